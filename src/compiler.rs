//! The one-shot compiler: walks a parsed program, emits bytecode into a
//! stack of compilation scopes, interns constants, and runs type and
//! nullability inference over the symbol table as it goes.

use std::mem;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Block, Expression, Program, Statement};
use crate::builtins::BUILTINS;
use crate::bytecode::Bytecode;
use crate::code::{make, Instructions, Opcode};
use crate::symbol::{Symbol, SymbolScope, SymbolTable};
use crate::types::{Attribute, ObjectType};
use crate::value::{CompiledFunction, Value};

/// A compile-time failure. Compilation stops at the first one; the
/// partially emitted bytecode is discarded with the compiler.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum CompileError {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    /// A value that can be null flowing into a non-nullable position.
    #[error("null value error: {0}")]
    NullValue(String),
    #[error("wrong type used: want={want}, got={got}")]
    WrongType { want: ObjectType, got: ObjectType },
    #[error("wrong argument count: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },
    #[error("block returns incompatible types: {first} {second}")]
    IncompatibleBlockTypes {
        first: ObjectType,
        second: ObjectType,
    },
    #[error("trying to do '{operator}' with other than {expected}")]
    UnsupportedOperand {
        operator: String,
        expected: &'static str,
    },
    /// Return sites producing callables with different signatures.
    #[error("function attribute disagreement")]
    FunctionAttributeDisagreement,
}

#[derive(Copy, Clone, Debug, Default)]
struct EmittedInstruction {
    opcode: Option<Opcode>,
    position: usize,
}

/// One function body under compilation. The last/previous emission
/// records are what make the trailing-pop rewinds possible.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: EmittedInstruction,
    previous_instruction: EmittedInstruction,
}

pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();

        for (index, builtin) in BUILTINS.iter().enumerate() {
            let attribute = Attribute {
                object_type: builtin.result,
                nullable: builtin.nullable,
                is_function: true,
                ..Attribute::default()
            };
            symbol_table.define_builtin(index, builtin.name, attribute);
        }

        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Compiles a whole program into the main scope.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Compiles one statement. Returns the attribute of the value the
    /// statement produces, or `None` for declarations and reassignments,
    /// which produce nothing.
    fn compile_statement(
        &mut self,
        statement: &Statement,
    ) -> Result<Option<Attribute>, CompileError> {
        match statement {
            Statement::Expression(expression) => {
                let attribute = self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[]);
                Ok(Some(attribute))
            }
            Statement::Return(value) => {
                let attribute = self.compile_expression(value)?;
                self.emit(Opcode::Return, &[]);
                Ok(Some(attribute))
            }
            Statement::Let {
                name,
                declared,
                nullable,
                value,
            } => {
                self.compile_let(name, *declared, *nullable, value)?;
                Ok(None)
            }
            Statement::Reassign { name, value } => {
                self.compile_reassign(name, value)?;
                Ok(None)
            }
        }
    }

    fn compile_let(
        &mut self,
        name: &str,
        declared: Option<ObjectType>,
        nullable: bool,
        value: &Expression,
    ) -> Result<(), CompileError> {
        // defined up front so the slot exists while the initializer
        // compiles, matching runtime slot allocation order
        let symbol = self.symbol_table.define(name, Attribute::default());
        let value_attribute = self.compile_expression(value)?;

        if value_attribute.nullable && !nullable {
            return Err(CompileError::NullValue(name.to_owned()));
        }

        if let Some(want) = declared {
            if value_attribute.object_type != ObjectType::Null
                && !value_attribute.object_type.compatible_with(want)
            {
                return Err(CompileError::WrongType {
                    want,
                    got: value_attribute.object_type,
                });
            }
        }

        let object_type = declared.unwrap_or(value_attribute.object_type);
        let attribute = Attribute {
            object_type,
            nullable,
            ..value_attribute
        };
        self.symbol_table.set_attribute(name, attribute);

        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
            _ => self.emit(Opcode::SetLocal, &[symbol.index]),
        };

        Ok(())
    }

    fn compile_reassign(&mut self, name: &str, value: &Expression) -> Result<(), CompileError> {
        let Some(symbol) = self.symbol_table.resolve(name) else {
            return Err(CompileError::UndefinedVariable(name.to_owned()));
        };

        let value_attribute = self.compile_expression(value)?;

        if value_attribute.nullable && !symbol.attribute.nullable {
            return Err(CompileError::NullValue(name.to_owned()));
        }

        if value_attribute.object_type != ObjectType::Null
            && !value_attribute
                .object_type
                .compatible_with(symbol.attribute.object_type)
        {
            return Err(CompileError::WrongType {
                want: symbol.attribute.object_type,
                got: value_attribute.object_type,
            });
        }

        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
            _ => self.emit(Opcode::SetLocal, &[symbol.index]),
        };

        Ok(())
    }

    /// Compiles the statements of a block and unifies the attributes of
    /// its type-producing statements.
    fn compile_block(&mut self, block: &Block) -> Result<Attribute, CompileError> {
        let mut merged: Option<Attribute> = None;

        for statement in &block.0 {
            if let Some(attribute) = self.compile_statement(statement)? {
                merged = Some(match merged {
                    Some(current) => unify(current, attribute)?,
                    None => attribute,
                });
            }
        }

        Ok(merged.unwrap_or_default())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<Attribute, CompileError> {
        match expression {
            Expression::Integer(value) => {
                let index = self.add_constant(Value::Int(*value));
                self.emit(Opcode::Constant, &[index]);
                Ok(Attribute::of(ObjectType::Integer))
            }

            Expression::Float(value) => {
                let index = self.add_constant(Value::Float(*value));
                self.emit(Opcode::Constant, &[index]);
                Ok(Attribute::of(ObjectType::Float))
            }

            Expression::String(value) => {
                let index = self.add_constant(Value::from(value.as_str()));
                self.emit(Opcode::Constant, &[index]);
                Ok(Attribute::of(ObjectType::String))
            }

            // true, false, and null are VM singletons, not constants
            Expression::Boolean(value) => {
                self.emit(if *value { Opcode::True } else { Opcode::False }, &[]);
                Ok(Attribute::of(ObjectType::Boolean))
            }

            Expression::Null => {
                self.emit(Opcode::Null, &[]);
                Ok(Attribute::null())
            }

            Expression::Identifier(name) => {
                let Some(symbol) = self.symbol_table.resolve(name) else {
                    return Err(CompileError::UndefinedVariable(name.clone()));
                };
                self.load_symbol(&symbol);
                Ok(symbol.attribute)
            }

            Expression::Prefix { operator, right } => {
                let right_attribute = self.compile_expression(right)?;

                match operator.as_str() {
                    "!" => {
                        self.emit(Opcode::Bang, &[]);
                        Ok(Attribute::of(ObjectType::Boolean))
                    }
                    "-" => {
                        if !right_attribute.object_type.is_numeric() {
                            return Err(CompileError::UnsupportedOperand {
                                operator: operator.clone(),
                                expected: "numbers",
                            });
                        }
                        self.emit(Opcode::Minus, &[]);
                        Ok(Attribute::of(right_attribute.object_type))
                    }
                    other => Err(CompileError::UnknownOperator(other.to_owned())),
                }
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(operator, left, right),

            Expression::IncPost { name, operator } => {
                let symbol = self.resolve_numeric(name, operator)?;
                // two loads so the pre-update value survives the store
                self.load_variable(&symbol);
                self.load_variable(&symbol);
                self.emit_inc_dec(operator)?;
                self.store_variable(&symbol);
                Ok(Attribute::of(symbol.attribute.object_type))
            }

            Expression::IncPre { name, operator } => {
                let symbol = self.resolve_numeric(name, operator)?;
                self.load_variable(&symbol);
                self.emit_inc_dec(operator)?;
                self.store_variable(&symbol);
                self.load_variable(&symbol);
                Ok(Attribute::of(symbol.attribute.object_type))
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

                let consequence_attribute = self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                } else {
                    self.emit(Opcode::Null, &[]);
                }

                let jump_pos = self.emit(Opcode::Jump, &[9999]);

                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy_pos, after_consequence);

                let alternative_attribute = match alternative {
                    Some(alternative) => {
                        let attribute = self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        } else {
                            self.emit(Opcode::Null, &[]);
                        }
                        attribute
                    }
                    None => {
                        self.emit(Opcode::Null, &[]);
                        Attribute::null()
                    }
                };

                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump_pos, after_alternative);

                unify(consequence_attribute, alternative_attribute)
            }

            Expression::While { condition, body } => {
                let condition_pos = self.current_scope().instructions.len();

                self.compile_expression(condition)?;
                let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

                self.compile_block(body)?;
                self.emit(Opcode::Jump, &[condition_pos]);

                let after_body = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy_pos, after_body);

                // a while expression always yields null
                self.emit(Opcode::Null, &[]);
                Ok(Attribute::null())
            }

            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
                Ok(Attribute::of(ObjectType::Array))
            }

            Expression::Hash(pairs) => {
                // keys sorted by their textual form so emission order is
                // deterministic
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
                Ok(Attribute::of(ObjectType::Hash))
            }

            Expression::Index { left, index } => {
                let left_attribute = self.compile_expression(left)?;
                let index_attribute = self.compile_expression(index)?;

                match left_attribute.object_type {
                    ObjectType::Array | ObjectType::Hash | ObjectType::Any | ObjectType::Unknown => {}
                    _ => {
                        return Err(CompileError::UnsupportedOperand {
                            operator: "[]".to_owned(),
                            expected: "array or hash",
                        })
                    }
                }

                if left_attribute.object_type == ObjectType::Array
                    && !index_attribute
                        .object_type
                        .compatible_with(ObjectType::Integer)
                {
                    return Err(CompileError::UnsupportedOperand {
                        operator: "[]".to_owned(),
                        expected: "integer index",
                    });
                }

                self.emit(Opcode::Index, &[]);
                Ok(Attribute::nullable(ObjectType::Any))
            }

            Expression::Function {
                name,
                parameters,
                body,
            } => {
                self.enter_scope();

                let args_types: Vec<ObjectType> = parameters
                    .iter()
                    .map(|p| p.ty.unwrap_or(ObjectType::Any))
                    .collect();
                let args_nullable: Vec<bool> = parameters.iter().map(|p| p.nullable).collect();

                if let Some(name) = name {
                    // registered before the parameters so recursion
                    // resolves without a capture slot
                    let attribute = Attribute {
                        object_type: ObjectType::Unknown,
                        nullable: false,
                        is_function: true,
                        args_types: args_types.clone(),
                        args_nullable: args_nullable.clone(),
                        function_attribute: None,
                    };
                    self.symbol_table.define_function_name(name.as_str(), attribute);
                }

                for parameter in parameters {
                    let attribute = Attribute {
                        object_type: parameter.ty.unwrap_or(ObjectType::Any),
                        nullable: parameter.nullable,
                        ..Attribute::default()
                    };
                    self.symbol_table.define(parameter.name.as_str(), attribute);
                }

                let body_attribute = self.compile_block(body)?;

                if self.last_instruction_is(Opcode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Opcode::Return) {
                    self.emit(Opcode::Null, &[]);
                    self.emit(Opcode::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions();
                let instructions = self.leave_scope();

                // push the captured values in the enclosing scope, in
                // free-list order, for OpClosure to consume
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::Function(Rc::new(function)));
                self.emit(Opcode::Closure, &[index, free_symbols.len()]);

                let function_attribute = body_attribute
                    .is_function
                    .then(|| Box::new(body_attribute.clone()));

                Ok(Attribute {
                    object_type: body_attribute.object_type,
                    nullable: body_attribute.nullable,
                    is_function: true,
                    args_types,
                    args_nullable,
                    function_attribute,
                })
            }

            Expression::Call {
                function,
                arguments,
            } => {
                let callee_attribute = self.compile_expression(function)?;

                // arity is checked here only against explicitly typed
                // signatures; untyped callees defer to the VM
                let typed = callee_attribute
                    .args_types
                    .iter()
                    .any(|ty| *ty != ObjectType::Any);
                if callee_attribute.is_function
                    && typed
                    && arguments.len() != callee_attribute.args_types.len()
                {
                    return Err(CompileError::WrongArgumentCount {
                        want: callee_attribute.args_types.len(),
                        got: arguments.len(),
                    });
                }

                for (position, argument) in arguments.iter().enumerate() {
                    let argument_attribute = self.compile_expression(argument)?;

                    let want = callee_attribute.args_types.get(position);
                    let want_nullable = callee_attribute.args_nullable.get(position);

                    if let (Some(&want), Some(&want_nullable)) = (want, want_nullable) {
                        if argument_attribute.nullable && !want_nullable {
                            return Err(CompileError::NullValue(format!(
                                "argument {}",
                                position + 1
                            )));
                        }
                        if argument_attribute.object_type != ObjectType::Null
                            && !argument_attribute.object_type.compatible_with(want)
                        {
                            return Err(CompileError::WrongType {
                                want,
                                got: argument_attribute.object_type,
                            });
                        }
                    }
                }

                self.emit(Opcode::Call, &[arguments.len()]);
                Ok(callee_attribute.returned())
            }
        }
    }

    fn compile_infix(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
    ) -> Result<Attribute, CompileError> {
        // < and <= reuse the greater-than opcodes with the operands
        // emitted in reverse order
        if operator == "<" || operator == "<=" {
            let right_attribute = self.compile_expression(right)?;
            let left_attribute = self.compile_expression(left)?;

            let op = if operator == "<" {
                Opcode::GreaterThan
            } else {
                Opcode::GreaterEqualThan
            };
            self.emit(op, &[]);

            return comparison_attribute(operator, &left_attribute, &right_attribute);
        }

        let left_attribute = self.compile_expression(left)?;
        let right_attribute = self.compile_expression(right)?;

        let lt = left_attribute.object_type;
        let rt = right_attribute.object_type;

        match operator {
            "+" => {
                if lt == ObjectType::String || rt == ObjectType::String {
                    if !(lt.is_string() && rt.is_string()) {
                        return Err(CompileError::UnsupportedOperand {
                            operator: operator.to_owned(),
                            expected: "numbers or string",
                        });
                    }
                    self.emit(Opcode::Add, &[]);
                    Ok(Attribute::of(ObjectType::String))
                } else if lt.is_numeric() && rt.is_numeric() {
                    self.emit(Opcode::Add, &[]);
                    Ok(Attribute::of(numeric_result(lt, rt)))
                } else {
                    Err(CompileError::UnsupportedOperand {
                        operator: operator.to_owned(),
                        expected: "numbers or string",
                    })
                }
            }

            "-" | "*" | "/" => {
                if !(lt.is_numeric() && rt.is_numeric()) {
                    return Err(CompileError::UnsupportedOperand {
                        operator: operator.to_owned(),
                        expected: "numbers",
                    });
                }

                let op = match operator {
                    "-" => Opcode::Sub,
                    "*" => Opcode::Mul,
                    _ => Opcode::Div,
                };
                self.emit(op, &[]);
                Ok(Attribute::of(numeric_result(lt, rt)))
            }

            ">" | ">=" => {
                let op = if operator == ">" {
                    Opcode::GreaterThan
                } else {
                    Opcode::GreaterEqualThan
                };
                self.emit(op, &[]);
                comparison_attribute(operator, &left_attribute, &right_attribute)
            }

            "==" => {
                self.emit(Opcode::Equal, &[]);
                Ok(Attribute::of(ObjectType::Boolean))
            }

            "!=" => {
                self.emit(Opcode::NotEqual, &[]);
                Ok(Attribute::of(ObjectType::Boolean))
            }

            other => Err(CompileError::UnknownOperator(other.to_owned())),
        }
    }

    fn resolve_numeric(&mut self, name: &str, operator: &str) -> Result<Symbol, CompileError> {
        let Some(symbol) = self.symbol_table.resolve(name) else {
            return Err(CompileError::UndefinedVariable(name.to_owned()));
        };

        if !symbol.attribute.object_type.is_numeric() {
            return Err(CompileError::UnsupportedOperand {
                operator: operator.to_owned(),
                expected: "numbers",
            });
        }

        Ok(symbol)
    }

    fn emit_inc_dec(&mut self, operator: &str) -> Result<(), CompileError> {
        match operator {
            "++" => self.emit(Opcode::Inc, &[]),
            "--" => self.emit(Opcode::Dec, &[]),
            other => return Err(CompileError::UnknownOperator(other.to_owned())),
        };
        Ok(())
    }

    fn load_variable(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            _ => self.emit(Opcode::GetLocal, &[symbol.index]),
        };
    }

    fn store_variable(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
            _ => self.emit(Opcode::SetLocal, &[symbol.index]),
        };
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = EmittedInstruction {
            opcode: Some(opcode),
            position,
        };
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        let scope = self.current_scope();
        !scope.instructions.is_empty() && scope.last_instruction.opcode == Some(opcode)
    }

    /// Rewinds the trailing `OpPop` so the preceding expression's value
    /// stays on the stack. Restores the previous emission record, which
    /// keeps a second rewind in the same scope sound.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let position = scope.last_instruction.position;
        scope.instructions.truncate(position);
        scope.last_instruction = scope.previous_instruction;
    }

    /// Rewrites a body-final `OpPop` into `OpReturn`, making the last
    /// expression of a function body its return value.
    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope_mut();
        let position = scope.last_instruction.position;
        scope.instructions[position] = Opcode::Return as u8;
        scope.last_instruction.opcode = Some(Opcode::Return);
    }

    fn replace_instruction(&mut self, position: usize, instruction: &[u8]) {
        let scope = self.current_scope_mut();
        scope.instructions[position..position + instruction.len()].copy_from_slice(instruction);
    }

    /// Backpatches the operand of the (jump) instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let Some(op) = Opcode::from_repr(self.current_scope().instructions[position]) else {
            return;
        };
        let instruction = make(op, &[operand]);
        self.replace_instruction(position, &instruction);
    }

    fn current_scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        let index = self.scopes.len() - 1;
        &mut self.scopes[index]
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let table = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(table);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().unwrap_or_default();
        let table = mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().unwrap_or_default();
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_result(left: ObjectType, right: ObjectType) -> ObjectType {
    use ObjectType::{Any, Float, Integer};

    match (left, right) {
        (Integer, Integer) => Integer,
        (Integer | Float, Integer | Float) => Float,
        _ => Any,
    }
}

fn comparison_attribute(
    operator: &str,
    left: &Attribute,
    right: &Attribute,
) -> Result<Attribute, CompileError> {
    let lt = left.object_type;
    let rt = right.object_type;

    if (lt.is_numeric() && rt.is_numeric()) || (lt.is_string() && rt.is_string()) {
        Ok(Attribute::of(ObjectType::Boolean))
    } else {
        Err(CompileError::UnsupportedOperand {
            operator: operator.to_owned(),
            expected: "numbers or string",
        })
    }
}

/// Unifies the attributes of two value-producing paths (the branches of
/// an if-expression, the type-producing statements of a block).
fn unify(a: Attribute, b: Attribute) -> Result<Attribute, CompileError> {
    use ObjectType::{Any, Null, Unknown};

    if a.is_function && b.is_function {
        let agree = a.args_types == b.args_types
            && a.args_nullable == b.args_nullable
            && a.object_type == b.object_type
            && a.function_attribute == b.function_attribute;
        if !agree {
            return Err(CompileError::FunctionAttributeDisagreement);
        }
        let nullable = a.nullable || b.nullable;
        return Ok(Attribute { nullable, ..a });
    }

    if !a.is_function && a.object_type == Unknown {
        let nullable = a.nullable || b.nullable;
        return Ok(Attribute { nullable, ..b });
    }
    if !b.is_function && b.object_type == Unknown {
        let nullable = a.nullable || b.nullable;
        return Ok(Attribute { nullable, ..a });
    }

    if !a.is_function && a.object_type == Any || !b.is_function && b.object_type == Any {
        return Ok(Attribute {
            object_type: Any,
            nullable: a.nullable || b.nullable,
            ..Attribute::default()
        });
    }

    if !a.is_function && a.object_type == Null {
        return Ok(Attribute { nullable: true, ..b });
    }
    if !b.is_function && b.object_type == Null {
        return Ok(Attribute { nullable: true, ..a });
    }

    if a.is_function != b.is_function {
        return Err(CompileError::FunctionAttributeDisagreement);
    }

    if a.object_type == b.object_type {
        let nullable = a.nullable || b.nullable;
        return Ok(Attribute { nullable, ..a });
    }

    Err(CompileError::IncompatibleBlockTypes {
        first: a.object_type,
        second: b.object_type,
    })
}
