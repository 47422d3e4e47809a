//! The virtual machine: a pure interpreter over a [`Bytecode`] bundle.
//!
//! State is a fixed-capacity value stack, a globals array, and a frame
//! stack. The dispatch loop pre-increments the instruction pointer,
//! fetches one opcode byte, reads its fixed-width operands, and executes.

use std::rc::Rc;

use thiserror::Error;

use crate::builtins::Builtin;
use crate::bytecode::Bytecode;
use crate::code::{read_u16, read_u8, Opcode};
use crate::utils::FxIndexMap;
use crate::value::{Closure, CompiledFunction, Hash, HashPair, Value};

use self::frame::Frame;

mod frame;

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

/// A runtime failure. The VM stops at the first one.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("frame overflow")]
    FrameOverflow,
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongNumberOfArguments { want: usize, got: usize },
    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },
    #[error("unknown string operator: {0}")]
    UnknownStringOperator(Opcode),
    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),
    #[error("unsupported type for inc/dec: {0}")]
    UnsupportedIncDec(&'static str),
    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),
    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),
    #[error("calling non-closure and non-builtin")]
    CallingNonFunction,
    #[error("not a function: {0}")]
    NotAFunction(&'static str),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
}

pub struct Vm {
    constants: Vec<Value>,
    stack: Box<[Value]>,
    globals: Box<[Value]>,
    frames: Vec<Frame>,
    /// Points one past the top of the stack.
    sp: usize,
}

impl Vm {
    /// Builds a VM over a bundle. The main program runs inside a
    /// synthetic closure with base pointer 0.
    pub fn new(bytecode: Bytecode) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_function,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE].into_boxed_slice(),
            globals: vec![Value::Null; GLOBALS_SIZE].into_boxed_slice(),
            frames,
            sp: 0,
        }
    }

    /// The value most recently popped off the stack; after [`Vm::run`]
    /// finishes this is the program's final result.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    /// Runs the program to completion or to its first error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() as isize - 1 {
            self.current_frame_mut().ip += 1;

            let frame = self.current_frame();
            let byte = frame.instructions()[frame.ip as usize];
            let Some(op) = Opcode::from_repr(byte) else {
                return Err(RuntimeError::UnknownOpcode(byte));
            };

            match op {
                Opcode::Constant => {
                    let index = self.read_u16_operand() as usize;
                    let value = self.constants[index].clone();
                    self.push(value)?;
                }

                Opcode::Pop => {
                    self.pop();
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }

                Opcode::Inc | Opcode::Dec => {
                    self.execute_inc_dec(op)?;
                }

                Opcode::True => self.push(Value::Bool(true))?,
                Opcode::False => self.push(Value::Bool(false))?,
                Opcode::Null => self.push(Value::Null)?,

                Opcode::Equal
                | Opcode::NotEqual
                | Opcode::GreaterThan
                | Opcode::GreaterEqualThan => {
                    self.execute_comparison(op)?;
                }

                Opcode::Bang => {
                    let operand = self.pop();
                    self.push(Value::Bool(!operand.is_truthy()))?;
                }

                Opcode::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Int(v) => self.push(Value::Int(v.wrapping_neg()))?,
                        Value::Float(v) => self.push(Value::Float(-v))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()))
                        }
                    }
                }

                Opcode::Jump => {
                    let position = self.read_u16_operand() as isize;
                    self.current_frame_mut().ip = position - 1;
                }

                Opcode::JumpNotTruthy => {
                    let position = self.read_u16_operand() as isize;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = position - 1;
                    }
                }

                Opcode::SetGlobal => {
                    let index = self.read_u16_operand() as usize;
                    self.globals[index] = self.pop();
                }

                Opcode::GetGlobal => {
                    let index = self.read_u16_operand() as usize;
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }

                Opcode::SetLocal => {
                    let index = self.read_u8_operand() as usize;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + index] = value;
                }

                Opcode::GetLocal => {
                    let index = self.read_u8_operand() as usize;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }

                Opcode::GetBuiltin => {
                    let ordinal = self.read_u8_operand();
                    self.push(Value::Builtin(Builtin(ordinal)))?;
                }

                Opcode::Array => {
                    let count = self.read_u16_operand() as usize;
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::from(elements))?;
                }

                Opcode::Hash => {
                    let count = self.read_u16_operand() as usize;
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                Opcode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index(left, index)?;
                }

                Opcode::Call => {
                    let num_args = self.read_u8_operand() as usize;
                    self.execute_call(num_args)?;
                }

                Opcode::Return => {
                    let value = self.pop();
                    match self.frames.pop() {
                        Some(frame) if !self.frames.is_empty() => {
                            self.sp = frame.base_pointer - 1;
                            self.push(value)?;
                        }
                        _ => {
                            // a return in the main program ends it with
                            // its value on top
                            self.push(value)?;
                            return Ok(());
                        }
                    }
                }

                Opcode::Closure => {
                    let const_index = self.read_u16_operand() as usize;
                    let num_free = self.read_u8_operand() as usize;
                    self.push_closure(const_index, num_free)?;
                }

                Opcode::GetFree => {
                    let index = self.read_u8_operand() as usize;
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }

                Opcode::CurrentClosure => {
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.push(Value::Closure(closure))?;
                }
            }
        }

        Ok(())
    }

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Int(l), Value::Int(r)) = (&left, &right) {
            let result = match op {
                Opcode::Add => l.wrapping_add(*r),
                Opcode::Sub => l.wrapping_sub(*r),
                Opcode::Mul => l.wrapping_mul(*r),
                _ => l.checked_div(*r).ok_or(RuntimeError::DivisionByZero)?,
            };
            return self.push(Value::Int(result));
        }

        if let (Some(l), Some(r)) = (float_value(&left), float_value(&right)) {
            let result = match op {
                Opcode::Add => l + r,
                Opcode::Sub => l - r,
                Opcode::Mul => l * r,
                _ => l / r,
            };
            return self.push(Value::Float(result));
        }

        if let (Value::Str(l), Value::Str(r)) = (&left, &right) {
            if op != Opcode::Add {
                return Err(RuntimeError::UnknownStringOperator(op));
            }
            let mut concatenated = String::with_capacity(l.len() + r.len());
            concatenated.push_str(l);
            concatenated.push_str(r);
            return self.push(Value::from(concatenated));
        }

        Err(RuntimeError::UnsupportedBinaryTypes {
            left: left.type_name(),
            right: right.type_name(),
        })
    }

    fn execute_inc_dec(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let delta: i64 = if op == Opcode::Inc { 1 } else { -1 };

        match self.pop() {
            Value::Int(v) => self.push(Value::Int(v.wrapping_add(delta))),
            Value::Float(v) => self.push(Value::Float(v + delta as f64)),
            other => Err(RuntimeError::UnsupportedIncDec(other.type_name())),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Int(l), Value::Int(r)) = (&left, &right) {
            let result = match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                _ => l >= r,
            };
            return self.push(Value::Bool(result));
        }

        if let (Some(l), Some(r)) = (float_value(&left), float_value(&right)) {
            let result = match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                _ => l >= r,
            };
            return self.push(Value::Bool(result));
        }

        if let (Value::Str(l), Value::Str(r)) = (&left, &right) {
            let result = match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                _ => l >= r,
            };
            return self.push(Value::Bool(result));
        }

        match op {
            Opcode::Equal => {
                let equal = identity_equal(&left, &right);
                self.push(Value::Bool(equal))
            }
            Opcode::NotEqual => {
                let equal = identity_equal(&left, &right);
                self.push(Value::Bool(!equal))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes {
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, RuntimeError> {
        let mut pairs = FxIndexMap::default();

        for slot in (start..end).step_by(2) {
            let key = self.stack[slot].clone();
            let value = self.stack[slot + 1].clone();

            let Some(hash_key) = key.hash_key() else {
                return Err(RuntimeError::UnusableHashKey(key.type_name()));
            };

            pairs.insert(hash_key, HashPair { key, value });
        }

        Ok(Value::Hash(Rc::new(Hash(pairs))))
    }

    fn execute_index(&mut self, left: Value, index: Value) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(array), Value::Int(i)) => {
                let element = usize::try_from(*i)
                    .ok()
                    .and_then(|i| array.get(i).cloned());
                self.push(element.unwrap_or(Value::Null))
            }
            (Value::Hash(hash), _) => {
                let Some(key) = index.hash_key() else {
                    return Err(RuntimeError::UnusableHashKey(index.type_name()));
                };
                let value = hash.get(&key).map(|pair| pair.value.clone());
                self.push(value.unwrap_or(Value::Null))
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();

        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError::CallingNonFunction),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), RuntimeError> {
        if num_args != closure.func.num_parameters {
            return Err(RuntimeError::WrongNumberOfArguments {
                want: closure.func.num_parameters,
                got: num_args,
            });
        }

        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;
        if base_pointer + num_locals > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames.push(Frame::new(closure, base_pointer));
        // reserve the local slots above the arguments
        self.sp = base_pointer + num_locals;

        Ok(())
    }

    fn call_builtin(&mut self, builtin: Builtin, num_args: usize) -> Result<(), RuntimeError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();

        let result = builtin.call(&args);
        self.sp = self.sp - num_args - 1;

        self.push(result.unwrap_or(Value::Null))
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let constant = self.constants[const_index].clone();
        let Value::Function(function) = constant else {
            return Err(RuntimeError::NotAFunction(constant.type_name()));
        };

        // the free values were pushed in capture order; snapshot them
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        let closure = Closure { func: function, free };
        self.push(Value::Closure(Rc::new(closure)))
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.stack[self.sp] = value;
        self.sp += 1;

        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn read_u16_operand(&mut self) -> u16 {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = read_u16(&frame.closure.func.instructions[ip + 1..]);
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = read_u8(&frame.closure.func.instructions[ip + 1..]);
        frame.ip += 1;
        value
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let index = self.frames.len() - 1;
        &mut self.frames[index]
    }
}

fn float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

/// Equality for the non-numeric kinds: singletons and primitives compare
/// by payload, strings by content, reference kinds by pointer identity.
/// Values of different kinds are never equal.
fn identity_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Null, Value::Null) => true,
        (Value::Str(l), Value::Str(r)) => l == r,
        (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(l, r),
        (Value::Hash(l), Value::Hash(r)) => Rc::ptr_eq(l, r),
        (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
        (Value::Closure(l), Value::Closure(r)) => Rc::ptr_eq(l, r),
        (Value::Builtin(l), Value::Builtin(r)) => l == r,
        (Value::Error(l), Value::Error(r)) => Rc::ptr_eq(l, r),
        _ => false,
    }
}
