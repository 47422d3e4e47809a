//! The host-provided builtin functions.
//!
//! Builtins are registered in a fixed order; `OpGetBuiltin` addresses
//! them by ordinal. A builtin reports misuse by *returning* an
//! [`Value::Error`] rather than aborting the VM, so scripts can observe
//! the failure.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::types::ObjectType;
use crate::value::{Array, Value};

pub type BuiltinFn = fn(&[Value]) -> Option<Value>;

/// One entry of the builtin registry: the callable plus the return-type
/// contract the compiler records for it. Argument validation happens
/// inside the builtin itself.
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
    pub result: ObjectType,
    pub nullable: bool,
}

/// The builtin registry, in ordinal order.
pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
        result: ObjectType::Integer,
        nullable: false,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
        result: ObjectType::Null,
        nullable: true,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
        result: ObjectType::Any,
        nullable: true,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
        result: ObjectType::Any,
        nullable: true,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
        result: ObjectType::Array,
        nullable: true,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
        result: ObjectType::Array,
        nullable: false,
    },
];

/// The ordinal of a registered builtin; the operand of `OpGetBuiltin`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Builtin(pub u8);

impl Builtin {
    pub fn def(self) -> &'static BuiltinDef {
        &BUILTINS[self.0 as usize]
    }

    pub fn name(self) -> &'static str {
        self.def().name
    }

    pub fn call(self, args: &[Value]) -> Option<Value> {
        (self.def().func)(args)
    }
}

fn error(message: String) -> Option<Value> {
    Some(Value::Error(Rc::from(message.as_str())))
}

fn wrong_arguments(got: usize, want: usize) -> Option<Value> {
    error(format!("wrong number of arguments. got={got}, want={want}"))
}

fn builtin_len(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }

    match &args[0] {
        Value::Str(s) => Some(Value::Int(s.len() as i64)),
        Value::Array(a) => Some(Value::Int(a.len() as i64)),
        other => error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Option<Value> {
    for arg in args {
        println!("{arg}");
    }
    None
}

fn builtin_first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }

    match &args[0] {
        Value::Array(a) => a.first().cloned(),
        other => error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }

    match &args[0] {
        Value::Array(a) => a.last().cloned(),
        other => error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_rest(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }

    match &args[0] {
        Value::Array(a) if !a.is_empty() => {
            let rest: Array = a.iter().skip(1).cloned().collect();
            Some(Value::Array(Rc::new(rest)))
        }
        Value::Array(_) => None,
        other => error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_push(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arguments(args.len(), 2);
    }

    match &args[0] {
        Value::Array(a) => {
            let mut elements = a.0.clone();
            elements.push(args[1].clone());
            Some(Value::Array(Rc::new(Array(elements))))
        }
        other => error(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}
