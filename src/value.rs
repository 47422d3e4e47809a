use std::fmt::{self, Display};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use paste::paste;
use serde::{Deserialize, Serialize};

use crate::builtins::Builtin;
use crate::code::Instructions;
use crate::utils::FxIndexMap;

macro_rules! variant_methods {
    ($($variant:ident($inner_ty:ty), $article:literal);+ $(;)?) => {
        impl Value {
            paste! {
                $(
                    #[doc = "Returns `true` if the `Value` is " $article " `" $variant "`."]
                    #[inline]
                    pub fn [<is_ $variant:lower>](&self) -> bool {
                        matches!(self, Self::$variant(_))
                    }

                    #[doc = "Borrows the payload if `self` is " $article " `" $variant "`."]
                    #[inline]
                    pub fn [<as_ $variant:lower>](&self) -> Option<&$inner_ty> {
                        match self {
                            Self::$variant(v) => Some(v),
                            _ => None,
                        }
                    }
                )+
            }
        }
    }
}

/// A runtime value.
///
/// Compound values hang off `Rc` so that cloning a `Value` is a pointer
/// copy; a value stays alive for as long as the stack, the globals array,
/// or a closure's free list refers to it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Value {
    /// A signed 64-bit integer.
    Int(i64),
    /// A double precision IEEE 754 floating point value.
    Float(f64),
    /// A boolean value which can be true or false.
    Bool(bool),
    /// The null singleton.
    Null,
    /// An immutable string.
    Str(Rc<str>),
    /// An ordered, immutable sequence of values.
    Array(Rc<Array>),
    /// A mapping from hashable keys to key/value pairs.
    Hash(Rc<Hash>),
    /// A unit of compiled bytecode living in the constant pool.
    Function(Rc<CompiledFunction>),
    /// A compiled function paired with its captured free values.
    Closure(Rc<Closure>),
    /// A host-provided builtin function.
    Builtin(Builtin),
    /// An error produced by a builtin; pushed like any other value.
    Error(Rc<str>),
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Bool(_) => "BOOLEAN",
            Self::Null => "NULL",
            Self::Str(_) => "STRING",
            Self::Array(_) => "ARRAY",
            Self::Hash(_) => "HASH",
            Self::Function(_) => "COMPILED_FUNCTION",
            Self::Closure(_) => "CLOSURE",
            Self::Builtin(_) => "BUILTIN",
            Self::Error(_) => "ERROR",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Every value has a truthiness: `false`, `null`, `0`, and `0.0` are
    /// falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(v) => *v,
            Self::Null => false,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            _ => true,
        }
    }

    /// The key this value hashes under, or `None` for unhashable kinds.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Self::Int(v) => Some(HashKey::Int(*v)),
            Self::Bool(v) => Some(HashKey::Bool(*v)),
            Self::Str(s) => Some(HashKey::Str(Rc::clone(s))),
            _ => None,
        }
    }
}

variant_methods! {
    Int(i64), "an";
    Float(f64), "a";
    Bool(bool), "a";
    Str(Rc<str>), "a";
    Array(Rc<Array>), "an";
    Hash(Rc<Hash>), "a";
    Function(Rc<CompiledFunction>), "a";
    Closure(Rc<Closure>), "a";
    Builtin(Builtin), "a";
    Error(Rc<str>), "an";
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Self::Array(Rc::new(Array(elements)))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Null => f.write_str("null"),
            Self::Str(v) => f.write_str(v),
            Self::Array(v) => {
                f.write_str("[")?;
                for (i, elem) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                f.write_str("]")
            }
            Self::Hash(v) => {
                f.write_str("{")?;
                for (i, pair) in v.values().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                f.write_str("}")
            }
            Self::Function(v) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(v)),
            Self::Closure(v) => write!(f, "Closure[{:p}]", Rc::as_ptr(v)),
            Self::Builtin(_) => f.write_str("builtin function"),
            Self::Error(msg) => write!(f, "ERROR: {msg}"),
        }
    }
}

/// A hash key: the type tag plus the payload of a hashable value.
/// Integers and booleans hash by value, strings by content.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum HashKey {
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
}

/// An ordered, immutable sequence of values. Builtins that "modify" an
/// array (`push`, `rest`) return a fresh one.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Array(pub Vec<Value>);

impl Deref for Array {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Array {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Value>> for Array {
    fn from(elements: Vec<Value>) -> Self {
        Self(elements)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The stored key/value pair of a hash entry. Keeping the original key
/// value around lets the hash display and iterate with the keys the
/// script supplied.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A hash object: insertion-ordered so iteration and display are
/// deterministic.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Hash(pub FxIndexMap<HashKey, HashPair>);

impl Deref for Hash {
    type Target = FxIndexMap<HashKey, HashPair>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Hash {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A compiled function: its instruction slice plus the frame layout the
/// VM needs to call it.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with the values of its free variables,
/// snapshotted when the closure was built.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Value::from(true).is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0i64).is_truthy());
        assert!(!Value::from(0.0).is_truthy());
        assert!(Value::from(5i64).is_truthy());
        assert!(Value::from(2.3).is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(Value::from(Vec::new()).is_truthy());
    }

    #[test]
    fn hash_keys_by_content() {
        let hello1 = Value::from("Hello World");
        let hello2 = Value::from("Hello World");
        let diff = Value::from("My name is johnny");

        assert_eq!(hello1.hash_key(), hello2.hash_key());
        assert_ne!(hello1.hash_key(), diff.hash_key());
        assert_ne!(Value::from(1i64).hash_key(), Value::from(true).hash_key());
        assert!(Value::from(1.5).hash_key().is_none());
        assert!(Value::Null.hash_key().is_none());
    }

    #[test]
    fn display() {
        let array = Value::from(vec![Value::from(1), Value::from("two")]);
        assert_eq!(array.to_string(), "[1, two]");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Error(Rc::from("boom")).to_string(), "ERROR: boom");
    }
}
