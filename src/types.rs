use std::fmt::{self, Display};

/// The static type a binding or expression is known to have at compile
/// time. `Any` matches every concrete type; `Unknown` is the absence of
/// information (an empty block, a not-yet-inferred recursive call).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum ObjectType {
    Integer,
    Float,
    Boolean,
    String,
    Null,
    Array,
    Hash,
    Any,
    #[default]
    Unknown,
}

impl ObjectType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Any | Self::Unknown)
    }

    pub fn is_string(self) -> bool {
        matches!(self, Self::String | Self::Any | Self::Unknown)
    }

    /// Whether a value of type `self` may be stored where `other` is
    /// expected. `Any` and `Unknown` are compatible in both directions.
    pub fn compatible_with(self, other: ObjectType) -> bool {
        use ObjectType::{Any, Unknown};
        self == other || matches!(self, Any | Unknown) || matches!(other, Any | Unknown)
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::String => "STRING",
            Self::Null => "NULL",
            Self::Array => "ARRAY",
            Self::Hash => "HASH",
            Self::Any => "ANY",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Everything the compiler knows statically about a binding or an
/// expression result.
///
/// For a callable, `object_type` is the *return* type and
/// `args_types`/`args_nullable` describe the parameters. When the return
/// value is itself callable, `function_attribute` holds its full
/// attribute, recursively.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Attribute {
    pub object_type: ObjectType,
    pub nullable: bool,
    pub is_function: bool,
    pub args_types: Vec<ObjectType>,
    pub args_nullable: Vec<bool>,
    pub function_attribute: Option<Box<Attribute>>,
}

impl Attribute {
    pub fn of(object_type: ObjectType) -> Self {
        Self {
            object_type,
            ..Self::default()
        }
    }

    pub fn nullable(object_type: ObjectType) -> Self {
        Self {
            object_type,
            nullable: true,
            ..Self::default()
        }
    }

    pub fn null() -> Self {
        Self::nullable(ObjectType::Null)
    }

    /// The attribute of the value produced by calling a binding with this
    /// attribute.
    pub fn returned(&self) -> Attribute {
        match &self.function_attribute {
            Some(inner) => (**inner).clone(),
            None => Attribute {
                object_type: self.object_type,
                nullable: self.nullable,
                ..Self::default()
            },
        }
    }
}
