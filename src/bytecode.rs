use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::code::Instructions;
use crate::value::Value;

/// Magic header prefixed to every serialized bundle.
const MAGIC: &[u8; 4] = b"AURB";

/// The compiler's output: a flat instruction buffer plus the constant
/// pool it references by index.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("missing or invalid magic header")]
    InvalidMagic,
    #[error(transparent)]
    Encoding(#[from] bincode::Error),
}

impl Bytecode {
    /// Serializes the bundle. The inverse of [`Bytecode::from_bytes`];
    /// the two round-trip bit-identically.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BytecodeError> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend(bincode::serialize(self)?);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BytecodeError> {
        let payload = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or(BytecodeError::InvalidMagic)?;
        Ok(bincode::deserialize(payload)?)
    }
}
