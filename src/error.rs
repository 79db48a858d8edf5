//! Typed errors for the VM's public surface.
//!
//! Low-level helpers (object/dictionary/text decode) still return
//! `Result<T, String>` the way the teacher codebase does throughout its
//! object and text modules; `VmError::Internal` is the seam those bubble up
//! through once they reach the run loop or another public entry point.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("decode error at pc {pc:#06x}: opcode byte {opcode_byte:#04x}")]
    Decode { pc: u32, opcode_byte: u8 },

    #[error("memory violation: write to {addr:#06x}")]
    MemoryViolation { addr: u32 },

    #[error("call stack underflow")]
    FrameUnderflow,

    #[error("call stack overflow (depth limit exceeded)")]
    FrameOverflow,

    #[error("put_prop on object {object} for property {property} it does not have")]
    UnknownProperty { object: u16, property: u16 },

    #[error("save/restore error: {0}")]
    SaveRestore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl From<String> for VmError {
    fn from(s: String) -> Self {
        VmError::Internal(s)
    }
}

pub type VmResult<T> = Result<T, VmError>;
