use evm_derive::Error;

/// Errors raised while executing or assembling bytecode.
///
/// Execution errors are fatal: the VM stops at the faulting instruction and
/// keeps its stack, gas and program counter as they were at that point.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum VMError {
    // =========================
    // Execution
    // =========================
    /// Gas left is smaller than the cost of the next instruction.
    #[error("out of gas: instruction requires {required}, {remaining} remaining")]
    OutOfGas { required: u64, remaining: u64 },
    /// An instruction needs more operands than the stack holds.
    #[error("stack underflow: instruction requires {required} operands, {available} available")]
    StackUnderflow { required: usize, available: usize },
    /// A push would exceed the configured stack depth.
    #[error("stack overflow: depth limit of {limit} reached")]
    StackOverflow { limit: usize },
    /// Byte is neither an instruction nor part of the PUSH family.
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    /// An immediate operand runs past the end of the bytecode.
    #[error(
        "unexpected end of bytecode at offset {ip}: requested {requested} bytes, {available} available"
    )]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },

    // =========================
    // Assembly
    // =========================
    /// Unrecognized instruction mnemonic.
    #[error("invalid instruction name: {name}")]
    InvalidInstructionName { name: String },
    /// Wrong number of operands for an instruction.
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Immediate is malformed or does not fit the push width.
    #[error("invalid immediate {token}: expected a value that fits in {width} byte(s)")]
    InvalidImmediate { token: String, width: usize },
    /// Malformed hex input.
    #[error("invalid hex: {token}")]
    InvalidHex { token: String },
    /// Tokenizer failure with source position.
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Instruction-level failure with source position.
    #[error("line {line}:{offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// File could not be read or written.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
}

impl VMError {
    /// Returns true for errors raised by the execution loop.
    pub const fn is_execution_error(&self) -> bool {
        matches!(
            self,
            VMError::OutOfGas { .. }
                | VMError::StackUnderflow { .. }
                | VMError::StackOverflow { .. }
                | VMError::InvalidOpcode { .. }
                | VMError::UnexpectedEndOfBytecode { .. }
        )
    }
}
