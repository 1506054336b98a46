use crate::state::Address;

/// Failures surfaced by the interpreter core.
///
/// Loading reports [`Chip8Error::RomTooLarge`]. Everything else is a contract
/// violation raised by [`crate::Chip8::step`]: a ROM targeting the base
/// instruction set never triggers one, so the host is expected to stop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM of {size} bytes does not fit in the {capacity} byte program area")]
    RomTooLarge { size: usize, capacity: usize },

    #[error("memory access out of bounds: {len} byte(s) at {addr:#05X}")]
    MemoryOutOfBounds { addr: usize, len: usize },

    #[error("program counter out of bounds: {0:#06X}")]
    PcOutOfBounds(Address),

    #[error("call stack overflow at {0:#05X}")]
    StackOverflow(Address),

    #[error("call stack underflow: return at {0:#05X} with no caller")]
    StackUnderflow(Address),

    #[error("invalid key index: {0:#X}")]
    InvalidKey(u8),
}
