//! A CHIP-8 interpreter core.
//!
//! [`Chip8`] owns the whole machine: 4 KiB of memory with the built-in font,
//! sixteen V registers, the index register, a bounded call stack, the delay
//! and sound timers, a 64x32 framebuffer and the 16-key keypad. The host drives
//! it one [`Chip8::step`] at a time and reads back the framebuffer, draw flag
//! and beep predicate.
pub mod diagnostics;
pub mod error;
pub mod instruction;
pub mod state;
pub mod vm;

pub use diagnostics::{Diagnostics, LogDiagnostics};
pub use error::Chip8Error;
pub use state::{
    DISPLAY_HEIGHT, DISPLAY_SIZE, DISPLAY_WIDTH, Framebuffer, Key, MEM_SIZE, NUM_KEYS,
    PC_START_ADDR, PROGRAM_CAPACITY, Register,
};
pub use vm::Chip8;
