use log::warn;

use crate::state::Address;

/// Receives non-fatal anomalies observed while stepping.
pub trait Diagnostics {
    fn unknown_opcode(&mut self, pc: Address, opcode: u16);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn unknown_opcode(&mut self, pc: Address, opcode: u16) {
        warn!("Unknown opcode {opcode:#06X} at {pc:#05X}, skipping");
    }
}

impl<F> Diagnostics for F
where
    F: FnMut(Address, u16),
{
    fn unknown_opcode(&mut self, pc: Address, opcode: u16) {
        self(pc, opcode)
    }
}
