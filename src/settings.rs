use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_CYCLE_RATE: u64 = 60;
pub const DEFAULT_BEEP_FREQUENCY: f32 = 440.0;

/// Run a CHIP-8 ROM in the terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Settings {
    /// Path to a raw CHIP-8 ROM image.
    pub rom: PathBuf,

    /// Interpreter cycles per second. Timers tick once per cycle.
    #[arg(long, default_value_t = DEFAULT_CYCLE_RATE, value_parser = clap::value_parser!(u64).range(1..))]
    pub cycle_rate: u64,

    /// Seed for the random number instruction.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pitch of the beep tone in Hz.
    #[arg(long, default_value_t = DEFAULT_BEEP_FREQUENCY)]
    pub beep_frequency: f32,

    /// Disable audio output.
    #[arg(long)]
    pub mute: bool,

    /// Write log records to this file. Filtering follows RUST_LOG.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
