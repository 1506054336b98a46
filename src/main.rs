mod display;
mod emulator;
mod settings;

use std::fs::File;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use crate::emulator::Emulator;
use crate::settings::Settings;

/// The terminal UI owns stderr, so records go to a file when one is given
/// and are otherwise dropped unless RUST_LOG asks for them.
fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    match &settings.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder
                .filter_level(LevelFilter::Info)
                .parse_default_env()
                .target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.filter_level(LevelFilter::Off).parse_default_env();
        }
    }
    builder.try_init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    init_logging(&settings)?;

    let mut emulator = Emulator::new(settings)?;
    emulator.run()
}
