use std::time::{Duration, Instant};

use anyhow::Context;
use chip8::{Chip8, Key, NUM_KEYS};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use log::{info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use rodio::{OutputStream, Sink, Source, source::SineWave};

use crate::display;
use crate::settings::Settings;

/// How long a key stays down after a terminal key press, since most
/// terminals never report the release.
const KEY_HOLD: Duration = Duration::from_millis(120);

pub struct Beep {
    sink: Sink,
    #[allow(dead_code)]
    stream: OutputStream,
}

impl Beep {
    pub fn new(freq: f32) -> anyhow::Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&stream_handle)?;
        let source = SineWave::new(freq).repeat_infinite();

        sink.append(source);
        sink.pause();

        Ok(Self { sink, stream })
    }

    pub fn set(&mut self, on: bool) {
        if on {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }
}

/// Maps the left-hand QWERTY block onto the hexadecimal keypad.
pub fn map_key(c: char) -> Option<Key> {
    let key = match c.to_ascii_lowercase() {
        '1' => Key::Key1,
        '2' => Key::Key2,
        '3' => Key::Key3,
        '4' => Key::KeyC,
        'q' => Key::Key4,
        'w' => Key::Key5,
        'e' => Key::Key6,
        'r' => Key::KeyD,
        'a' => Key::Key7,
        's' => Key::Key8,
        'd' => Key::Key9,
        'f' => Key::KeyE,
        'z' => Key::KeyA,
        'x' => Key::Key0,
        'c' => Key::KeyB,
        'v' => Key::KeyF,
        _ => return None,
    };
    Some(key)
}

/// Release deadlines for keys pressed from the terminal.
#[derive(Default)]
struct HeldKeys {
    release_at: [Option<Instant>; NUM_KEYS],
}

impl HeldKeys {
    fn press(&mut self, key: Key, now: Instant) {
        self.release_at[usize::from(key.index())] = Some(now + KEY_HOLD);
    }

    fn release(&mut self, key: Key) {
        self.release_at[usize::from(key.index())] = None;
    }

    /// Keys whose hold window has elapsed; they are forgotten once returned.
    fn expire(&mut self, now: Instant) -> Vec<Key> {
        let mut expired = Vec::new();
        for key in Key::ALL {
            let slot = &mut self.release_at[usize::from(key.index())];
            if slot.is_some_and(|deadline| deadline <= now) {
                *slot = None;
                expired.push(key);
            }
        }
        expired
    }
}

pub struct Emulator {
    machine: Chip8,
    beeper: Option<Beep>,
    held_keys: HeldKeys,
    cycle_duration: Duration,
    rom_name: String,
}

impl Emulator {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let rom_data = std::fs::read(&settings.rom)
            .with_context(|| format!("Failed to read ROM {}", settings.rom.display()))?;
        info!("Read ROM {} ({} bytes)", settings.rom.display(), rom_data.len());

        let mut machine = match settings.seed {
            Some(seed) => Chip8::with_seed(seed),
            None => Chip8::new(),
        };
        machine
            .load_program(&rom_data)
            .with_context(|| format!("Failed to load ROM {}", settings.rom.display()))?;

        let beeper = if settings.mute {
            None
        } else {
            match Beep::new(settings.beep_frequency) {
                Ok(beep) => Some(beep),
                Err(err) => {
                    warn!("Audio unavailable, running muted: {err:#}");
                    None
                }
            }
        };

        let rom_name = settings
            .rom
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown ROM".to_string());

        Ok(Emulator {
            machine,
            beeper,
            held_keys: HeldKeys::default(),
            cycle_duration: Duration::from_secs_f64(1.0 / settings.cycle_rate as f64),
            rom_name,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let result = self.run_loop();
        disable_raw_mode()?;
        if let Some(beeper) = self.beeper.as_mut() {
            beeper.set(false);
        }
        result
    }

    fn run_loop(&mut self) -> anyhow::Result<()> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        loop {
            let cycle_start = Instant::now();

            if !self.handle_input(cycle_start)? {
                terminal.clear()?;
                return Ok(());
            }

            self.machine
                .step()
                .with_context(|| format!("Interpreter halted at {:#05X}", self.machine.pc()))?;

            if let Some(beeper) = self.beeper.as_mut() {
                beeper.set(self.machine.should_beep());
            }

            if self.machine.needs_redraw() {
                let status = self.status_line();
                terminal.draw(|frame| {
                    display::draw(frame, self.machine.framebuffer(), &self.rom_name, &status)
                })?;
                self.machine.acknowledge_draw();
            }

            for key in self.held_keys.expire(Instant::now()) {
                self.machine.set_key_up(key.index())?;
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_duration {
                std::thread::sleep(self.cycle_duration - elapsed);
            }
        }
    }

    /// Drains pending terminal events. Returns false once the user asks to quit.
    fn handle_input(&mut self, now: Instant) -> anyhow::Result<bool> {
        while event::poll(Duration::ZERO)? {
            let Event::Key(key_event) = event::read()? else {
                continue;
            };
            match key_event.code {
                KeyCode::Esc => return Ok(false),
                KeyCode::Char(c) => {
                    let Some(key) = map_key(c) else {
                        continue;
                    };
                    if key_event.kind == KeyEventKind::Release {
                        self.held_keys.release(key);
                        self.machine.set_key_up(key.index())?;
                    } else {
                        self.held_keys.press(key, now);
                        self.machine.set_key_down(key.index())?;
                    }
                }
                _ => {}
            }
        }
        Ok(true)
    }

    fn status_line(&self) -> String {
        let waiting = if self.machine.awaiting_key().is_some() {
            "  waiting for key"
        } else {
            ""
        };
        format!(
            "PC {:#05X}  I {:#05X}  DT {:3}  ST {:3}{waiting}  Esc quits",
            self.machine.pc(),
            self.machine.index(),
            self.machine.delay_timer(),
            self.machine.sound_timer(),
        )
    }
}
