use log::{debug, info, trace};
use rand::{SeedableRng, rngs::StdRng};

use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::error::Chip8Error;
use crate::instruction::{ProgramCounter, UnknownOpcode, decode};
use crate::state::{
    Address, Chip8State, DISPLAY_SIZE, Framebuffer, Key, MEM_SIZE, NUM_REGISTERS, Register,
    Timer,
};

/// A CHIP-8 machine, stepped one instruction at a time by its host.
///
/// The host calls [`Chip8::step`] at a fixed cadence (conventionally 60 Hz),
/// presents the framebuffer while [`Chip8::needs_redraw`] holds and forwards
/// key events through [`Chip8::set_key_state`].
pub struct Chip8 {
    state: Chip8State,
    diagnostics: Box<dyn Diagnostics + Send>,
}

impl Chip8 {
    pub fn new() -> Self {
        Self::from_state(Chip8State::from_os_rng())
    }

    /// Machine whose CXNN results are reproducible for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_state(Chip8State::new(StdRng::seed_from_u64(seed)))
    }

    fn from_state(state: Chip8State) -> Self {
        Chip8 {
            state,
            diagnostics: Box::new(LogDiagnostics),
        }
    }

    /// Replaces the sink that receives unknown-opcode reports.
    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + Send + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    pub fn reset(&mut self) {
        self.state.reset();
        debug!("Machine reset");
    }

    /// Copies a raw ROM image into the program area at 0x200.
    pub fn load_program(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        self.state.memory.load_rom(rom)?;
        info!("Loaded {} byte program", rom.len());
        Ok(())
    }

    /// Runs one fetch-decode-execute cycle and then ticks both timers.
    ///
    /// While an FX0A key wait is pending, the cycle only checks the keypad.
    /// Errors are contract violations; the machine is left as it was before
    /// the failing instruction.
    pub fn step(&mut self) -> Result<(), Chip8Error> {
        match self.state.awaiting_key {
            Some(reg) => self.poll_key_wait(reg),
            None => self.execute_next()?,
        }
        self.state.tick_timers();
        Ok(())
    }

    fn poll_key_wait(&mut self, reg: Register) {
        if let Some(key) = self.state.keypad.first_pressed() {
            debug!("Key {:X} ends wait, stored in {reg:?}", key.index());
            self.state.registers.write(reg, key.index());
            self.state.awaiting_key = None;
            self.advance(ProgramCounter::Next);
        }
    }

    fn execute_next(&mut self) -> Result<(), Chip8Error> {
        let pc = self.state.pc;
        let raw = self.fetch()?;

        match decode(raw) {
            Ok(instruction) => {
                trace!("{pc:#05X}: {raw:04X}");
                let next = instruction.execute(&mut self.state)?;
                if next == ProgramCounter::Wait {
                    debug!("Waiting for key at {pc:#05X}");
                }
                self.advance(next);
            }
            Err(UnknownOpcode(opcode)) => {
                self.diagnostics.unknown_opcode(pc, opcode);
                self.advance(ProgramCounter::Next);
            }
        }
        Ok(())
    }

    fn fetch(&self) -> Result<u16, Chip8Error> {
        let pc = usize::from(self.state.pc);
        let bytes = self
            .state
            .memory
            .slice(pc, 2)
            .map_err(|_| Chip8Error::PcOutOfBounds(self.state.pc))?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn advance(&mut self, next: ProgramCounter) {
        self.state.pc = match next {
            ProgramCounter::Next => self.state.pc + 2,
            ProgramCounter::Skip => self.state.pc + 4,
            ProgramCounter::Jump(addr) => addr,
            ProgramCounter::Wait => self.state.pc,
        };
    }

    pub fn set_key_state(&mut self, index: u8, down: bool) -> Result<(), Chip8Error> {
        let key = Key::from_index(index)?;
        self.state.keypad.set(key, down);
        Ok(())
    }

    pub fn set_key_down(&mut self, index: u8) -> Result<(), Chip8Error> {
        self.set_key_state(index, true)
    }

    pub fn set_key_up(&mut self, index: u8) -> Result<(), Chip8Error> {
        self.set_key_state(index, false)
    }

    pub fn is_key_down(&self, key: Key) -> bool {
        self.state.keypad.is_key_pressed(key)
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.state.framebuffer
    }

    /// The display as 0/1 bytes, indexed `x + y * 64`.
    pub fn framebuffer_bytes(&self) -> [u8; DISPLAY_SIZE] {
        self.state.framebuffer.to_bytes()
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.state.framebuffer.pixel(x, y)
    }

    /// True when the framebuffer changed since the last acknowledgement.
    pub fn needs_redraw(&self) -> bool {
        self.state.draw_flag
    }

    pub fn acknowledge_draw(&mut self) {
        self.state.draw_flag = false;
    }

    /// Whether the host should sound its tone this cycle.
    pub fn should_beep(&self) -> bool {
        self.state.sound_timer == 1
    }

    pub fn pc(&self) -> Address {
        self.state.pc
    }

    pub fn index(&self) -> Address {
        self.state.index
    }

    pub fn register(&self, reg: Register) -> u8 {
        self.state.registers.read(reg)
    }

    pub fn registers(&self) -> &[u8; NUM_REGISTERS] {
        self.state.registers.values()
    }

    pub fn delay_timer(&self) -> Timer {
        self.state.delay_timer
    }

    pub fn sound_timer(&self) -> Timer {
        self.state.sound_timer
    }

    pub fn stack_pointer(&self) -> usize {
        self.state.stack.pointer()
    }

    pub fn memory(&self) -> &[u8; MEM_SIZE] {
        self.state.memory.as_bytes()
    }

    /// Register that will receive the next key press, if FX0A is pending.
    pub fn awaiting_key(&self) -> Option<Register> {
        self.state.awaiting_key
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FONT_SET, PC_START_ADDR, PROGRAM_CAPACITY, STACK_DEPTH};
    use std::sync::{Arc, Mutex};

    fn machine_with(program: &[u8]) -> Chip8 {
        let mut chip8 = Chip8::with_seed(7);
        chip8.load_program(program).unwrap();
        chip8
    }

    fn run(chip8: &mut Chip8, cycles: usize) {
        for _ in 0..cycles {
            chip8.step().unwrap();
        }
    }

    fn assert_power_on_state(chip8: &Chip8) {
        assert_eq!(chip8.pc(), PC_START_ADDR);
        assert_eq!(chip8.index(), 0);
        assert_eq!(chip8.stack_pointer(), 0);
        assert!(chip8.state.stack.entries().iter().all(|&a| a == 0));
        assert_eq!(chip8.registers(), &[0; NUM_REGISTERS]);
        assert!(Key::ALL.iter().all(|&k| !chip8.is_key_down(k)));
        assert_eq!(chip8.framebuffer().lit_count(), 0);
        assert_eq!((chip8.delay_timer(), chip8.sound_timer()), (0, 0));
        assert_eq!(&chip8.memory()[..80], &FONT_SET[..]);
        assert!(chip8.memory()[80..].iter().all(|&b| b == 0));
        assert!(chip8.needs_redraw());
        assert_eq!(chip8.awaiting_key(), None);
    }

    #[test]
    fn test_new_machine_is_reset() {
        assert_power_on_state(&Chip8::with_seed(1));
    }

    #[test]
    fn test_reset_restores_power_on_state() {
        // V0=5, sound=V0, delay=V0, I=0, draw, call 0x20E, F00A waits
        let mut chip8 = machine_with(&[
            0x60, 0x05, 0xF0, 0x18, 0xF0, 0x15, 0xA0, 0x00, 0xD0, 0x05, 0x22, 0x0E, 0x00, 0x00,
            0xF1, 0x0A,
        ]);
        chip8.set_key_down(0x4).unwrap();
        chip8.set_key_up(0x4).unwrap();
        chip8.set_key_down(0x8).unwrap();
        run(&mut chip8, 7);
        chip8.acknowledge_draw();
        assert_eq!(chip8.stack_pointer(), 1);
        assert_eq!(chip8.register(Register::V1), 0x8);

        chip8.reset();
        assert_power_on_state(&chip8);
    }

    #[test]
    fn test_load_program_rejects_oversized_rom_without_mutation() {
        let mut chip8 = Chip8::with_seed(1);
        let before = *chip8.memory();
        let rom = vec![0x12; PROGRAM_CAPACITY + 1];
        assert!(matches!(
            chip8.load_program(&rom),
            Err(Chip8Error::RomTooLarge { .. })
        ));
        assert_eq!(chip8.memory(), &before);
        assert_power_on_state(&chip8);
    }

    #[test]
    fn test_set_immediate_is_readable_for_every_register() {
        for x in 0..16u8 {
            let nn = 0xA0 | x;
            let mut chip8 = machine_with(&[0x60 | x, nn]);
            run(&mut chip8, 1);
            assert_eq!(chip8.register(Register::from_nibble(x)), nn);
        }
    }

    #[test]
    fn test_add_immediate_wraps_without_touching_flag() {
        let mut chip8 = machine_with(&[0x60, 0xFF, 0x6F, 0x42, 0x70, 0x02]);
        run(&mut chip8, 3);
        assert_eq!(chip8.register(Register::V0), 0x01);
        assert_eq!(chip8.register(Register::VF), 0x42);
    }

    #[test]
    fn test_add_registers_carries_at_256() {
        let mut chip8 = machine_with(&[0x60, 0xFF, 0x61, 0x01, 0x80, 0x14]);
        run(&mut chip8, 3);
        assert_eq!(chip8.register(Register::V0), 0x00);
        assert_eq!(chip8.register(Register::VF), 1);
    }

    #[test]
    fn test_subtract_without_borrow_flag_when_smaller() {
        let mut chip8 = machine_with(&[0x60, 0x05, 0x61, 0x0A, 0x80, 0x15]);
        run(&mut chip8, 3);
        assert_eq!(chip8.register(Register::V0), 0xFB);
        assert_eq!(chip8.register(Register::VF), 0);
    }

    #[test]
    fn test_call_then_return_resumes_after_call() {
        // 0x200: jump 0x204; 0x202: padding; 0x204: call 0x20A; 0x206: V2 = 1;
        // 0x20A: V3 = 1, return
        let mut chip8 = machine_with(&[
            0x12, 0x04, 0x00, 0x00, 0x22, 0x0A, 0x62, 0x01, 0x00, 0x00, 0x63, 0x01, 0x00, 0xEE,
        ]);
        run(&mut chip8, 2);
        assert_eq!(chip8.pc(), 0x20A);
        assert_eq!(chip8.stack_pointer(), 1);
        run(&mut chip8, 2);
        assert_eq!(chip8.pc(), 0x204 + 2);
        assert_eq!(chip8.stack_pointer(), 0);
        run(&mut chip8, 1);
        assert_eq!(chip8.register(Register::V2), 1);
        assert_eq!(chip8.register(Register::V3), 1);
    }

    #[test]
    fn test_return_with_empty_stack_is_fatal_and_changes_nothing() {
        let mut chip8 = machine_with(&[0x00, 0xEE]);
        assert_eq!(chip8.step(), Err(Chip8Error::StackUnderflow(0x200)));
        assert_eq!(chip8.pc(), 0x200);
    }

    #[test]
    fn test_recursion_past_stack_depth_is_fatal() {
        // 0x200: call 0x200 forever
        let mut chip8 = machine_with(&[0x22, 0x00]);
        run(&mut chip8, STACK_DEPTH);
        assert_eq!(chip8.stack_pointer(), STACK_DEPTH);
        assert_eq!(chip8.step(), Err(Chip8Error::StackOverflow(0x200)));
        assert_eq!(chip8.stack_pointer(), STACK_DEPTH);
    }

    #[test]
    fn test_skip_advances_past_next_instruction() {
        let mut chip8 = machine_with(&[0x30, 0x00, 0x61, 0x01, 0x62, 0x02]);
        run(&mut chip8, 1);
        assert_eq!(chip8.pc(), 0x204);
        run(&mut chip8, 1);
        assert_eq!(chip8.register(Register::V1), 0);
        assert_eq!(chip8.register(Register::V2), 2);
    }

    #[test]
    fn test_drawing_twice_erases_and_collides() {
        // I = glyph 7, V0 = 20, V1 = 10, draw, draw
        let mut chip8 = machine_with(&[0xA0, 0x23, 0x60, 0x14, 0x61, 0x0A, 0xD0, 0x15, 0xD0, 0x15]);
        run(&mut chip8, 4);
        assert_eq!(chip8.register(Register::VF), 0);
        let lit = chip8.framebuffer_bytes();
        assert!(lit.iter().any(|&p| p == 1));
        assert!(chip8.pixel(20, 10));

        chip8.acknowledge_draw();
        run(&mut chip8, 1);
        assert!(chip8.needs_redraw());
        assert_eq!(chip8.register(Register::VF), 1);
        assert!(chip8.framebuffer_bytes().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_key_wait_polls_until_key_down() {
        let mut chip8 = machine_with(&[0x60, 0x33, 0xF5, 0x0A]);
        run(&mut chip8, 2);
        assert_eq!(chip8.awaiting_key(), Some(Register::V5));
        let registers = *chip8.registers();

        for _ in 0..50 {
            chip8.step().unwrap();
            assert_eq!(chip8.pc(), 0x202);
            assert_eq!(chip8.registers(), &registers);
        }

        chip8.set_key_down(0xB).unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.register(Register::V5), 0xB);
        assert_eq!(chip8.pc(), 0x204);
        assert_eq!(chip8.awaiting_key(), None);
    }

    #[test]
    fn test_key_wait_still_ticks_timers() {
        let mut chip8 = machine_with(&[0x60, 0x05, 0xF0, 0x15, 0xF1, 0x0A]);
        run(&mut chip8, 2);
        assert_eq!(chip8.delay_timer(), 4);
        run(&mut chip8, 3);
        assert_eq!(chip8.delay_timer(), 1);
        assert_eq!(chip8.pc(), 0x204);
    }

    #[test]
    fn test_key_setters_reject_out_of_range_index() {
        let mut chip8 = Chip8::with_seed(1);
        assert_eq!(chip8.set_key_down(16), Err(Chip8Error::InvalidKey(16)));
        assert!(chip8.set_key_state(15, true).is_ok());
        assert!(chip8.is_key_down(Key::KeyF));
    }

    #[test]
    fn test_unknown_opcode_is_reported_and_skipped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut chip8 = Chip8::with_seed(1).with_diagnostics(move |pc: Address, opcode: u16| {
            sink.lock().unwrap().push((pc, opcode));
        });
        chip8.load_program(&[0x61, 0x09, 0x01, 0x23, 0x80, 0x1F]).unwrap();
        chip8.acknowledge_draw();

        run(&mut chip8, 3);
        assert_eq!(chip8.pc(), 0x206);
        assert_eq!(chip8.register(Register::V1), 0x09);
        assert_eq!(chip8.register(Register::VF), 0);
        assert_eq!(chip8.stack_pointer(), 0);
        assert!(!chip8.needs_redraw());
        assert_eq!(*seen.lock().unwrap(), vec![(0x202, 0x0123), (0x204, 0x801F)]);
    }

    #[test]
    fn test_timers_tick_once_per_step() {
        let mut chip8 = machine_with(&[0x60, 0x03, 0xF0, 0x15, 0xF0, 0x18, 0x12, 0x06]);
        run(&mut chip8, 2);
        assert_eq!(chip8.delay_timer(), 2);
        run(&mut chip8, 1);
        assert_eq!(chip8.delay_timer(), 1);
        assert_eq!(chip8.sound_timer(), 2);
        run(&mut chip8, 5);
        assert_eq!((chip8.delay_timer(), chip8.sound_timer()), (0, 0));
    }

    #[test]
    fn test_beep_is_asserted_while_sound_timer_is_one() {
        let mut chip8 = machine_with(&[0x60, 0x03, 0xF0, 0x18, 0x12, 0x04]);
        run(&mut chip8, 2);
        assert_eq!(chip8.sound_timer(), 2);
        assert!(!chip8.should_beep());
        run(&mut chip8, 1);
        assert!(chip8.should_beep());
        run(&mut chip8, 1);
        assert!(!chip8.should_beep());
    }

    #[test]
    fn test_fetch_past_end_of_memory_is_fatal() {
        // Jump to the last byte of memory.
        let mut chip8 = machine_with(&[0x1F, 0xFF]);
        run(&mut chip8, 1);
        assert_eq!(chip8.step(), Err(Chip8Error::PcOutOfBounds(0xFFF)));
    }

    #[test]
    fn test_same_seed_gives_same_random_sequence() {
        let program = [0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF];
        let mut a = machine_with(&program);
        let mut b = machine_with(&program);
        run(&mut a, 3);
        run(&mut b, 3);
        assert_eq!(a.registers(), b.registers());
    }
}
