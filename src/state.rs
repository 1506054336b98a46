use bitvec::{BitArr, array::BitArray, slice::BitSlice};
use rand::{SeedableRng, rngs::StdRng};

use crate::error::Chip8Error;

pub type Timer = u8;
pub type Address = u16;

pub const MEM_SIZE: usize = 4096;
pub const FONT_ADDR: usize = 0x000;
pub const FONT_HEIGHT: usize = 5;
pub const PC_START_ADDR: Address = 0x200;
pub const PROGRAM_CAPACITY: usize = MEM_SIZE - PC_START_ADDR as usize;
pub const NUM_REGISTERS: usize = 16;
pub const NUM_KEYS: usize = 16;
pub const STACK_DEPTH: usize = 16;
pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;
pub const DISPLAY_SIZE: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT;

/// Hexadecimal digit glyphs, 4 pixels wide and [`FONT_HEIGHT`] rows tall.
pub const FONT_SET: [u8; 16 * FONT_HEIGHT] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

#[derive(Clone)]
pub struct Memory {
    data: [u8; MEM_SIZE],
}
impl Memory {
    pub fn new() -> Self {
        let data = {
            let mut data = [0; MEM_SIZE];
            data[FONT_ADDR..FONT_ADDR + FONT_SET.len()].copy_from_slice(&FONT_SET);
            data
        };

        Memory { data }
    }

    pub fn read(&self, addr: usize) -> Result<u8, Chip8Error> {
        self.data
            .get(addr)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { addr, len: 1 })
    }

    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), Chip8Error> {
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(Chip8Error::MemoryOutOfBounds { addr, len: 1 })?;
        *cell = value;
        Ok(())
    }

    /// Copies `rom` into the program area. Nothing is written when it does not fit.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > PROGRAM_CAPACITY {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                capacity: PROGRAM_CAPACITY,
            });
        }
        let start = usize::from(PC_START_ADDR);
        self.data[start..start + rom.len()].copy_from_slice(rom);
        Ok(())
    }

    pub fn slice(&self, addr: usize, len: usize) -> Result<&[u8], Chip8Error> {
        self.data
            .get(addr..addr + len)
            .ok_or(Chip8Error::MemoryOutOfBounds { addr, len })
    }

    pub fn slice_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8], Chip8Error> {
        self.data
            .get_mut(addr..addr + len)
            .ok_or(Chip8Error::MemoryOutOfBounds { addr, len })
    }

    pub fn as_bytes(&self) -> &[u8; MEM_SIZE] {
        &self.data
    }
}
impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    VF,
}
impl Register {
    pub const ALL: [Register; NUM_REGISTERS] = [
        Register::V0,
        Register::V1,
        Register::V2,
        Register::V3,
        Register::V4,
        Register::V5,
        Register::V6,
        Register::V7,
        Register::V8,
        Register::V9,
        Register::VA,
        Register::VB,
        Register::VC,
        Register::VD,
        Register::VE,
        Register::VF,
    ];

    /// Register named by the low four bits of `nibble`.
    pub fn from_nibble(nibble: u8) -> Self {
        Self::ALL[usize::from(nibble & 0x0F)]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Default)]
pub struct RegisterBank {
    registers: [u8; NUM_REGISTERS],
}
impl RegisterBank {
    pub fn new() -> Self {
        RegisterBank {
            registers: [0; NUM_REGISTERS],
        }
    }

    pub fn read(&self, reg: Register) -> u8 {
        self.registers[reg.index()]
    }

    pub fn write(&mut self, reg: Register, value: u8) {
        self.registers[reg.index()] = value;
    }

    pub fn values(&self) -> &[u8; NUM_REGISTERS] {
        &self.registers
    }

    pub fn values_mut(&mut self) -> &mut [u8; NUM_REGISTERS] {
        &mut self.registers
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF,
}
impl Key {
    pub const ALL: [Key; NUM_KEYS] = [
        Key::Key0,
        Key::Key1,
        Key::Key2,
        Key::Key3,
        Key::Key4,
        Key::Key5,
        Key::Key6,
        Key::Key7,
        Key::Key8,
        Key::Key9,
        Key::KeyA,
        Key::KeyB,
        Key::KeyC,
        Key::KeyD,
        Key::KeyE,
        Key::KeyF,
    ];

    pub fn from_index(index: u8) -> Result<Key, Chip8Error> {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .ok_or(Chip8Error::InvalidKey(index))
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Default)]
pub struct Keypad {
    keys: [bool; NUM_KEYS],
}
impl Keypad {
    pub fn new() -> Self {
        Keypad {
            keys: [false; NUM_KEYS],
        }
    }

    pub fn set(&mut self, key: Key, down: bool) {
        self.keys[usize::from(key.index())] = down;
    }

    pub fn press_key(&mut self, key: Key) {
        self.set(key, true);
    }

    pub fn release_key(&mut self, key: Key) {
        self.set(key, false);
    }

    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.keys[usize::from(key.index())]
    }

    /// Lowest-numbered key currently held down.
    pub fn first_pressed(&self) -> Option<Key> {
        Key::ALL.into_iter().find(|&key| self.is_key_pressed(key))
    }

    pub fn states(&self) -> &[bool; NUM_KEYS] {
        &self.keys
    }
}

/// Return addresses for subroutine calls, bounded at [`STACK_DEPTH`] entries.
#[derive(Clone, Default)]
pub struct CallStack {
    entries: [Address; STACK_DEPTH],
    sp: usize,
}
impl CallStack {
    pub fn new() -> Self {
        CallStack {
            entries: [0; STACK_DEPTH],
            sp: 0,
        }
    }

    pub fn push(&mut self, addr: Address) -> Result<(), Chip8Error> {
        let slot = self
            .entries
            .get_mut(self.sp)
            .ok_or(Chip8Error::StackOverflow(addr))?;
        *slot = addr;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Address> {
        self.sp = self.sp.checked_sub(1)?;
        Some(self.entries[self.sp])
    }

    pub fn pointer(&self) -> usize {
        self.sp
    }

    pub fn entries(&self) -> &[Address; STACK_DEPTH] {
        &self.entries
    }
}

/// 64x32 monochrome display, one bit per pixel, row-major.
#[derive(Clone)]
pub struct Framebuffer {
    pixels: BitArr!(for DISPLAY_SIZE),
}
impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            pixels: BitArray::ZERO,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT && self.pixels[y * DISPLAY_WIDTH + x]
    }

    pub fn bits(&self) -> &BitSlice<usize> {
        &self.pixels[..DISPLAY_SIZE]
    }

    pub fn lit_count(&self) -> usize {
        self.bits().count_ones()
    }

    /// Pixels as 0/1 bytes, indexed `x + y * DISPLAY_WIDTH`.
    pub fn to_bytes(&self) -> [u8; DISPLAY_SIZE] {
        let mut bytes = [0; DISPLAY_SIZE];
        for index in self.bits().iter_ones() {
            bytes[index] = 1;
        }
        bytes
    }

    /// XORs `sprite` onto the display with its top-left corner at (`x`, `y`).
    /// Pixels that fall past the right or bottom edge are dropped.
    /// Returns true if any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut collision = false;

        for (row, &byte) in sprite.iter().enumerate() {
            let pixel_y = y + row;
            if pixel_y >= DISPLAY_HEIGHT {
                break;
            }

            for bit in 0..8 {
                let pixel_x = x + bit;
                if pixel_x >= DISPLAY_WIDTH {
                    break;
                }

                if (byte >> (7 - bit)) & 1 == 0 {
                    continue;
                }

                let index = pixel_y * DISPLAY_WIDTH + pixel_x;
                let current_pixel = self.pixels[index];
                collision |= current_pixel;
                self.pixels.set(index, !current_pixel);
            }
        }
        collision
    }
}
impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything an executing instruction may read or modify.
pub struct Chip8State {
    pub memory: Memory,
    pub registers: RegisterBank,
    pub pc: Address,
    pub index: Address,
    pub stack: CallStack,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    pub framebuffer: Framebuffer,
    pub keypad: Keypad,
    pub draw_flag: bool,
    /// Destination register of a pending FX0A key wait.
    pub awaiting_key: Option<Register>,
    pub rng: StdRng,
}
impl Chip8State {
    pub fn new(rng: StdRng) -> Self {
        Chip8State {
            memory: Memory::new(),
            registers: RegisterBank::new(),
            pc: PC_START_ADDR,
            index: 0,
            stack: CallStack::new(),
            delay_timer: 0,
            sound_timer: 0,
            framebuffer: Framebuffer::new(),
            keypad: Keypad::new(),
            draw_flag: true,
            awaiting_key: None,
            rng,
        }
    }

    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    /// Restores power-on state. The random source keeps its position.
    pub fn reset(&mut self) {
        self.memory = Memory::new();
        self.registers = RegisterBank::new();
        self.pc = PC_START_ADDR;
        self.index = 0;
        self.stack = CallStack::new();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.framebuffer.clear();
        self.keypad = Keypad::new();
        self.draw_flag = true;
        self.awaiting_key = None;
    }

    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }
}
