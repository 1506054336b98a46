use rand::Rng;

use crate::error::Chip8Error;
use crate::state::{Address, Chip8State, FONT_ADDR, FONT_HEIGHT, Key, Register};

/// Where the program counter goes once an instruction has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramCounter {
    /// Advance to the following instruction.
    Next,
    /// Step over the following instruction.
    Skip,
    Jump(Address),
    /// Stay on the current instruction.
    Wait,
}
impl ProgramCounter {
    fn skip_if(condition: bool) -> Self {
        if condition {
            ProgramCounter::Skip
        } else {
            ProgramCounter::Next
        }
    }
}

pub trait Instruction {
    /// Applies the instruction. On error the state is left untouched.
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown opcode {0:#06X}")]
pub struct UnknownOpcode(pub u16);

/// Decodes a raw opcode on its top nibble, then on the low nibble or low
/// byte for the 0x0, 0x8, 0xE and 0xF families.
pub fn decode(raw: u16) -> Result<Box<dyn Instruction>, UnknownOpcode> {
    let decoded = DecodedInstruction::new(raw);

    match decoded.opcode {
        0x0 => match decoded.nnn {
            0x0E0 => Ok(Box::new(ClearScreen)),
            0x0EE => Ok(Box::new(SubroutineReturn)),
            _ => Err(UnknownOpcode(raw)),
        },
        0x1 => Ok(Box::new(Jump(decoded))),
        0x2 => Ok(Box::new(SubroutineCall(decoded))),
        0x3 => Ok(Box::new(SkipEqImmediate(decoded))),
        0x4 => Ok(Box::new(SkipNeqImmediate(decoded))),
        0x5 => Ok(Box::new(SkipXEqY(decoded))),
        0x6 => Ok(Box::new(SetImmediate(decoded))),
        0x7 => Ok(Box::new(AddImmediate(decoded))),
        0x8 => match decoded.n {
            0x0 => Ok(Box::new(SetXToY(decoded))),
            0x1 => Ok(Box::new(BinaryOr(decoded))),
            0x2 => Ok(Box::new(BinaryAnd(decoded))),
            0x3 => Ok(Box::new(BinaryXor(decoded))),
            0x4 => Ok(Box::new(AddWithCarry(decoded))),
            0x5 => Ok(Box::new(SubtractYFromX(decoded))),
            0x6 => Ok(Box::new(RightShift(decoded))),
            0x7 => Ok(Box::new(SubtractXFromY(decoded))),
            0xE => Ok(Box::new(LeftShift(decoded))),
            _ => Err(UnknownOpcode(raw)),
        },
        0x9 => Ok(Box::new(SkipXNeqY(decoded))),
        0xA => Ok(Box::new(SetIndex(decoded))),
        0xB => Ok(Box::new(JumpWithOffset(decoded))),
        0xC => Ok(Box::new(Random(decoded))),
        0xD => Ok(Box::new(Draw(decoded))),
        0xE => match decoded.nn {
            0x9E => Ok(Box::new(SkipIfKeyPressed(decoded))),
            0xA1 => Ok(Box::new(SkipIfKeyNotPressed(decoded))),
            _ => Err(UnknownOpcode(raw)),
        },
        0xF => match decoded.nn {
            0x07 => Ok(Box::new(SetVxFromTimer(decoded))),
            0x0A => Ok(Box::new(WaitForKey(decoded))),
            0x15 => Ok(Box::new(SetDelayTimer(decoded))),
            0x18 => Ok(Box::new(SetSoundTimer(decoded))),
            0x1E => Ok(Box::new(AddToIndex(decoded))),
            0x29 => Ok(Box::new(FontChar(decoded))),
            0x33 => Ok(Box::new(BinaryCodedDecimal(decoded))),
            0x55 => Ok(Box::new(Store(decoded))),
            0x65 => Ok(Box::new(Load(decoded))),
            _ => Err(UnknownOpcode(raw)),
        },
        _ => unreachable!("top nibble of a u16 is at most 0xF"),
    }
}

#[derive(Debug, Clone, Copy)]
struct DecodedInstruction {
    /// First nibble. Selects the instruction family.
    opcode: u8,
    /// Second nibble. One of the 16 registers.
    x: Register,
    /// Third nibble. One of the 16 registers.
    y: Register,
    /// Fourth nibble. A 4-bit number.
    n: u8,
    /// The second byte (third and fourth nibbles). An 8-bit immediate number.
    nn: u8,
    /// The second, third, and fourth nibbles. A 12-bit immediate address.
    nnn: Address,
}
impl DecodedInstruction {
    fn new(raw: u16) -> Self {
        DecodedInstruction {
            opcode: (raw >> 12) as u8,
            x: Register::from_nibble((raw >> 8) as u8),
            y: Register::from_nibble((raw >> 4) as u8),
            n: (raw & 0x0F) as u8,
            nn: (raw & 0x00FF) as u8,
            nnn: raw & 0x0FFF,
        }
    }
}

struct ClearScreen;
impl Instruction for ClearScreen {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.framebuffer.clear();
        state.draw_flag = true;
        Ok(ProgramCounter::Next)
    }
}

struct SubroutineReturn;
impl Instruction for SubroutineReturn {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let call_site = state
            .stack
            .pop()
            .ok_or(Chip8Error::StackUnderflow(state.pc))?;
        Ok(ProgramCounter::Jump(call_site + 2))
    }
}

struct Jump(DecodedInstruction);
impl Instruction for Jump {
    fn execute(&self, _state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        Ok(ProgramCounter::Jump(self.0.nnn))
    }
}

struct SubroutineCall(DecodedInstruction);
impl Instruction for SubroutineCall {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.stack.push(state.pc)?;
        Ok(ProgramCounter::Jump(self.0.nnn))
    }
}

struct SkipEqImmediate(DecodedInstruction);
impl Instruction for SkipEqImmediate {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        Ok(ProgramCounter::skip_if(
            state.registers.read(self.0.x) == self.0.nn,
        ))
    }
}

struct SkipNeqImmediate(DecodedInstruction);
impl Instruction for SkipNeqImmediate {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        Ok(ProgramCounter::skip_if(
            state.registers.read(self.0.x) != self.0.nn,
        ))
    }
}

struct SkipXEqY(DecodedInstruction);
impl Instruction for SkipXEqY {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        Ok(ProgramCounter::skip_if(
            state.registers.read(self.0.x) == state.registers.read(self.0.y),
        ))
    }
}

struct SkipXNeqY(DecodedInstruction);
impl Instruction for SkipXNeqY {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        Ok(ProgramCounter::skip_if(
            state.registers.read(self.0.x) != state.registers.read(self.0.y),
        ))
    }
}

struct SetImmediate(DecodedInstruction);
impl Instruction for SetImmediate {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.registers.write(self.0.x, self.0.nn);
        Ok(ProgramCounter::Next)
    }
}

struct AddImmediate(DecodedInstruction);
impl Instruction for AddImmediate {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        state
            .registers
            .write(self.0.x, value_x.wrapping_add(self.0.nn));
        Ok(ProgramCounter::Next)
    }
}

struct SetXToY(DecodedInstruction);
impl Instruction for SetXToY {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_y = state.registers.read(self.0.y);
        state.registers.write(self.0.x, value_y);
        Ok(ProgramCounter::Next)
    }
}

struct BinaryOr(DecodedInstruction);
impl Instruction for BinaryOr {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let value_y = state.registers.read(self.0.y);
        state.registers.write(self.0.x, value_x | value_y);
        Ok(ProgramCounter::Next)
    }
}

struct BinaryAnd(DecodedInstruction);
impl Instruction for BinaryAnd {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let value_y = state.registers.read(self.0.y);
        state.registers.write(self.0.x, value_x & value_y);
        Ok(ProgramCounter::Next)
    }
}

struct BinaryXor(DecodedInstruction);
impl Instruction for BinaryXor {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let value_y = state.registers.read(self.0.y);
        state.registers.write(self.0.x, value_x ^ value_y);
        Ok(ProgramCounter::Next)
    }
}

// Flag-setting arithmetic writes VX first and VF last, so VF holds the flag
// when X is F.

struct AddWithCarry(DecodedInstruction);
impl Instruction for AddWithCarry {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let value_y = state.registers.read(self.0.y);
        let (sum, carry) = value_x.overflowing_add(value_y);

        state.registers.write(self.0.x, sum);
        state.registers.write(Register::VF, u8::from(carry));
        Ok(ProgramCounter::Next)
    }
}

struct SubtractYFromX(DecodedInstruction);
impl Instruction for SubtractYFromX {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let value_y = state.registers.read(self.0.y);

        state.registers.write(self.0.x, value_x.wrapping_sub(value_y));
        state.registers.write(Register::VF, u8::from(value_x > value_y));
        Ok(ProgramCounter::Next)
    }
}

struct SubtractXFromY(DecodedInstruction);
impl Instruction for SubtractXFromY {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let value_y = state.registers.read(self.0.y);

        state.registers.write(self.0.x, value_y.wrapping_sub(value_x));
        state.registers.write(Register::VF, u8::from(value_y > value_x));
        Ok(ProgramCounter::Next)
    }
}

/// Shifts VX in place; VY is ignored.
struct RightShift(DecodedInstruction);
impl Instruction for RightShift {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);

        state.registers.write(self.0.x, value_x >> 1);
        state.registers.write(Register::VF, value_x & 0x01);
        Ok(ProgramCounter::Next)
    }
}

/// Shifts VX in place; VY is ignored.
struct LeftShift(DecodedInstruction);
impl Instruction for LeftShift {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);

        state.registers.write(self.0.x, value_x << 1);
        state.registers.write(Register::VF, value_x >> 7);
        Ok(ProgramCounter::Next)
    }
}

struct SetIndex(DecodedInstruction);
impl Instruction for SetIndex {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.index = self.0.nnn;
        Ok(ProgramCounter::Next)
    }
}

struct JumpWithOffset(DecodedInstruction);
impl Instruction for JumpWithOffset {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let offset = Address::from(state.registers.read(Register::V0));
        Ok(ProgramCounter::Jump(self.0.nnn + offset))
    }
}

struct Random(DecodedInstruction);
impl Instruction for Random {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let random_value = state.rng.random::<u8>() & self.0.nn;
        state.registers.write(self.0.x, random_value);
        Ok(ProgramCounter::Next)
    }
}

/// Sprites are clipped at the right and bottom edges rather than wrapped.
struct Draw(DecodedInstruction);
impl Instruction for Draw {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let x = usize::from(state.registers.read(self.0.x));
        let y = usize::from(state.registers.read(self.0.y));
        let sprite = state
            .memory
            .slice(usize::from(state.index), usize::from(self.0.n))?;

        let collision = state.framebuffer.draw_sprite(x, y, sprite);
        state.registers.write(Register::VF, u8::from(collision));
        state.draw_flag = true;
        Ok(ProgramCounter::Next)
    }
}

struct SkipIfKeyPressed(DecodedInstruction);
impl Instruction for SkipIfKeyPressed {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let key = Key::from_index(state.registers.read(self.0.x))?;
        Ok(ProgramCounter::skip_if(state.keypad.is_key_pressed(key)))
    }
}

struct SkipIfKeyNotPressed(DecodedInstruction);
impl Instruction for SkipIfKeyNotPressed {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let key = Key::from_index(state.registers.read(self.0.x))?;
        Ok(ProgramCounter::skip_if(!state.keypad.is_key_pressed(key)))
    }
}

struct SetVxFromTimer(DecodedInstruction);
impl Instruction for SetVxFromTimer {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.registers.write(self.0.x, state.delay_timer);
        Ok(ProgramCounter::Next)
    }
}

/// Completes immediately when a key is already down, otherwise parks the
/// interpreter in the key-wait state without moving the program counter.
struct WaitForKey(DecodedInstruction);
impl Instruction for WaitForKey {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        match state.keypad.first_pressed() {
            Some(key) => {
                state.registers.write(self.0.x, key.index());
                Ok(ProgramCounter::Next)
            }
            None => {
                state.awaiting_key = Some(self.0.x);
                Ok(ProgramCounter::Wait)
            }
        }
    }
}

struct SetDelayTimer(DecodedInstruction);
impl Instruction for SetDelayTimer {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.delay_timer = state.registers.read(self.0.x);
        Ok(ProgramCounter::Next)
    }
}

struct SetSoundTimer(DecodedInstruction);
impl Instruction for SetSoundTimer {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        state.sound_timer = state.registers.read(self.0.x);
        Ok(ProgramCounter::Next)
    }
}

/// VF is raised only when I wraps past 0xFFFF and is left alone otherwise.
struct AddToIndex(DecodedInstruction);
impl Instruction for AddToIndex {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = Address::from(state.registers.read(self.0.x));
        let (index, overflow) = state.index.overflowing_add(value_x);

        state.index = index;
        if overflow {
            state.registers.write(Register::VF, 1);
        }
        Ok(ProgramCounter::Next)
    }
}

struct FontChar(DecodedInstruction);
impl Instruction for FontChar {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = usize::from(state.registers.read(self.0.x));
        // At most 0xFF * 5 + FONT_ADDR, well inside 16 bits.
        state.index = (FONT_ADDR + value_x * FONT_HEIGHT) as Address;
        Ok(ProgramCounter::Next)
    }
}

struct BinaryCodedDecimal(DecodedInstruction);
impl Instruction for BinaryCodedDecimal {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let value_x = state.registers.read(self.0.x);
        let digits = state.memory.slice_mut(usize::from(state.index), 3)?;
        digits.copy_from_slice(&[value_x / 100, (value_x / 10) % 10, value_x % 10]);
        Ok(ProgramCounter::Next)
    }
}

/// Copies V0..=VX to memory at I. I is not modified.
struct Store(DecodedInstruction);
impl Instruction for Store {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let count = self.0.x.index() + 1;
        let dest = state.memory.slice_mut(usize::from(state.index), count)?;
        dest.copy_from_slice(&state.registers.values()[..count]);
        Ok(ProgramCounter::Next)
    }
}

/// Fills V0..=VX from memory at I. I is not modified.
struct Load(DecodedInstruction);
impl Instruction for Load {
    fn execute(&self, state: &mut Chip8State) -> Result<ProgramCounter, Chip8Error> {
        let count = self.0.x.index() + 1;
        let src = state.memory.slice(usize::from(state.index), count)?;
        state.registers.values_mut()[..count].copy_from_slice(src);
        Ok(ProgramCounter::Next)
    }
}
