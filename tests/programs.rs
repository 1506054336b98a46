use chip8::{Chip8, Chip8Error, DISPLAY_WIDTH, PROGRAM_CAPACITY, Register};

fn boot(program: &[u8]) -> Chip8 {
    let mut chip8 = Chip8::with_seed(0xC8);
    chip8.load_program(program).expect("program fits in memory");
    chip8
}

fn run(chip8: &mut Chip8, cycles: usize) {
    for _ in 0..cycles {
        chip8.step().expect("cycle completes");
    }
}

#[test]
fn test_add_program() {
    let mut chip8 = boot(&[0x60, 0x0A, 0x61, 0x05, 0x80, 0x14]);
    run(&mut chip8, 3);
    assert_eq!(chip8.register(Register::V0), 15);
    assert_eq!(chip8.register(Register::VF), 0);
    assert_eq!(chip8.pc(), 0x206);
}

#[test]
fn test_counting_loop() {
    // V0 counts to 10 in a loop, then the program spins on itself.
    // 0x200: V0 += 1
    // 0x202: skip if V0 == 10
    // 0x204: jump 0x200
    // 0x206: jump 0x206
    let mut chip8 = boot(&[0x70, 0x01, 0x30, 0x0A, 0x12, 0x00, 0x12, 0x06]);
    run(&mut chip8, 100);
    assert_eq!(chip8.register(Register::V0), 10);
    assert_eq!(chip8.pc(), 0x206);
}

#[test]
fn test_bcd_digits_drawn_with_font() {
    // V0 = 137, I = 0x300, BCD, load V0..V2, I = glyph(V1), draw at (V3, V3)
    let mut chip8 = boot(&[
        0x60, 0x89, 0xA3, 0x00, 0xF0, 0x33, 0xF2, 0x65, 0xF1, 0x29, 0x63, 0x08, 0xD3, 0x35,
    ]);
    run(&mut chip8, 7);
    assert_eq!(&chip8.memory()[0x300..0x303], &[1, 3, 7]);
    assert_eq!(chip8.registers()[..3], [1, 3, 7]);
    assert_eq!(chip8.index(), 3 * 5);

    // Glyph "3": F0 10 F0 10 F0
    let frame = chip8.framebuffer_bytes();
    let row = |y: usize| &frame[8 + y * DISPLAY_WIDTH..12 + y * DISPLAY_WIDTH];
    assert_eq!(row(8), &[1, 1, 1, 1]);
    assert_eq!(row(9), &[0, 0, 0, 1]);
    assert_eq!(row(12), &[1, 1, 1, 1]);
    assert!(chip8.needs_redraw());
}

#[test]
fn test_key_driven_branch() {
    // Wait for a key in V0, then skip the marker write unless key 5 is held.
    // 0x200: V0 = key
    // 0x202: skip if key[V0] pressed
    // 0x204: V1 = 0xEE
    // 0x206: jump 0x206
    let mut chip8 = boot(&[0xF0, 0x0A, 0xE0, 0x9E, 0x61, 0xEE, 0x12, 0x06]);
    run(&mut chip8, 5);
    assert_eq!(chip8.pc(), 0x200);

    chip8.set_key_down(5).unwrap();
    run(&mut chip8, 3);
    assert_eq!(chip8.register(Register::V0), 5);
    assert_eq!(chip8.register(Register::V1), 0);
    assert_eq!(chip8.pc(), 0x206);
}

#[test]
fn test_oversized_rom_is_rejected() {
    let mut chip8 = Chip8::with_seed(0);
    let err = chip8
        .load_program(&vec![0; PROGRAM_CAPACITY + 1])
        .unwrap_err();
    assert_eq!(
        err,
        Chip8Error::RomTooLarge {
            size: PROGRAM_CAPACITY + 1,
            capacity: PROGRAM_CAPACITY,
        }
    );
    assert_eq!(chip8.pc(), 0x200);
}

#[test]
fn test_two_machines_are_independent() {
    let mut a = boot(&[0x60, 0x01]);
    let b = boot(&[0x60, 0x02]);
    run(&mut a, 1);
    assert_eq!(a.register(Register::V0), 1);
    assert_eq!(b.register(Register::V0), 0);
    assert_eq!(b.pc(), 0x200);
}
