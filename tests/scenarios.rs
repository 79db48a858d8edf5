//! End-to-end scenarios built from hand-assembled bytecode, run through the
//! public `Interpreter` API (spec.md §8).

use zcore::header::Header;
use zcore::io::{HeadlessScreen, MemStorage, ScriptedInput};
use zcore::text::encode_word_v3;
use zcore::vm::Game;
use zcore::{Interpreter, RunOutcome, VM};

type TestInterpreter = Interpreter<HeadlessScreen, ScriptedInput, MemStorage>;

fn base_memory() -> Vec<u8> {
    let mut mem = vec![0u8; 0x10000];
    mem[0] = 3; // version
    mem[0x06] = 0x00;
    mem[0x07] = 0x40; // initial_pc = 0x40
    mem[0x0A] = 0x02;
    mem[0x0B] = 0x00; // object table at 0x0200
    mem[0x0C] = 0x03;
    mem[0x0D] = 0x00; // globals at 0x0300
    mem[0x0E] = 0x40;
    mem[0x0F] = 0x00; // static mem base 0x4000
    mem[0x08] = 0x05;
    mem[0x09] = 0x00; // dictionary at 0x0500
    mem
}

fn make_interpreter(mem: Vec<u8>, input_lines: &[&str]) -> TestInterpreter {
    let header = Header::new(&mem[..64]);
    let vm = VM::new(Game { memory: mem, header });
    Interpreter::new(
        vm,
        HeadlessScreen::default(),
        ScriptedInput::new(input_lines.iter().map(|s| s.to_string())),
        MemStorage::default(),
        zcore::config::Config::default(),
    )
}

fn run_to_completion(interp: &mut TestInterpreter) {
    loop {
        match interp.run().unwrap() {
            RunOutcome::Finished => break,
            RunOutcome::Yielded => continue,
        }
    }
}

#[test]
fn quit_only_program_ends_cleanly() {
    let mut mem = base_memory();
    mem[0x40] = 0xBA; // short form 0OP, opcode 0x0A = quit
    let mut interp = make_interpreter(mem, &[]);
    run_to_completion(&mut interp);
    assert!(!interp.vm.game_running);
    assert!(interp.screen.transcript.is_empty());
}

#[test]
fn call_to_zero_stores_zero_then_quits() {
    let mut mem = base_memory();
    // call_vs 0 -> G00; quit.
    mem[0x40] = 0xE0;
    mem[0x41] = 0b00_11_11_11;
    mem[0x42] = 0x00;
    mem[0x43] = 0x00;
    mem[0x44] = 0x10; // store into global 0 (variable number 16)
    mem[0x45] = 0xBA; // quit
    let mut interp = make_interpreter(mem, &[]);
    run_to_completion(&mut interp);
    let globals_addr = interp.vm.game.header.global_variables as u32;
    assert_eq!(interp.vm.read_word(globals_addr), 0);
}

#[test]
fn prints_hi_then_quits() {
    let mut mem = base_memory();
    let (w1, w2) = encode_word_v3("HI");
    mem[0x40] = 0xB2; // print (short form, 0OP opcode 2)
    mem[0x41] = (w1 >> 8) as u8;
    mem[0x42] = (w1 & 0xFF) as u8;
    mem[0x43] = (w2 >> 8) as u8;
    mem[0x44] = (w2 & 0xFF) as u8;
    mem[0x45] = 0xBA; // quit
    let mut interp = make_interpreter(mem, &[]);
    run_to_completion(&mut interp);
    assert_eq!(interp.screen.transcript, "HI");
}

#[test]
fn add_globals_and_print_num_yields_eight() {
    let mut mem = base_memory();
    // add G00,G01 -> stack
    mem[0x40] = 0x14 | 0x40 | 0x20; // long form, both operands variable
    mem[0x41] = 16;
    mem[0x42] = 17;
    mem[0x43] = 0;
    // print_num (VAR form, variable operand referencing the stack)
    mem[0x44] = 0xE6;
    mem[0x45] = 0b10_11_11_11;
    mem[0x46] = 0;
    mem[0x47] = 0xBA; // quit
    let mut interp = make_interpreter(mem, &[]);
    interp.vm.write_variable(16, 5).unwrap();
    interp.vm.write_variable(17, 3).unwrap();
    run_to_completion(&mut interp);
    assert_eq!(interp.screen.transcript, "8");
}

#[test]
fn attribute_test_branches_to_yes() {
    let mut mem = base_memory();
    let (yes_w1, yes_w2) = encode_word_v3("yes");
    let (no_w1, no_w2) = encode_word_v3("no");
    let yes_addr = 0x3E00u32;
    let no_addr = 0x3E10u32;
    mem[yes_addr as usize] = (yes_w1 >> 8) as u8;
    mem[yes_addr as usize + 1] = (yes_w1 & 0xFF) as u8;
    mem[yes_addr as usize + 2] = (yes_w2 >> 8) as u8;
    mem[yes_addr as usize + 3] = (yes_w2 & 0xFF) as u8;
    mem[no_addr as usize] = (no_w1 >> 8) as u8;
    mem[no_addr as usize + 1] = (no_w1 & 0xFF) as u8;
    mem[no_addr as usize + 2] = (no_w2 >> 8) as u8;
    mem[no_addr as usize + 3] = (no_w2 & 0xFF) as u8;

    // set_attr obj1, attr 5
    mem[0x40] = 0x0B; // 2OP long form, opcode 0x0B = set_attr, both small constants
    mem[0x41] = 1;
    mem[0x42] = 5;
    // test_attr obj1, attr5 ?label
    mem[0x43] = 0x0A; // set_attr's sibling opcode test_attr
    mem[0x44] = 1;
    mem[0x45] = 5;
    mem[0x46] = 0x80 | 0x40 | 6; // branch on true (short form), offset 6, to the L_yes label
    // Fallthrough when the attribute test is false: print "no" then quit.
    // 0x8D: short form, 1OP, operand type large-constant (packed addresses
    // don't fit a single byte), opcode 0x0D = print_paddr.
    let no_packed = (no_addr / 2) as u16;
    mem[0x47] = 0x8D;
    mem[0x48] = (no_packed >> 8) as u8;
    mem[0x49] = (no_packed & 0xFF) as u8;
    mem[0x4A] = 0xBA; // quit
    // L_yes (branch target): print "yes" then quit.
    let yes_packed = (yes_addr / 2) as u16;
    mem[0x4B] = 0x8D;
    mem[0x4C] = (yes_packed >> 8) as u8;
    mem[0x4D] = (yes_packed & 0xFF) as u8;
    mem[0x4E] = 0xBA;

    let mut interp = make_interpreter(mem, &[]);
    run_to_completion(&mut interp);
    assert_eq!(interp.screen.transcript, "yes");
}

#[test]
fn sread_tokenizes_take_lamp() {
    let mut mem = base_memory();

    // Dictionary: separator ',', two sorted entries "lamp" and "take".
    let dict_addr = 0x0500u32;
    mem[dict_addr as usize] = 1;
    mem[dict_addr as usize + 1] = b',';
    let entry_start = dict_addr + 2;
    mem[entry_start as usize] = 7; // entry length
    mem[entry_start as usize + 1] = 0x00;
    mem[entry_start as usize + 2] = 0x02; // 2 entries
    let entries_addr = entry_start + 3;
    for (i, word) in ["lamp", "take"].iter().enumerate() {
        let (w1, w2) = encode_word_v3(word);
        let addr = entries_addr + i as u32 * 7;
        mem[addr as usize] = (w1 >> 8) as u8;
        mem[addr as usize + 1] = (w1 & 0xFF) as u8;
        mem[addr as usize + 2] = (w2 >> 8) as u8;
        mem[addr as usize + 3] = (w2 & 0xFF) as u8;
    }

    let text_buffer = 0x3E00u32;
    let parse_buffer = 0x3E40u32;
    mem[text_buffer as usize] = 20;
    mem[parse_buffer as usize] = 4;

    // sread text_buffer, parse_buffer ; quit
    mem[0x40] = 0xE4; // VAR form, opcode 4 = sread
    mem[0x41] = 0b00_00_11_11; // two large-constant operands, rest omitted
    mem[0x42] = (text_buffer >> 8) as u8;
    mem[0x43] = (text_buffer & 0xFF) as u8;
    mem[0x44] = (parse_buffer >> 8) as u8;
    mem[0x45] = (parse_buffer & 0xFF) as u8;
    mem[0x46] = 0xBA; // quit

    let mut interp = make_interpreter(mem, &["take lamp"]);
    run_to_completion(&mut interp);

    assert_eq!(interp.vm.read_byte(parse_buffer + 1), 2);
    assert_eq!(interp.vm.read_byte(parse_buffer + 2 + 2), 4); // "take" length
    assert_eq!(interp.vm.read_byte(parse_buffer + 2 + 3), 0); // offset 0
    assert_eq!(interp.vm.read_byte(parse_buffer + 6 + 2), 4); // "lamp" length
    assert_eq!(interp.vm.read_byte(parse_buffer + 6 + 3), 5); // offset 5
    assert_ne!(interp.vm.read_word(parse_buffer + 2), 0);
    assert_ne!(interp.vm.read_word(parse_buffer + 6), 0);
}
