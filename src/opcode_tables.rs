//! Opcode name lookup for logging and disassembly (spec.md §4.7, §9).
//!
//! These tables are diagnostic only; execution dispatches on the numeric
//! opcode directly in `interpreter.rs`.

pub fn op0_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "rtrue",
        0x01 => "rfalse",
        0x02 => "print",
        0x03 => "print_ret",
        0x04 => "nop",
        0x05 => "save",
        0x06 => "restore",
        0x07 => "restart",
        0x08 => "ret_popped",
        0x09 => "pop",
        0x0A => "quit",
        0x0B => "new_line",
        0x0C => "show_status",
        0x0D => "verify",
        0x0F => "piracy",
        _ => "unknown_0op",
    }
}

pub fn op1_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "jz",
        0x01 => "get_sibling",
        0x02 => "get_child",
        0x03 => "get_parent",
        0x04 => "get_prop_len",
        0x05 => "inc",
        0x06 => "dec",
        0x07 => "print_addr",
        0x08 => "call_1s",
        0x09 => "remove_obj",
        0x0A => "print_obj",
        0x0B => "ret",
        0x0C => "jump",
        0x0D => "print_paddr",
        0x0E => "load",
        0x0F => "not",
        _ => "unknown_1op",
    }
}

pub fn op2_name(opcode: u8) -> &'static str {
    match opcode {
        0x01 => "je",
        0x02 => "jl",
        0x03 => "jg",
        0x04 => "dec_chk",
        0x05 => "inc_chk",
        0x06 => "jin",
        0x07 => "test",
        0x08 => "or",
        0x09 => "and",
        0x0A => "test_attr",
        0x0B => "set_attr",
        0x0C => "clear_attr",
        0x0D => "store",
        0x0E => "insert_obj",
        0x0F => "loadw",
        0x10 => "loadb",
        0x11 => "get_prop",
        0x12 => "get_prop_addr",
        0x13 => "get_next_prop",
        0x14 => "add",
        0x15 => "sub",
        0x16 => "mul",
        0x17 => "div",
        0x18 => "mod",
        0x19 => "call_2s",
        0x1A => "call_2n",
        0x1B => "set_colour",
        0x1C => "throw",
        _ => "unknown_2op",
    }
}

pub fn var_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "call_vs",
        0x01 => "storew",
        0x02 => "storeb",
        0x03 => "put_prop",
        0x04 => "sread",
        0x05 => "print_char",
        0x06 => "print_num",
        0x07 => "random",
        0x08 => "push",
        0x09 => "pull",
        0x0A => "split_window",
        0x0B => "set_window",
        0x0C => "call_vs2",
        0x0D => "erase_window",
        0x0E => "erase_line",
        0x0F => "set_cursor",
        0x10 => "get_cursor",
        0x11 => "set_text_style",
        0x12 => "buffer_mode",
        0x13 => "output_stream",
        0x14 => "input_stream",
        0x15 => "sound_effect",
        0x16 => "read_char",
        0x17 => "scan_table",
        0x18 => "not",
        0x19 => "call_vn",
        0x1A => "call_vn2",
        0x1B => "tokenise",
        0x1C => "encode_text",
        0x1D => "copy_table",
        0x1E => "print_table",
        0x1F => "check_arg_count",
        _ => "unknown_var",
    }
}

/// Extended-form opcodes are V5+ only; named here so V3 disassembly of a
/// malformed story doesn't just print a bare number.
pub fn ext_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "save_ext",
        0x01 => "restore_ext",
        0x02 => "log_shift",
        0x03 => "art_shift",
        0x04 => "set_font",
        0x09 => "save_undo",
        0x0A => "restore_undo",
        _ => "unknown_ext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_opcodes_resolve() {
        assert_eq!(op2_name(0x14), "add");
        assert_eq!(op1_name(0x0B), "ret");
        assert_eq!(op0_name(0x0D), "verify");
        assert_eq!(var_name(0x04), "sread");
    }

    #[test]
    fn unknown_opcodes_fall_back() {
        assert_eq!(op2_name(0xFF), "unknown_2op");
    }
}
