//! Dictionary parsing, lookup, and the `sread` tokenizer (spec.md §4.4).

use crate::error::VmResult;
use crate::text;
use crate::vm::VM;
use log::debug;
use std::cmp::Ordering;

/// Parsed dictionary header (spec.md §3 "Dictionary").
pub struct DictionaryHeader {
    pub separators: Vec<u8>,
    pub entry_length: u8,
    /// Negative means the table is *not* sorted (linear scan required).
    pub entry_count: i16,
    pub entries_addr: u32,
}

pub fn read_header(vm: &VM) -> DictionaryHeader {
    let dict_addr = vm.game.header.dictionary as u32;
    let sep_count = vm.read_byte(dict_addr);
    let mut separators = Vec::with_capacity(sep_count as usize);
    for i in 0..sep_count as u32 {
        separators.push(vm.read_byte(dict_addr + 1 + i));
    }
    let entry_start = dict_addr + 1 + sep_count as u32;
    let entry_length = vm.read_byte(entry_start);
    let entry_count = vm.read_word(entry_start + 1) as i16;
    DictionaryHeader {
        separators,
        entry_length,
        entry_count,
        entries_addr: entry_start + 3,
    }
}

/// Frotz-style binary chop: start at the largest power-of-two index not
/// exceeding the entry count, halve the step each time, and move by the
/// (possibly stale) step in the direction the comparison indicates
/// (spec.md §4.4).
fn binary_chop(vm: &VM, hdr: &DictionaryHeader, key: (u16, u16)) -> Option<u32> {
    let count = hdr.entry_count as i64;
    if count <= 0 {
        return None;
    }
    let mut chop: i64 = 1;
    while chop * 2 <= count {
        chop *= 2;
    }
    let mut index: i64 = chop - 1;
    loop {
        if index >= 0 && index < count {
            let addr = hdr.entries_addr + index as u32 * hdr.entry_length as u32;
            let entry = (vm.read_word(addr), vm.read_word(addr + 2));
            match key.cmp(&entry) {
                Ordering::Equal => return Some(addr),
                Ordering::Less => {
                    if chop <= 1 {
                        return None;
                    }
                    chop /= 2;
                    index -= chop;
                }
                Ordering::Greater => {
                    if chop <= 1 {
                        return None;
                    }
                    chop /= 2;
                    index += chop;
                }
            }
        } else if index < 0 {
            if chop <= 1 {
                return None;
            }
            chop /= 2;
            index += chop;
        } else {
            if chop <= 1 {
                return None;
            }
            chop /= 2;
            index -= chop;
        }
    }
}

fn linear_scan(vm: &VM, hdr: &DictionaryHeader, key: (u16, u16)) -> Option<u32> {
    let count = hdr.entry_count.unsigned_abs() as u32;
    for i in 0..count {
        let addr = hdr.entries_addr + i * hdr.entry_length as u32;
        let entry = (vm.read_word(addr), vm.read_word(addr + 2));
        if entry == key {
            return Some(addr);
        }
    }
    None
}

/// Look up an already-lowercased token in the dictionary. Returns the
/// entry's byte address, or 0 for "not found" (spec.md §4.4).
pub fn lookup(vm: &VM, token: &str) -> u16 {
    let hdr = read_header(vm);
    let key = text::encode_word_v3(token);
    let found = if hdr.entry_count < 0 {
        linear_scan(vm, &hdr, key)
    } else {
        binary_chop(vm, &hdr, key)
    };
    found.unwrap_or(0) as u16
}

/// One entry of the tokenizer's parse buffer.
struct ParsedToken {
    dict_addr: u16,
    length: u8,
    text_offset: u8,
}

fn is_word_break(c: char, separators: &[u8]) -> bool {
    c.is_whitespace() || separators.iter().any(|&s| s as u32 == c as u32)
}

/// Split `line` into tokens the way `sread` does: whitespace separates
/// tokens silently, but each dictionary separator is *also* emitted as its
/// own single-character token at its source position (spec.md §4.4).
fn split_tokens(line: &str, separators: &[u8]) -> Vec<(usize, String)> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if separators.iter().any(|&s| s as u32 == c as u32) {
            tokens.push((i, c.to_string()));
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !is_word_break(chars[i], separators) {
            i += 1;
        }
        tokens.push((start, chars[start..i].iter().collect()));
    }
    tokens
}

/// Implements `sread` (spec.md §4.4, §4.7): read a line via `read_line`,
/// write it into the text buffer, tokenize it against the dictionary, and
/// write the parse buffer.
pub fn tokenize(vm: &mut VM, text_buffer: u32, parse_buffer: u32, input: &str) -> VmResult<()> {
    let max_text = vm.read_byte(text_buffer).max(1) as usize;
    let lowered: String = input.to_lowercase();
    let truncated: String = lowered.chars().take(max_text.saturating_sub(1)).collect();

    for (i, ch) in truncated.chars().enumerate() {
        vm.write_byte(text_buffer + 1 + i as u32, ch as u8)?;
    }
    vm.write_byte(text_buffer + 1 + truncated.chars().count() as u32, 0)?;

    let hdr = read_header(vm);
    let max_tokens = vm.read_byte(parse_buffer) as usize;
    let raw_tokens = split_tokens(&truncated, &hdr.separators);

    let mut tokens = Vec::new();
    for (offset, word) in raw_tokens.iter().take(max_tokens) {
        let dict_addr = lookup(vm, word);
        tokens.push(ParsedToken {
            dict_addr,
            length: word.chars().count() as u8,
            text_offset: *offset as u8,
        });
        debug!("token {word:?} @ {offset} -> dict {dict_addr:#06x}");
    }

    vm.write_byte(parse_buffer + 1, tokens.len() as u8)?;
    for (i, tok) in tokens.iter().enumerate() {
        let entry = parse_buffer + 2 + (i as u32 * 4);
        vm.write_word(entry, tok.dict_addr)?;
        vm.write_byte(entry + 2, tok.length)?;
        vm.write_byte(entry + 3, tok.text_offset)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::vm::Game;

    /// Builds a tiny sorted V3 dictionary with `words`, one separator ',',
    /// at a fixed address, and returns a VM plus the text/parse buffer
    /// addresses.
    fn vm_with_dictionary(words: &[&str]) -> VM {
        let mut mem = vec![0u8; 0x10000];
        mem[0] = 3;
        let dict_addr = 0x300u32;
        mem[0x08] = (dict_addr >> 8) as u8;
        mem[0x09] = (dict_addr & 0xFF) as u8;

        mem[dict_addr as usize] = 1; // one separator
        mem[dict_addr as usize + 1] = b',';
        let entry_start = dict_addr + 2;
        let entry_length = 7u8; // 4 bytes key + 3 bytes game data (V3 min)
        mem[entry_start as usize] = entry_length;

        let mut sorted: Vec<&str> = words.to_vec();
        sorted.sort();
        let count = sorted.len() as u16;
        mem[entry_start as usize + 1] = (count >> 8) as u8;
        mem[entry_start as usize + 2] = (count & 0xFF) as u8;

        let entries_addr = entry_start + 3;
        for (i, w) in sorted.iter().enumerate() {
            let (w1, w2) = text::encode_word_v3(w);
            let addr = entries_addr + i as u32 * entry_length as u32;
            mem[addr as usize] = (w1 >> 8) as u8;
            mem[addr as usize + 1] = (w1 & 0xFF) as u8;
            mem[addr as usize + 2] = (w2 >> 8) as u8;
            mem[addr as usize + 3] = (w2 & 0xFF) as u8;
        }

        let header = Header::new(&mem[..64]);
        VM::new(Game { memory: mem, header })
    }

    #[test]
    fn lookup_finds_known_word_and_misses_unknown() {
        let vm = vm_with_dictionary(&["take", "lamp", "drop", "look", "go", "west"]);
        assert_ne!(lookup(&vm, "take"), 0);
        assert_ne!(lookup(&vm, "lamp"), 0);
        assert_eq!(lookup(&vm, "xyzzy"), 0);
    }

    #[test]
    fn tokenize_take_lamp_matches_spec_scenario() {
        let mut vm = vm_with_dictionary(&["take", "lamp", "drop", "look", "go", "west"]);
        let text_buffer = 0x500u32;
        let parse_buffer = 0x540u32;
        vm.write_byte(text_buffer, 20).unwrap();
        vm.write_byte(parse_buffer, 4).unwrap();

        tokenize(&mut vm, text_buffer, parse_buffer, "take lamp").unwrap();

        assert_eq!(vm.read_byte(parse_buffer + 1), 2);
        let first_len = vm.read_byte(parse_buffer + 2 + 2);
        let first_off = vm.read_byte(parse_buffer + 2 + 3);
        assert_eq!(first_len, 4);
        assert_eq!(first_off, 0);
        let second_len = vm.read_byte(parse_buffer + 6 + 2);
        let second_off = vm.read_byte(parse_buffer + 6 + 3);
        assert_eq!(second_len, 4);
        assert_eq!(second_off, 5);
        assert_ne!(vm.read_word(parse_buffer + 2), 0);
        assert_ne!(vm.read_word(parse_buffer + 6), 0);
    }

    #[test]
    fn separators_become_their_own_tokens() {
        let mut vm = vm_with_dictionary(&["take", "lamp"]);
        let text_buffer = 0x500u32;
        let parse_buffer = 0x540u32;
        vm.write_byte(text_buffer, 20).unwrap();
        vm.write_byte(parse_buffer, 8).unwrap();

        tokenize(&mut vm, text_buffer, parse_buffer, "take,lamp").unwrap();
        assert_eq!(vm.read_byte(parse_buffer + 1), 3);
    }
}
