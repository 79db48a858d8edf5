//! The fetch-decode-execute loop and full V3 opcode semantics (spec.md §4.7,
//! §5, §9). V5+ opcodes the core doesn't implement decode cleanly but
//! execute as `VmError::NotImplemented` stubs rather than panicking.

use crate::config::Config;
use crate::dictionary;
use crate::error::{VmError, VmResult};
use crate::instruction::{Instruction, OperandCount, OperandType};
use crate::io::{Input, Screen, Storage};
use crate::quetzal;
use crate::vm::{CallFrame, MAX_LOCALS, VM};
use crate::zobject_v3::ObjectSystemV3;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Yielded back to the host after `Config::yield_interval` instructions;
    /// the host should call `run` again to keep going.
    Yielded,
    /// `quit` executed or the outermost routine returned.
    Finished,
}

pub struct Interpreter<S: Screen, I: Input, T: Storage> {
    pub vm: VM,
    pub screen: S,
    pub input: I,
    pub storage: T,
    pub config: Config,
}

impl<S: Screen, I: Input, T: Storage> Interpreter<S, I, T> {
    pub fn new(vm: VM, screen: S, input: I, storage: T, config: Config) -> Self {
        Interpreter {
            vm,
            screen,
            input,
            storage,
            config,
        }
    }

    /// Runs until `quit`/outermost return, or until the configured
    /// instruction budget for one host tick is exhausted (spec.md §5).
    pub fn run(&mut self) -> VmResult<RunOutcome> {
        let mut count = 0u64;
        let budget = self.config.yield_interval.max(1);
        while self.vm.game_running {
            self.step()?;
            count += 1;
            if count >= budget {
                return Ok(RunOutcome::Yielded);
            }
        }
        Ok(RunOutcome::Finished)
    }

    fn step(&mut self) -> VmResult<()> {
        let pc = self.vm.pc;
        self.vm.current_instruction_pc = Some(pc);
        let version = self.vm.game.header.version;
        let inst = Instruction::decode(&self.vm, pc, version).map_err(|_| VmError::Decode {
            pc,
            opcode_byte: self.vm.read_byte(pc),
        })?;
        self.vm.pc = pc + inst.size;

        if inst.ext_opcode.is_some() {
            return self.execute_ext(&inst);
        }
        match inst.operand_count {
            OperandCount::Op0 => self.execute_0op(&inst),
            OperandCount::Op1 => self.execute_1op(&inst),
            OperandCount::Op2 => self.execute_2op(&inst),
            OperandCount::Var => self.execute_var(&inst),
        }
    }

    // ---- operand resolution ------------------------------------------

    fn resolve_operands(&mut self, inst: &Instruction) -> VmResult<Vec<u16>> {
        let mut out = Vec::with_capacity(inst.operands.len());
        for (i, ty) in inst.operand_types.iter().enumerate() {
            let raw = inst.operands[i];
            let v = match ty {
                OperandType::Variable => self.vm.read_variable(raw as u8)?,
                _ => raw,
            };
            out.push(v);
        }
        Ok(out)
    }

    /// Resolves a single operand by index, without touching the others.
    /// Needed wherever another operand is already consumed through
    /// `indirect_variable_number` — re-resolving via `resolve_operands`
    /// would read a `Variable`-typed operand 0 (e.g. the stack) a second
    /// time (spec.md §4.7, §9).
    fn resolve_operand(&mut self, inst: &Instruction, index: usize) -> VmResult<u16> {
        let raw = inst.operands[index];
        match inst.operand_types[index] {
            OperandType::Variable => self.vm.read_variable(raw as u8),
            _ => Ok(raw),
        }
    }

    /// The "variable-operand indirection rule": opcodes like `inc`, `dec`,
    /// `load`, `store`, `inc_chk`, `dec_chk`, and `pull` take a variable
    /// *number* as their first operand. If that operand's type is itself
    /// `Variable`, the number is read indirectly through it rather than
    /// being resolved to a value directly (spec.md §9).
    fn indirect_variable_number(&mut self, inst: &Instruction, index: usize) -> VmResult<u8> {
        match inst.operand_types[index] {
            OperandType::Variable => Ok(self.vm.read_variable(inst.operands[index] as u8)? as u8),
            _ => Ok(inst.operands[index] as u8),
        }
    }

    fn do_store(&mut self, inst: &Instruction, value: u16) -> VmResult<()> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    fn do_branch(&mut self, inst: &Instruction, condition: bool) -> VmResult<()> {
        let Some(branch) = &inst.branch else {
            return Ok(());
        };
        if condition != branch.on_true {
            return Ok(());
        }
        match branch.offset {
            0 => self.do_return(0),
            1 => self.do_return(1),
            off => {
                self.vm.pc = (inst.addr as i64 + inst.size as i64 + off as i64 - 2) as u32;
                Ok(())
            }
        }
    }

    fn do_return(&mut self, value: u16) -> VmResult<()> {
        if self.vm.call_stack.len() <= 1 {
            debug!("return from outermost context, ending game");
            self.vm.game_running = false;
            return Ok(());
        }
        let frame = self.vm.pop_frame()?;
        self.vm.pc = frame.return_pc;
        if let Some(store) = frame.return_store {
            self.vm.write_variable(store, value)?;
        }
        Ok(())
    }

    fn do_jump(&mut self, inst: &Instruction, offset: i16) {
        self.vm.pc = (inst.addr as i64 + inst.size as i64 + offset as i64 - 2) as u32;
    }

    fn do_call(&mut self, args: &[u16], store_var: Option<u8>) -> VmResult<()> {
        let routine_packed = args.first().copied().unwrap_or(0);
        if routine_packed == 0 {
            // Calling address 0 is always legal and returns false without
            // executing anything (spec.md §4.7).
            if let Some(sv) = store_var {
                self.vm.write_variable(sv, 0)?;
            }
            return Ok(());
        }
        let addr = self.vm.unpack_address(routine_packed, true);
        let num_locals = self.vm.read_byte(addr).min(MAX_LOCALS as u8);
        let mut locals = [0u16; MAX_LOCALS];
        for i in 0..num_locals as usize {
            locals[i] = self.vm.read_word(addr + 1 + i as u32 * 2);
        }
        let call_args = &args[1..];
        for (i, &v) in call_args.iter().enumerate().take(num_locals as usize) {
            locals[i] = v;
        }
        let argc = call_args.len().min(num_locals as usize) as u8;
        let return_pc = self.vm.pc;
        let frame = CallFrame::call(return_pc, store_var, num_locals, argc, locals);
        self.vm.push_frame(frame)?;
        self.vm.pc = addr + 1 + num_locals as u32 * 2;
        Ok(())
    }

    // ---- 0OP -----------------------------------------------------------

    fn execute_0op(&mut self, inst: &Instruction) -> VmResult<()> {
        match inst.opcode {
            0x00 => self.do_return(1), // rtrue
            0x01 => self.do_return(0), // rfalse
            0x02 => {
                if let Some(text) = &inst.text {
                    self.screen.print(text);
                }
                Ok(())
            }
            0x03 => {
                if let Some(text) = &inst.text {
                    self.screen.print(text);
                }
                self.screen.new_line();
                self.do_return(1)
            }
            0x04 => Ok(()), // nop
            0x05 => {
                let ok = quetzal::save(&self.vm)
                    .and_then(|bytes| {
                        self.storage
                            .save("default", &bytes)
                            .map_err(VmError::SaveRestore)
                    })
                    .is_ok();
                self.do_branch(inst, ok)
            }
            0x06 => {
                let ok = match self.storage.load("default") {
                    Ok(bytes) => quetzal::restore(&mut self.vm, &bytes).is_ok(),
                    Err(_) => false,
                };
                if ok {
                    // PC was replaced from the save; the branch belongs to
                    // this (no-longer-executing) instruction and must not
                    // fire on success (spec.md §4.7).
                    Ok(())
                } else {
                    self.do_branch(inst, false)
                }
            }
            0x07 => {
                self.vm.reset();
                Ok(())
            }
            0x08 => {
                let v = self.vm.pop()?;
                self.do_return(v)
            }
            0x09 => {
                let _ = self.vm.pop()?;
                Ok(())
            }
            0x0A => {
                self.vm.game_running = false;
                Ok(())
            }
            0x0B => {
                self.screen.new_line();
                Ok(())
            }
            0x0C => {
                self.show_status();
                Ok(())
            }
            0x0D => {
                let ok = self.verify_checksum();
                self.do_branch(inst, ok)
            }
            0x0F => self.do_branch(inst, true), // piracy: always genuine
            other => {
                warn!("unhandled 0OP opcode {other:#04x} at {:#06x}", inst.addr);
                Err(VmError::NotImplemented("0OP opcode"))
            }
        }
    }

    fn show_status(&mut self) {
        let global0 = self.vm.read_variable(16).unwrap_or(0);
        let left = self.vm.object_short_name(global0);
        let g1 = self.vm.read_variable(17).unwrap_or(0) as i16;
        let g2 = self.vm.read_variable(18).unwrap_or(0) as i16;
        let right = if self.vm.game.header.is_time_game() {
            format!("{:02}:{:02}", g1, g2)
        } else {
            format!("{}/{}", g1, g2)
        };
        self.screen.show_status(&left, &right);
    }

    fn verify_checksum(&self) -> bool {
        let len = self.vm.game.header.len_file.min(self.vm.game.memory.len());
        if len <= 0x40 {
            return true;
        }
        let mut sum: u16 = 0;
        for b in &self.vm.game.memory[0x40..len] {
            sum = sum.wrapping_add(*b as u16);
        }
        sum == self.vm.game.header.checksum_file
    }

    // ---- 1OP -------------------------------------------------------------

    fn execute_1op(&mut self, inst: &Instruction) -> VmResult<()> {
        match inst.opcode {
            0x00 => {
                let v = self.resolve_operands(inst)?[0];
                self.do_branch(inst, v == 0)
            }
            0x01 => {
                let obj = self.resolve_operands(inst)?[0];
                let sib = self.vm.sibling(obj);
                self.do_store(inst, sib)?;
                self.do_branch(inst, sib != 0)
            }
            0x02 => {
                let obj = self.resolve_operands(inst)?[0];
                let child = self.vm.child(obj);
                self.do_store(inst, child)?;
                self.do_branch(inst, child != 0)
            }
            0x03 => {
                let obj = self.resolve_operands(inst)?[0];
                let parent = self.vm.parent(obj);
                self.do_store(inst, parent)
            }
            0x04 => {
                let addr = self.resolve_operands(inst)?[0] as u32;
                let len = if addr == 0 { 0 } else { self.vm.prop_len(addr) };
                self.do_store(inst, len as u16)
            }
            0x05 => {
                let var = self.indirect_variable_number(inst, 0)?;
                let v = self.vm.read_variable(var)? as i16;
                self.vm.write_variable(var, v.wrapping_add(1) as u16)
            }
            0x06 => {
                let var = self.indirect_variable_number(inst, 0)?;
                let v = self.vm.read_variable(var)? as i16;
                self.vm.write_variable(var, v.wrapping_sub(1) as u16)
            }
            0x07 => {
                let addr = self.resolve_operands(inst)?[0] as u32;
                let abbrev = self.vm.game.header.abbrev_table as u32;
                let (s, _) = crate::text::decode_string(&self.vm, addr, abbrev)?;
                self.screen.print(&s);
                Ok(())
            }
            0x08 => {
                let args = self.resolve_operands(inst)?;
                self.do_call(&args, inst.store_var)
            }
            0x09 => {
                let obj = self.resolve_operands(inst)?[0];
                self.vm.remove_obj(obj)
            }
            0x0A => {
                let obj = self.resolve_operands(inst)?[0];
                let name = self.vm.object_short_name(obj);
                self.screen.print(&name);
                Ok(())
            }
            0x0B => {
                let v = self.resolve_operands(inst)?[0];
                self.do_return(v)
            }
            0x0C => {
                let offset = self.resolve_operands(inst)?[0] as i16;
                self.do_jump(inst, offset);
                Ok(())
            }
            0x0D => {
                let packed = self.resolve_operands(inst)?[0];
                let addr = self.vm.unpack_address(packed, false);
                let abbrev = self.vm.game.header.abbrev_table as u32;
                let (s, _) = crate::text::decode_string(&self.vm, addr, abbrev)?;
                self.screen.print(&s);
                Ok(())
            }
            0x0E => {
                let var = self.indirect_variable_number(inst, 0)?;
                let v = if var == 0 {
                    self.vm.peek_top_of_stack().unwrap_or(0)
                } else {
                    self.vm.read_variable(var)?
                };
                self.do_store(inst, v)
            }
            0x0F => {
                let v = self.resolve_operands(inst)?[0];
                self.do_store(inst, !v)
            }
            other => {
                warn!("unhandled 1OP opcode {other:#04x} at {:#06x}", inst.addr);
                Err(VmError::NotImplemented("1OP opcode"))
            }
        }
    }

    // ---- 2OP -------------------------------------------------------------

    fn execute_2op(&mut self, inst: &Instruction) -> VmResult<()> {
        match inst.opcode {
            0x01 => {
                // je is variadic: true if the first operand equals any of
                // the 1-3 operands that follow (spec.md §4.7).
                let a = self.resolve_operands(inst)?;
                self.do_branch(inst, a[1..].iter().any(|&x| x == a[0]))
            }
            0x02 => {
                let a = self.resolve_operands(inst)?;
                self.do_branch(inst, (a[0] as i16) < (a[1] as i16))
            }
            0x03 => {
                let a = self.resolve_operands(inst)?;
                self.do_branch(inst, (a[0] as i16) > (a[1] as i16))
            }
            0x04 => {
                let var = self.indirect_variable_number(inst, 0)?;
                let cmp = self.resolve_operand(inst, 1)? as i16;
                let v = self.vm.read_variable(var)? as i16;
                let new_v = v.wrapping_sub(1);
                self.vm.write_variable(var, new_v as u16)?;
                self.do_branch(inst, new_v < cmp)
            }
            0x05 => {
                let var = self.indirect_variable_number(inst, 0)?;
                let cmp = self.resolve_operand(inst, 1)? as i16;
                let v = self.vm.read_variable(var)? as i16;
                let new_v = v.wrapping_add(1);
                self.vm.write_variable(var, new_v as u16)?;
                self.do_branch(inst, new_v > cmp)
            }
            0x06 => {
                let a = self.resolve_operands(inst)?;
                self.do_branch(inst, self.vm.parent(a[0]) == a[1])
            }
            0x07 => {
                let a = self.resolve_operands(inst)?;
                self.do_branch(inst, (a[0] & a[1]) == a[1])
            }
            0x08 => {
                let a = self.resolve_operands(inst)?;
                self.do_store(inst, a[0] | a[1])
            }
            0x09 => {
                let a = self.resolve_operands(inst)?;
                self.do_store(inst, a[0] & a[1])
            }
            0x0A => {
                let a = self.resolve_operands(inst)?;
                self.do_branch(inst, self.vm.test_attribute(a[0], a[1]))
            }
            0x0B => {
                let a = self.resolve_operands(inst)?;
                self.vm.set_attribute(a[0], a[1])
            }
            0x0C => {
                let a = self.resolve_operands(inst)?;
                self.vm.clear_attribute(a[0], a[1])
            }
            0x0D => {
                let var = self.indirect_variable_number(inst, 0)?;
                let value = self.resolve_operand(inst, 1)?;
                if var == 0 {
                    // `store` to the stack overwrites the top rather than
                    // pushing (spec.md §9).
                    if !self.vm.current_frame().eval_stack.is_empty() {
                        self.vm.pop()?;
                    }
                    self.vm.push(value);
                    Ok(())
                } else {
                    self.vm.write_variable(var, value)
                }
            }
            0x0E => {
                let a = self.resolve_operands(inst)?;
                self.vm.insert_obj(a[0], a[1])
            }
            0x0F => {
                let a = self.resolve_operands(inst)?;
                let v = self.vm.read_word(a[0] as u32 + 2 * a[1] as u32);
                self.do_store(inst, v)
            }
            0x10 => {
                let a = self.resolve_operands(inst)?;
                let v = self.vm.read_byte(a[0] as u32 + a[1] as u32) as u16;
                self.do_store(inst, v)
            }
            0x11 => {
                let a = self.resolve_operands(inst)?;
                let v = self.vm.get_prop(a[0], a[1]);
                self.do_store(inst, v)
            }
            0x12 => {
                let a = self.resolve_operands(inst)?;
                let v = self.vm.get_prop_addr(a[0], a[1]);
                self.do_store(inst, v)
            }
            0x13 => {
                let a = self.resolve_operands(inst)?;
                let v = self.vm.get_next_prop(a[0], a[1]);
                self.do_store(inst, v)
            }
            0x14 => {
                let a = self.resolve_operands(inst)?;
                let v = (a[0] as i16).wrapping_add(a[1] as i16);
                self.do_store(inst, v as u16)
            }
            0x15 => {
                let a = self.resolve_operands(inst)?;
                let v = (a[0] as i16).wrapping_sub(a[1] as i16);
                self.do_store(inst, v as u16)
            }
            0x16 => {
                let a = self.resolve_operands(inst)?;
                let v = (a[0] as i16).wrapping_mul(a[1] as i16);
                self.do_store(inst, v as u16)
            }
            0x17 => {
                let a = self.resolve_operands(inst)?;
                let divisor = a[1] as i16;
                let v = if divisor == 0 {
                    warn!("division by zero at {:#06x}", inst.addr);
                    0x7FFFu16
                } else {
                    (a[0] as i16).wrapping_div(divisor) as u16
                };
                self.do_store(inst, v)
            }
            0x18 => {
                let a = self.resolve_operands(inst)?;
                let divisor = a[1] as i16;
                let v = if divisor == 0 {
                    warn!("modulo by zero at {:#06x}", inst.addr);
                    0u16
                } else {
                    (a[0] as i16).wrapping_rem(divisor) as u16
                };
                self.do_store(inst, v)
            }
            other => {
                info!("unimplemented 2OP opcode {other:#04x} (v5+ only)");
                Err(VmError::NotImplemented("2OP opcode"))
            }
        }
    }

    // ---- VAR ---------------------------------------------------------

    fn execute_var(&mut self, inst: &Instruction) -> VmResult<()> {
        match inst.opcode {
            0x00 => {
                let args = self.resolve_operands(inst)?;
                self.do_call(&args, inst.store_var)
            }
            0x01 => {
                let a = self.resolve_operands(inst)?;
                self.vm.write_word(a[0] as u32 + 2 * a[1] as u32, a[2])
            }
            0x02 => {
                let a = self.resolve_operands(inst)?;
                self.vm.write_byte(a[0] as u32 + a[1] as u32, a[2] as u8)
            }
            0x03 => {
                let a = self.resolve_operands(inst)?;
                self.vm.put_prop(a[0], a[1], a[2])
            }
            0x04 => {
                let a = self.resolve_operands(inst)?;
                let text_buffer = a[0] as u32;
                let parse_buffer = a.get(1).copied().unwrap_or(0) as u32;
                let max_len = self.vm.read_byte(text_buffer).max(1) as usize;
                let line = self.input.read_line(max_len.saturating_sub(1));
                dictionary::tokenize(&mut self.vm, text_buffer, parse_buffer, &line)
            }
            0x05 => {
                let a = self.resolve_operands(inst)?;
                self.screen.print_char(zscii_to_char(a[0]));
                Ok(())
            }
            0x06 => {
                let a = self.resolve_operands(inst)?;
                self.screen.print(&(a[0] as i16).to_string());
                Ok(())
            }
            0x07 => {
                let a = self.resolve_operands(inst)?;
                let range = a[0] as i16;
                let v = if range > 0 {
                    self.vm.rng.next_in_range(range as u16)
                } else if range == 0 {
                    self.vm.rng.reseed_from_entropy();
                    0
                } else {
                    self.vm.rng.reseed((-range) as u64);
                    0
                };
                self.do_store(inst, v)
            }
            0x08 => {
                let a = self.resolve_operands(inst)?;
                self.vm.push(a[0]);
                Ok(())
            }
            0x09 => {
                let var = self.indirect_variable_number(inst, 0)?;
                let v = self.vm.pop()?;
                self.vm.write_variable(var, v)
            }
            0x0A => {
                let a = self.resolve_operands(inst)?;
                self.screen.split_window(a[0]);
                Ok(())
            }
            0x0B => {
                let a = self.resolve_operands(inst)?;
                self.screen.set_window(a[0]);
                Ok(())
            }
            0x0C => {
                let args = self.resolve_operands(inst)?;
                self.do_call(&args, inst.store_var)
            }
            0x16 => {
                let ch = self.input.read_char();
                self.do_store(inst, ch as u16)
            }
            0x17 => self.scan_table(inst),
            0x18 => {
                let a = self.resolve_operands(inst)?;
                self.do_store(inst, !a[0])
            }
            0x19 => {
                let args = self.resolve_operands(inst)?;
                self.do_call(&args, None)
            }
            0x1A => {
                let args = self.resolve_operands(inst)?;
                self.do_call(&args, None)
            }
            0x1B => {
                let a = self.resolve_operands(inst)?;
                let text_buffer = a[0] as u32;
                let parse_buffer = a[1] as u32;
                let existing = self.read_existing_text(text_buffer);
                dictionary::tokenize(&mut self.vm, text_buffer, parse_buffer, &existing)
            }
            0x1C => {
                let a = self.resolve_operands(inst)?;
                let text_buffer = a[0] as u32;
                let length = a[1] as u32;
                let from = a[2] as u32;
                let out_addr = a[3] as u32;
                let mut token = String::new();
                for i in 0..length {
                    token.push(self.vm.read_byte(text_buffer + from + i) as char);
                }
                let (w1, w2) = crate::text::encode_word_v3(&token);
                self.vm.write_word(out_addr, w1)?;
                self.vm.write_word(out_addr + 2, w2)
            }
            0x1D => self.copy_table(inst),
            0x1F => {
                let a = self.resolve_operands(inst)?;
                let argc = self.vm.current_frame().argc;
                self.do_branch(inst, argc as u16 >= a[0])
            }
            0x0D | 0x0E | 0x0F | 0x10 | 0x11 | 0x12 | 0x13 | 0x14 | 0x15 | 0x1E => {
                debug!("ignoring unimplemented screen/stream VAR opcode {:#04x}", inst.opcode);
                Ok(())
            }
            other => {
                warn!("unhandled VAR opcode {other:#04x} at {:#06x}", inst.addr);
                Err(VmError::NotImplemented("VAR opcode"))
            }
        }
    }

    fn read_existing_text(&self, text_buffer: u32) -> String {
        let mut s = String::new();
        let mut addr = text_buffer + 1;
        loop {
            let b = self.vm.read_byte(addr);
            if b == 0 {
                break;
            }
            s.push(b as char);
            addr += 1;
        }
        s
    }

    fn scan_table(&mut self, inst: &Instruction) -> VmResult<()> {
        let a = self.resolve_operands(inst)?;
        let value = a[0];
        let table = a[1] as u32;
        let len = a[2];
        let form = a.get(3).copied().unwrap_or(0x82);
        let entry_size = (form & 0x7F).max(1) as u32;
        let word_entries = form & 0x80 != 0;
        for i in 0..len as u32 {
            let addr = table + i * entry_size;
            let entry = if word_entries {
                self.vm.read_word(addr)
            } else {
                self.vm.read_byte(addr) as u16
            };
            if entry == value {
                self.do_store(inst, addr as u16)?;
                return self.do_branch(inst, true);
            }
        }
        self.do_store(inst, 0)?;
        self.do_branch(inst, false)
    }

    fn copy_table(&mut self, inst: &Instruction) -> VmResult<()> {
        let a = self.resolve_operands(inst)?;
        let src = a[0] as u32;
        let dst = a[1] as u32;
        let len = (a[2] as i16).unsigned_abs() as u32;
        if dst == 0 {
            for i in 0..len {
                self.vm.write_byte(src + i, 0)?;
            }
            return Ok(());
        }
        let mut buf = Vec::with_capacity(len as usize);
        for i in 0..len {
            buf.push(self.vm.read_byte(src + i));
        }
        for (i, b) in buf.iter().enumerate() {
            self.vm.write_byte(dst + i as u32, *b)?;
        }
        Ok(())
    }

    fn execute_ext(&mut self, inst: &Instruction) -> VmResult<()> {
        info!(
            "extended opcode {:#04x} not implemented (v5+)",
            inst.ext_opcode.unwrap_or(0)
        );
        Err(VmError::NotImplemented("extended opcode"))
    }
}

fn zscii_to_char(code: u16) -> char {
    match code {
        13 => '\n',
        _ => char::from_u32(code as u32).unwrap_or('?'),
    }
}
