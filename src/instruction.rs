//! Instruction decoding: the four encoding forms, operand types, and the
//! store/branch trailing bytes (spec.md §4.5, §4.6).

use crate::vm::VM;
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Variable,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCount {
    Op0,
    Op1,
    Op2,
    Var,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    LargeConstant,
    SmallConstant,
    Variable,
    Omitted,
}

#[derive(Debug, Clone, Copy)]
pub struct BranchInfo {
    pub on_true: bool,
    pub offset: i32,
    /// Total size in bytes of the branch suffix (1 or 2).
    pub size: u8,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub addr: u32,
    pub opcode: u8,
    pub ext_opcode: Option<u8>,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    pub operand_types: Vec<OperandType>,
    pub operands: Vec<u16>,
    pub store_var: Option<u8>,
    pub branch: Option<BranchInfo>,
    pub text: Option<String>,
    /// Total size in bytes, including operands/store/branch/text suffixes.
    pub size: u32,
}

fn operand_type_from_bits(bits: u8) -> OperandType {
    match bits {
        0b00 => OperandType::LargeConstant,
        0b01 => OperandType::SmallConstant,
        0b10 => OperandType::Variable,
        _ => OperandType::Omitted,
    }
}

/// True for opcodes that store a result (spec.md §4.5's "store-suffix
/// opcodes" table, by form and opcode number).
fn has_store(form: InstructionForm, operand_count: OperandCount, opcode: u8) -> bool {
    match (form, operand_count) {
        (_, OperandCount::Op2) => matches!(
            opcode,
            8 | 9 | 15 | 16 | 17 | 18 | 19 | 20 | 21 | 22 | 23 | 24
        ),
        (_, OperandCount::Op1) => matches!(opcode, 1 | 2 | 3 | 4 | 8 | 14 | 15),
        // No 0OP opcode stores a result.
        (_, OperandCount::Op0) => false,
        (_, OperandCount::Var) => matches!(opcode, 0 | 7 | 12 | 22 | 23 | 24),
    }
}

/// True for opcodes followed by a branch suffix.
fn has_branch(form: InstructionForm, operand_count: OperandCount, opcode: u8) -> bool {
    match (form, operand_count) {
        (_, OperandCount::Op2) => matches!(opcode, 1 | 2 | 3 | 4 | 5 | 6 | 7 | 10),
        (_, OperandCount::Op1) => matches!(opcode, 0 | 1 | 2),
        (_, OperandCount::Op0) => matches!(opcode, 5 | 6 | 0x0D | 0x0F),
        (_, OperandCount::Var) => matches!(opcode, 0x17 | 0x1F),
    }
}

/// True for opcodes followed by an encoded literal string (`print`,
/// `print_ret`).
fn has_text(operand_count: OperandCount, opcode: u8) -> bool {
    matches!(operand_count, OperandCount::Op0) && matches!(opcode, 2 | 3)
}

impl Instruction {
    /// Decode one instruction at `addr`. `version` selects V3 vs V5+ opcode
    /// tables (only V3 semantics are fully implemented downstream).
    pub fn decode(vm: &VM, addr: u32, _version: u8) -> Result<Instruction, String> {
        let first = vm.read_byte(addr);
        let mut cursor = addr + 1;

        let (form, operand_count, opcode, ext_opcode) = if first == 0xBE {
            let ext = vm.read_byte(cursor);
            cursor += 1;
            (InstructionForm::Extended, OperandCount::Var, ext, Some(ext))
        } else if first & 0xC0 == 0xC0 {
            let count = if first & 0x20 != 0 {
                OperandCount::Var
            } else {
                OperandCount::Op2
            };
            (InstructionForm::Variable, count, first & 0x1F, None)
        } else if first & 0x80 != 0 {
            let count = if first & 0x30 == 0x30 {
                OperandCount::Op0
            } else {
                OperandCount::Op1
            };
            (InstructionForm::Short, count, first & 0x0F, None)
        } else {
            (InstructionForm::Long, OperandCount::Op2, first & 0x1F, None)
        };

        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Short => {
                let bits = (first >> 4) & 0x03;
                if operand_count == OperandCount::Op1 {
                    operand_types.push(operand_type_from_bits(bits));
                }
            }
            InstructionForm::Long => {
                operand_types.push(if first & 0x40 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                });
                operand_types.push(if first & 0x20 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                });
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                let type_byte = vm.read_byte(cursor);
                cursor += 1;
                let mut second_byte = None;
                let is_double_var = form == InstructionForm::Variable
                    && matches!(operand_count, OperandCount::Var)
                    && (first == 0xEC || first == 0xFA);
                if is_double_var {
                    second_byte = Some(vm.read_byte(cursor));
                    cursor += 1;
                }
                for shift in [6, 4, 2, 0] {
                    operand_types.push(operand_type_from_bits((type_byte >> shift) & 0x03));
                }
                if let Some(second) = second_byte {
                    for shift in [6, 4, 2, 0] {
                        operand_types.push(operand_type_from_bits((second >> shift) & 0x03));
                    }
                }
                // Operand types are packed left-to-right; the first Omitted
                // marker ends the real operand list.
                if let Some(first_omitted) =
                    operand_types.iter().position(|t| *t == OperandType::Omitted)
                {
                    operand_types.truncate(first_omitted);
                }
            }
        }

        let mut operands = Vec::new();
        for ty in &operand_types {
            match ty {
                OperandType::LargeConstant => {
                    operands.push(vm.read_word(cursor));
                    cursor += 2;
                }
                OperandType::SmallConstant | OperandType::Variable => {
                    operands.push(vm.read_byte(cursor) as u16);
                    cursor += 1;
                }
                OperandType::Omitted => {}
            }
        }

        let store_var = if has_store(form, operand_count, opcode) {
            let v = vm.read_byte(cursor);
            cursor += 1;
            Some(v)
        } else {
            None
        };

        let branch = if has_branch(form, operand_count, opcode) {
            let b0 = vm.read_byte(cursor);
            cursor += 1;
            let on_true = b0 & 0x80 != 0;
            let offset = if b0 & 0x40 != 0 {
                (b0 & 0x3F) as i32
            } else {
                let b1 = vm.read_byte(cursor);
                cursor += 1;
                let raw = (((b0 & 0x3F) as u16) << 8) | b1 as u16;
                sign_extend_14(raw) as i32
            };
            let size = if b0 & 0x40 != 0 { 1 } else { 2 };
            Some(BranchInfo { on_true, offset, size })
        } else {
            None
        };

        let text = if has_text(operand_count, opcode) {
            let (s, consumed) = crate::text::decode_string(
                vm,
                cursor,
                vm.game.header.abbrev_table as u32,
            )?;
            cursor += consumed;
            Some(s)
        } else {
            None
        };

        let size = cursor - addr;
        trace!("decoded {:?} opcode {opcode:#04x} at {addr:#06x}, size {size}", form);

        Ok(Instruction {
            addr,
            opcode,
            ext_opcode,
            form,
            operand_count,
            operand_types,
            operands,
            store_var,
            branch,
            text,
            size,
        })
    }
}

fn sign_extend_14(raw: u16) -> i16 {
    if raw & 0x2000 != 0 {
        (raw | 0xC000) as i16
    } else {
        raw as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::vm::Game;

    fn vm_with(bytes: &[u8]) -> VM {
        let mut mem = vec![0u8; 0x10000];
        mem[0] = 3;
        for (i, b) in bytes.iter().enumerate() {
            mem[0x40 + i] = *b;
        }
        mem[0x06] = 0x00;
        mem[0x07] = 0x40;
        let header = Header::new(&mem[..64]);
        VM::new(Game { memory: mem, header })
    }

    #[test]
    fn decodes_short_form_0op_no_operands() {
        // rtrue = 0xB0 (short form, operand count 0x3 => Op0, opcode 0).
        let vm = vm_with(&[0xB0]);
        let inst = Instruction::decode(&vm, 0x40, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Short);
        assert_eq!(inst.operand_count, OperandCount::Op0);
        assert_eq!(inst.opcode, 0);
        assert_eq!(inst.size, 1);
        assert!(inst.operands.is_empty());
    }

    #[test]
    fn decodes_long_form_2op_with_store() {
        // `add` = opcode 20 (0x14); long form, both operands small constants.
        // first byte: bits 7-6=00 (long), bit6=0 (op1 small), bit5=0 (op2 small), low5=0x14.
        let vm = vm_with(&[0x14, 0x05, 0x03, 0x10]);
        let inst = Instruction::decode(&vm, 0x40, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Long);
        assert_eq!(inst.operand_count, OperandCount::Op2);
        assert_eq!(inst.opcode, 20);
        assert_eq!(inst.operands, vec![5, 3]);
        assert_eq!(inst.store_var, Some(0x10));
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn decodes_branch_short_form() {
        // jz (1OP opcode 0) with a variable operand, short-form branch (1 byte).
        // first byte: 1 0 01 0000 -> short form, op1 variable type, opcode 0.
        let vm = vm_with(&[0x90, 0x01, 0xC5]);
        let inst = Instruction::decode(&vm, 0x40, 3).unwrap();
        assert_eq!(inst.opcode, 0);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.size, 1);
        assert_eq!(branch.offset, 0x45);
    }

    #[test]
    fn decodes_variable_form_call_with_omitted_operands() {
        // call_vs-shaped (VAR:224, opcode 0x00) with one large-constant
        // operand then all-omitted, plus a store byte.
        let type_byte = 0b00_11_11_11; // large const, then omitted x3
        let vm = vm_with(&[0xE0, type_byte, 0x12, 0x34, 0x05]);
        let inst = Instruction::decode(&vm, 0x40, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Variable);
        assert_eq!(inst.operand_count, OperandCount::Var);
        assert_eq!(inst.operands, vec![0x1234]);
        assert_eq!(inst.store_var, Some(0x05));
    }
}
