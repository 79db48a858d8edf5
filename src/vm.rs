//! Core VM state: memory, the frame stack, and the tagged variable
//! address space (spec.md §3, §4.1).

use crate::error::{VmError, VmResult};
use crate::header::Header;
use log::{debug, trace, warn};

/// Number of local variable slots a routine may declare (spec.md §3).
pub const MAX_LOCALS: usize = 15;

/// Default call-stack depth limit (spec.md §3 "implementation limit").
const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// One activation record. Per spec.md §9's resolved open question, the
/// evaluation stack is owned per-frame: a routine never sees a caller's
/// temporaries.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub return_pc: u32,
    pub return_store: Option<u8>,
    pub num_locals: u8,
    /// Number of locals actually supplied by the caller (<= `num_locals`);
    /// the rest keep their routine-header defaults. Recorded for save/restore
    /// fidelity (spec.md §4.8).
    pub argc: u8,
    pub locals: [u16; MAX_LOCALS],
    pub eval_stack: Vec<u16>,
}

impl CallFrame {
    fn main(num_locals: u8, locals: [u16; MAX_LOCALS]) -> CallFrame {
        CallFrame {
            return_pc: 0,
            return_store: None,
            num_locals,
            argc: 0,
            locals,
            eval_stack: Vec::new(),
        }
    }

    pub fn call(
        return_pc: u32,
        return_store: Option<u8>,
        num_locals: u8,
        argc: u8,
        locals: [u16; MAX_LOCALS],
    ) -> CallFrame {
        CallFrame {
            return_pc,
            return_store,
            num_locals,
            argc,
            locals,
            eval_stack: Vec::new(),
        }
    }
}

/// A loaded story file: raw bytes plus the parsed header view over them.
pub struct Game {
    pub memory: Vec<u8>,
    pub header: Header,
}

impl Game {
    /// Load a story file, padding dynamic memory up to at least 64 KiB so
    /// every word address in the low 64K is always in-bounds (spec.md §3).
    pub fn from_memory(mut memory: Vec<u8>) -> VmResult<Self> {
        if memory.len() < 64 {
            return Err(VmError::Internal("story file too small for header".into()));
        }
        if memory.len() < 0x10000 {
            memory.resize(0x10000, 0);
        }
        let header = Header::new(&memory);
        if ![3u8, 5, 8].contains(&header.version) {
            return Err(VmError::Internal(format!(
                "unsupported Z-machine version {}",
                header.version
            )));
        }
        Ok(Game { memory, header })
    }
}

/// The Z-machine virtual machine: memory, program counter, and the call
/// stack. The VM is owned exclusively by the run loop (spec.md §5); the
/// decoder only reads it, the executor is the only mutator.
pub struct VM {
    pub game: Game,
    pub pc: u32,
    pub call_stack: Vec<CallFrame>,
    pub rng: crate::zrand::ZRand,
    pub max_call_depth: usize,
    pub game_running: bool,
    /// PC of the instruction currently executing, set by the interpreter
    /// before dispatch so error messages can report it (spec.md §7).
    pub current_instruction_pc: Option<u32>,
}

impl VM {
    pub fn new(game: Game) -> Self {
        let initial_pc = game.header.initial_pc as u32;
        let mut vm = VM {
            game,
            pc: initial_pc,
            call_stack: Vec::new(),
            rng: crate::zrand::ZRand::new_uniform(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            game_running: true,
            current_instruction_pc: None,
        };
        // A base frame always exists so the frame stack invariant
        // ("never empty while the VM runs", spec.md §3) holds from the start.
        vm.call_stack.push(CallFrame::main(0, [0; MAX_LOCALS]));
        vm
    }

    pub fn reset(&mut self) {
        self.pc = self.game.header.initial_pc as u32;
        self.call_stack.clear();
        self.call_stack.push(CallFrame::main(0, [0; MAX_LOCALS]));
        self.game_running = true;
    }

    // ---- memory ----------------------------------------------------

    /// Out-of-range reads return 0 and never fault (spec.md §4.1).
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.game
            .memory
            .get(addr as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn read_word(&self, addr: u32) -> u16 {
        let hi = self.read_byte(addr) as u16;
        let lo = self.read_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Writes to `addr >= static_base` or out of memory bounds are fatal
    /// (spec.md §4.1, §7).
    pub fn write_byte(&mut self, addr: u32, value: u8) -> VmResult<()> {
        self.check_writable(addr)?;
        self.game.memory[addr as usize] = value;
        Ok(())
    }

    pub fn write_word(&mut self, addr: u32, value: u16) -> VmResult<()> {
        self.check_writable(addr)?;
        self.check_writable(addr + 1)?;
        self.game.memory[addr as usize] = (value >> 8) as u8;
        self.game.memory[addr as usize + 1] = (value & 0xFF) as u8;
        Ok(())
    }

    fn check_writable(&self, addr: u32) -> VmResult<()> {
        let static_base = self.game.header.base_static_mem as u32;
        if addr >= static_base || addr as usize >= self.game.memory.len() {
            return Err(VmError::MemoryViolation { addr });
        }
        Ok(())
    }

    /// Unpack a packed routine/string address (spec.md §4.1).
    pub fn unpack_address(&self, packed: u16, is_routine: bool) -> u32 {
        let scaler = self.game.header.address_scaler();
        let offset = if self.game.header.version >= 5 {
            if is_routine {
                self.game.header.routine_offset as u32 * 8
            } else {
                self.game.header.string_offset as u32 * 8
            }
        } else {
            0
        };
        packed as u32 * scaler + offset
    }

    // ---- frame stack -------------------------------------------------

    pub fn current_frame(&self) -> &CallFrame {
        self.call_stack
            .last()
            .expect("frame stack invariant: never empty while running")
    }

    pub fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.call_stack
            .last_mut()
            .expect("frame stack invariant: never empty while running")
    }

    pub fn push_frame(&mut self, frame: CallFrame) -> VmResult<()> {
        if self.call_stack.len() >= self.max_call_depth {
            return Err(VmError::FrameOverflow);
        }
        self.call_stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> VmResult<CallFrame> {
        if self.call_stack.len() <= 1 {
            return Err(VmError::FrameUnderflow);
        }
        Ok(self.call_stack.pop().expect("checked non-empty above"))
    }

    // ---- evaluation stack (current frame) -----------------------------

    pub fn push(&mut self, value: u16) {
        trace!("push {:#06x} (depth {})", value, self.current_frame().eval_stack.len());
        self.current_frame_mut().eval_stack.push(value);
    }

    pub fn pop(&mut self) -> VmResult<u16> {
        self.current_frame_mut()
            .eval_stack
            .pop()
            .ok_or_else(|| {
                warn!("stack underflow at pc {:#06x}", self.pc);
                VmError::Internal("evaluation stack underflow".into())
            })
    }

    // ---- variables -----------------------------------------------------

    /// `0` = frame eval stack (pop), `1..=15` = local, `16..=255` = global.
    pub fn read_variable(&mut self, var: u8) -> VmResult<u16> {
        match var {
            0 => self.pop(),
            1..=15 => {
                let idx = (var - 1) as usize;
                Ok(self.current_frame().locals[idx])
            }
            _ => {
                let global = var as u16 - 16;
                let addr = self.game.header.global_variables as u32 + 2 * global as u32;
                Ok(self.read_word(addr))
            }
        }
    }

    pub fn write_variable(&mut self, var: u8, value: u16) -> VmResult<()> {
        match var {
            0 => {
                self.push(value);
                Ok(())
            }
            1..=15 => {
                let idx = (var - 1) as usize;
                self.current_frame_mut().locals[idx] = value;
                Ok(())
            }
            _ => {
                let global = var as u16 - 16;
                let addr = self.game.header.global_variables as u32 + 2 * global as u32;
                self.write_word(addr, value)
            }
        }
    }

    /// Reads a variable *without* popping the stack when `var == 0` and the
    /// caller is only peeking (used by disassembly/debug tooling, never by
    /// opcode execution — opcode semantics always pop variable 0).
    pub fn peek_top_of_stack(&self) -> Option<u16> {
        self.current_frame().eval_stack.last().copied()
    }

    pub fn as_signed(value: u16) -> i16 {
        value as i16
    }

    pub fn as_unsigned(value: i16) -> u16 {
        value as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_game() -> Game {
        let mut mem = vec![0u8; 0x10000];
        mem[0] = 3;
        mem[0x06] = 0x40;
        mem[0x0C] = 0x02;
        mem[0x0D] = 0x00;
        mem[0x0E] = 0x30;
        mem[0x0F] = 0x00;
        Game::from_memory(mem).unwrap()
    }

    #[test]
    fn out_of_range_read_is_zero() {
        let vm = VM::new(test_game());
        assert_eq!(vm.read_byte(0xFFFFFF), 0);
    }

    #[test]
    fn write_above_static_base_is_fatal() {
        let mut vm = VM::new(test_game());
        let static_base = vm.game.header.base_static_mem as u32;
        assert!(vm.write_byte(static_base, 1).is_err());
        assert!(vm.write_byte(static_base - 1, 1).is_ok());
    }

    #[test]
    fn push_pull_roundtrip() {
        let mut vm = VM::new(test_game());
        vm.write_variable(0, 0x1234).unwrap();
        let v = vm.read_variable(0).unwrap();
        assert_eq!(v, 0x1234);
        assert!(vm.current_frame().eval_stack.is_empty());
    }

    #[test]
    fn globals_are_addressable_by_variable_number() {
        let mut vm = VM::new(test_game());
        vm.write_variable(16, 5).unwrap();
        vm.write_variable(17, 3).unwrap();
        assert_eq!(vm.read_variable(16).unwrap(), 5);
        assert_eq!(vm.read_variable(17).unwrap(), 3);
    }

    #[test]
    fn frame_stack_never_empties() {
        let mut vm = VM::new(test_game());
        assert!(vm.pop_frame().is_err());
    }
}
