use super::chunks::ByteWriter;
use super::MAGIC;
use crate::error::{VmError, VmResult};
use crate::vm::{MAX_LOCALS, VM};

/// Serialize the VM's dynamic memory and call stack (spec.md §4.8).
///
/// Layout: magic, story version, 2-byte PC, 2-byte dynamic-memory size +
/// that many bytes, 2-byte frame count, then per frame a 2-byte record
/// length followed by the record (return PC, result variable, argument
/// count, locals count, 15 local words, evaluation-stack depth,
/// evaluation-stack words).
pub fn save(vm: &VM) -> VmResult<Vec<u8>> {
    if vm.call_stack.len() > u16::MAX as usize {
        return Err(VmError::SaveRestore("call stack too deep to save".into()));
    }
    if vm.pc > u16::MAX as u32 {
        return Err(VmError::SaveRestore("PC out of save-format range".into()));
    }
    for frame in &vm.call_stack {
        if frame.return_pc > u16::MAX as u32 {
            return Err(VmError::SaveRestore(
                "return PC out of save-format range".into(),
            ));
        }
    }

    let mut w = ByteWriter::new();
    w.bytes(MAGIC);
    w.u8(vm.game.header.version);
    w.u16(vm.pc as u16);

    let dynamic_size = vm.game.header.base_static_mem;
    w.u16(dynamic_size);
    w.bytes(&vm.game.memory[..dynamic_size as usize]);

    w.u16(vm.call_stack.len() as u16);
    for frame in &vm.call_stack {
        let mut rec = ByteWriter::new();
        rec.u16(frame.return_pc as u16);
        match frame.return_store {
            Some(v) => {
                rec.u8(1);
                rec.u8(v);
            }
            None => {
                rec.u8(0);
                rec.u8(0);
            }
        }
        rec.u8(frame.argc);
        rec.u8(frame.num_locals);
        for local in frame.locals.iter().take(MAX_LOCALS) {
            rec.u16(*local);
        }
        rec.u16(frame.eval_stack.len() as u16);
        for v in &frame.eval_stack {
            rec.u16(*v);
        }
        let rec = rec.into_vec();
        w.u16(rec.len() as u16);
        w.bytes(&rec);
    }

    Ok(w.into_vec())
}
