use super::chunks::ByteReader;
use super::MAGIC;
use crate::error::{VmError, VmResult};
use crate::vm::{CallFrame, VM, MAX_LOCALS};

/// Deserialize a save produced by [`super::save`] and install it into `vm`.
///
/// A magic/version/frame-count mismatch is reported as an error and leaves
/// `vm` untouched; nothing is written to VM state until the whole buffer
/// has been parsed successfully (spec.md §4.8, §7).
pub fn restore(vm: &mut VM, data: &[u8]) -> VmResult<()> {
    let mut r = ByteReader::new(data);

    let magic = r.bytes(4).map_err(VmError::SaveRestore)?;
    if magic != MAGIC {
        return Err(VmError::SaveRestore("not a recognized save file".into()));
    }
    let version = r.u8().map_err(VmError::SaveRestore)?;
    if version != vm.game.header.version {
        return Err(VmError::SaveRestore(format!(
            "save is for story version {version}, loaded story is version {}",
            vm.game.header.version
        )));
    }

    let pc = r.u16().map_err(VmError::SaveRestore)? as u32;
    let dynamic_size = r.u16().map_err(VmError::SaveRestore)?;
    let dynamic_bytes = r
        .bytes(dynamic_size as usize)
        .map_err(VmError::SaveRestore)?
        .to_vec();

    let frame_count = r.u16().map_err(VmError::SaveRestore)?;
    let mut frames = Vec::with_capacity(frame_count as usize);
    for _ in 0..frame_count {
        let rec_len = r.u16().map_err(VmError::SaveRestore)?;
        let rec_bytes = r.bytes(rec_len as usize).map_err(VmError::SaveRestore)?;
        let mut rr = ByteReader::new(rec_bytes);

        let return_pc = rr.u16().map_err(VmError::SaveRestore)? as u32;
        let has_store = rr.u8().map_err(VmError::SaveRestore)?;
        let store_var = rr.u8().map_err(VmError::SaveRestore)?;
        let return_store = if has_store != 0 { Some(store_var) } else { None };
        let argc = rr.u8().map_err(VmError::SaveRestore)?;
        let num_locals = rr.u8().map_err(VmError::SaveRestore)?;
        let mut locals = [0u16; MAX_LOCALS];
        for slot in locals.iter_mut().take(MAX_LOCALS) {
            *slot = rr.u16().map_err(VmError::SaveRestore)?;
        }
        let mut frame = CallFrame::call(return_pc, return_store, num_locals, argc, locals);
        let stack_depth = rr.u16().map_err(VmError::SaveRestore)?;
        for _ in 0..stack_depth {
            frame.eval_stack.push(rr.u16().map_err(VmError::SaveRestore)?);
        }
        frames.push(frame);
    }

    if frames.is_empty() {
        return Err(VmError::SaveRestore("save file has no frames".into()));
    }
    if dynamic_size as usize > vm.game.memory.len() {
        return Err(VmError::SaveRestore(
            "save file's dynamic memory is larger than this story's".into(),
        ));
    }

    vm.game.memory[..dynamic_bytes.len()].copy_from_slice(&dynamic_bytes);
    vm.pc = pc;
    vm.call_stack = frames;
    Ok(())
}
