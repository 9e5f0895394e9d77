//! # Capture Routine
//!
//! Walks a [`LayoutDescriptor`] against a live call frame and fills a
//! [`RequestEvent`]. Written once, generic over how memory is read: the uprobe
//! backs [`TargetMemory`] with `bpf_probe_read_user`, tests back it with an
//! in-memory address space.
//!
//! Failure model: every read may fail. A failed read leaves the affected
//! field zeroed and the walk moves on to the next field.

use crate::layout::{
    ArgLocation, FieldPath, LayoutDescriptor, ARG_REGISTER, ARG_STACK, STEP_DEREF, STEP_OFFSET,
    STRING_LEN_OFFSET,
};
use crate::{RequestEvent, WORD_SIZE};

/// Fallible reads from the traced process's address space
pub trait TargetMemory {
    /// Read one native-endian machine word at `addr`
    fn read_word(&self, addr: u64) -> Option<u64>;

    /// Fill all of `dst` from `addr`. On failure `dst` must be left zeroed.
    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> bool;
}

/// Register state of the frame the probe fired in
pub trait CallFrame: TargetMemory {
    fn stack_pointer(&self) -> u64;

    /// Go integer argument register `index` (`RAX, RBX, RCX, ...`)
    fn register(&self, index: u32) -> Option<u64>;
}

/// Bytes to copy for a field that claims `declared` bytes into `capacity`
#[must_use]
pub fn guarded_len(declared: u64, capacity: usize) -> usize {
    usize::try_from(declared).map_or(capacity, |len| len.min(capacity))
}

/// Resolve the argument base address from the frame
pub fn resolve_argument<F: CallFrame + ?Sized>(frame: &F, arg: &ArgLocation) -> Option<u64> {
    match arg.kind {
        ARG_STACK => {
            let slot = frame.stack_pointer().wrapping_add(u64::from(arg.index) * WORD_SIZE);
            frame.read_word(slot)
        }
        ARG_REGISTER => frame.register(arg.index),
        _ => None,
    }
}

/// Apply `path`'s steps to `base`, returning the string header address
pub fn walk_path<M: TargetMemory + ?Sized>(memory: &M, base: u64, path: &FieldPath) -> Option<u64> {
    let mut addr = base;
    for step in path.active_steps() {
        match step.kind {
            STEP_OFFSET => addr = addr.wrapping_add(step.operand),
            STEP_DEREF => addr = memory.read_word(addr)?,
            _ => break,
        }
    }
    Some(addr)
}

/// Capture one `(length, data)` pair. Stores the declared length, not the
/// guarded one; the decoder clamps again.
fn capture_field<M: TargetMemory + ?Sized>(
    memory: &M,
    base: u64,
    path: &FieldPath,
    len_slot: &mut [u8; 8],
    data: &mut [u8],
) -> bool {
    let Some(header) = walk_path(memory, base, path) else {
        return false;
    };
    let Some(data_ptr) = memory.read_word(header) else {
        return false;
    };
    let Some(declared) = memory.read_word(header.wrapping_add(STRING_LEN_OFFSET)) else {
        return false;
    };
    *len_slot = declared.to_ne_bytes();

    let capacity = (path.capacity as usize).min(data.len());
    let copy_len = guarded_len(declared, capacity);
    if copy_len == 0 {
        return true;
    }
    memory.read_bytes(data_ptr, &mut data[..copy_len])
}

/// Fill `event` from the frame according to `layout`.
///
/// Returns the number of fields whose capture failed. `event` is expected to
/// start zeroed; it is owned by the caller for the whole invocation.
#[allow(clippy::cast_possible_truncation)]
pub fn capture_request<F: CallFrame + ?Sized>(
    frame: &F,
    layout: &LayoutDescriptor,
    event: &mut RequestEvent,
) -> u32 {
    let field_count = (layout.field_count as usize).min(layout.fields.len());
    let Some(base) = resolve_argument(frame, &layout.arg) else {
        return field_count as u32;
    };

    let mut faults = 0;
    for (index, path) in layout.fields.iter().enumerate().take(field_count) {
        let Some((len_slot, data)) = event.field_mut(index) else {
            break;
        };
        if !capture_field(frame, base, path, len_slot, data) {
            faults += 1;
        }
    }
    faults
}
