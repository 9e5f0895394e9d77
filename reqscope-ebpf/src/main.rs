//! # eBPF Kernel-Side Capture
//!
//! Uprobe that fires on entry to the traced function, walks the installed
//! layout descriptor through the target's memory and emits one
//! [`RequestEvent`] per invocation.
//!
//! ## Programs
//!
//! - **Uprobe**: `capture_request_hook` - attached by userspace to the symbol given
//!   on the command line
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer (256KB) carrying raw records, lossy when full
//! - `LAYOUT` - Single-entry array holding the [`LayoutDescriptor`]
//! - `CAPTURE_STATS` - Per-CPU counters (captured, dropped, faults, no layout)
//!
//! ## Build
//!
//! Always compiled in release mode:
//! ```bash
//! cargo xtask build-ebpf
//! ```
//!
//! Register access assumes x86_64 `pt_regs`, matching the Go amd64 ABIs the
//! layout presets describe.

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{bpf_probe_read_user, bpf_probe_read_user_buf},
    macros::{map, uprobe},
    maps::{Array, PerCpuArray, RingBuf},
    programs::ProbeContext,
};
use aya_log_ebpf::debug;
use reqscope_common::{
    capture::{capture_request, CallFrame, TargetMemory},
    LayoutDescriptor, RequestEvent, LAYOUT_VERSION, STAT_CAPTURED, STAT_COUNT, STAT_DROPPED,
    STAT_FIELD_FAULTS, STAT_LAYOUT_MISSING,
};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Ring buffer for sending records to userspace
///
/// - **Size**: 256KB (~1700 records)
/// - **Overflow**: `output()` fails and the record is dropped; the producer
///   never waits for the consumer
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

/// Layout descriptor, written once by userspace before the uprobe attaches
#[map]
static LAYOUT: Array<LayoutDescriptor> = Array::with_max_entries(1, 0);

/// Per-CPU counters indexed by `STAT_*`
///
/// Per-CPU so concurrent probe hits never contend on a shared slot.
#[map]
static CAPTURE_STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(STAT_COUNT, 0);

// ============================================================================
// Target memory access
// ============================================================================

/// The probed frame: registers from `pt_regs`, memory via probe-read helpers
struct UprobeFrame<'a> {
    ctx: &'a ProbeContext,
}

impl TargetMemory for UprobeFrame<'_> {
    fn read_word(&self, addr: u64) -> Option<u64> {
        unsafe { bpf_probe_read_user(addr as *const u64).ok() }
    }

    fn read_bytes(&self, addr: u64, dst: &mut [u8]) -> bool {
        // The helper zeroes `dst` on failure
        unsafe { bpf_probe_read_user_buf(addr as *const u8, dst).is_ok() }
    }
}

impl CallFrame for UprobeFrame<'_> {
    fn stack_pointer(&self) -> u64 {
        unsafe { (*self.ctx.regs).rsp }
    }

    fn register(&self, index: u32) -> Option<u64> {
        let regs = unsafe { &*self.ctx.regs };
        // Go amd64 internal ABI integer argument order
        let value = match index {
            0 => regs.rax,
            1 => regs.rbx,
            2 => regs.rcx,
            3 => regs.rdi,
            4 => regs.rsi,
            5 => regs.r8,
            6 => regs.r9,
            7 => regs.r10,
            8 => regs.r11,
            _ => return None,
        };
        Some(value)
    }
}

// ============================================================================
// eBPF Program Hooks
// ============================================================================

/// Hook: entry of the traced function
#[uprobe]
pub fn capture_request_hook(ctx: ProbeContext) -> u32 {
    match try_capture_request(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_capture_request(ctx: &ProbeContext) -> Result<(), i64> {
    let Some(layout) = LAYOUT.get(0) else {
        debug!(ctx, "no layout installed");
        bump(STAT_LAYOUT_MISSING, 1);
        return Err(1);
    };
    if layout.version != LAYOUT_VERSION {
        debug!(ctx, "layout version {} not supported", layout.version);
        bump(STAT_LAYOUT_MISSING, 1);
        return Err(1);
    }

    // Owned by this invocation only
    let mut event = RequestEvent::zeroed();
    let frame = UprobeFrame { ctx };
    let faults = capture_request(&frame, layout, &mut event);
    if faults > 0 {
        bump(STAT_FIELD_FAULTS, u64::from(faults));
    }

    if EVENTS.output(&event, 0).is_ok() {
        bump(STAT_CAPTURED, 1);
    } else {
        bump(STAT_DROPPED, 1);
    }

    Ok(())
}

fn bump(stat: u32, by: u64) {
    if let Some(counter) = CAPTURE_STATS.get_ptr_mut(stat) {
        unsafe { *counter += by };
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
