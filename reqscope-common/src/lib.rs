//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the record and configuration types shared between the kernel-side
//! uprobe and userspace. All types use `#[repr(C)]` for a consistent memory
//! layout across the kernel/userspace boundary.
//!
//! ## Key Types
//!
//! - [`RequestEvent`] - Raw event record passed via ring buffer
//! - [`LayoutDescriptor`] - Field paths walked by the capture routine
//! - [`capture::capture_request`] - The capture routine itself, generic over
//!   how target memory is read so it runs both in eBPF and in tests
//!
//! ## Record Layout
//!
//! ```text
//! offset  size  field
//!      0     8  method_len  (native-endian u64, true length in the target)
//!      8     8  path_len    (native-endian u64, true length in the target)
//!     16    10  method      (min(method_len, 10) valid bytes)
//!     26   128  path        (min(path_len, 128) valid bytes)
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

pub mod capture;
pub mod layout;

pub use layout::{
    AccessStep, ArgLocation, FieldPath, LayoutDescriptor, ARG_REGISTER, ARG_STACK,
    GO_ARG_REGISTER_COUNT, LAYOUT_VERSION, MAX_ACCESS_STEPS, STEP_DEREF, STEP_NONE, STEP_OFFSET,
    STRING_LEN_OFFSET,
};

// ============================================================================
// Record Constants
// ============================================================================

/// Size of a target machine word (pointers and string lengths), in bytes
pub const WORD_SIZE: u64 = 8;

/// Number of dynamically-sized fields captured per event
pub const FIELD_COUNT: usize = 2;

/// Capture capacity of the method field
pub const METHOD_CAPACITY: usize = 10;

/// Capture capacity of the path field
pub const PATH_CAPACITY: usize = 128;

/// Exact wire size of a [`RequestEvent`]
pub const RAW_EVENT_SIZE: usize = 2 * 8 + METHOD_CAPACITY + PATH_CAPACITY;

/// Index of the method field in [`FIELD_SLOTS`] and in the layout
pub const FIELD_METHOD: usize = 0;

/// Index of the path field in [`FIELD_SLOTS`] and in the layout
pub const FIELD_PATH: usize = 1;

// ============================================================================
// Capture Statistics (per-CPU counter indices)
// ============================================================================

/// Records written to the ring buffer
pub const STAT_CAPTURED: u32 = 0;

/// Records discarded because the ring buffer was full
pub const STAT_DROPPED: u32 = 1;

/// Fields left zeroed because a read in their path failed
pub const STAT_FIELD_FAULTS: u32 = 2;

/// Probe hits with no usable layout installed
pub const STAT_LAYOUT_MISSING: u32 = 3;

/// Number of counters in the `CAPTURE_STATS` map
pub const STAT_COUNT: u32 = 4;

// ============================================================================
// Raw Event Record
// ============================================================================

/// Event sent from eBPF to userspace via ring buffer
///
/// Lengths are stored as native-endian byte arrays rather than `u64` so the
/// struct has alignment 1 and exactly [`RAW_EVENT_SIZE`] bytes, with no
/// trailing padding on the wire.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestEvent {
    /// Method length as reported by the target (may exceed [`METHOD_CAPACITY`])
    pub method_len: [u8; 8],

    /// Path length as reported by the target (may exceed [`PATH_CAPACITY`])
    pub path_len: [u8; 8],

    /// First `min(method_len, METHOD_CAPACITY)` bytes of the method
    pub method: [u8; METHOD_CAPACITY],

    /// First `min(path_len, PATH_CAPACITY)` bytes of the path
    pub path: [u8; PATH_CAPACITY],
}

const _: () = assert!(core::mem::size_of::<RequestEvent>() == RAW_EVENT_SIZE);

impl RequestEvent {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            method_len: [0; 8],
            path_len: [0; 8],
            method: [0; METHOD_CAPACITY],
            path: [0; PATH_CAPACITY],
        }
    }

    #[must_use]
    pub fn method_len(&self) -> u64 {
        u64::from_ne_bytes(self.method_len)
    }

    #[must_use]
    pub fn path_len(&self) -> u64 {
        u64::from_ne_bytes(self.path_len)
    }

    /// Length slot and data slot of field `index`, borrowed together
    pub fn field_mut(&mut self, index: usize) -> Option<(&mut [u8; 8], &mut [u8])> {
        match index {
            FIELD_METHOD => Some((&mut self.method_len, &mut self.method[..])),
            FIELD_PATH => Some((&mut self.path_len, &mut self.path[..])),
            _ => None,
        }
    }

    /// Serialize into the wire layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RAW_EVENT_SIZE] {
        let mut out = [0u8; RAW_EVENT_SIZE];
        let method = &FIELD_SLOTS[FIELD_METHOD];
        let path = &FIELD_SLOTS[FIELD_PATH];
        out[method.len_offset..method.len_offset + 8].copy_from_slice(&self.method_len);
        out[path.len_offset..path.len_offset + 8].copy_from_slice(&self.path_len);
        out[method.data_offset..method.data_offset + method.capacity].copy_from_slice(&self.method);
        out[path.data_offset..path.data_offset + path.capacity].copy_from_slice(&self.path);
        out
    }
}

impl Default for RequestEvent {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Where one `(length, data)` pair lives inside a raw record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: &'static str,
    pub len_offset: usize,
    pub data_offset: usize,
    pub capacity: usize,
}

/// Record slots in field order, consumed by the userspace decoder
pub const FIELD_SLOTS: [FieldSlot; FIELD_COUNT] = [
    FieldSlot {
        name: "method",
        len_offset: core::mem::offset_of!(RequestEvent, method_len),
        data_offset: core::mem::offset_of!(RequestEvent, method),
        capacity: METHOD_CAPACITY,
    },
    FieldSlot {
        name: "path",
        len_offset: core::mem::offset_of!(RequestEvent, path_len),
        data_offset: core::mem::offset_of!(RequestEvent, path),
        capacity: PATH_CAPACITY,
    },
];

#[cfg(feature = "user")]
use aya::Pod;

// Pod marks types that can be copied into eBPF maps as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for LayoutDescriptor {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for RequestEvent {}
