//! # Layout Descriptor
//!
//! Static description of how to reach each captured field from the traced
//! function's argument. Installed once by userspace into the `LAYOUT` map and
//! read (never written) by the uprobe.
//!
//! Conventions:
//! - Offsets are in **bytes**.
//! - A field path ends at a string header: data pointer word at `+0`, length
//!   word at `+WORD_SIZE`.

use crate::{FIELD_COUNT, WORD_SIZE};

/// Version of the descriptor wire format understood by the probe
pub const LAYOUT_VERSION: u32 = 1;

/// Maximum number of access steps per field path
pub const MAX_ACCESS_STEPS: usize = 8;

/// Unused step slot (terminates the walk)
pub const STEP_NONE: u32 = 0;

/// Add `operand` bytes to the current address
pub const STEP_OFFSET: u32 = 1;

/// Replace the current address with the pointer stored at it
pub const STEP_DEREF: u32 = 2;

/// Argument lives in the word at `SP + index * WORD_SIZE` (Go stack ABI)
pub const ARG_STACK: u32 = 1;

/// Argument lives in the `index`-th Go integer argument register
pub const ARG_REGISTER: u32 = 2;

/// Number of integer argument registers in the Go amd64 register ABI
/// (`RAX, RBX, RCX, RDI, RSI, R8, R9, R10, R11`)
pub const GO_ARG_REGISTER_COUNT: u32 = 9;

/// Byte distance from a string header to its length word
pub const STRING_LEN_OFFSET: u64 = WORD_SIZE;

/// One step of a field path
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessStep {
    /// `STEP_NONE`, `STEP_OFFSET` or `STEP_DEREF`
    pub kind: u32,

    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,

    /// Byte count for `STEP_OFFSET`, ignored otherwise
    pub operand: u64,
}

impl AccessStep {
    #[must_use]
    pub const fn offset(bytes: u64) -> Self {
        Self { kind: STEP_OFFSET, _padding: 0, operand: bytes }
    }

    #[must_use]
    pub const fn deref() -> Self {
        Self { kind: STEP_DEREF, _padding: 0, operand: 0 }
    }
}

/// Steps from the argument base to a string header, plus its capture capacity
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldPath {
    pub steps: [AccessStep; MAX_ACCESS_STEPS],

    /// Number of leading entries of `steps` in use
    pub step_count: u32,

    /// Bytes reserved for this field in the event record
    pub capacity: u32,
}

impl FieldPath {
    /// Build a path from a step list; `None` if it exceeds [`MAX_ACCESS_STEPS`]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(steps: &[AccessStep], capacity: u32) -> Option<Self> {
        if steps.len() > MAX_ACCESS_STEPS {
            return None;
        }
        let mut path = Self { capacity, step_count: steps.len() as u32, ..Self::default() };
        path.steps[..steps.len()].copy_from_slice(steps);
        Some(path)
    }

    /// Steps actually in use
    #[must_use]
    pub fn active_steps(&self) -> &[AccessStep] {
        let count = (self.step_count as usize).min(MAX_ACCESS_STEPS);
        &self.steps[..count]
    }
}

/// Where the structured argument is found on the call frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArgLocation {
    /// `ARG_STACK` or `ARG_REGISTER`
    pub kind: u32,

    /// Stack word index or register index
    pub index: u32,
}

impl ArgLocation {
    #[must_use]
    pub const fn stack(word: u32) -> Self {
        Self { kind: ARG_STACK, index: word }
    }

    #[must_use]
    pub const fn register(index: u32) -> Self {
        Self { kind: ARG_REGISTER, index }
    }
}

/// Complete, session-constant capture contract for one target
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutDescriptor {
    /// Must equal [`LAYOUT_VERSION`] for the probe to use it
    pub version: u32,

    /// Number of entries of `fields` in use
    pub field_count: u32,

    pub arg: ArgLocation,

    /// FNV-1a over the canonical content, see [`LayoutDescriptor::compute_checksum`]
    pub checksum: u64,

    pub fields: [FieldPath; FIELD_COUNT],
}

impl LayoutDescriptor {
    /// Build a descriptor and stamp its checksum
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(arg: ArgLocation, fields: [FieldPath; FIELD_COUNT]) -> Self {
        let mut layout = Self {
            version: LAYOUT_VERSION,
            field_count: FIELD_COUNT as u32,
            arg,
            checksum: 0,
            fields,
        };
        layout.checksum = layout.compute_checksum();
        layout
    }

    /// FNV-1a (64-bit) over every semantic field except `checksum`, in
    /// little-endian order so the value is stable across hosts.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        let mut hash = Fnv1a::new();
        hash.write(&self.version.to_le_bytes());
        hash.write(&self.field_count.to_le_bytes());
        hash.write(&self.arg.kind.to_le_bytes());
        hash.write(&self.arg.index.to_le_bytes());
        for field in &self.fields {
            hash.write(&field.step_count.to_le_bytes());
            hash.write(&field.capacity.to_le_bytes());
            for step in field.active_steps() {
                hash.write(&step.kind.to_le_bytes());
                hash.write(&step.operand.to_le_bytes());
            }
        }
        hash.finish()
    }

    #[must_use]
    pub fn checksum_matches(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

struct Fnv1a(u64);

impl Fnv1a {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
