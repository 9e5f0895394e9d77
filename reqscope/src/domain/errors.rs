//! Structured error types for reqscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only setup failures are errors; the capture path absorbs its own faults.

use super::types::{GoVersion, Pid};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to load eBPF program from {path}: {error}")]
    EbpfLoadFailed { path: String, error: String },

    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Symbol {symbol} not found in {binary}")]
    SymbolNotFound { symbol: String, binary: String },

    #[error("Failed to attach {probe} to {symbol} in {binary}: {error}")]
    ProbeAttachFailed { probe: String, symbol: String, binary: String, error: String },

    #[error("eBPF map {0} not found")]
    MapNotFound(&'static str),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Unsupported layout version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Layout must describe exactly {expected} fields, got {found}")]
    FieldCount { found: usize, expected: usize },

    #[error("Layout field {index} is named {found:?}, expected {expected:?}")]
    FieldName { index: usize, found: String, expected: &'static str },

    #[error("Field {field} declares capacity {found}, record holds {expected}")]
    CapacityMismatch { field: String, found: u32, expected: usize },

    #[error("Field {field} has {found} access steps (max {max})")]
    TooManySteps { field: String, found: usize, max: usize },

    #[error("Register index {0} is outside the Go argument registers")]
    RegisterOutOfRange(u32),

    #[error("Layout checksum mismatch: file says {declared:#x}, content hashes to {computed:#x}")]
    ChecksumMismatch { declared: u64, computed: u64 },

    #[error(
        "Layout {layout} uses the {layout_abi} argument ABI but the target was built with \
         {version}, which uses the {target_abi} ABI (use --force to override)"
    )]
    AbiMismatch {
        layout: String,
        layout_abi: &'static str,
        version: GoVersion,
        target_abi: &'static str,
    },
}
