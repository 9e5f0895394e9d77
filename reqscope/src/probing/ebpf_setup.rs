//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled capture probe, installs the layout descriptor and
//! attaches the uprobe to the traced symbol.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Load eBPF bytecode from the build output
//! - [`install_layout()`] - Write the descriptor into the `LAYOUT` map
//! - [`attach_capture_uprobe()`] - Attach `capture_request_hook` to the symbol
//! - [`take_event_ring()`] - Hand the `EVENTS` ring buffer to the consumer
//!
//! The layout must be installed before attaching; a probe that fires with an
//! empty `LAYOUT` map only bumps the `layout_missing` counter.

use anyhow::{Context, Result};
use aya::{
    maps::{Array, MapData, RingBuf},
    programs::UProbe,
    Ebpf,
};
use aya_log::EbpfLogger;
use log::{info, warn};
use reqscope_common::LayoutDescriptor;
use std::path::{Path, PathBuf};

use crate::domain::{Pid, ProbeError};

/// Name of the uprobe program inside the object
pub const PROBE_PROGRAM: &str = "capture_request_hook";

const LAYOUT_MAP: &str = "LAYOUT";
const EVENTS_MAP: &str = "EVENTS";

/// Where `cargo xtask build-ebpf` leaves the probe object
///
/// Always the release build: debug builds pull in formatting code the BPF
/// verifier rejects.
#[must_use]
pub fn default_ebpf_object() -> PathBuf {
    PathBuf::from(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../target/bpfel-unknown-none/release/reqscope-probe"
    ))
}

/// Load the eBPF program binary
///
/// # Errors
/// Returns [`ProbeError::EbpfLoadFailed`] if the object is missing or rejected
pub fn load_ebpf_program(object: &Path) -> Result<Ebpf> {
    let bpf = Ebpf::load_file(object).map_err(|e| ProbeError::EbpfLoadFailed {
        path: object.display().to_string(),
        error: e.to_string(),
    })?;
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Install the layout descriptor in slot 0 of the `LAYOUT` map
///
/// # Errors
/// Returns an error if the map is missing or the update fails
pub fn install_layout(bpf: &mut Ebpf, layout: &LayoutDescriptor) -> Result<()> {
    let mut map: Array<_, LayoutDescriptor> =
        Array::try_from(bpf.map_mut(LAYOUT_MAP).ok_or(ProbeError::MapNotFound(LAYOUT_MAP))?)?;
    map.set(0, *layout, 0).context("Failed to write layout descriptor")?;
    info!("✓ Installed layout (checksum {:#018x})", layout.checksum);
    Ok(())
}

/// Attach the capture uprobe to `symbol` in `binary`, optionally scoped to
/// one process
///
/// # Errors
/// Returns [`ProbeError::ProbeAttachFailed`] if the program cannot be loaded
/// or attached
pub fn attach_capture_uprobe(
    bpf: &mut Ebpf,
    binary: &Path,
    symbol: &str,
    pid: Option<Pid>,
) -> Result<()> {
    let attach_error = |error: String| ProbeError::ProbeAttachFailed {
        probe: PROBE_PROGRAM.to_string(),
        symbol: symbol.to_string(),
        binary: binary.display().to_string(),
        error,
    };

    let program: &mut UProbe = bpf
        .program_mut(PROBE_PROGRAM)
        .ok_or_else(|| attach_error("program not found in eBPF object".to_string()))?
        .try_into()
        .map_err(|e: aya::programs::ProgramError| attach_error(e.to_string()))?;
    program.load().map_err(|e| attach_error(e.to_string()))?;
    program
        .attach(Some(symbol), 0, binary, pid.map(|p| p.0))
        .map_err(|e| attach_error(e.to_string()))?;

    match pid {
        Some(pid) => info!("✓ Attached uprobe: {symbol} ({pid})"),
        None => info!("✓ Attached uprobe: {symbol} (all processes)"),
    }
    Ok(())
}

/// Take ownership of the `EVENTS` ring buffer
///
/// # Errors
/// Returns an error if the map is missing or is not a ring buffer
pub fn take_event_ring(bpf: &mut Ebpf) -> Result<RingBuf<MapData>> {
    let map = bpf.take_map(EVENTS_MAP).ok_or(ProbeError::MapNotFound(EVENTS_MAP))?;
    Ok(RingBuf::try_from(map)?)
}
