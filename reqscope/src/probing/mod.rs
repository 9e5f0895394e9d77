//! Capture pipeline
//!
//! - eBPF program loading, layout installation and uprobe attachment
//! - Raw record decoding
//! - Lossy hand-off to the presentation thread
//! - Text and JSON output
//! - Kernel and consumer counters

pub mod diagnostics;
pub mod ebpf_setup;
pub mod event_channel;
pub mod event_decoder;
pub mod event_display;
pub mod event_processor;

pub use diagnostics::{print_capture_summary, read_capture_stats, CaptureStats};
pub use ebpf_setup::{
    attach_capture_uprobe, default_ebpf_object, init_ebpf_logger, install_layout,
    load_ebpf_program, take_event_ring,
};
pub use event_channel::{lossy_channel, LossySender, SendOutcome};
pub use event_decoder::{decode_event, DecodedField, DecodedRequest};
pub use event_display::{format_event, header_line, run_sink, spawn_stdout_sink, OutputFormat};
pub use event_processor::{ConsumerStats, EventProcessor};
