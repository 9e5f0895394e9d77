//! # reqscope - eBPF Request Tracer for Go HTTP Handlers
//!
//! reqscope attaches a uprobe to a handler function in a running Go binary and
//! prints the HTTP method and URL path of every request it receives, without
//! modifying or restarting the target.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Go Application                           │
//! │           func handler(w http.ResponseWriter, r *http.Request)  │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ function entry
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Uprobe (Kernel)                        │
//! │  • LAYOUT map: where the request lives, how to reach each field │
//! │  • bpf_probe_read_user walk → fixed 154-byte RequestEvent       │
//! │  • EVENTS ring buffer (lossy), CAPTURE_STATS per-CPU counters   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ raw records
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     reqscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Consumer   │──▶│   Decoder    │──▶│     Sink     │         │
//! │  │  (AsyncFd)   │   │  (clamping)  │   │ (text/json)  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │                        lossy channel ──┘                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`layout`]: Layout descriptors, built-in Go `net/http` presets, JSON
//!   layout files and Go toolchain version detection
//! - [`probing`]: eBPF loading and attachment, record decoding, the lossy
//!   hand-off, output formatting and counters
//! - [`preflight`]: Privilege, kernel, binary, symbol and PID checks
//! - [`cli`]: Command-line argument parsing
//! - [`domain`]: Core domain types (Pid, `GoVersion`) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Trace every process running ./server
//! sudo ./reqscope ./server main.handler
//!
//! # One process, JSON lines
//! sudo ./reqscope ./server main.handler --pid 1234 --format json
//! ```
//!
//! ## Key Concepts
//!
//! - **Layout descriptor**: data, not code. Argument location plus a chain of
//!   offset/dereference steps per field, ending at a Go string header
//! - **Truncation**: the target's length is stored as-is, the copied bytes
//!   are capped at the field capacity, and the decoder clamps again
//! - **Go ABIs**: stack-based before Go 1.17, register-based from 1.17

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod layout;
pub mod preflight;
pub mod probing;
