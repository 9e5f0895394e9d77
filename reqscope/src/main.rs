//! # reqscope - Main Entry Point
//!
//! `reqscope <BINARY> <SYMBOL>` loads the capture probe, installs the layout
//! for the target's Go ABI, attaches to `SYMBOL` and prints one line per
//! request until interrupted.

// Main function is intentionally long for clarity
#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::time::{Duration, Instant};
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{signal, SignalKind};

use reqscope::cli::Args;
use reqscope::domain::{GoVersion, Pid};
use reqscope::layout::{
    detect_go_version, go_http_request, load_layout_file, select_abi, LayoutSpec,
};
use reqscope::preflight::{check_process_exists, run_preflight_checks};
use reqscope::probing::{
    attach_capture_uprobe, default_ebpf_object, init_ebpf_logger, install_layout, lossy_channel,
    load_ebpf_program, print_capture_summary, read_capture_stats, spawn_stdout_sink,
    take_event_ring, EventProcessor,
};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

/// Decoded requests buffered between the consumer and the output thread
const SINK_CAPACITY: usize = 1024;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied")
        || msg.contains("requires root")
        || msg.contains("operation not permitted")
    {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

/// Pick the layout: a JSON file if given, otherwise the built-in preset for
/// the requested or detected ABI. Unless `force` is set, a layout whose ABI
/// contradicts the detected Go version is refused.
fn choose_layout(args: &Args, detected: Option<GoVersion>) -> Result<LayoutSpec> {
    let spec = match args.layout {
        Some(ref path) => load_layout_file(path)?,
        None => go_http_request(select_abi(args.abi, detected)),
    };

    if args.force {
        if let Err(e) = spec.check_target(detected) {
            warn!("{e}");
        }
    } else {
        spec.check_target(detected)?;
    }
    Ok(spec)
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;
    let pid = args.pid.map(Pid);

    // Run pre-flight checks before anything else
    run_preflight_checks(&args.binary, &args.symbol, pid)?;

    let detected = match detect_go_version(&args.binary) {
        Ok(version) => version,
        Err(e) => {
            warn!("Could not read Go version from {}: {e:#}", args.binary.display());
            None
        }
    };
    let spec = choose_layout(&args, detected)?;
    let descriptor = spec
        .to_descriptor()
        .with_context(|| format!("Invalid layout {}", spec.name))?;

    if !quiet {
        eprintln!("reqscope v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("target: {} ({})", args.binary.display(), args.symbol);
        match detected {
            Some(version) => eprintln!("go: {version}"),
            None => eprintln!("go: unknown"),
        }
        eprintln!("layout: {}", spec.name);
        if let Some(pid) = pid {
            eprintln!("pid: {}", pid.0);
        }
    }

    // ── Load eBPF, install layout, attach ───────────────────────────────
    let object = args.ebpf_object.clone().unwrap_or_else(default_ebpf_object);
    let mut bpf = load_ebpf_program(&object)?;
    init_ebpf_logger(&mut bpf);

    // Layout first: the probe must never fire against an empty LAYOUT map
    install_layout(&mut bpf, &descriptor)?;
    attach_capture_uprobe(&mut bpf, &args.binary, &args.symbol, pid)?;

    let ring_buf = take_event_ring(&mut bpf)?;
    let mut ring_fd = AsyncFd::new(ring_buf).context("Failed to watch EVENTS ring buffer")?;

    // ── Output thread behind the lossy hand-off ─────────────────────────
    let (sink_tx, sink_rx) = lossy_channel(SINK_CAPACITY);
    let sink_handle = spawn_stdout_sink(sink_rx, args.format);
    let mut processor = EventProcessor::new(sink_tx);

    // ── Main event loop ─────────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    let started = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let mut exit_reason = "interrupted";

    info!("Waiting for requests...");
    loop {
        tokio::select! {
            guard = ring_fd.readable_mut() => {
                let mut guard = guard.context("EVENTS ring buffer poll failed")?;
                let ring = guard.get_inner_mut();
                while let Some(item) = ring.next() {
                    processor.process_record(&item);
                }
                guard.clear_ready();
            }
            _ = &mut ctrl_c => {
                break;
            }
            _ = sigterm.recv() => {
                exit_reason = "terminated";
                break;
            }
            _ = ticker.tick() => {
                if duration_limit.is_some_and(|limit| started.elapsed() >= limit) {
                    exit_reason = "duration limit reached";
                    break;
                }
                if let Some(pid) = pid {
                    if check_process_exists(pid).is_err() {
                        exit_reason = "process exited";
                        break;
                    }
                }
            }
        }
    }

    // Records already committed are still presented
    let ring = ring_fd.get_mut();
    while let Some(item) = ring.next() {
        processor.process_record(&item);
    }
    debug!("Stopped: {exit_reason}");

    let (consumer_stats, sink_dropped) = processor.finish();
    match sink_handle.join() {
        Ok(Ok(written)) => debug!("Output thread wrote {written} requests"),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => warn!("Output failed: {e}"),
        Err(_) => warn!("Output thread panicked"),
    }

    if !quiet {
        let kernel_stats = match read_capture_stats(&bpf) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Could not read capture counters: {e:#}");
                None
            }
        };
        eprintln!("\n{exit_reason}: {:.1}s", started.elapsed().as_secs_f64());
        print_capture_summary(kernel_stats.as_ref(), &consumer_stats, sink_dropped);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqscope::layout::ArgSpec;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["reqscope", "/bin/server", "main.handler"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("Permission denied: requires root")), EXIT_NOPERM);
        assert_eq!(exit_code_for(&anyhow::anyhow!("Symbol main.x not found")), EXIT_ERROR);
    }

    #[test]
    fn test_preset_follows_detected_version() {
        let old = Some(GoVersion { major: 1, minor: 15 });
        let spec = choose_layout(&args(&[]), old).unwrap();
        assert_eq!(spec.arg, ArgSpec::Stack(3));
    }

    #[test]
    fn test_contradicting_abi_refused_unless_forced() {
        let new = Some(GoVersion { major: 1, minor: 21 });
        assert!(choose_layout(&args(&["--abi", "stack"]), new).is_err());

        let spec = choose_layout(&args(&["--abi", "stack", "--force"]), new).unwrap();
        assert_eq!(spec.arg, ArgSpec::Stack(3));
    }

    #[test]
    fn test_missing_layout_file() {
        let err = choose_layout(&args(&["--layout", "/nonexistent.json"]), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent.json"));
    }
}
