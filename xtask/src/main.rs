use anyhow::{Context, Result};
use clap::Parser;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Compile the capture probe for the BPF target
    BuildEbpf {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
    },
    /// Build the probe and userspace, then run reqscope under sudo
    Run {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Arguments passed to reqscope
        #[arg(last = true)]
        run_args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => build_ebpf(&target)?,
        Cmd::Run { target, run_args } => {
            build_ebpf(&target)?;
            run(&run_args)?;
        }
    }

    Ok(())
}

fn build_ebpf(target: &str) -> Result<()> {
    // Always build in release mode because debug builds pull in formatting
    // code (LowerHex) that's incompatible with the BPF linker.
    let mut cmd = Command::new("cargo");
    cmd.arg("+nightly")
        .arg("build")
        .arg("--package")
        .arg("reqscope-ebpf")
        .arg("--target")
        .arg(target)
        .arg("-Z")
        .arg("build-std=core")
        .arg("--release");

    let status = cmd.status().context("Failed to build eBPF program")?;

    if !status.success() {
        anyhow::bail!("Failed to build eBPF program");
    }

    println!("✓ eBPF program built successfully");
    println!("  Target: {target}");
    println!("  Profile: release (always)");

    Ok(())
}

fn run(run_args: &[String]) -> Result<()> {
    let status = Command::new("cargo")
        .args(["build", "--package", "reqscope", "--release"])
        .status()
        .context("Failed to build reqscope")?;
    if !status.success() {
        anyhow::bail!("Failed to build reqscope");
    }

    let status = Command::new("sudo")
        .arg("-E")
        .arg("target/release/reqscope")
        .args(run_args)
        .status()
        .context("Failed to run reqscope")?;
    if !status.success() {
        anyhow::bail!("reqscope exited with {status}");
    }
    Ok(())
}
