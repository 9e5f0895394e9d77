//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::layout::Abi;
use crate::probing::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "reqscope",
    version,
    about = "Trace HTTP request method and path from a running Go binary",
    after_help = "\
EXAMPLES:
    sudo reqscope ./server 'main.handler'                 Trace every process running ./server
    sudo reqscope ./server 'main.handler' --pid 1234      Only one process
    sudo reqscope ./server 'main.handler' --abi stack     Binary built with Go < 1.17
    sudo reqscope ./server 'main.handler' --format json   One JSON object per request"
)]
pub struct Args {
    /// Path to the Go binary containing the handler
    #[arg(value_name = "BINARY")]
    pub binary: PathBuf,

    /// Symbol of the handler to trace, e.g. `main.handler`
    #[arg(value_name = "SYMBOL")]
    pub symbol: String,

    /// Only trace this process
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// Argument ABI of the built-in layout (default: from the Go version)
    #[arg(long, value_enum, conflicts_with = "layout")]
    pub abi: Option<Abi>,

    /// Load the layout descriptor from a JSON file
    #[arg(long, value_name = "FILE")]
    pub layout: Option<PathBuf>,

    /// Use the layout even if it contradicts the target's Go version
    #[arg(long)]
    pub force: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Compiled eBPF probe (default: the `cargo xtask build-ebpf` output)
    #[arg(long, value_name = "FILE")]
    pub ebpf_object: Option<PathBuf>,

    /// Suppress banner and summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_positionals_are_enough() {
        let args = Args::try_parse_from(["reqscope", "./server", "main.handler"]).unwrap();
        assert_eq!(args.binary, PathBuf::from("./server"));
        assert_eq!(args.symbol, "main.handler");
        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.duration, 0);
        assert!(args.abi.is_none() && args.layout.is_none() && !args.force);
    }

    #[test]
    fn test_missing_symbol_is_usage_error() {
        assert!(Args::try_parse_from(["reqscope", "./server"]).is_err());
    }

    #[test]
    fn test_abi_conflicts_with_layout() {
        let result = Args::try_parse_from([
            "reqscope", "./server", "main.h", "--abi", "stack", "--layout", "l.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_all_flags() {
        let args = Args::try_parse_from([
            "reqscope", "./server", "main.h", "-p", "42", "--abi", "register", "--format",
            "json", "--duration", "5", "--force", "-q",
        ])
        .unwrap();
        assert_eq!(args.pid, Some(42));
        assert_eq!(args.abi, Some(Abi::Register));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.duration, 5);
        assert!(args.force && args.quiet);
    }
}
