//! Pre-flight checks for reqscope
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSymbol};
use std::path::Path;

use crate::domain::{Pid, ProbeError};

/// Minimum kernel version required for the BPF ring buffer
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns the first failed requirement
pub fn run_preflight_checks(binary: &Path, symbol: &str, pid: Option<Pid>) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_binary_exists(binary)?;
    check_symbol_exists(binary, symbol)?;
    if let Some(pid) = pid {
        check_process_exists(pid)?;
    }
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: reqscope requires root privileges to load eBPF programs.\n\n\
         Run with: sudo reqscope ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");
    let Some((major, minor)) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             reqscope requires Linux {}.{} or newer for eBPF ring buffer support.\n\
             Current kernel: {}",
            major,
            minor,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release
        );
    }

    Ok(())
}

fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    Some((major, minor.parse().ok()?))
}

/// Check if the target binary exists and is a file
fn check_binary_exists(binary: &Path) -> Result<()> {
    if !binary.exists() {
        bail!(
            "Binary not found: {}\n\n\
             Make sure the path is correct and the binary exists.",
            binary.display()
        );
    }
    if !binary.is_file() {
        bail!(
            "Not a file: {}\n\n\
             BINARY must point to an executable file, not a directory.",
            binary.display()
        );
    }
    Ok(())
}

/// Check that `symbol` is defined in the binary's symbol table
///
/// # Errors
/// Returns [`ProbeError::SymbolNotFound`] if the symbol is absent or the
/// binary is stripped
pub fn check_symbol_exists(binary: &Path, symbol: &str) -> Result<()> {
    let file_data = std::fs::read(binary)
        .with_context(|| format!("Failed to read binary: {}", binary.display()))?;

    let obj = object::File::parse(&*file_data)
        .with_context(|| format!("Not a valid ELF file: {}", binary.display()))?;

    let found = obj
        .symbols()
        .chain(obj.dynamic_symbols())
        .any(|sym| sym.is_definition() && sym.name().is_ok_and(|name| name == symbol));

    if !found {
        return Err(ProbeError::SymbolNotFound {
            symbol: symbol.to_string(),
            binary: binary.display().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Check if the target process exists
///
/// # Errors
/// Returns [`ProbeError::ProcessNotFound`] if `/proc/<pid>` is missing
pub fn check_process_exists(pid: Pid) -> Result<()> {
    if !Path::new(&format!("/proc/{}", pid.0)).exists() {
        return Err(ProbeError::ProcessNotFound(pid).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_check() {
        // Don't assert success since test might run on old kernel
        let _ = check_kernel_version();
    }

    #[test]
    fn test_parse_kernel_release() {
        assert_eq!(parse_kernel_release("6.1.0-arch1-1"), Some((6, 1)));
        assert_eq!(parse_kernel_release("5.15rc2"), Some((5, 15)));
        assert_eq!(parse_kernel_release("unknown"), None);
    }

    #[test]
    fn test_binary_not_found() {
        let result = check_binary_exists(Path::new("/nonexistent/path/to/binary"));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Binary not found"));
    }

    #[test]
    fn test_directory_is_not_a_binary() {
        let err = check_binary_exists(Path::new("/")).unwrap_err().to_string();
        assert!(err.contains("Not a file"));
    }

    #[test]
    fn test_symbol_not_found() {
        let exe = std::env::current_exe().unwrap();
        let err = check_symbol_exists(&exe, "main.definitelyNotHere").unwrap_err();
        assert!(err.to_string().contains("main.definitelyNotHere"));
    }

    #[test]
    fn test_process_not_found() {
        let err = check_process_exists(Pid(999_999_999)).unwrap_err().to_string();
        assert!(err.contains("not found"));
    }
}
