//! Go toolchain version detection
//!
//! Go binaries carry their toolchain version (`go1.21.5`) inline in the
//! `.go.buildinfo` section since Go 1.18. Older binaries keep a pointer there
//! instead; for those the `runtime.buildVersion` string header is followed
//! through the symbol table. Scanning `.rodata` for the first version-shaped
//! string is the last resort.

use anyhow::{Context, Result};
use log::debug;
use object::{Object, ObjectSection, ObjectSymbol};
use std::path::Path;

use crate::domain::GoVersion;

/// Detect the Go version of `binary`, `None` if it is not a recognisable Go binary
///
/// # Errors
/// Returns an error only if the file cannot be read
pub fn detect_go_version(binary: &Path) -> Result<Option<GoVersion>> {
    let data = std::fs::read(binary)
        .with_context(|| format!("Failed to read binary: {}", binary.display()))?;

    let Ok(obj) = object::File::parse(&*data) else {
        return Ok(None);
    };

    if let Some(version) = scan_section(&obj, ".go.buildinfo") {
        return Ok(Some(version));
    }
    if let Some(version) = build_version_from_symbol(&obj) {
        debug!("Found {version} via {BUILD_VERSION_SYMBOL}");
        return Ok(Some(version));
    }
    Ok(scan_section(&obj, ".rodata"))
}

/// `var buildVersion string` in package runtime
const BUILD_VERSION_SYMBOL: &str = "runtime.buildVersion";

/// Longest version string worth reading (`go1.22.12 X:nocoverageredesign`)
const MAX_VERSION_LEN: u64 = 64;

fn scan_section(obj: &object::File<'_>, section_name: &str) -> Option<GoVersion> {
    let bytes = obj.section_by_name(section_name)?.data().ok()?;
    let version = parse_go_version(bytes)?;
    debug!("Found {version} in {section_name}");
    Some(version)
}

fn build_version_from_symbol(obj: &object::File<'_>) -> Option<GoVersion> {
    if !obj.is_64() {
        return None;
    }
    let symbol = obj
        .symbols()
        .find(|sym| sym.name().is_ok_and(|name| name == BUILD_VERSION_SYMBOL))?;
    resolve_build_version(symbol.address(), obj.is_little_endian(), |addr, len| {
        read_mapped(obj, addr, len)
    })
}

/// Bytes at virtual address `addr`, from whichever section maps it
fn read_mapped<'data>(obj: &object::File<'data>, addr: u64, len: usize) -> Option<&'data [u8]> {
    // Non-allocated sections (debug info, symtab) have address 0
    obj.sections().filter(|section| section.address() != 0).find_map(|section| {
        let offset = addr.checked_sub(section.address())?;
        if offset >= section.size() {
            return None;
        }
        let start = usize::try_from(offset).ok()?;
        section.data().ok()?.get(start..start.checked_add(len)?)
    })
}

/// Follow the Go string header at `header_addr` (ptr, len) and parse the
/// string it points at
fn resolve_build_version<'a>(
    header_addr: u64,
    little_endian: bool,
    read: impl Fn(u64, usize) -> Option<&'a [u8]>,
) -> Option<GoVersion> {
    let header = read(header_addr, 16)?;
    let word = |bytes: &[u8]| -> Option<u64> {
        let bytes: [u8; 8] = bytes.try_into().ok()?;
        Some(if little_endian { u64::from_le_bytes(bytes) } else { u64::from_be_bytes(bytes) })
    };
    let data = word(&header[..8])?;
    let len = word(&header[8..16])?.min(MAX_VERSION_LEN);
    let text = read(data, usize::try_from(len).ok()?)?;
    // The whole string must be the version, not merely contain one
    if !text.starts_with(b"go1.") {
        return None;
    }
    parse_go_version(text)
}

/// Find the first `go1.<minor>` token not preceded by an identifier character
#[must_use]
pub fn parse_go_version(bytes: &[u8]) -> Option<GoVersion> {
    const PREFIX: &[u8] = b"go1.";

    let mut start = 0;
    while let Some(pos) = find(&bytes[start..], PREFIX) {
        let at = start + pos;
        start = at + PREFIX.len();

        if at > 0 && (bytes[at - 1].is_ascii_alphanumeric() || bytes[at - 1] == b'_') {
            continue;
        }
        let digits: Vec<u8> =
            bytes[start..].iter().copied().take_while(u8::is_ascii_digit).collect();
        if digits.is_empty() {
            continue;
        }
        if let Some(minor) = std::str::from_utf8(&digits).ok().and_then(|d| d.parse().ok()) {
            return Some(GoVersion { major: 1, minor });
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buildinfo_blob() {
        let blob = b"\xff Go buildinf:\x08\x02\x08go1.21.5\x00path\tmain";
        assert_eq!(parse_go_version(blob), Some(GoVersion { major: 1, minor: 21 }));
    }

    #[test]
    fn test_parse_skips_embedded_tokens() {
        let blob = b"xgo1.99 cargo1.5 go1.16.15";
        assert_eq!(parse_go_version(blob), Some(GoVersion { major: 1, minor: 16 }));
    }

    #[test]
    fn test_parse_without_version() {
        assert_eq!(parse_go_version(b"go1."), None);
        assert_eq!(parse_go_version(b"nothing here"), None);
        assert_eq!(parse_go_version(b""), None);
    }

    /// Sparse address space for [`resolve_build_version`]
    fn reader<'a>(regions: &'a [(u64, Vec<u8>)]) -> impl Fn(u64, usize) -> Option<&'a [u8]> {
        move |addr, len| {
            regions.iter().find_map(|(start, bytes)| {
                let offset = usize::try_from(addr.checked_sub(*start)?).ok()?;
                bytes.get(offset..offset.checked_add(len)?)
            })
        }
    }

    fn header(data: u64, len: u64) -> Vec<u8> {
        let mut bytes = data.to_le_bytes().to_vec();
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes
    }

    #[test]
    fn test_build_version_symbol_wins_over_earlier_rodata_tokens() {
        let rodata = b"unsupported go1.99 feature\x00go1.16.15\x00".to_vec();
        let version_at = 0x2000 + 27;
        let regions = vec![(0x1000, header(version_at, 9)), (0x2000, rodata.clone())];

        // A blind scan picks the error message
        assert_eq!(parse_go_version(&rodata), Some(GoVersion { major: 1, minor: 99 }));
        assert_eq!(
            resolve_build_version(0x1000, true, reader(&regions)),
            Some(GoVersion { major: 1, minor: 16 })
        );
    }

    #[test]
    fn test_build_version_unresolvable() {
        // Header points at unmapped memory
        let regions = vec![(0x1000, header(0x9000, 9))];
        assert_eq!(resolve_build_version(0x1000, true, reader(&regions)), None);
        // Symbol itself unmapped
        assert_eq!(resolve_build_version(0x5000, true, reader(&regions)), None);
        // Pointed-at string is not a version
        let regions = vec![(0x1000, header(0x2000, 5)), (0x2000, b"devel".to_vec())];
        assert_eq!(resolve_build_version(0x1000, true, reader(&regions)), None);
    }

    #[test]
    fn test_build_version_big_endian_header() {
        let mut header = 0x2000u64.to_be_bytes().to_vec();
        header.extend_from_slice(&8u64.to_be_bytes());
        let regions = vec![(0x1000, header), (0x2000, b"go1.12.4".to_vec())];
        assert_eq!(
            resolve_build_version(0x1000, false, reader(&regions)),
            Some(GoVersion { major: 1, minor: 12 })
        );
    }

    #[test]
    fn test_detect_on_non_go_binary() {
        // The test harness itself is a Rust binary
        let exe = std::env::current_exe().unwrap();
        assert!(detect_go_version(&exe).is_ok());
    }

    #[test]
    fn test_detect_missing_file() {
        assert!(detect_go_version(Path::new("/nonexistent/binary")).is_err());
    }
}
