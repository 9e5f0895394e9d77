//! Built-in layouts for Go `net/http` handlers
//!
//! Targets a function shaped like `func(w http.ResponseWriter, r *http.Request)`
//! on amd64. The struct offsets below have been stable across Go 1.x:
//!
//! ```text
//! http.Request { Method string @0, URL *url.URL @16, ... }
//! url.URL      { Scheme string @0, Opaque string @16, User *Userinfo @32,
//!                Host string @40, Path string @56, ... }
//! ```

use reqscope_common::{METHOD_CAPACITY, PATH_CAPACITY};

use super::{ArgSpec, FieldSpec, LayoutSpec, StepSpec};
use crate::domain::GoVersion;

/// `http.Request.URL`
pub const REQUEST_URL_OFFSET: u64 = 16;

/// `url.URL.Path`
pub const URL_PATH_OFFSET: u64 = 56;

/// Stack ABI: return address, `w.tab`, `w.data`, then `r`
pub const STACK_REQUEST_SLOT: u32 = 3;

/// Register ABI: `w` takes RAX and RBX, `r` lands in RCX
pub const REGISTER_REQUEST_INDEX: u32 = 2;

/// Go calling convention the traced function was compiled with
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Abi {
    /// Arguments on the stack (Go before 1.17)
    Stack,
    /// Arguments in registers (Go 1.17 and later)
    Register,
}

impl Abi {
    #[must_use]
    pub fn for_go(version: GoVersion) -> Self {
        if version.uses_register_abi() {
            Abi::Register
        } else {
            Abi::Stack
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Abi::Stack => "stack",
            Abi::Register => "register",
        }
    }
}

/// Pick the preset ABI: explicit choice wins, then the detected Go version,
/// then the register ABI every supported toolchain uses today.
#[must_use]
pub fn select_abi(requested: Option<Abi>, detected: Option<GoVersion>) -> Abi {
    requested.or_else(|| detected.map(Abi::for_go)).unwrap_or(Abi::Register)
}

/// Method and path of an `*http.Request` argument
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn go_http_request(abi: Abi) -> LayoutSpec {
    let arg = match abi {
        Abi::Stack => ArgSpec::Stack(STACK_REQUEST_SLOT),
        Abi::Register => ArgSpec::Register(REGISTER_REQUEST_INDEX),
    };
    LayoutSpec {
        version: reqscope_common::LAYOUT_VERSION,
        name: format!("go-net-http-{}", abi.as_str()),
        arg,
        fields: vec![
            FieldSpec { name: "method".to_string(), capacity: METHOD_CAPACITY as u32, steps: vec![] },
            FieldSpec {
                name: "path".to_string(),
                capacity: PATH_CAPACITY as u32,
                steps: vec![
                    StepSpec::Offset(REQUEST_URL_OFFSET),
                    StepSpec::Deref,
                    StepSpec::Offset(URL_PATH_OFFSET),
                ],
            },
        ],
        checksum: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_abi() {
        let old = Some(GoVersion { major: 1, minor: 16 });
        let new = Some(GoVersion { major: 1, minor: 20 });

        assert_eq!(select_abi(None, old), Abi::Stack);
        assert_eq!(select_abi(None, new), Abi::Register);
        assert_eq!(select_abi(None, None), Abi::Register);
        assert_eq!(select_abi(Some(Abi::Stack), new), Abi::Stack);
    }

    #[test]
    fn test_preset_names_are_distinct() {
        assert_ne!(go_http_request(Abi::Stack).name, go_http_request(Abi::Register).name);
        assert_eq!(go_http_request(Abi::Stack).arg, ArgSpec::Stack(3));
        assert_eq!(go_http_request(Abi::Register).arg, ArgSpec::Register(2));
    }
}
