//! Domain types providing compile-time safety and self-documentation

use std::fmt;

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Go toolchain version a target binary was built with (`go1.21.5` → 1.21)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoVersion {
    pub major: u32,
    pub minor: u32,
}

impl GoVersion {
    /// First release using the register-based calling convention on amd64
    pub const REGISTER_ABI: GoVersion = GoVersion { major: 1, minor: 17 };

    #[must_use]
    pub fn uses_register_abi(self) -> bool {
        self >= Self::REGISTER_ABI
    }
}

impl fmt::Display for GoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "go{}.{}", self.major, self.minor)
    }
}
