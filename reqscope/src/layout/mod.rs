//! # Layout Descriptors
//!
//! Userspace side of the capture contract. A [`LayoutSpec`] is the
//! human-editable form (built-in preset or JSON file); [`LayoutSpec::to_descriptor`]
//! validates it and produces the `#[repr(C)]` [`LayoutDescriptor`] installed
//! into the probe's `LAYOUT` map.
//!
//! Validation covers self-consistency only: versions, field order,
//! capacities, step counts, checksum. Whether the offsets match the target's
//! compiled structs cannot be checked from here.

pub mod go_version;
pub mod presets;

use anyhow::{Context, Result};
use reqscope_common::{
    AccessStep, ArgLocation, FieldPath, LayoutDescriptor, FIELD_COUNT, FIELD_SLOTS,
    GO_ARG_REGISTER_COUNT, LAYOUT_VERSION, MAX_ACCESS_STEPS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{GoVersion, LayoutError};

pub use go_version::detect_go_version;
pub use presets::{go_http_request, select_abi, Abi};

/// Where the traced function receives the structured argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgSpec {
    /// Word index from the stack pointer at function entry
    Stack(u32),
    /// Go integer argument register index
    Register(u32),
}

impl ArgSpec {
    #[must_use]
    pub fn abi(self) -> Abi {
        match self {
            ArgSpec::Stack(_) => Abi::Stack,
            ArgSpec::Register(_) => Abi::Register,
        }
    }
}

/// One access step; offsets are in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepSpec {
    Offset(u64),
    Deref,
}

impl From<StepSpec> for AccessStep {
    fn from(step: StepSpec) -> Self {
        match step {
            StepSpec::Offset(bytes) => AccessStep::offset(bytes),
            StepSpec::Deref => AccessStep::deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// Versioned, human-editable layout description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub version: u32,
    pub name: String,
    pub arg: ArgSpec,
    pub fields: Vec<FieldSpec>,
    /// Expected descriptor checksum; verified when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u64>,
}

impl LayoutSpec {
    /// Validate and lower into the wire descriptor
    ///
    /// # Errors
    /// Returns the first [`LayoutError`] found
    pub fn to_descriptor(&self) -> Result<LayoutDescriptor, LayoutError> {
        if self.version != LAYOUT_VERSION {
            return Err(LayoutError::UnsupportedVersion {
                found: self.version,
                expected: LAYOUT_VERSION,
            });
        }
        if self.fields.len() != FIELD_COUNT {
            return Err(LayoutError::FieldCount { found: self.fields.len(), expected: FIELD_COUNT });
        }

        let arg = match self.arg {
            ArgSpec::Stack(word) => ArgLocation::stack(word),
            ArgSpec::Register(index) if index < GO_ARG_REGISTER_COUNT => {
                ArgLocation::register(index)
            }
            ArgSpec::Register(index) => return Err(LayoutError::RegisterOutOfRange(index)),
        };

        let mut paths = [FieldPath::default(); FIELD_COUNT];
        for (index, (field, slot)) in self.fields.iter().zip(FIELD_SLOTS.iter()).enumerate() {
            if field.name != slot.name {
                return Err(LayoutError::FieldName {
                    index,
                    found: field.name.clone(),
                    expected: slot.name,
                });
            }
            if field.capacity as usize != slot.capacity {
                return Err(LayoutError::CapacityMismatch {
                    field: field.name.clone(),
                    found: field.capacity,
                    expected: slot.capacity,
                });
            }
            let steps: Vec<AccessStep> = field.steps.iter().copied().map(AccessStep::from).collect();
            paths[index] = FieldPath::new(&steps, field.capacity).ok_or_else(|| {
                LayoutError::TooManySteps {
                    field: field.name.clone(),
                    found: steps.len(),
                    max: MAX_ACCESS_STEPS,
                }
            })?;
        }

        let descriptor = LayoutDescriptor::new(arg, paths);
        if let Some(declared) = self.checksum {
            if declared != descriptor.checksum {
                return Err(LayoutError::ChecksumMismatch {
                    declared,
                    computed: descriptor.checksum,
                });
            }
        }
        Ok(descriptor)
    }

    /// Refuse a layout whose argument ABI contradicts the target's Go version
    ///
    /// # Errors
    /// Returns [`LayoutError::AbiMismatch`] on contradiction; unknown versions pass
    pub fn check_target(&self, version: Option<GoVersion>) -> Result<(), LayoutError> {
        let Some(version) = version else {
            return Ok(());
        };
        let target_abi = Abi::for_go(version);
        let layout_abi = self.arg.abi();
        if layout_abi == target_abi {
            return Ok(());
        }
        Err(LayoutError::AbiMismatch {
            layout: self.name.clone(),
            layout_abi: layout_abi.as_str(),
            version,
            target_abi: target_abi.as_str(),
        })
    }
}

/// Read a [`LayoutSpec`] from a JSON file
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid layout
pub fn load_layout_file(path: &Path) -> Result<LayoutSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read layout file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse layout file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqscope_common::{METHOD_CAPACITY, PATH_CAPACITY};

    fn spec() -> LayoutSpec {
        go_http_request(Abi::Stack)
    }

    #[test]
    fn test_preset_lowers_to_expected_descriptor() {
        let descriptor = spec().to_descriptor().unwrap();
        assert_eq!(descriptor.arg, ArgLocation::stack(3));
        assert_eq!(descriptor.fields[0].step_count, 0);
        assert_eq!(descriptor.fields[0].capacity as usize, METHOD_CAPACITY);
        assert_eq!(
            descriptor.fields[1].active_steps(),
            &[AccessStep::offset(16), AccessStep::deref(), AccessStep::offset(56)]
        );
        assert_eq!(descriptor.fields[1].capacity as usize, PATH_CAPACITY);
        assert!(descriptor.checksum_matches());
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "version": 1,
            "name": "custom",
            "arg": { "register": 2 },
            "fields": [
                { "name": "method", "capacity": 10 },
                { "name": "path", "capacity": 128, "steps": [ {"offset": 16}, "deref", {"offset": 56} ] }
            ]
        }"#;
        let parsed: LayoutSpec = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.arg, ArgSpec::Register(2));
        assert_eq!(parsed.fields[1].steps[1], StepSpec::Deref);
        assert_eq!(parsed.checksum, None);
        assert_eq!(
            parsed.to_descriptor().unwrap().fields,
            go_http_request(Abi::Register).to_descriptor().unwrap().fields
        );
    }

    #[test]
    fn test_rejects_wrong_capacity() {
        let mut bad = spec();
        bad.fields[1].capacity = 256;
        assert!(matches!(
            bad.to_descriptor(),
            Err(LayoutError::CapacityMismatch { found: 256, expected: 128, .. })
        ));
    }

    #[test]
    fn test_rejects_swapped_fields() {
        let mut bad = spec();
        bad.fields.swap(0, 1);
        assert!(matches!(bad.to_descriptor(), Err(LayoutError::FieldName { index: 0, .. })));
    }

    #[test]
    fn test_rejects_version_and_count() {
        let mut bad = spec();
        bad.version = 2;
        assert!(matches!(bad.to_descriptor(), Err(LayoutError::UnsupportedVersion { .. })));

        let mut bad = spec();
        bad.fields.pop();
        assert!(matches!(bad.to_descriptor(), Err(LayoutError::FieldCount { found: 1, .. })));
    }

    #[test]
    fn test_rejects_register_out_of_range() {
        let mut bad = spec();
        bad.arg = ArgSpec::Register(9);
        assert_eq!(bad.to_descriptor(), Err(LayoutError::RegisterOutOfRange(9)));
    }

    #[test]
    fn test_rejects_too_many_steps() {
        let mut bad = spec();
        bad.fields[1].steps = vec![StepSpec::Deref; MAX_ACCESS_STEPS + 1];
        assert!(matches!(bad.to_descriptor(), Err(LayoutError::TooManySteps { .. })));
    }

    #[test]
    fn test_checksum_verified_when_declared() {
        let mut declared = spec();
        let computed = declared.to_descriptor().unwrap().checksum;

        declared.checksum = Some(computed);
        assert!(declared.to_descriptor().is_ok());

        declared.checksum = Some(computed ^ 1);
        assert_eq!(
            declared.to_descriptor(),
            Err(LayoutError::ChecksumMismatch { declared: computed ^ 1, computed })
        );
    }

    #[test]
    fn test_check_target_abi() {
        let old = GoVersion { major: 1, minor: 16 };
        let new = GoVersion { major: 1, minor: 21 };

        assert!(go_http_request(Abi::Stack).check_target(Some(old)).is_ok());
        assert!(go_http_request(Abi::Register).check_target(Some(new)).is_ok());
        assert!(go_http_request(Abi::Stack).check_target(Some(new)).is_err());
        assert!(go_http_request(Abi::Register).check_target(None).is_ok());
    }
}
