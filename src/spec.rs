use std::convert::TryFrom;

use crate::consts::*;
use crate::error::{OcflError, Result};

/// The OCFL spec versions this library understands. OCFL 1.0 and 1.1 share almost all of
/// their rules; anything version specific is dispatched through this enum.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SpecVersion {
    Ocfl1_0,
    Ocfl1_1,
}

impl SpecVersion {
    /// The most recent spec version the library supports
    pub fn latest() -> SpecVersion {
        SpecVersion::Ocfl1_1
    }

    /// The bare version number, eg `1.1`
    pub fn version_str(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => OCFL_VERSION_1_0,
            SpecVersion::Ocfl1_1 => OCFL_VERSION_1_1,
        }
    }

    /// The filename of the object NAMASTE declaration, eg `0=ocfl_object_1.1`
    pub fn object_namaste_filename(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => OBJECT_NAMASTE_FILE_1_0,
            SpecVersion::Ocfl1_1 => OBJECT_NAMASTE_FILE_1_1,
        }
    }

    /// The required contents of the object NAMASTE declaration, eg `ocfl_object_1.1\n`
    pub fn object_namaste_contents(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => OBJECT_NAMASTE_CONTENTS_1_0,
            SpecVersion::Ocfl1_1 => OBJECT_NAMASTE_CONTENTS_1_1,
        }
    }

    /// The canonical inventory `type` value, eg `https://ocfl.io/1.1/spec/#inventory`
    pub fn inventory_type(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => INVENTORY_TYPE_1_0,
            SpecVersion::Ocfl1_1 => INVENTORY_TYPE_1_1,
        }
    }

    /// Maps an inventory `type` value to its spec version
    pub fn try_from_inventory_type(inventory_type: &str) -> Result<SpecVersion> {
        match inventory_type {
            INVENTORY_TYPE_1_0 => Ok(SpecVersion::Ocfl1_0),
            INVENTORY_TYPE_1_1 => Ok(SpecVersion::Ocfl1_1),
            _ => Err(OcflError::InvalidValue(format!(
                "Unknown inventory type: {}",
                inventory_type
            ))),
        }
    }

    /// Maps a NAMASTE filename, eg `0=ocfl_object_1.0`, to its spec version
    pub fn try_from_namaste_filename(filename: &str) -> Result<SpecVersion> {
        match filename {
            OBJECT_NAMASTE_FILE_1_0 => Ok(SpecVersion::Ocfl1_0),
            OBJECT_NAMASTE_FILE_1_1 => Ok(SpecVersion::Ocfl1_1),
            _ => Err(OcflError::InvalidValue(format!(
                "Unknown object declaration: {}",
                filename
            ))),
        }
    }
}

impl TryFrom<&str> for SpecVersion {
    type Error = OcflError;

    /// Parses a bare version number, eg `1.0`, into a spec version
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            OCFL_VERSION_1_0 => Ok(SpecVersion::Ocfl1_0),
            OCFL_VERSION_1_1 => Ok(SpecVersion::Ocfl1_1),
            _ => Err(OcflError::InvalidValue(format!(
                "Unknown OCFL spec version: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version_str())
    }
}
