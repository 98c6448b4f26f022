//! Exhaustive OCFL validation. Validation never short-circuits: every problem found is
//! collected into a [`ValidationResult`] carrying fatal errors and warnings side by
//! side, each tagged with its OCFL code.

use std::collections::HashSet;
use std::convert::TryFrom;

use strum_macros::Display as EnumDisplay;
use uriparse::URI;

use crate::digest::DigestAlgorithm;
use crate::digest_map::MapError;
use crate::inventory::Inventory;
use crate::spec::SpecVersion;
use crate::types::VersionNum;

mod object;
mod serde;

pub use object::{validate_object, ValidationOptions};
pub use serde::validate_inventory_bytes;

pub(crate) use serde::parse_inventory_collecting;

/// The location a validation problem was found: the root inventory or a version
/// directory's inventory.
pub const ROOT_LOCATION: &str = "root";

/// The result of validating an inventory or an entire object
#[derive(Debug)]
pub struct ValidationResult {
    pub object_id: Option<String>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug)]
pub struct ValidationError {
    /// The inventory the problem was found in, eg `root` or `v2`
    pub location: Option<String>,
    pub code: ErrorCode,
    pub text: String,
}

#[derive(Debug)]
pub struct ValidationWarning {
    /// The inventory the problem was found in, eg `root` or `v2`
    pub location: Option<String>,
    pub code: WarnCode,
    pub text: String,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            object_id: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_id(object_id: &str) -> Self {
        Self {
            object_id: Some(object_id.to_string()),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, code: ErrorCode, message: String) {
        self.errors.push(ValidationError::new(code, message));
    }

    pub fn warn(&mut self, code: WarnCode, message: String) {
        self.warnings.push(ValidationWarning::new(code, message));
    }

    pub fn error_at(&mut self, location: &str, code: ErrorCode, message: String) {
        self.errors
            .push(ValidationError::at(location.to_string(), code, message));
    }

    pub fn warn_at(&mut self, location: &str, code: WarnCode, message: String) {
        self.warnings
            .push(ValidationWarning::at(location.to_string(), code, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Returns every error with the specified code
    pub fn errors_with_code(&self, code: ErrorCode) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.code == code).collect()
    }

    /// Returns every warning with the specified code
    pub fn warnings_with_code(&self, code: WarnCode) -> Vec<&ValidationWarning> {
        self.warnings.iter().filter(|w| w.code == code).collect()
    }
}

impl ValidationError {
    pub fn new(code: ErrorCode, text: String) -> Self {
        Self {
            location: None,
            code,
            text,
        }
    }

    pub fn at(location: String, code: ErrorCode, text: String) -> Self {
        Self {
            location: Some(location),
            code,
            text,
        }
    }
}

impl ValidationWarning {
    pub fn new(code: WarnCode, text: String) -> Self {
        Self {
            location: None,
            code,
            text,
        }
    }

    pub fn at(location: String, code: WarnCode, text: String) -> Self {
        Self {
            location: Some(location),
            code,
            text,
        }
    }
}

/// The numbered OCFL validation error codes
#[allow(dead_code)]
#[derive(Debug, EnumDisplay, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    E001,
    E002,
    E003,
    E004,
    E005,
    E006,
    E007,
    E008,
    E009,
    E010,
    E011,
    E012,
    E013,
    E014,
    E015,
    E016,
    E017,
    E018,
    E019,
    E020,
    E021,
    E022,
    E023,
    E024,
    E025,
    E026,
    E027,
    E028,
    E029,
    E030,
    E031,
    E032,
    E033,
    E034,
    E035,
    E036,
    E037,
    E038,
    E039,
    E040,
    E041,
    E042,
    E043,
    E044,
    E045,
    E046,
    E047,
    E048,
    E049,
    E050,
    E051,
    E052,
    E053,
    E054,
    E055,
    E056,
    E057,
    E058,
    E059,
    E060,
    E061,
    E062,
    E063,
    E064,
    E066,
    E067,
    E068,
    E069,
    E070,
    E071,
    E072,
    E073,
    E074,
    E075,
    E076,
    E077,
    E078,
    E079,
    E080,
    E081,
    E082,
    E083,
    E084,
    E085,
    E086,
    E087,
    E088,
    E089,
    E090,
    E091,
    E092,
    E093,
    E094,
    E095,
    E096,
    E097,
    E098,
    E099,
    E100,
    E101,
    E102,
    E103,
    E104,
    E105,
    E106,
    E107,
}

/// The numbered OCFL validation warning codes
#[allow(dead_code)]
#[derive(Debug, EnumDisplay, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WarnCode {
    W001,
    W002,
    W003,
    W004,
    W005,
    W006,
    W007,
    W008,
    W009,
    W010,
    W011,
    W012,
    W013,
    W014,
    W015,
}

/// The context a digest map appears in, used to map map problems to OCFL codes
#[derive(Debug, Copy, Clone)]
pub(crate) enum MapContext {
    Manifest,
    State,
    Fixity,
}

/// A digest map problem without its payload
#[derive(Debug, Copy, Clone)]
pub(crate) enum MapProblem {
    PathInvalid,
    PathConflict,
    DigestConflict,
    EmptyPaths,
}

/// Maps a digest map problem to the OCFL code for the context it occurred in
pub(crate) fn map_problem_code(context: MapContext, problem: MapProblem) -> ErrorCode {
    match (context, problem) {
        (MapContext::Manifest, MapProblem::PathInvalid) => ErrorCode::E099,
        (MapContext::Manifest, MapProblem::PathConflict) => ErrorCode::E101,
        (MapContext::Manifest, MapProblem::DigestConflict) => ErrorCode::E096,
        (MapContext::Manifest, MapProblem::EmptyPaths) => ErrorCode::E099,
        (MapContext::State, MapProblem::PathInvalid) => ErrorCode::E053,
        (MapContext::State, MapProblem::PathConflict) => ErrorCode::E095,
        (MapContext::State, MapProblem::DigestConflict) => ErrorCode::E050,
        (MapContext::State, MapProblem::EmptyPaths) => ErrorCode::E095,
        (MapContext::Fixity, MapProblem::PathInvalid) => ErrorCode::E099,
        (MapContext::Fixity, MapProblem::PathConflict) => ErrorCode::E101,
        (MapContext::Fixity, MapProblem::DigestConflict) => ErrorCode::E097,
        (MapContext::Fixity, MapProblem::EmptyPaths) => ErrorCode::E099,
    }
}

/// Maps a [`MapError`] to the OCFL code for the context it occurred in
pub(crate) fn map_error_code(context: MapContext, err: &MapError) -> ErrorCode {
    let problem = match err {
        MapError::PathInvalid(_) => MapProblem::PathInvalid,
        MapError::PathConflict(_) => MapProblem::PathConflict,
        MapError::DigestConflict(_) => MapProblem::DigestConflict,
        MapError::EmptyPaths(_) => MapProblem::EmptyPaths,
    };
    map_problem_code(context, problem)
}

/// Runs the model-level inventory rules: everything that can be checked on a parsed
/// inventory without access to the raw JSON. The byte-level rules, unknown or missing
/// fields and malformed values, are the collecting parser's job.
pub fn validate_inventory(
    inventory: &Inventory,
    expected_spec: Option<SpecVersion>,
    location: &str,
    result: &mut ValidationResult,
) {
    validate_id(inventory.id(), location, result);
    validate_type(inventory, expected_spec, location, result);
    validate_digest_algorithm(inventory.digest_algorithm(), location, result);

    if let Some(content_dir) = inventory.content_directory() {
        validate_content_dir(content_dir, location, result);
    }

    let versions: Vec<VersionNum> = inventory.versions().keys().copied().collect();
    validate_lineage(&versions, inventory.head(), location, result);

    validate_version_blocks(inventory, result);
    validate_manifest_usage(inventory, location, result);
    validate_fixity_paths(inventory, location, result);
}

fn validate_id(id: &str, location: &str, result: &mut ValidationResult) {
    if id.is_empty() {
        result.error_at(
            location,
            ErrorCode::E036,
            "Inventory field 'id' cannot be blank".to_string(),
        );
    } else if URI::try_from(id).is_err() {
        result.warn_at(
            location,
            WarnCode::W005,
            format!("Inventory field 'id' should be a URI. Found: {}", id),
        );
    }
}

fn validate_type(
    inventory: &Inventory,
    expected_spec: Option<SpecVersion>,
    location: &str,
    result: &mut ValidationResult,
) {
    match expected_spec {
        Some(spec) => {
            if inventory.type_declaration() != spec.inventory_type() {
                result.error_at(
                    location,
                    ErrorCode::E038,
                    format!(
                        "Inventory field 'type' must equal '{}'. Found: {}",
                        spec.inventory_type(),
                        inventory.type_declaration()
                    ),
                );
            }
        }
        None => {
            if inventory.spec_version().is_err() {
                result.error_at(
                    location,
                    ErrorCode::E038,
                    format!(
                        "Inventory field 'type' must be an OCFL inventory type. Found: {}",
                        inventory.type_declaration()
                    ),
                );
            }
        }
    }
}

fn validate_digest_algorithm(
    algorithm: DigestAlgorithm,
    location: &str,
    result: &mut ValidationResult,
) {
    if algorithm != DigestAlgorithm::Sha512 && algorithm != DigestAlgorithm::Sha256 {
        result.error_at(
            location,
            ErrorCode::E025,
            format!(
                "Inventory field 'digestAlgorithm' must be 'sha512' or 'sha256'. Found: {}",
                algorithm
            ),
        );
    } else if algorithm == DigestAlgorithm::Sha256 {
        result.warn_at(
            location,
            WarnCode::W004,
            "Inventory field 'digestAlgorithm' should be 'sha512'".to_string(),
        );
    }
}

pub(crate) fn validate_content_dir(content_dir: &str, location: &str, result: &mut ValidationResult) {
    if content_dir.eq(".") || content_dir.eq("..") {
        result.error_at(
            location,
            ErrorCode::E018,
            format!(
                "Inventory field 'contentDirectory' cannot equal '.' or '..'. Found: {}",
                content_dir
            ),
        );
    } else if content_dir.contains('/') || content_dir.is_empty() {
        result.error_at(
            location,
            ErrorCode::E017,
            format!(
                "Inventory field 'contentDirectory' cannot contain '/'. Found: {}",
                content_dir
            ),
        );
    }
}

/// Checks the version sequence: same padding width throughout, values exactly `1..=n`,
/// and `head` equal to the maximum.
fn validate_lineage(
    versions: &[VersionNum],
    head: VersionNum,
    location: &str,
    result: &mut ValidationResult,
) {
    if versions.is_empty() {
        result.error_at(
            location,
            ErrorCode::E008,
            "Inventory does not contain any valid versions".to_string(),
        );
        return;
    }

    let width = versions[0].width;

    if versions.iter().any(|v| v.width != width) {
        result.error_at(
            location,
            ErrorCode::E012,
            "Inventory 'versions' must all use the same zero-padding".to_string(),
        );
    } else if width > 0 {
        result.warn_at(
            location,
            WarnCode::W001,
            "Inventory 'versions' should not be zero-padded".to_string(),
        );
    }

    let mut expected = 1;
    for version in versions {
        if version.number != expected {
            result.error_at(
                location,
                ErrorCode::E010,
                format!(
                    "Inventory 'versions' is missing version 'v{}'",
                    expected
                ),
            );
            expected = version.number;
        }
        expected += 1;
    }

    let max = versions[versions.len() - 1];
    if head != max {
        result.error_at(
            location,
            ErrorCode::E040,
            format!("Inventory field 'head' must equal '{}'. Found: {}", max, head),
        );
    }
}

/// Per version block rules: state digests must exist in the manifest, and the
/// recommended metadata should be present.
fn validate_version_blocks(inventory: &Inventory, result: &mut ValidationResult) {
    for (version_num, version) in inventory.versions() {
        let location = version_num.to_string();

        for (digest, _) in version.state().iter() {
            if !inventory.manifest().contains_digest(digest) {
                result.error_at(
                    &location,
                    ErrorCode::E050,
                    format!(
                        "Inventory version {} state contains digest '{}' that is not present in the manifest",
                        version_num, digest
                    ),
                );
            }
        }

        if version.message().is_none() {
            result.warn_at(
                &location,
                WarnCode::W007,
                format!(
                    "Inventory version '{}' is missing recommended field 'message'",
                    version_num
                ),
            );
        }

        match version.user() {
            None => {
                result.warn_at(
                    &location,
                    WarnCode::W007,
                    format!(
                        "Inventory version '{}' is missing recommended field 'user'",
                        version_num
                    ),
                );
            }
            Some(user) => {
                match user.name() {
                    None => {
                        result.error_at(
                            &location,
                            ErrorCode::E054,
                            format!(
                                "Inventory version '{}' is missing required field 'name'",
                                version_num
                            ),
                        );
                    }
                    Some(_) => (),
                }

                match user.address() {
                    None => {
                        result.warn_at(
                            &location,
                            WarnCode::W008,
                            format!(
                                "Inventory version '{}' is missing recommended field 'address'",
                                version_num
                            ),
                        );
                    }
                    Some(address) => {
                        if URI::try_from(address).is_err() {
                            result.warn_at(
                                &location,
                                WarnCode::W009,
                                format!(
                                    "Inventory version '{}' user 'address' should be a URI. Found: {}",
                                    version_num, address
                                ),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Every digest in the manifest must appear in at least one version's state
fn validate_manifest_usage(inventory: &Inventory, location: &str, result: &mut ValidationResult) {
    let mut used: HashSet<&crate::digest::HexDigest> = HashSet::new();

    for version in inventory.versions().values() {
        for (digest, _) in version.state().iter() {
            used.insert(digest);
        }
    }

    for (digest, _) in inventory.manifest().iter() {
        if !used.contains(digest) {
            result.error_at(
                location,
                ErrorCode::E107,
                format!(
                    "Inventory manifest contains digest '{}' that is not used in any version",
                    digest
                ),
            );
        }
    }
}

/// Fixity blocks must reference manifest content paths
fn validate_fixity_paths(inventory: &Inventory, location: &str, result: &mut ValidationResult) {
    if let Some(fixity) = inventory.fixity() {
        for (algorithm, block) in fixity {
            for path in block.paths() {
                if !inventory.manifest().contains_path(path.as_str()) {
                    result.error_at(
                        location,
                        ErrorCode::E057,
                        format!(
                            "Inventory fixity block '{}' contains content path '{}' that is not present in the manifest",
                            algorithm, path
                        ),
                    );
                }
            }
        }
    }
}
