//! Full object validation: root structure, per-version structure, root versus version
//! inventory cross-checks, and content digest verification. Problems are collected, not
//! thrown; the scan never aborts at the first finding.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::str::FromStr;

use log::info;

use crate::cancel::Cancel;
use crate::consts::{INVENTORY_FILE, INVENTORY_SIDECAR_PREFIX, REGISTERED_EXTENSIONS};
use crate::digest::{global_registry, DigestAlgorithm, HexDigest, NamedMultiWriter};
use crate::error::{DigestMismatch, OcflError, Result};
use crate::fs::{walk_files, FileSystem, Listing};
use crate::inventory::Inventory;
use crate::object::{read_object_root, ObjectRootState};
use crate::paths;
use crate::pipeline::{DigestExpectation, DigesterPipeline};
use crate::serde::parse_sidecar;
use crate::spec::SpecVersion;
use crate::types::VersionNum;
use crate::validate::{
    parse_inventory_collecting, ErrorCode, ValidationResult, WarnCode, ROOT_LOCATION,
};

/// Options controlling object validation
#[derive(Debug, Default, Clone)]
pub struct ValidationOptions {
    /// Skip content digest verification
    pub skip_digests: bool,
    /// Worker count for the digest pipeline; defaults to hardware parallelism
    pub concurrency: Option<usize>,
}

/// Validates the object rooted at `root`, returning every fatal error and warning found.
/// An `Err` is returned only for non-validation failures, eg the root directory not
/// existing or cancellation.
pub fn validate_object(
    fs: &dyn FileSystem,
    root: &str,
    opts: &ValidationOptions,
    cancel: &Cancel,
) -> Result<ValidationResult> {
    cancel.check()?;

    let mut result = ValidationResult::new();
    let state = read_object_root(fs, root)?;

    validate_namaste(fs, root, &state, &mut result);
    validate_root_structure(fs, root, &state, &mut result);

    let root_inventory = validate_root_inventory(fs, root, &state, &mut result);

    if let Some(inventory) = &root_inventory {
        result.object_id = Some(inventory.id().to_string());
        info!("Validating object {}", inventory.id());
    }

    validate_version_dir_presence(&state, root_inventory.as_ref(), &mut result);
    validate_version_dirs(fs, root, &state, root_inventory.as_ref(), cancel, &mut result)?;

    if let Some(inventory) = &root_inventory {
        let disk_files = collect_content_files(fs, root, &state, inventory, &mut result)?;
        compare_content_files(inventory, &disk_files, &mut result);

        if !opts.skip_digests {
            verify_content_digests(fs, root, inventory, &disk_files, opts, cancel, &mut result)?;
        }
    }

    Ok(result)
}

fn validate_namaste(
    fs: &dyn FileSystem,
    root: &str,
    state: &ObjectRootState,
    result: &mut ValidationResult,
) {
    if !state.has_namaste() {
        result.error(
            ErrorCode::E003,
            "Object version declaration does not exist".to_string(),
        );
        return;
    }

    if state.has_conflicting_namaste() {
        result.error(
            ErrorCode::E003,
            format!(
                "Object has conflicting version declarations: {}",
                state.namaste_files.join(", ")
            ),
        );
        return;
    }

    let spec = match state.spec {
        Some(spec) => spec,
        None => {
            result.error(
                ErrorCode::E007,
                format!(
                    "Object version declaration is not a known OCFL version: {}",
                    state.namaste_files[0]
                ),
            );
            return;
        }
    };

    match fs.read_bytes(&paths::object_namaste_path(root, spec)) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(contents) => {
                if contents != spec.object_namaste_contents() {
                    result.error(
                        ErrorCode::E007,
                        format!(
                            "Object version declaration is invalid. Expected: {}; Found: {}",
                            spec.object_namaste_contents().trim_end(),
                            contents.trim_end()
                        ),
                    );
                }
            }
            Err(_) => {
                result.error(
                    ErrorCode::E007,
                    "Object version declaration contains invalid UTF-8 content".to_string(),
                );
            }
        },
        Err(_) => {
            result.error(
                ErrorCode::E003,
                "Object version declaration could not be read".to_string(),
            );
        }
    }
}

fn validate_root_structure(
    fs: &dyn FileSystem,
    root: &str,
    state: &ObjectRootState,
    result: &mut ValidationResult,
) {
    for entry in &state.invalid {
        result.error(
            ErrorCode::E001,
            format!("Unexpected file in object root: {}", entry),
        );
    }

    if state.has_extensions {
        if let Ok(listings) = fs.read_dir(&paths::extensions_path(root)) {
            for listing in listings {
                match listing {
                    Listing::Directory(name) => {
                        if !REGISTERED_EXTENSIONS.contains(&name.as_ref()) {
                            result.warn(
                                WarnCode::W013,
                                format!(
                                    "Extensions directory contains an unregistered extension: {}",
                                    name
                                ),
                            );
                        }
                    }
                    listing => {
                        result.error(
                            ErrorCode::E067,
                            format!(
                                "Extensions directory contains an unexpected file: {}",
                                listing.path()
                            ),
                        );
                    }
                }
            }
        }
    }
}

/// Parses and validates the root inventory and its sidecar
fn validate_root_inventory(
    fs: &dyn FileSystem,
    root: &str,
    state: &ObjectRootState,
    result: &mut ValidationResult,
) -> Option<Inventory> {
    if !state.has_inventory {
        result.error_at(
            ROOT_LOCATION,
            ErrorCode::E063,
            "Inventory does not exist".to_string(),
        );
        return None;
    }

    let bytes = match fs.read_bytes(&paths::inventory_path(root)) {
        Ok(bytes) => bytes,
        Err(_) => {
            result.error_at(
                ROOT_LOCATION,
                ErrorCode::E063,
                "Inventory could not be read".to_string(),
            );
            return None;
        }
    };

    let inventory = parse_inventory_collecting(&bytes, ROOT_LOCATION, state.spec, result);

    let algorithm = match &inventory {
        Some(inventory) => Some(inventory.digest_algorithm()),
        None => state.sidecar_algorithm(),
    };

    if let Some(algorithm) = algorithm {
        validate_sidecar(fs, root, ROOT_LOCATION, algorithm, &bytes, result);
    } else if !state.has_sidecar() {
        result.error_at(
            ROOT_LOCATION,
            ErrorCode::E058,
            "Inventory sidecar does not exist".to_string(),
        );
    }

    inventory
}

/// Reads `inventory.json.<alg>` in `dir` and verifies it names the digest of
/// `inventory_bytes`
fn validate_sidecar(
    fs: &dyn FileSystem,
    dir: &str,
    location: &str,
    algorithm: DigestAlgorithm,
    inventory_bytes: &[u8],
    result: &mut ValidationResult,
) {
    let sidecar_path = paths::sidecar_path(dir, algorithm);

    let bytes = match fs.read_bytes(&sidecar_path) {
        Ok(bytes) => bytes,
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E058,
                format!(
                    "Inventory sidecar {} does not exist",
                    paths::sidecar_name(algorithm)
                ),
            );
            return;
        }
    };

    let expected = match parse_sidecar(&bytes) {
        Ok(expected) => expected,
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E061,
                "Inventory sidecar is invalid".to_string(),
            );
            return;
        }
    };

    match algorithm.hash_hex(&mut &inventory_bytes[..]) {
        Ok(actual) => {
            if actual != expected {
                result.error_at(
                    location,
                    ErrorCode::E060,
                    format!(
                        "Inventory does not match expected digest. Expected: {}; Found: {}",
                        expected, actual
                    ),
                );
            }
        }
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E060,
                "Inventory digest could not be computed".to_string(),
            );
        }
    }
}

/// Cross-checks the version directories on disk against the versions in the inventory
fn validate_version_dir_presence(
    state: &ObjectRootState,
    root_inventory: Option<&Inventory>,
    result: &mut ValidationResult,
) {
    let inventory = match root_inventory {
        Some(inventory) => inventory,
        None => return,
    };

    for version_num in inventory.versions().keys() {
        if !state.version_dirs.contains(version_num) {
            result.error(
                ErrorCode::E010,
                format!("Object root is missing version directory '{}'", version_num),
            );
        }
    }

    for version_num in &state.version_dirs {
        if !inventory.versions().contains_key(version_num) {
            result.error(
                ErrorCode::E046,
                format!(
                    "Object root contains version directory '{}' that is not listed in the inventory",
                    version_num
                ),
            );
        }
    }
}

/// Validates the structure and inventory of every version directory, cross-checking
/// against the root inventory
fn validate_version_dirs(
    fs: &dyn FileSystem,
    root: &str,
    state: &ObjectRootState,
    root_inventory: Option<&Inventory>,
    cancel: &Cancel,
    result: &mut ValidationResult,
) -> Result<()> {
    let content_dir = root_inventory
        .map(|inv| inv.defaulted_content_dir().to_string())
        .unwrap_or_else(|| crate::consts::DEFAULT_CONTENT_DIR.to_string());

    let mut previous_spec: Option<SpecVersion> = None;

    for version_num in &state.version_dirs {
        cancel.check()?;

        let location = version_num.to_string();
        let version_dir = paths::version_path(root, *version_num);

        let listings = match fs.read_dir(&version_dir) {
            Ok(listings) => listings,
            Err(_) => continue,
        };

        let mut has_inventory = false;

        for listing in &listings {
            match listing {
                Listing::File(name) => {
                    if name == INVENTORY_FILE {
                        has_inventory = true;
                    } else if name.starts_with(INVENTORY_SIDECAR_PREFIX) {
                        // verified against the inventory's declared algorithm below
                    } else {
                        result.error_at(
                            &location,
                            ErrorCode::E015,
                            format!(
                                "Version directory {} contains an unexpected file: {}",
                                version_num, name
                            ),
                        );
                    }
                }
                Listing::Directory(name) => {
                    if name != content_dir.as_str() {
                        result.warn_at(
                            &location,
                            WarnCode::W002,
                            format!(
                                "Version directory {} contains an unexpected directory: {}",
                                version_num, name
                            ),
                        );
                    }
                }
                Listing::Other(name) => {
                    result.error_at(
                        &location,
                        ErrorCode::E015,
                        format!(
                            "Version directory {} contains an unexpected file: {}",
                            version_num, name
                        ),
                    );
                }
            }
        }

        if !has_inventory {
            result.warn_at(
                &location,
                WarnCode::W010,
                format!(
                    "Version directory {} is missing recommended file inventory.json",
                    version_num
                ),
            );
            continue;
        }

        let bytes = match fs.read_bytes(&paths::inventory_path(&version_dir)) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };

        let version_inventory = parse_inventory_collecting(&bytes, &location, None, result);

        let version_inventory = match version_inventory {
            Some(version_inventory) => version_inventory,
            None => continue,
        };

        validate_sidecar(
            fs,
            &version_dir,
            &location,
            version_inventory.digest_algorithm(),
            &bytes,
            result,
        );

        if version_inventory.head() != *version_num {
            result.error_at(
                &location,
                ErrorCode::E040,
                format!(
                    "Inventory field 'head' must equal '{}'. Found: {}",
                    version_num,
                    version_inventory.head()
                ),
            );
        }

        // spec versions may not regress over the lineage or run ahead of the root
        if let Ok(version_spec) = version_inventory.spec_version() {
            let root_spec = root_inventory.and_then(|inv| inv.spec_version().ok());

            if let Some(root_spec) = root_spec {
                if version_spec > root_spec {
                    result.error_at(
                        &location,
                        ErrorCode::E103,
                        format!(
                            "Version {} inventory declares spec version {} which is newer than the root's {}",
                            version_num, version_spec, root_spec
                        ),
                    );
                }
            }

            if let Some(previous_spec) = previous_spec {
                if version_spec < previous_spec {
                    result.error_at(
                        &location,
                        ErrorCode::E103,
                        format!(
                            "Version {} inventory declares spec version {} which is older than an earlier version's {}",
                            version_num, version_spec, previous_spec
                        ),
                    );
                }
            }

            previous_spec = Some(version_spec);
        }

        if let Some(root_inventory) = root_inventory {
            cross_check_inventories(
                root_inventory,
                *version_num,
                &version_inventory,
                &location,
                result,
            );
        }
    }

    Ok(())
}

/// Compares a version directory's inventory against the root inventory per the spec's
/// consistency rules
fn cross_check_inventories(
    root_inventory: &Inventory,
    version_num: VersionNum,
    version_inventory: &Inventory,
    location: &str,
    result: &mut ValidationResult,
) {
    if root_inventory.id() != version_inventory.id() {
        result.error_at(
            location,
            ErrorCode::E037,
            format!(
                "Inventory field 'id' is inconsistent with the root inventory. Expected: {}; Found: {}",
                root_inventory.id(),
                version_inventory.id()
            ),
        );
    }

    if root_inventory.defaulted_content_dir() != version_inventory.defaulted_content_dir() {
        result.error_at(
            location,
            ErrorCode::E019,
            format!(
                "Inventory field 'contentDirectory' is inconsistent with the root inventory. Expected: {}; Found: {}",
                root_inventory.defaulted_content_dir(),
                version_inventory.defaulted_content_dir()
            ),
        );
    }

    let same_algorithm =
        root_inventory.digest_algorithm() == version_inventory.digest_algorithm();
    let byte_identical = same_algorithm
        && match (root_inventory.digest(), version_inventory.digest()) {
            (Some(root_digest), Some(version_digest)) => root_digest == version_digest,
            _ => false,
        };

    if version_num == root_inventory.head() && !byte_identical {
        result.error_at(
            location,
            ErrorCode::E064,
            "The root inventory and HEAD version inventory must be identical".to_string(),
        );
    }

    if byte_identical {
        return;
    }

    for (block_num, version_block) in version_inventory.versions() {
        let root_block = match root_inventory.versions().get(block_num) {
            Some(root_block) => root_block,
            None => continue,
        };

        let root_state = root_inventory.logical_state(*block_num);
        let version_state = version_inventory.logical_state(*block_num);

        match (root_state, version_state) {
            (Ok(root_state), Ok(version_state)) => {
                if root_state != version_state {
                    result.error_at(
                        location,
                        ErrorCode::E066,
                        format!(
                            "The state of version {} is inconsistent with the root inventory",
                            block_num
                        ),
                    );
                }
            }
            _ => continue,
        }

        if *block_num != version_inventory.head() {
            let meta_differs = root_block.message() != version_block.message()
                || root_block.user() != version_block.user()
                || root_block.created() != version_block.created();

            if meta_differs {
                result.warn_at(
                    location,
                    WarnCode::W011,
                    format!(
                        "The metadata of version {} differs from the root inventory",
                        block_num
                    ),
                );
            }
        }
    }
}

/// Walks every version's content directory, returning the content paths found on disk
/// relative to the object root
fn collect_content_files(
    fs: &dyn FileSystem,
    root: &str,
    state: &ObjectRootState,
    inventory: &Inventory,
    result: &mut ValidationResult,
) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();

    for version_num in &state.version_dirs {
        let content_dir =
            paths::content_path(root, *version_num, inventory.defaulted_content_dir());

        if !fs.exists(&content_dir)? {
            continue;
        }

        match walk_files(fs, &content_dir) {
            Ok(walked) => {
                for file in walked {
                    files.insert(relative_to_root(root, &file));
                }
            }
            Err(OcflError::InvalidFileType { path }) => {
                result.error(
                    ErrorCode::E092,
                    format!("Object contains a non-regular file: {}", path),
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(files)
}

/// Compares the manifest's path set against the files on disk
fn compare_content_files(
    inventory: &Inventory,
    disk_files: &BTreeSet<String>,
    result: &mut ValidationResult,
) {
    for path in inventory.manifest().paths() {
        if !disk_files.contains(path.as_str()) {
            result.error(
                ErrorCode::E092,
                format!(
                    "Inventory manifest references {} but a corresponding file does not exist",
                    path
                ),
            );
        }
    }

    for file in disk_files {
        if !inventory.manifest().contains_path(file) {
            result.error(
                ErrorCode::E023,
                format!("Object contains a file that is not listed in the manifest: {}", file),
            );
        }
    }
}

/// Streams every on-disk manifest file through the digest pipeline and reports
/// mismatches. Fixity digests under recognized algorithms are verified in the same pass.
fn verify_content_digests(
    fs: &dyn FileSystem,
    root: &str,
    inventory: &Inventory,
    disk_files: &BTreeSet<String>,
    opts: &ValidationOptions,
    cancel: &Cancel,
    result: &mut ValidationResult,
) -> Result<()> {
    let algorithm = inventory.digest_algorithm();
    let mut expected_by_path: HashMap<String, DigestExpectation> = HashMap::new();

    for (digest, content_paths) in inventory.manifest().iter() {
        for path in content_paths {
            if !disk_files.contains(path.as_str()) {
                // already reported as E092
                continue;
            }

            let full_path = paths::join(root, path.as_str());
            expected_by_path
                .entry(full_path.clone())
                .or_insert_with(|| DigestExpectation {
                    path: full_path,
                    expected: HashMap::new(),
                })
                .expected
                .insert(algorithm, digest.clone());
        }
    }

    if let Some(fixity) = inventory.fixity() {
        for (algorithm_name, block) in fixity {
            let fixity_algorithm = match DigestAlgorithm::from_str(algorithm_name) {
                Ok(fixity_algorithm) => fixity_algorithm,
                // unknown fixity algorithms are not verifiable; skip them
                Err(_) => continue,
            };

            for (digest, content_paths) in block.iter() {
                for path in content_paths {
                    let full_path = paths::join(root, path.as_str());
                    if let Some(expectation) = expected_by_path.get_mut(&full_path) {
                        expectation.expected.insert(fixity_algorithm, digest.clone());
                    }
                }
            }
        }
    }

    let pipeline = DigesterPipeline::new(fs, opts.concurrency, cancel.clone());
    let mut failures: Vec<OcflError> = Vec::new();

    pipeline.validate(expected_by_path.into_values(), |failure| {
        failures.push(failure);
        Ok(())
    })?;

    for failure in failures {
        match failure {
            OcflError::FixityCheck { path, mismatches } => {
                let joined: Vec<String> =
                    mismatches.iter().map(|m| m.to_string()).collect();
                result.error(
                    ErrorCode::E093,
                    format!(
                        "Content file {} failed fixity check: {}",
                        relative_to_root(root, &path),
                        joined.join("; ")
                    ),
                );
            }
            failure => {
                result.error(ErrorCode::E092, failure.to_string());
            }
        }
    }

    verify_registry_fixity(fs, root, inventory, disk_files, cancel, result)
}

/// Verifies fixity blocks whose algorithms are not built in but are resolvable through
/// the process-wide algorithm registry. Algorithm names the registry does not know are
/// silently dropped.
fn verify_registry_fixity(
    fs: &dyn FileSystem,
    root: &str,
    inventory: &Inventory,
    disk_files: &BTreeSet<String>,
    cancel: &Cancel,
    result: &mut ValidationResult,
) -> Result<()> {
    let fixity = match inventory.fixity() {
        Some(fixity) => fixity,
        None => return Ok(()),
    };

    let registry = match global_registry().read() {
        Ok(registry) => registry,
        Err(_) => return Ok(()),
    };

    let mut expected_by_path: BTreeMap<String, HashMap<String, HexDigest>> = BTreeMap::new();

    for (algorithm_name, block) in fixity {
        if DigestAlgorithm::from_str(algorithm_name).is_ok() {
            // verified in the concurrent pass
            continue;
        }
        if !registry.contains(algorithm_name) {
            continue;
        }

        for (digest, content_paths) in block.iter() {
            for path in content_paths {
                if !disk_files.contains(path.as_str()) {
                    continue;
                }
                expected_by_path
                    .entry(paths::join(root, path.as_str()))
                    .or_default()
                    .insert(algorithm_name.clone(), digest.clone());
            }
        }
    }

    for (path, expected) in expected_by_path {
        cancel.check()?;

        let mut writer = NamedMultiWriter::new(
            expected.keys().map(String::as_str),
            &registry,
            io::sink(),
        );

        if fs.read(&path, &mut writer).is_err() {
            // the concurrent pass already reported unreadable files
            continue;
        }

        let actual = writer.finalize_hex();
        let mut mismatches = Vec::new();

        for (algorithm_name, expected_digest) in expected {
            match actual.get(&algorithm_name) {
                Some(found) if *found == expected_digest => (),
                Some(found) => mismatches.push(DigestMismatch::new(
                    algorithm_name,
                    expected_digest,
                    found.clone(),
                )),
                None => (),
            }
        }

        if !mismatches.is_empty() {
            mismatches.sort_by(|a, b| a.algorithm.cmp(&b.algorithm));
            let joined: Vec<String> = mismatches.iter().map(|m| m.to_string()).collect();
            result.error(
                ErrorCode::E093,
                format!(
                    "Content file {} failed fixity check: {}",
                    relative_to_root(root, &path),
                    joined.join("; ")
                ),
            );
        }
    }

    Ok(())
}

fn relative_to_root(root: &str, path: &str) -> String {
    if root.is_empty() {
        return path.to_string();
    }

    match path.strip_prefix(&format!("{}/", root)) {
        Some(relative) => relative.to_string(),
        None => path.to_string(),
    }
}
