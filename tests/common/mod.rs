//! Helpers shared by the integration tests: fixture objects are built with the commit
//! pipeline against an in-memory filesystem and then mutated to produce invalid states.

#![allow(dead_code)]

use ocfl_core::{
    commit, validate_object, Cancel, CommitMeta, CommitOptions, DigestAlgorithm,
    DirectoryContent, ErrorCode, Inventory, MemoryFs, OcflObject, ValidationOptions,
    ValidationResult, WarnCode,
};

pub const OBJECT_ROOT: &str = "object";
pub const STAGING_DIR: &str = "staging";
pub const OBJECT_ID: &str = "urn:example:test-object";

pub fn seed_staging(fs: &MemoryFs) {
    fs.insert("staging/hello.txt", "Hello, OCFL!");
    fs.insert("staging/dir/nested.txt", "nested content");
}

pub fn sample_meta(message: &str) -> CommitMeta {
    CommitMeta::new()
        .with_object_id(OBJECT_ID)
        .with_user(
            Some("Test User".to_string()),
            Some("mailto:test@example.com".to_string()),
        )
        .unwrap()
        .with_message(Some(message.to_string()))
}

/// Commits the contents of `staging_dir` as the object's next version
pub fn commit_staged(fs: &MemoryFs, staging_dir: &str, message: &str) -> Inventory {
    let cancel = Cancel::new();

    let prior = match OcflObject::open(fs, OBJECT_ROOT) {
        Ok(object) => Some(object.inventory().clone()),
        Err(_) => None,
    };

    let content = DirectoryContent::scan(
        fs,
        staging_dir,
        DigestAlgorithm::Sha512,
        &[],
        Some(2),
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    commit(
        fs,
        OBJECT_ROOT,
        prior.as_ref(),
        &stage,
        &sample_meta(message),
        &CommitOptions::default(),
        &cancel,
    )
    .unwrap()
}

/// Builds a complete valid object with a single version
pub fn commit_sample_object(fs: &MemoryFs) -> Inventory {
    seed_staging(fs);
    commit_staged(fs, STAGING_DIR, "initial commit")
}

pub fn validate(fs: &MemoryFs) -> ValidationResult {
    validate_object(fs, OBJECT_ROOT, &ValidationOptions::default(), &Cancel::new()).unwrap()
}

pub fn assert_no_problems(result: &ValidationResult) {
    assert!(
        !result.has_errors(),
        "Expected no errors. Found: {:?}",
        result.errors
    );
    assert!(
        !result.has_warnings(),
        "Expected no warnings. Found: {:?}",
        result.warnings
    );
}

pub fn assert_error_count(result: &ValidationResult, count: usize) {
    assert_eq!(
        count,
        result.errors.len(),
        "Expected {} errors. Found: {:?}",
        count,
        result.errors
    );
}

pub fn assert_has_error(result: &ValidationResult, code: ErrorCode, fragment: &str) {
    let matching = result.errors_with_code(code);
    assert!(
        matching.iter().any(|e| e.text.contains(fragment)),
        "Expected an {} error containing '{}'. Found: {:?}",
        code,
        fragment,
        result.errors
    );
}

pub fn assert_has_warning(result: &ValidationResult, code: WarnCode, fragment: &str) {
    let matching = result.warnings_with_code(code);
    assert!(
        matching.iter().any(|w| w.text.contains(fragment)),
        "Expected a {} warning containing '{}'. Found: {:?}",
        code,
        fragment,
        result.warnings
    );
}

/// Applies a JSON-level mutation to the object's root inventory and rewrites the root
/// and head version copies, plus their sidecars, so the object stays byte-consistent.
pub fn rewrite_inventories(fs: &MemoryFs, mutate: impl FnOnce(&mut serde_json::Value)) {
    use ocfl_core::FileSystem;

    let mut value: serde_json::Value =
        serde_json::from_slice(&fs.read_bytes("object/inventory.json").unwrap()).unwrap();

    mutate(&mut value);

    let head = value["head"].as_str().unwrap().to_string();
    let bytes = serde_json::to_vec_pretty(&value).unwrap();
    let digest = DigestAlgorithm::Sha512
        .hash_hex(&mut bytes.as_slice())
        .unwrap();
    let sidecar = ocfl_core::format_sidecar(&digest);

    fs.insert("object/inventory.json", bytes.clone());
    fs.insert("object/inventory.json.sha512", sidecar.clone());
    fs.insert(&format!("object/{}/inventory.json", head), bytes);
    fs.insert(&format!("object/{}/inventory.json.sha512", head), sidecar);
}
