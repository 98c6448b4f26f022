use common::*;
use ocfl_core::{ErrorCode, MemoryFs, WarnCode, WriteFileSystem};

mod common;

#[test]
fn valid_object_passes_validation() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    let result = validate(&fs);

    assert_no_problems(&result);
    assert_eq!(Some(OBJECT_ID.to_string()), result.object_id);
}

#[test]
fn missing_namaste() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.remove("object/0=ocfl_object_1.1").unwrap();

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E003,
        "Object version declaration does not exist",
    );
}

#[test]
fn bad_namaste_contents() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/0=ocfl_object_1.1", "This is not the right content!\n");

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E007,
        "Object version declaration is invalid",
    );
}

#[test]
fn extra_file_in_root() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/README.txt", "extra");

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E001,
        "Unexpected file in object root: README.txt",
    );
}

#[test]
fn sidecar_digest_mismatch() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    let zeros = "0".repeat(128);
    fs.insert(
        "object/inventory.json.sha512",
        format!("{}  inventory.json\n", zeros),
    );

    let result = validate(&fs);

    assert_has_error(
        &result,
        ErrorCode::E060,
        "Inventory does not match expected digest",
    );
}

#[test]
fn malformed_sidecar() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/inventory.json.sha512", "garbage");

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(&result, ErrorCode::E061, "Inventory sidecar is invalid");
}

#[test]
fn missing_root_inventory() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.remove("object/inventory.json").unwrap();

    let result = validate(&fs);

    assert_has_error(&result, ErrorCode::E063, "Inventory does not exist");
}

#[test]
fn malformed_root_inventory() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/inventory.json", "{not json");

    let result = validate(&fs);

    assert_has_error(&result, ErrorCode::E033, "Inventory could not be parsed");
    // the sidecar no longer matches the rewritten bytes either
    assert_has_error(
        &result,
        ErrorCode::E060,
        "Inventory does not match expected digest",
    );
}

#[test]
fn missing_version_inventory_is_a_warning() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.remove("object/v1/inventory.json").unwrap();
    fs.remove("object/v1/inventory.json.sha512").unwrap();

    let result = validate(&fs);

    assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);
    assert_has_warning(
        &result,
        WarnCode::W010,
        "Version directory v1 is missing recommended file inventory.json",
    );
}

#[test]
fn version_inventory_missing_sidecar() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.remove("object/v1/inventory.json.sha512").unwrap();

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E058,
        "Inventory sidecar inventory.json.sha512 does not exist",
    );
}

#[test]
fn extra_file_in_version_dir() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/v1/stray.txt", "extra");

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E015,
        "Version directory v1 contains an unexpected file: stray.txt",
    );
}

#[test]
fn extra_dir_in_version_dir_is_a_warning() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/v1/extra-dir/file.txt", "extra");

    let result = validate(&fs);

    assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);
    assert_has_warning(
        &result,
        WarnCode::W002,
        "Version directory v1 contains an unexpected directory: extra-dir",
    );
}

#[test]
fn content_file_missing_from_disk() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.remove("object/v1/content/hello.txt").unwrap();

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E092,
        "Inventory manifest references v1/content/hello.txt but a corresponding file does not exist",
    );
}

#[test]
fn content_file_not_in_manifest() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/v1/content/orphan.txt", "orphan");

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E023,
        "Object contains a file that is not listed in the manifest: v1/content/orphan.txt",
    );
}

#[test]
fn corrupt_content_file_fails_fixity() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/v1/content/hello.txt", "Tampered!");

    let result = validate(&fs);

    assert_error_count(&result, 1);
    assert_has_error(
        &result,
        ErrorCode::E093,
        "Content file v1/content/hello.txt failed fixity check",
    );
}

#[test]
fn corrupt_content_is_ignored_when_skipping_digests() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/v1/content/hello.txt", "Tampered!");

    let result = ocfl_core::validate_object(
        &fs,
        OBJECT_ROOT,
        &ocfl_core::ValidationOptions {
            skip_digests: true,
            concurrency: None,
        },
        &ocfl_core::Cancel::new(),
    )
    .unwrap();

    assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);
}

#[test]
fn version_dir_not_in_inventory() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/v2/content/new.txt", "not committed");

    let result = validate(&fs);

    assert_has_error(
        &result,
        ErrorCode::E046,
        "Object root contains version directory 'v2' that is not listed in the inventory",
    );
}

#[test]
fn unregistered_extension_is_a_warning() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/extensions/9999-custom-ext/config.json", "{}");

    let result = validate(&fs);

    assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors);
    assert_has_warning(
        &result,
        WarnCode::W013,
        "Extensions directory contains an unregistered extension: 9999-custom-ext",
    );
}

#[test]
fn file_in_extensions_dir() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("object/extensions/stray.txt", "extra");

    let result = validate(&fs);

    assert_has_error(
        &result,
        ErrorCode::E067,
        "Extensions directory contains an unexpected file: stray.txt",
    );
}

#[test]
fn multi_version_object_passes_validation() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("staging2/hello.txt", "Hello, OCFL!");
    fs.insert("staging2/dir/nested.txt", "updated content");
    fs.insert("staging2/new.txt", "brand new");
    commit_staged(&fs, "staging2", "second version");

    let result = validate(&fs);

    assert_no_problems(&result);
}

#[test]
fn tampered_version_state_in_root_inventory() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("staging2/hello.txt", "Hello, OCFL!");
    fs.insert("staging2/dir/nested.txt", "updated content");
    commit_staged(&fs, "staging2", "second version");

    // rewrite v1's inventory so its recorded state no longer matches the root's
    let mut value: serde_json::Value =
        serde_json::from_slice(&read(&fs, "object/v1/inventory.json")).unwrap();
    let state = value["versions"]["v1"]["state"].as_object_mut().unwrap();
    let (digest, _) = state.iter().next().map(|(k, v)| (k.clone(), v.clone())).unwrap();
    state.insert(digest, serde_json::json!(["renamed.txt"]));
    let bytes = serde_json::to_vec_pretty(&value).unwrap();

    let digest = ocfl_core::DigestAlgorithm::Sha512
        .hash_hex(&mut bytes.as_slice())
        .unwrap();
    fs.insert("object/v1/inventory.json", bytes);
    fs.insert(
        "object/v1/inventory.json.sha512",
        ocfl_core::format_sidecar(&digest),
    );

    let result = validate(&fs);

    assert_has_error(
        &result,
        ErrorCode::E066,
        "The state of version v1 is inconsistent with the root inventory",
    );
}

#[test]
fn fixity_blocks_are_verified() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    let md5 = ocfl_core::DigestAlgorithm::Md5
        .hash_hex(&mut "Hello, OCFL!".as_bytes())
        .unwrap();

    rewrite_inventories(&fs, |value| {
        value.as_object_mut().unwrap().insert(
            "fixity".to_string(),
            serde_json::json!({
                "md5": { (md5.as_str()): ["v1/content/hello.txt"] }
            }),
        );
    });

    assert_no_problems(&validate(&fs));

    // and a wrong fixity digest is a fixity failure
    rewrite_inventories(&fs, |value| {
        value["fixity"] = serde_json::json!({
            "md5": { "00000000000000000000000000000000": ["v1/content/hello.txt"] }
        });
    });

    let result = validate(&fs);
    assert_has_error(
        &result,
        ErrorCode::E093,
        "Content file v1/content/hello.txt failed fixity check: md5",
    );
}

#[test]
fn registry_algorithms_verify_fixity() {
    use sha2::{Digest, Sha512};

    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    // sha512 under an alias only the registry knows about
    ocfl_core::register_algorithm("sha512-alt", || Box::new(Sha512::new()));

    let alt = ocfl_core::DigestAlgorithm::Sha512
        .hash_hex(&mut "Hello, OCFL!".as_bytes())
        .unwrap();

    rewrite_inventories(&fs, |value| {
        value.as_object_mut().unwrap().insert(
            "fixity".to_string(),
            serde_json::json!({
                "sha512-alt": { (alt.as_str()): ["v1/content/hello.txt"] },
                "not-registered": { "ffff": ["v1/content/hello.txt"] }
            }),
        );
    });

    // the unregistered algorithm is silently dropped; the alias verifies cleanly
    assert_no_problems(&validate(&fs));

    rewrite_inventories(&fs, |value| {
        value["fixity"]["sha512-alt"] = serde_json::json!({
            "0000": ["v1/content/hello.txt"]
        });
    });

    let result = validate(&fs);
    assert_has_error(
        &result,
        ErrorCode::E093,
        "Content file v1/content/hello.txt failed fixity check: sha512-alt",
    );
}

fn read(fs: &MemoryFs, path: &str) -> Vec<u8> {
    use ocfl_core::FileSystem;
    fs.read_bytes(path).unwrap()
}
