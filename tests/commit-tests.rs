use chrono::{Local, TimeZone};
use common::*;
use ocfl_core::{
    commit, plan_commit, Activity, Cancel, CommitOptions, DigestAlgorithm, DirectoryContent,
    FileSystem, MemoryFs, OcflObject, SpecVersion, VersionNum,
};

mod common;

#[test]
fn commit_creates_new_object() {
    let fs = MemoryFs::new();
    fs.insert("staging/hello.txt", "Hello, OCFL!");

    let inventory = commit_staged(&fs, STAGING_DIR, "initial commit");

    assert_eq!(OBJECT_ID, inventory.id());
    assert_eq!(VersionNum::v1(), inventory.head());

    assert_eq!(
        vec![
            "object/0=ocfl_object_1.1".to_string(),
            "object/inventory.json".to_string(),
            "object/inventory.json.sha512".to_string(),
            "object/v1/content/hello.txt".to_string(),
            "object/v1/inventory.json".to_string(),
            "object/v1/inventory.json.sha512".to_string(),
        ],
        fs.file_paths()
    );

    // the NAMASTE declaration carries its own filename as content
    assert_eq!(
        b"ocfl_object_1.1\n".to_vec(),
        fs.read_bytes("object/0=ocfl_object_1.1").unwrap()
    );

    // the root and version inventories are byte-identical
    let root_bytes = fs.read_bytes("object/inventory.json").unwrap();
    let version_bytes = fs.read_bytes("object/v1/inventory.json").unwrap();
    assert_eq!(root_bytes, version_bytes);

    // the sidecar digest is the digest of the inventory bytes
    let expected_digest = DigestAlgorithm::Sha512
        .hash_hex(&mut root_bytes.as_slice())
        .unwrap();
    let sidecar = String::from_utf8(fs.read_bytes("object/inventory.json.sha512").unwrap()).unwrap();
    assert_eq!(format!("{}  inventory.json\n", expected_digest), sidecar);
    assert_eq!(
        sidecar,
        String::from_utf8(fs.read_bytes("object/v1/inventory.json.sha512").unwrap()).unwrap()
    );

    // the content file landed at its manifest path
    assert_eq!(
        b"Hello, OCFL!".to_vec(),
        fs.read_bytes("object/v1/content/hello.txt").unwrap()
    );

    assert_no_problems(&validate(&fs));
}

#[test]
fn unchanged_commit_is_rejected() {
    let fs = MemoryFs::new();
    fs.insert("staging/hello.txt", "Hello, OCFL!");
    commit_staged(&fs, STAGING_DIR, "initial commit");

    let cancel = Cancel::new();
    let prior = OcflObject::open(&fs, OBJECT_ROOT).unwrap().inventory().clone();

    let content = DirectoryContent::scan(
        &fs,
        STAGING_DIR,
        DigestAlgorithm::Sha512,
        &[],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    let err = commit(
        &fs,
        OBJECT_ROOT,
        Some(&prior),
        &stage,
        &sample_meta("identical"),
        &CommitOptions::default(),
        &cancel,
    )
    .unwrap_err();

    assert!(!err.dirty);
    assert!(
        err.source.to_string().contains("version state unchanged"),
        "Unexpected error: {}",
        err
    );
}

#[test]
fn unchanged_commit_is_permitted_when_allowed() {
    let fs = MemoryFs::new();
    fs.insert("staging/hello.txt", "Hello, OCFL!");
    commit_staged(&fs, STAGING_DIR, "initial commit");

    let cancel = Cancel::new();
    let prior = OcflObject::open(&fs, OBJECT_ROOT).unwrap().inventory().clone();

    let content = DirectoryContent::scan(
        &fs,
        STAGING_DIR,
        DigestAlgorithm::Sha512,
        &[],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    let inventory = commit(
        &fs,
        OBJECT_ROOT,
        Some(&prior),
        &stage,
        &sample_meta("identical"),
        &CommitOptions {
            allow_unchanged: true,
            ..Default::default()
        },
        &cancel,
    )
    .unwrap();

    assert_eq!(VersionNum::new(2), inventory.head());
    assert_eq!(
        inventory.version(VersionNum::v1()).unwrap().state(),
        inventory.head_version().state()
    );

    // no content is copied for an unchanged version
    assert!(!fs.exists("object/v2/content").unwrap());

    assert_no_problems(&validate(&fs));
}

#[test]
fn commit_second_version_dedups_existing_content() {
    let fs = MemoryFs::new();
    commit_sample_object(&fs);

    fs.insert("staging2/hello.txt", "Hello, OCFL!");
    fs.insert("staging2/dir/nested.txt", "updated content");
    let inventory = commit_staged(&fs, "staging2", "second version");

    assert_eq!(VersionNum::new(2), inventory.head());

    // unchanged content keeps its v1 manifest path
    let hello_digest = DigestAlgorithm::Sha512
        .hash_hex(&mut "Hello, OCFL!".as_bytes())
        .unwrap();
    let paths: Vec<&str> = inventory
        .manifest()
        .paths_for(&hello_digest)
        .unwrap()
        .iter()
        .map(|p| p.as_str())
        .collect();
    assert_eq!(vec!["v1/content/hello.txt"], paths);

    // changed content is copied into v2
    assert!(fs.exists("object/v2/content/dir/nested.txt").unwrap());
    assert!(!fs.exists("object/v2/content/hello.txt").unwrap());

    assert_no_problems(&validate(&fs));
}

#[test]
fn commit_plan_orders_activities() {
    let fs = MemoryFs::new();
    fs.insert("staging/hello.txt", "Hello, OCFL!");

    let cancel = Cancel::new();
    let content = DirectoryContent::scan(
        &fs,
        STAGING_DIR,
        DigestAlgorithm::Sha512,
        &[],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    let plan = plan_commit(
        None,
        &stage,
        &sample_meta("initial commit"),
        &CommitOptions::default(),
    )
    .unwrap();

    let activities = plan.activities();
    assert_eq!(4, activities.len());

    assert_eq!(
        Activity::WriteNamaste {
            spec: SpecVersion::Ocfl1_1
        },
        activities[0]
    );
    assert!(matches!(&activities[1], Activity::CopyContent { dst_path, .. }
        if dst_path == "v1/content/hello.txt"));
    assert_eq!(
        Activity::WriteInventory {
            dir: "v1".to_string()
        },
        activities[2]
    );
    // the root inventory is always written last
    assert_eq!(
        Activity::WriteInventory { dir: String::new() },
        activities[3]
    );
}

#[test]
fn upgrade_spec_replaces_namaste() {
    let fs = MemoryFs::new();
    fs.insert("staging/hello.txt", "Hello, OCFL!");

    let cancel = Cancel::new();
    let content = DirectoryContent::scan(
        &fs,
        STAGING_DIR,
        DigestAlgorithm::Sha512,
        &[],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    commit(
        &fs,
        OBJECT_ROOT,
        None,
        &stage,
        &sample_meta("initial commit").with_spec(Some(SpecVersion::Ocfl1_0)),
        &CommitOptions::default(),
        &cancel,
    )
    .unwrap();

    assert!(fs.exists("object/0=ocfl_object_1.0").unwrap());

    fs.insert("staging2/hello.txt", "Hello, OCFL!");
    fs.insert("staging2/second.txt", "more");
    let prior = OcflObject::open(&fs, OBJECT_ROOT).unwrap().inventory().clone();

    let content = DirectoryContent::scan(
        &fs,
        "staging2",
        DigestAlgorithm::Sha512,
        &[],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    let inventory = commit(
        &fs,
        OBJECT_ROOT,
        Some(&prior),
        &stage,
        &sample_meta("upgrade").with_spec(Some(SpecVersion::Ocfl1_1)),
        &CommitOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(SpecVersion::Ocfl1_1, inventory.spec_version().unwrap());
    assert!(!fs.exists("object/0=ocfl_object_1.0").unwrap());
    assert!(fs.exists("object/0=ocfl_object_1.1").unwrap());
}

#[test]
fn content_path_fn_rewrites_content_paths() {
    let fs = MemoryFs::new();
    fs.insert("staging/dir/nested.txt", "nested content");

    let cancel = Cancel::new();
    let content = DirectoryContent::scan(
        &fs,
        STAGING_DIR,
        DigestAlgorithm::Sha512,
        &[],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    let opts = CommitOptions {
        content_path_fn: Some(Box::new(|logical| {
            format!("flat/{}", logical.filename())
        })),
        ..Default::default()
    };

    let inventory = commit(
        &fs,
        OBJECT_ROOT,
        None,
        &stage,
        &sample_meta("flattened layout"),
        &opts,
        &cancel,
    )
    .unwrap();

    let digest = DigestAlgorithm::Sha512
        .hash_hex(&mut "nested content".as_bytes())
        .unwrap();
    let paths: Vec<&str> = inventory
        .manifest()
        .paths_for(&digest)
        .unwrap()
        .iter()
        .map(|p| p.as_str())
        .collect();
    assert_eq!(vec!["v1/content/flat/nested.txt"], paths);

    // the logical state is unaffected by the rewrite
    assert!(inventory
        .head_version()
        .state()
        .contains_path("dir/nested.txt"));

    assert!(fs.exists("object/v1/content/flat/nested.txt").unwrap());
    assert_no_problems(&validate(&fs));
}

#[test]
fn pinned_created_produces_deterministic_inventories() {
    let created = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    let mut outputs = Vec::new();

    for _ in 0..2 {
        let fs = MemoryFs::new();
        fs.insert("staging/hello.txt", "Hello, OCFL!");

        let cancel = Cancel::new();
        let content = DirectoryContent::scan(
            &fs,
            STAGING_DIR,
            DigestAlgorithm::Sha512,
            &[],
            None,
            &cancel,
        )
        .unwrap();
        let stage = content.stage(DigestAlgorithm::Sha512);

        commit(
            &fs,
            OBJECT_ROOT,
            None,
            &stage,
            &sample_meta("deterministic").with_created(Some(created)),
            &CommitOptions::default(),
            &cancel,
        )
        .unwrap();

        outputs.push(fs.read_bytes("object/inventory.json").unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn commit_records_fixity_from_the_stage() {
    let fs = MemoryFs::new();
    fs.insert("staging/hello.txt", "Hello, OCFL!");

    let cancel = Cancel::new();
    let content = DirectoryContent::scan(
        &fs,
        STAGING_DIR,
        DigestAlgorithm::Sha512,
        &[DigestAlgorithm::Md5],
        None,
        &cancel,
    )
    .unwrap();
    let stage = content.stage(DigestAlgorithm::Sha512);

    let inventory = commit(
        &fs,
        OBJECT_ROOT,
        None,
        &stage,
        &sample_meta("with fixity"),
        &CommitOptions::default(),
        &cancel,
    )
    .unwrap();

    let fixity = inventory.fixity().unwrap();
    let md5_block = fixity.get("md5").unwrap();
    let expected_md5 = DigestAlgorithm::Md5
        .hash_hex(&mut "Hello, OCFL!".as_bytes())
        .unwrap();

    assert!(md5_block.contains_digest(&expected_md5));
    assert!(md5_block.contains_path("v1/content/hello.txt"));

    assert_no_problems(&validate(&fs));
}
