use const_format::concatcp;

pub const INVENTORY_FILE: &str = "inventory.json";
pub const INVENTORY_SIDECAR_PREFIX: &str = concatcp!(INVENTORY_FILE, ".");
pub const EXTENSIONS_DIR: &str = "extensions";

pub const DEFAULT_CONTENT_DIR: &str = "content";

pub const OBJECT_NAMASTE_PREFIX: &str = "0=ocfl_object_";

pub const OCFL_VERSION_1_0: &str = "1.0";
pub const OCFL_VERSION_1_1: &str = "1.1";

pub const OBJECT_NAMASTE_FILE_1_0: &str = concatcp!(OBJECT_NAMASTE_PREFIX, OCFL_VERSION_1_0);
pub const OBJECT_NAMASTE_FILE_1_1: &str = concatcp!(OBJECT_NAMASTE_PREFIX, OCFL_VERSION_1_1);

pub const OBJECT_NAMASTE_CONTENTS_1_0: &str = concatcp!("ocfl_object_", OCFL_VERSION_1_0, "\n");
pub const OBJECT_NAMASTE_CONTENTS_1_1: &str = concatcp!("ocfl_object_", OCFL_VERSION_1_1, "\n");

pub const INVENTORY_TYPE_1_0: &str =
    concatcp!("https://ocfl.io/", OCFL_VERSION_1_0, "/spec/#inventory");
pub const INVENTORY_TYPE_1_1: &str =
    concatcp!("https://ocfl.io/", OCFL_VERSION_1_1, "/spec/#inventory");

/// Extension names registered with the OCFL community extensions repository. Anything
/// else under `extensions/` produces W013.
pub const REGISTERED_EXTENSIONS: &[&str] = &[
    "0001-digest-algorithms",
    "0002-flat-direct-storage-layout",
    "0003-hash-and-id-n-tuple-storage-layout",
    "0004-hashed-n-tuple-storage-layout",
    "0005-mutable-head",
    "0006-flat-omit-prefix-storage-layout",
    "0007-n-tuple-omit-prefix-storage-layout",
    "0008-schema-registry",
];
