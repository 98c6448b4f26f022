//! A library for reading, validating, and writing [OCFL](https://ocfl.io/) v1.0/v1.1
//! objects: versioned, content-addressed file hierarchies whose complete history is
//! reconstructable from a root inventory and per-version state maps.
//!
//! Open and validate an object:
//!
//! ```rust,no_run
//! use ocfl_core::{validate_object, Cancel, LocalFs, ValidationOptions};
//!
//! # fn main() -> ocfl_core::Result<()> {
//! let fs = LocalFs::new("path/to/storage")?;
//! let result = validate_object(&fs, "path/to/object", &ValidationOptions::default(), &Cancel::new())?;
//!
//! for error in &result.errors {
//!     eprintln!("[{}] {}", error.code, error.text);
//! }
//! # Ok(())
//! # }
//! ```

pub use self::cancel::Cancel;
pub use self::commit::{
    commit, execute_plan, plan_commit, Activity, CommitOptions, CommitPlan, ContentPathFn,
};
pub use self::digest::{
    global_registry, register_algorithm, AlgorithmRegistry, DigestAlgorithm, DigestFactory,
    DigestReader, DigestWriter, HexDigest, MultiDigestWriter, NamedMultiWriter,
};
pub use self::digest_map::{DigestMap, MapError, PathDiff, PathMap};
pub use self::error::{not_found, CommitError, DigestMismatch, OcflError, Result};
pub use self::fs::{walk_files, FileSystem, Listing, LocalFs, MemoryFs, WriteFileSystem};
pub use self::inventory::{Inventory, User, Version};
pub use self::object::{read_object_root, ObjectRootState, OcflObject};
pub use self::pipeline::{DigestExpectation, DigestJob, DigestOutcome, DigesterPipeline};
pub use self::serde::{
    format_sidecar, parse_inventory, parse_sidecar, serialize_inventory, sidecar_algorithm,
};
pub use self::spec::SpecVersion;
pub use self::stage::{ContentSource, DirectoryContent, FixitySource, Stage};
pub use self::types::{
    lineage_head, valid_lineage, CommitMeta, FileDetails, InventoryPath, VersionDetails,
    VersionNum, VersionView,
};
pub use self::validate::{
    validate_inventory, validate_inventory_bytes, validate_object, ErrorCode, ValidationError,
    ValidationOptions, ValidationResult, ValidationWarning, WarnCode,
};

mod cancel;
mod commit;
pub mod consts;
mod digest;
mod digest_map;
mod error;
mod fs;
mod inventory;
mod object;
pub mod paths;
mod pipeline;
mod serde;
mod spec;
mod stage;
mod types;
mod validate;
