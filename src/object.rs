//! Object root detection and reading. The root state machine lists a directory exactly
//! once and classifies every entry; the reader builds on it to load and verify the root
//! inventory.

use std::convert::TryFrom;
use std::io::Read;

use log::info;

use crate::consts::{EXTENSIONS_DIR, INVENTORY_FILE, INVENTORY_SIDECAR_PREFIX, OBJECT_NAMASTE_PREFIX};
use crate::digest::DigestAlgorithm;
use crate::error::{OcflError, Result};
use crate::fs::{FileSystem, Listing};
use crate::inventory::Inventory;
use crate::paths;
use crate::serde::{parse_inventory, parse_sidecar, sidecar_algorithm};
use crate::spec::SpecVersion;
use crate::types::{InventoryPath, VersionNum};

/// What was found in an object root directory, computed from a single listing
#[derive(Debug, Default)]
pub struct ObjectRootState {
    /// The spec version declared by the NAMASTE file, when exactly one valid declaration
    /// exists
    pub spec: Option<SpecVersion>,
    /// Every `0=ocfl_object_*` file found. More than one is a fatal conflict.
    pub namaste_files: Vec<String>,
    /// True if `inventory.json` exists
    pub has_inventory: bool,
    /// Every `inventory.json.*` sidecar found
    pub sidecar_files: Vec<String>,
    /// Version directories, sorted ascending
    pub version_dirs: Vec<VersionNum>,
    /// True if an `extensions/` directory exists
    pub has_extensions: bool,
    /// Entries that do not belong in an object root
    pub invalid: Vec<String>,
}

impl ObjectRootState {
    pub fn has_namaste(&self) -> bool {
        !self.namaste_files.is_empty()
    }

    pub fn has_conflicting_namaste(&self) -> bool {
        self.namaste_files.len() > 1
    }

    pub fn has_sidecar(&self) -> bool {
        !self.sidecar_files.is_empty()
    }

    /// The algorithm named by the sidecar, when exactly one recognizable sidecar exists
    pub fn sidecar_algorithm(&self) -> Option<DigestAlgorithm> {
        if self.sidecar_files.len() != 1 {
            return None;
        }
        sidecar_algorithm(&self.sidecar_files[0])
    }
}

/// Lists an object root exactly once and classifies its entries
pub fn read_object_root(fs: &dyn FileSystem, root: &str) -> Result<ObjectRootState> {
    let mut state = ObjectRootState::default();

    for entry in fs.read_dir(root)? {
        match &entry {
            Listing::File(name) => {
                if name.starts_with(OBJECT_NAMASTE_PREFIX) {
                    if state.namaste_files.is_empty() {
                        state.spec = SpecVersion::try_from_namaste_filename(name).ok();
                    } else {
                        state.spec = None;
                    }
                    state.namaste_files.push(name.to_string());
                } else if name == INVENTORY_FILE {
                    state.has_inventory = true;
                } else if name.starts_with(INVENTORY_SIDECAR_PREFIX) {
                    state.sidecar_files.push(name.to_string());
                } else {
                    state.invalid.push(name.to_string());
                }
            }
            Listing::Directory(name) => {
                if name == EXTENSIONS_DIR {
                    state.has_extensions = true;
                } else if let Ok(version_num) = VersionNum::try_from(name.as_ref()) {
                    state.version_dirs.push(version_num);
                } else {
                    state.invalid.push(name.to_string());
                }
            }
            Listing::Other(name) => {
                state.invalid.push(name.to_string());
            }
        }
    }

    state.version_dirs.sort_unstable();
    state.namaste_files.sort_unstable();
    state.sidecar_files.sort_unstable();
    state.invalid.sort_unstable();

    Ok(state)
}

/// An open OCFL object: its root state plus its verified root inventory. The filesystem
/// reference is borrowed for the lifetime of the reader.
pub struct OcflObject<'a> {
    fs: &'a dyn FileSystem,
    root: String,
    state: ObjectRootState,
    inventory: Inventory,
}

impl<'a> OcflObject<'a> {
    /// Opens the object rooted at `root`. The NAMASTE declaration and inventory must
    /// exist, the inventory must parse strictly, and its digest must match the sidecar.
    /// This is a strict read path; for a full report of problems use the object
    /// validator instead.
    pub fn open(fs: &'a dyn FileSystem, root: &str) -> Result<Self> {
        let state = read_object_root(fs, root)?;

        if !state.has_namaste() {
            return Err(OcflError::CorruptObject {
                object_id: root.to_string(),
                message: "Object version declaration does not exist".to_string(),
            });
        }

        if state.has_conflicting_namaste() {
            return Err(OcflError::CorruptObject {
                object_id: root.to_string(),
                message: format!(
                    "Object has conflicting version declarations: {}",
                    state.namaste_files.join(", ")
                ),
            });
        }

        if !state.has_inventory {
            return Err(OcflError::CorruptObject {
                object_id: root.to_string(),
                message: "Inventory does not exist".to_string(),
            });
        }

        let bytes = fs.read_bytes(&paths::inventory_path(root))?;
        let inventory = parse_inventory(&bytes)?;

        verify_sidecar(fs, root, &inventory)?;

        info!("Opened object {}", inventory.id());

        Ok(Self {
            fs,
            root: root.to_string(),
            state,
            inventory,
        })
    }

    pub fn id(&self) -> &str {
        self.inventory.id()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn head(&self) -> VersionNum {
        self.inventory.head()
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn root_state(&self) -> &ObjectRootState {
        &self.state
    }

    /// Loads a version directory's inventory, or None when the directory does not carry
    /// one (permitted; the root inventory is authoritative).
    pub fn version_inventory(&self, version_num: VersionNum) -> Result<Option<Inventory>> {
        let version_dir = paths::version_path(&self.root, version_num);
        let inventory_path = paths::inventory_path(&version_dir);

        match self.fs.read_bytes(&inventory_path) {
            Ok(bytes) => Ok(Some(parse_inventory(&bytes)?)),
            Err(OcflError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves a complete view of a version's files
    pub fn version_view(&self, version_num: VersionNum) -> Result<crate::types::VersionView> {
        self.inventory.version_view(version_num)
    }

    /// Opens the content file backing a logical path in the specified version
    pub fn open_content_file(
        &self,
        logical_path: &InventoryPath,
        version_num: VersionNum,
    ) -> Result<Box<dyn Read + Send>> {
        let content_path = self
            .inventory
            .content_path_for_logical_path(logical_path, version_num)?;

        self.fs
            .open_file(&paths::join(&self.root, content_path.as_str()))
    }
}

/// Verifies that the root sidecar exists, parses, and matches the inventory digest
fn verify_sidecar(fs: &dyn FileSystem, root: &str, inventory: &Inventory) -> Result<()> {
    let sidecar_path = paths::sidecar_path(root, inventory.digest_algorithm());

    let bytes = match fs.read_bytes(&sidecar_path) {
        Ok(bytes) => bytes,
        Err(OcflError::NotFound(_)) => {
            return Err(OcflError::CorruptObject {
                object_id: inventory.id().to_string(),
                message: format!("Inventory sidecar {} does not exist", sidecar_path),
            })
        }
        Err(e) => return Err(e),
    };

    let expected = parse_sidecar(&bytes).map_err(|_| OcflError::CorruptObject {
        object_id: inventory.id().to_string(),
        message: "Inventory sidecar is invalid".to_string(),
    })?;

    match inventory.digest() {
        Some(digest) if *digest == expected => Ok(()),
        Some(digest) => Err(OcflError::CorruptObject {
            object_id: inventory.id().to_string(),
            message: format!(
                "Inventory does not match expected digest. Expected: {}; Found: {}",
                expected, digest
            ),
        }),
        None => Err(OcflError::CorruptObject {
            object_id: inventory.id().to_string(),
            message: "Inventory digest was not computed".to_string(),
        }),
    }
}
