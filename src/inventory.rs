use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_CONTENT_DIR;
use crate::digest::{DigestAlgorithm, HexDigest};
use crate::digest_map::{DigestMap, PathDiff};
use crate::error::{not_found, OcflError, Result};
use crate::spec::SpecVersion;
use crate::types::{FileDetails, InventoryPath, VersionDetails, VersionNum, VersionView};

/// An OCFL inventory: the JSON document describing an object's id, digest algorithm,
/// manifest, and per-version state. Immutable once constructed; operations that change an
/// inventory produce a new value.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Inventory {
    id: String,
    #[serde(rename = "type")]
    type_declaration: String,
    digest_algorithm: DigestAlgorithm,
    head: VersionNum,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_directory: Option<String>,
    manifest: DigestMap,
    versions: BTreeMap<VersionNum, Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixity: Option<BTreeMap<String, DigestMap>>,

    /// The digest of the JSON bytes this inventory was parsed from or serialized to,
    /// computed under `digest_algorithm`. This is the value the sidecar must carry.
    #[serde(skip)]
    digest: Option<HexDigest>,
}

/// A single version block within an inventory
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Version {
    created: DateTime<Local>,
    state: DigestMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

/// The user recorded on a version
#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

impl Inventory {
    /// Assembles an inventory from its parts, verifying that the head version exists.
    /// Full rule validation is the validator's job; this only guards the invariants the
    /// accessors rely on.
    pub fn new(
        id: String,
        type_declaration: String,
        digest_algorithm: DigestAlgorithm,
        head: VersionNum,
        content_directory: Option<String>,
        manifest: DigestMap,
        versions: BTreeMap<VersionNum, Version>,
        fixity: Option<BTreeMap<String, DigestMap>>,
    ) -> Result<Self> {
        let inventory = Self {
            id,
            type_declaration,
            digest_algorithm,
            head,
            content_directory,
            manifest,
            versions,
            fixity,
            digest: None,
        };

        inventory.spot_check()?;

        Ok(inventory)
    }

    /// Verifies that the head version exists in the version map
    pub fn spot_check(&self) -> Result<()> {
        if !self.versions.contains_key(&self.head) {
            return Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("HEAD version {} was not found", self.head),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_declaration(&self) -> &str {
        &self.type_declaration
    }

    /// The spec version declared by the inventory's `type` field
    pub fn spec_version(&self) -> Result<SpecVersion> {
        SpecVersion::try_from_inventory_type(&self.type_declaration)
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn head(&self) -> VersionNum {
        self.head
    }

    /// True if the inventory describes a brand new object
    pub fn is_new(&self) -> bool {
        self.head.number == 1
    }

    pub fn content_directory(&self) -> Option<&str> {
        self.content_directory.as_deref()
    }

    /// The content directory, defaulted to `content` when not declared
    pub fn defaulted_content_dir(&self) -> &str {
        self.content_directory
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_DIR)
    }

    pub fn manifest(&self) -> &DigestMap {
        &self.manifest
    }

    pub fn versions(&self) -> &BTreeMap<VersionNum, Version> {
        &self.versions
    }

    pub fn fixity(&self) -> Option<&BTreeMap<String, DigestMap>> {
        self.fixity.as_ref()
    }

    /// The digest of the serialized inventory bytes, when known
    pub fn digest(&self) -> Option<&HexDigest> {
        self.digest.as_ref()
    }

    pub(crate) fn set_digest(&mut self, digest: HexDigest) {
        self.digest = Some(digest);
    }

    /// Returns a reference to the HEAD version
    pub fn head_version(&self) -> &Version {
        // The head version is known to exist because it is checked on construction
        self.versions.get(&self.head).unwrap()
    }

    /// Returns a reference to the specified version or an error if it does not exist
    pub fn version(&self, version_num: VersionNum) -> Result<&Version> {
        match self.versions.get(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    /// True if the path exists in the manifest
    pub fn contains_content_path(&self, content_path: &str) -> bool {
        self.manifest.contains_path(content_path)
    }

    /// Returns the first content path associated with the digest. When `logical_path` is
    /// provided and the digest maps to several content paths, the path whose suffix
    /// mirrors the logical path is preferred.
    pub fn content_path_for_digest(
        &self,
        digest: &HexDigest,
        logical_path: Option<&InventoryPath>,
    ) -> Result<&InventoryPath> {
        match self.manifest.paths_for(digest) {
            Some(paths) => {
                if paths.len() > 1 {
                    if let Some(logical_path) = logical_path {
                        let suffix =
                            format!("/{}/{}", self.defaulted_content_dir(), logical_path);
                        for path in paths {
                            if path.as_str().ends_with(&suffix) {
                                return Ok(path);
                            }
                        }
                    }
                }

                Ok(&paths[0])
            }
            None => Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("Digest {} not found in manifest", digest),
            }),
        }
    }

    /// Returns the content path for a logical path within a version, or `NotFound`
    pub fn content_path_for_logical_path(
        &self,
        logical_path: &InventoryPath,
        version_num: VersionNum,
    ) -> Result<&InventoryPath> {
        let version = self.version(version_num)?;

        let digest = match version.lookup_digest(logical_path) {
            Some(digest) => digest,
            None => {
                return Err(OcflError::NotFound(format!(
                    "Path {} not found in object {} version {}",
                    logical_path, self.id, version_num
                )))
            }
        };

        self.content_path_for_digest(digest, Some(logical_path))
    }

    /// Resolves a version's logical state: each logical path mapped to the sorted content
    /// paths its digest resolves to in the manifest. Logical paths whose digest has no
    /// manifest entry map to an empty list.
    pub fn logical_state(
        &self,
        version_num: VersionNum,
    ) -> Result<BTreeMap<InventoryPath, Vec<InventoryPath>>> {
        let version = self.version(version_num)?;
        let mut resolved = BTreeMap::new();

        for (path, digest) in version.state().path_map().iter() {
            let mut content_paths = match self.manifest.paths_for(digest) {
                Some(paths) => paths.to_vec(),
                None => Vec::new(),
            };
            content_paths.sort_unstable();
            resolved.insert(path.clone(), content_paths);
        }

        Ok(resolved)
    }

    /// Resolves a complete view of a version: every logical path mapped to its backing
    /// content file and the version in which that file last changed.
    pub fn version_view(&self, version_num: VersionNum) -> Result<VersionView> {
        let version = self.version(version_num)?;
        let version_details = VersionDetails::new(version_num, version);

        let mut state = BTreeMap::new();

        for (path, digest) in version.state().path_map().iter() {
            let content_path = self.content_path_for_digest(digest, Some(path))?.clone();
            let last_update = self.last_update(path, digest, version_num);

            state.insert(
                path.clone(),
                FileDetails {
                    digest: digest.clone(),
                    content_path,
                    last_update,
                },
            );
        }

        Ok(VersionView {
            id: self.id.clone(),
            version_details,
            state,
        })
    }

    /// Walks backwards from `from` to find the version in which the path was last bound
    /// to the digest
    fn last_update(&self, path: &InventoryPath, digest: &HexDigest, from: VersionNum) -> VersionNum {
        let mut current = from;

        loop {
            let previous = match current.previous() {
                Ok(previous) => previous,
                Err(_) => return current,
            };

            match self.versions.get(&previous) {
                Some(version) => match version.state().digest_for(path.as_str()) {
                    Some(previous_digest) if previous_digest == digest => current = previous,
                    _ => return current,
                },
                None => return current,
            }
        }
    }

    /// Returns the diff between two versions. If `left` is None, the version preceding
    /// `right` is used, or an empty base when `right` is `v1`.
    pub fn diff_versions(
        &self,
        left: Option<VersionNum>,
        right: VersionNum,
    ) -> Result<PathDiff> {
        if let Some(left) = left {
            if left == right {
                return Ok(PathDiff::default());
            }
        }

        let right_state = self.version(right)?.state().path_map();

        let left_state = match left {
            Some(left) => self.version(left)?.state().path_map(),
            None => {
                if right.number > 1 {
                    self.version(right.previous()?)?.state().path_map()
                } else {
                    Default::default()
                }
            }
        };

        Ok(right_state.diff(&left_state))
    }
}

impl Version {
    pub fn new(
        created: DateTime<Local>,
        state: DigestMap,
        message: Option<String>,
        user: Option<User>,
    ) -> Self {
        Self {
            created,
            state,
            message,
            user,
        }
    }

    pub fn created(&self) -> DateTime<Local> {
        self.created
    }

    pub fn state(&self) -> &DigestMap {
        &self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Returns a reference to the digest associated to a logical path, or None if the
    /// logical path does not exist in the version's state
    pub fn lookup_digest(&self, logical_path: &InventoryPath) -> Option<&HexDigest> {
        self.state.digest_for(logical_path.as_str())
    }
}

impl VersionDetails {
    /// Creates `VersionDetails` by cloning the version's metadata
    pub fn new(version_num: VersionNum, version: &Version) -> Self {
        let (user_name, user_address) = match version.user() {
            Some(user) => (
                user.name().map(String::from),
                user.address().map(String::from),
            ),
            None => (None, None),
        };

        Self {
            version_num,
            created: version.created(),
            user_name,
            user_address,
            message: version.message().map(String::from),
        }
    }
}

impl User {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self {
            name: Some(name),
            address,
        }
    }

    pub(crate) fn from_parts(name: Option<String>, address: Option<String>) -> Self {
        Self { name, address }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}
