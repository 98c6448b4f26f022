use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::convert::TryFrom;
use std::fmt;
use std::fmt::Formatter;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::digest::HexDigest;
use crate::types::InventoryPath;

/// The reasons a digest map can be rejected. Construction and transform operations are
/// total: they either return a validated map or one of these, carrying the offending
/// value.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MapError {
    #[error("Invalid path. Found: {0}")]
    PathInvalid(String),

    #[error("Conflicting path. Found: {0}")]
    PathConflict(String),

    #[error("Conflicting digest. Found: {0}")]
    DigestConflict(String),

    #[error("Digest maps to no paths. Found: {0}")]
    EmptyPaths(String),
}

/// A mapping from digest to a non-empty set of paths: the content-addressable relation
/// used by inventory manifests, version states, and fixity blocks.
///
/// A `DigestMap` is always valid: every digest has at least one path, no path appears
/// twice, no path is a strict prefix of another at a `/` boundary, and no two digest keys
/// are the same hex value in different cases. Mutating operations return new maps.
#[derive(Debug, Clone, Default)]
pub struct DigestMap {
    entries: BTreeMap<HexDigest, Vec<InventoryPath>>,
}

/// The inverse view of a [`DigestMap`]: path to digest. Used for path-indexed merges and
/// diffing.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PathMap {
    entries: BTreeMap<InventoryPath, HexDigest>,
}

/// The difference between two path maps
#[derive(Debug, Default, Eq, PartialEq)]
pub struct PathDiff {
    pub added: Vec<InventoryPath>,
    pub removed: Vec<InventoryPath>,
    pub modified: Vec<InventoryPath>,
}

impl DigestMap {
    /// Creates an empty map
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a map from digest to paths entries, validating every invariant. Paths are
    /// kept in their input order; digest case is preserved.
    pub fn new<I, D, P>(entries: I) -> Result<Self, MapError>
    where
        I: IntoIterator<Item = (D, Vec<P>)>,
        D: Into<HexDigest>,
        P: AsRef<str>,
    {
        let mut map = BTreeMap::new();

        for (digest, paths) in entries {
            let digest = digest.into();

            if paths.is_empty() {
                return Err(MapError::EmptyPaths(digest.to_string()));
            }

            let mut converted = Vec::with_capacity(paths.len());
            for path in paths {
                let path = path.as_ref();
                converted.push(
                    InventoryPath::try_from(path)
                        .map_err(|_| MapError::PathInvalid(path.to_string()))?,
                );
            }

            match map.entry(digest) {
                Entry::Occupied(existing) => {
                    return Err(MapError::DigestConflict(existing.key().to_string()));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(converted);
                }
            }
        }

        Self::from_entries(map)
    }

    /// Builds a map from pre-validated parts, running the path invariant checks. Digest
    /// uniqueness is guaranteed by the `BTreeMap`'s case insensitive key ordering.
    fn from_entries(entries: BTreeMap<HexDigest, Vec<InventoryPath>>) -> Result<Self, MapError> {
        for (digest, paths) in &entries {
            if paths.is_empty() {
                return Err(MapError::EmptyPaths(digest.to_string()));
            }
        }

        check_path_conflicts(entries.values().flatten())?;

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.entries.contains_key(digest)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.digest_for(path).is_some()
    }

    /// Returns the paths associated with a digest
    pub fn paths_for(&self, digest: &HexDigest) -> Option<&[InventoryPath]> {
        self.entries.get(digest).map(|paths| paths.as_slice())
    }

    /// Returns the digest a path maps to, or None. Linear in the size of the map; the
    /// traversal order is deterministic.
    pub fn digest_for(&self, path: &str) -> Option<&HexDigest> {
        for (digest, paths) in &self.entries {
            if paths.iter().any(|p| p.as_str() == path) {
                return Some(digest);
            }
        }
        None
    }

    /// Returns every path in the map, sorted
    pub fn paths(&self) -> Vec<&InventoryPath> {
        let mut paths: Vec<&InventoryPath> = self.entries.values().flatten().collect();
        paths.sort_unstable();
        paths
    }

    /// Iterates over digest to paths entries in digest order
    pub fn iter(&self) -> impl Iterator<Item = (&HexDigest, &[InventoryPath])> {
        self.entries
            .iter()
            .map(|(digest, paths)| (digest, paths.as_slice()))
    }

    /// Returns the inverse path to digest view
    pub fn path_map(&self) -> PathMap {
        let mut entries = BTreeMap::new();
        for (digest, paths) in &self.entries {
            for path in paths {
                entries.insert(path.clone(), digest.clone());
            }
        }
        PathMap { entries }
    }

    /// Returns a copy with every digest lowercased and every path list sorted
    pub fn normalize(&self) -> DigestMap {
        let mut entries = BTreeMap::new();
        for (digest, paths) in &self.entries {
            let mut paths = paths.clone();
            paths.sort_unstable();
            entries.insert(digest.lowercased(), paths);
        }
        Self { entries }
    }

    /// Merges two maps into a new, normalized map. When a path is present in both maps
    /// with different digests, the merge fails with `PathConflict` unless `replace` is
    /// true, in which case `other`'s digest wins. The merged map must satisfy all of the
    /// usual invariants or the call fails.
    pub fn merge(&self, other: &DigestMap, replace: bool) -> Result<DigestMap, MapError> {
        let mut merged: BTreeMap<InventoryPath, HexDigest> = BTreeMap::new();

        for (digest, paths) in &self.entries {
            for path in paths {
                merged.insert(path.clone(), digest.lowercased());
            }
        }

        for (digest, paths) in &other.entries {
            for path in paths {
                match merged.get(path) {
                    Some(existing) if existing != digest => {
                        if replace {
                            merged.insert(path.clone(), digest.lowercased());
                        } else {
                            return Err(MapError::PathConflict(path.to_string()));
                        }
                    }
                    Some(_) => (),
                    None => {
                        merged.insert(path.clone(), digest.lowercased());
                    }
                }
            }
        }

        let mut entries: BTreeMap<HexDigest, Vec<InventoryPath>> = BTreeMap::new();
        for (path, digest) in merged {
            entries.entry(digest).or_default().push(path);
        }

        let mut map = Self::from_entries(entries)?;
        map = map.normalize();
        Ok(map)
    }

    /// Applies a path-transforming function to every digest entry and returns the
    /// resulting map. Returning an empty path list drops the digest. The result is
    /// validated.
    pub fn remap<F>(&self, mut f: F) -> Result<DigestMap, MapError>
    where
        F: FnMut(&HexDigest, &[InventoryPath]) -> Vec<String>,
    {
        let mut entries = BTreeMap::new();

        for (digest, paths) in &self.entries {
            let new_paths = f(digest, paths);

            if new_paths.is_empty() {
                continue;
            }

            let mut converted = Vec::with_capacity(new_paths.len());
            for path in new_paths {
                converted
                    .push(InventoryPath::try_from(&path).map_err(|_| MapError::PathInvalid(path))?);
            }

            entries.insert(digest.clone(), converted);
        }

        Self::from_entries(entries)
    }

    /// Renames paths within the map:
    ///
    /// - a path equal to `src` is renamed to `dst`;
    /// - when `src` is `.`, every path is prefixed with `dst`;
    /// - otherwise any path beginning with `src + "/"` has that prefix replaced with
    ///   `dst`.
    pub fn rename(&self, src: &str, dst: &str) -> Result<DigestMap, MapError> {
        self.remap(|_, paths| {
            paths
                .iter()
                .map(|path| rename_path(path.as_str(), src, dst))
                .collect()
        })
    }
}

fn rename_path(path: &str, src: &str, dst: &str) -> String {
    if src == "." {
        return format!("{}/{}", dst, path);
    }

    if path == src {
        return dst.to_string();
    }

    match path.strip_prefix(src) {
        Some(rest) if rest.starts_with('/') => format!("{}{}", dst, rest),
        _ => path.to_string(),
    }
}

/// Verifies that no path appears twice and no path is a strict prefix of another at a
/// `/` boundary. The error carries the path that is in use as both a file and a
/// directory.
fn check_path_conflicts<'a>(
    paths: impl Iterator<Item = &'a InventoryPath>,
) -> Result<(), MapError> {
    let mut files: HashSet<&str> = HashSet::new();
    let mut dirs: HashSet<&str> = HashSet::new();

    for path in paths {
        if !files.insert(path.as_str()) {
            return Err(MapError::PathConflict(path.to_string()));
        }
        for ancestor in path.ancestors() {
            dirs.insert(ancestor);
        }
    }

    for file in &files {
        if dirs.contains(file) {
            return Err(MapError::PathConflict((*file).to_string()));
        }
    }

    Ok(())
}

impl PartialEq for DigestMap {
    /// True iff both maps normalize to the same digest to set-of-paths mapping
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }

        for ((left_digest, left_paths), (right_digest, right_paths)) in
            self.entries.iter().zip(other.entries.iter())
        {
            if left_digest != right_digest {
                return false;
            }

            let mut left_paths = left_paths.clone();
            let mut right_paths = right_paths.clone();
            left_paths.sort_unstable();
            right_paths.sort_unstable();

            if left_paths != right_paths {
                return false;
            }
        }

        true
    }
}

impl Eq for DigestMap {}

impl Serialize for DigestMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter())
    }
}

struct DigestMapVisitor;

impl<'de> Visitor<'de> for DigestMapVisitor {
    type Value = DigestMap;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a map of digests to arrays of paths")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut entries: Vec<(String, Vec<String>)> =
            Vec::with_capacity(access.size_hint().unwrap_or(0));

        while let Some((digest, paths)) = access.next_entry::<String, Vec<String>>()? {
            entries.push((digest, paths));
        }

        DigestMap::new(entries).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for DigestMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DigestMapVisitor)
    }
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &InventoryPath) -> Option<&HexDigest> {
        self.entries.get(path)
    }

    pub fn contains_path(&self, path: &InventoryPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: InventoryPath, digest: HexDigest) {
        self.entries.insert(path, digest);
    }

    /// Iterates over path to digest entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&InventoryPath, &HexDigest)> {
        self.entries.iter()
    }

    /// Regroups the paths by digest, producing a digest map. Fails if the grouped paths
    /// violate the path conflict invariant.
    pub fn to_digest_map(&self) -> Result<DigestMap, MapError> {
        let mut entries: BTreeMap<HexDigest, Vec<InventoryPath>> = BTreeMap::new();
        for (path, digest) in &self.entries {
            entries.entry(digest.clone()).or_default().push(path.clone());
        }
        DigestMap::from_entries(entries)
    }

    /// Computes the difference between this map (the newer state) and `base` (the older
    /// state).
    pub fn diff(&self, base: &PathMap) -> PathDiff {
        let mut diff = PathDiff::default();

        for (path, digest) in &self.entries {
            match base.entries.get(path) {
                None => diff.added.push(path.clone()),
                Some(base_digest) if base_digest != digest => diff.modified.push(path.clone()),
                Some(_) => (),
            }
        }

        for path in base.entries.keys() {
            if !self.entries.contains_key(path) {
                diff.removed.push(path.clone());
            }
        }

        diff
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{DigestMap, MapError};

    fn map(entries: Vec<(&str, Vec<&str>)>) -> DigestMap {
        DigestMap::new(entries).unwrap()
    }

    #[test]
    fn construct_valid_map() {
        let map = map(vec![
            ("abc1", vec!["foo/bar.txt", "copy.txt"]),
            ("def2", vec!["foo/baz.txt"]),
        ]);

        assert_eq!(2, map.len());
        assert_eq!("abc1", map.digest_for("copy.txt").unwrap().as_str());
        assert_eq!("def2", map.digest_for("foo/baz.txt").unwrap().as_str());
        assert_eq!(None, map.digest_for("bogus"));

        let paths: Vec<&str> = map.paths().iter().map(|p| p.as_str()).collect();
        assert_eq!(vec!["copy.txt", "foo/bar.txt", "foo/baz.txt"], paths);
    }

    #[test]
    fn reject_empty_path_list() {
        let err = DigestMap::new(vec![("abc1", Vec::<&str>::new())]).unwrap_err();
        assert_eq!(MapError::EmptyPaths("abc1".to_string()), err);
    }

    #[test]
    fn reject_invalid_path() {
        let err = DigestMap::new(vec![("abc1", vec!["foo/../bar"])]).unwrap_err();
        assert_eq!(MapError::PathInvalid("foo/../bar".to_string()), err);
    }

    #[test]
    fn reject_duplicate_path() {
        let err =
            DigestMap::new(vec![("abc1", vec!["a.txt"]), ("def2", vec!["a.txt"])]).unwrap_err();
        assert_eq!(MapError::PathConflict("a.txt".to_string()), err);
    }

    #[test]
    fn reject_path_that_is_both_file_and_directory() {
        let err =
            DigestMap::new(vec![("abc1", vec!["a/b"]), ("def2", vec!["a/b/c"])]).unwrap_err();
        assert_eq!(MapError::PathConflict("a/b".to_string()), err);

        // not a conflict: the shared prefix is not at a `/` boundary
        let map = map(vec![("abc1", vec!["a/b"]), ("def2", vec!["a/bc"])]);
        assert_eq!(2, map.len());
    }

    #[test]
    fn reject_digest_case_twins_in_both_orders() {
        let err = DigestMap::new(vec![("ABC1", vec!["a.txt"]), ("abc1", vec!["b.txt"])])
            .unwrap_err();
        assert!(matches!(err, MapError::DigestConflict(_)));

        let err = DigestMap::new(vec![("abc1", vec!["a.txt"]), ("ABC1", vec!["b.txt"])])
            .unwrap_err();
        assert!(matches!(err, MapError::DigestConflict(_)));
    }

    #[test]
    fn normalize_lowercases_digests_and_sorts_paths() {
        let map = map(vec![("ABC1", vec!["z.txt", "a.txt"])]);
        let normalized = map.normalize();

        assert_eq!("abc1", normalized.iter().next().unwrap().0.as_str());
        let paths: Vec<&str> = normalized.paths_for(&"abc1".into()).unwrap()
            .iter()
            .map(|p| p.as_str())
            .collect();
        assert_eq!(vec!["a.txt", "z.txt"], paths);

        // equality is case and order insensitive
        assert_eq!(map, normalized);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..25 {
            let map = random_map(&mut rng);
            let once = map.normalize();
            let twice = once.normalize();

            assert_eq!(once, twice);
            assert_eq!(map, once);

            let paths = map.paths();
            for pair in paths.windows(2) {
                assert_ne!(pair[0], pair[1]);
                assert!(!pair[1].as_str().starts_with(&format!("{}/", pair[0])));
            }
        }
    }

    #[test]
    fn merge_without_collisions_is_commutative() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..25 {
            let left = random_map(&mut rng);
            let right = prefixed_map(&random_map(&mut rng), "other");

            let forward = left.merge(&right, false).unwrap();
            let backward = right.merge(&left, false).unwrap();

            assert_eq!(forward.normalize(), backward.normalize());
        }
    }

    #[test]
    fn merge_conflicting_path_fails_unless_replace() {
        let left = map(vec![("abc1", vec!["shared.txt"])]);
        let right = map(vec![("def2", vec!["shared.txt"])]);

        let err = left.merge(&right, false).unwrap_err();
        assert_eq!(MapError::PathConflict("shared.txt".to_string()), err);

        let merged = left.merge(&right, true).unwrap();
        assert_eq!("def2", merged.digest_for("shared.txt").unwrap().as_str());
    }

    #[test]
    fn merge_rejects_cross_map_prefix_conflicts() {
        let left = map(vec![("abc1", vec!["a/b"])]);
        let right = map(vec![("def2", vec!["a/b/c"])]);

        let err = left.merge(&right, false).unwrap_err();
        assert_eq!(MapError::PathConflict("a/b".to_string()), err);
    }

    #[test]
    fn rename_moves_exact_match() {
        let map = map(vec![("abc1", vec!["old.txt", "dir/keep.txt"])]);
        let renamed = map.rename("old.txt", "new.txt").unwrap();

        assert!(renamed.digest_for("new.txt").is_some());
        assert!(renamed.digest_for("old.txt").is_none());
        assert!(renamed.digest_for("dir/keep.txt").is_some());
    }

    #[test]
    fn rename_replaces_directory_prefix() {
        let map = map(vec![("abc1", vec!["src/a.txt", "src/sub/b.txt", "src2/c.txt"])]);
        let renamed = map.rename("src", "dst").unwrap();

        assert!(renamed.digest_for("dst/a.txt").is_some());
        assert!(renamed.digest_for("dst/sub/b.txt").is_some());
        assert!(renamed.digest_for("src2/c.txt").is_some());
    }

    #[test]
    fn rename_dot_prefixes_all_paths() {
        let map = map(vec![("abc1", vec!["a.txt"]), ("def2", vec!["b/c.txt"])]);
        let renamed = map.rename(".", "root").unwrap();

        assert!(renamed.digest_for("root/a.txt").is_some());
        assert!(renamed.digest_for("root/b/c.txt").is_some());
    }

    #[test]
    fn rename_then_inverse_rename_is_identity() {
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..25 {
            let map = random_map(&mut rng);
            let round_tripped = map
                .rename("dir", "moved")
                .unwrap()
                .rename("moved", "dir")
                .unwrap();

            assert_eq!(map, round_tripped);
        }
    }

    #[test]
    fn remap_dropping_all_paths_drops_the_digest() {
        let map = map(vec![("abc1", vec!["a.txt"]), ("def2", vec!["b.txt"])]);

        let remapped = map
            .remap(|digest, paths| {
                if digest.as_str() == "abc1" {
                    Vec::new()
                } else {
                    paths.iter().map(|p| p.as_str().to_string()).collect()
                }
            })
            .unwrap();

        assert_eq!(1, remapped.len());
        assert!(remapped.digest_for("b.txt").is_some());
        assert!(remapped.digest_for("a.txt").is_none());
    }

    #[test]
    fn remap_rejects_invalid_result_paths() {
        let map = map(vec![("abc1", vec!["a.txt"])]);
        let err = map.remap(|_, _| vec!["../escape".to_string()]).unwrap_err();
        assert_eq!(MapError::PathInvalid("../escape".to_string()), err);
    }

    #[test]
    fn path_map_round_trip() {
        let map = map(vec![
            ("abc1", vec!["a.txt", "dir/b.txt"]),
            ("def2", vec!["dir/c.txt"]),
        ]);

        let path_map = map.path_map();
        assert_eq!(3, path_map.len());

        let round_tripped = path_map.to_digest_map().unwrap();
        assert_eq!(map, round_tripped);
    }

    #[test]
    fn diff_path_maps() {
        let old = map(vec![("abc1", vec!["same.txt", "gone.txt", "changed.txt"])]).path_map();
        let new = map(vec![
            ("abc1", vec!["same.txt"]),
            ("def2", vec!["changed.txt", "added.txt"]),
        ])
        .path_map();

        let diff = new.diff(&old);

        assert_eq!(1, diff.added.len());
        assert_eq!("added.txt", diff.added[0].as_str());
        assert_eq!(1, diff.removed.len());
        assert_eq!("gone.txt", diff.removed[0].as_str());
        assert_eq!(1, diff.modified.len());
        assert_eq!("changed.txt", diff.modified[0].as_str());
    }

    #[test]
    fn serde_round_trip() {
        let map = map(vec![
            ("abc1", vec!["a.txt"]),
            ("def2", vec!["dir/b.txt", "dir/c.txt"]),
        ]);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            r#"{"abc1":["a.txt"],"def2":["dir/b.txt","dir/c.txt"]}"#,
            json
        );

        let parsed: DigestMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, parsed);
    }

    #[test]
    fn deserialize_rejects_invalid_maps() {
        assert!(serde_json::from_str::<DigestMap>(r#"{"abc1":[]}"#).is_err());
        assert!(serde_json::from_str::<DigestMap>(r#"{"abc1":["a/b"],"def2":["a/b/c"]}"#).is_err());
    }

    /// Builds a random valid map: distinct digests, distinct non-conflicting paths under
    /// a shared `dir/` tree plus top-level files.
    fn random_map(rng: &mut StdRng) -> DigestMap {
        let digest_count = rng.gen_range(1..6);
        let mut entries = Vec::new();

        for d in 0..digest_count {
            let digest = if rng.gen_bool(0.5) {
                format!("d{:04x}", d)
            } else {
                format!("D{:04X}", d)
            };

            let path_count = rng.gen_range(1..4);
            let mut paths = Vec::new();
            for p in 0..path_count {
                if rng.gen_bool(0.5) {
                    paths.push(format!("dir/file-{}-{}.txt", d, p));
                } else {
                    paths.push(format!("file-{}-{}.txt", d, p));
                }
            }

            entries.push((digest, paths));
        }

        DigestMap::new(entries).unwrap()
    }

    /// Rewrites a map so all of its paths live under `prefix/`, guaranteeing it cannot
    /// collide with the original.
    fn prefixed_map(map: &DigestMap, prefix: &str) -> DigestMap {
        let renamed = map.rename(".", prefix).unwrap();
        // shift the digests as well so merges never see the same key
        let entries = renamed
            .iter()
            .map(|(digest, paths)| {
                (
                    format!("{}{}", prefix, digest),
                    paths.iter().map(|p| p.as_str().to_string()).collect(),
                )
            })
            .collect::<Vec<(String, Vec<String>)>>();
        DigestMap::new(entries).unwrap()
    }

    #[test]
    fn digest_for_traverses_deterministically() {
        let map = map(vec![("b2", vec!["x.txt"]), ("A1", vec!["y.txt"])]);

        // keys iterate in case insensitive digest order
        let digests: Vec<&str> = map.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(vec!["A1", "b2"], digests);
    }

}
