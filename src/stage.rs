//! Staging: the in-memory builder of an object's next version. A stage carries the
//! desired logical state, the digest algorithm, and the sources that commit uses to
//! locate content bytes and alternate fixity digests. A stage exists for one commit.

use std::collections::{BTreeMap, HashMap};

use crate::cancel::Cancel;
use crate::digest::{DigestAlgorithm, HexDigest};
use crate::digest_map::DigestMap;
use crate::error::{OcflError, Result};
use crate::fs::{walk_files, FileSystem};
use crate::pipeline::{DigestJob, DigesterPipeline};

/// Resolves a content digest to the filesystem and path its bytes can be copied from
pub trait ContentSource {
    fn resolve(&self, digest: &HexDigest) -> Option<(&dyn FileSystem, &str)>;
}

/// Supplies alternate digests for new content, keyed by algorithm name
pub trait FixitySource {
    fn fixity(&self, digest: &HexDigest) -> BTreeMap<String, HexDigest>;
}

/// The next version of an object, prior to commit
pub struct Stage<'a> {
    digest_algorithm: DigestAlgorithm,
    state: DigestMap,
    content_source: Option<&'a dyn ContentSource>,
    fixity_source: Option<&'a dyn FixitySource>,
}

impl<'a> Stage<'a> {
    pub fn new(digest_algorithm: DigestAlgorithm, state: DigestMap) -> Self {
        Self {
            digest_algorithm,
            state,
            content_source: None,
            fixity_source: None,
        }
    }

    pub fn with_content_source(mut self, source: &'a dyn ContentSource) -> Self {
        self.content_source = Some(source);
        self
    }

    pub fn with_fixity_source(mut self, source: &'a dyn FixitySource) -> Self {
        self.fixity_source = Some(source);
        self
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn state(&self) -> &DigestMap {
        &self.state
    }

    /// Resolves new content bytes through the stage's content source
    pub fn resolve_content(&self, digest: &HexDigest) -> Option<(&dyn FileSystem, &str)> {
        self.content_source.and_then(|source| source.resolve(digest))
    }

    /// Alternate digests for new content, or empty when no fixity source is attached
    pub fn fixity_for(&self, digest: &HexDigest) -> BTreeMap<String, HexDigest> {
        match self.fixity_source {
            Some(source) => source.fixity(digest),
            None => BTreeMap::new(),
        }
    }
}

/// A content source built by digesting every file under a directory tree. The logical
/// state mirrors the tree, with paths relative to the scanned directory.
pub struct DirectoryContent<'a> {
    fs: &'a dyn FileSystem,
    state: DigestMap,
    content_paths: HashMap<HexDigest, String>,
    fixity: HashMap<HexDigest, BTreeMap<String, HexDigest>>,
}

impl<'a> DirectoryContent<'a> {
    /// Digests every file under `dir` with the primary algorithm, plus any
    /// `fixity_algorithms`, using the concurrent pipeline.
    pub fn scan(
        fs: &'a dyn FileSystem,
        dir: &str,
        algorithm: DigestAlgorithm,
        fixity_algorithms: &[DigestAlgorithm],
        concurrency: Option<usize>,
        cancel: &Cancel,
    ) -> Result<Self> {
        let files = walk_files(fs, dir)?;

        let mut algorithms = vec![algorithm];
        algorithms.extend_from_slice(fixity_algorithms);

        let jobs: Vec<DigestJob> = files
            .iter()
            .map(|path| DigestJob {
                path: path.clone(),
                algorithms: algorithms.clone(),
            })
            .collect();

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut grouped: BTreeMap<HexDigest, Vec<String>> = BTreeMap::new();
        let mut content_paths = HashMap::new();
        let mut fixity: HashMap<HexDigest, BTreeMap<String, HexDigest>> = HashMap::new();

        let pipeline = DigesterPipeline::new(fs, concurrency, cancel.clone());

        pipeline.run(jobs, |outcome| {
            let mut digests = outcome.result?;

            let primary = match digests.remove(&algorithm) {
                Some(primary) => primary.lowercased(),
                None => {
                    return Err(OcflError::IllegalState(format!(
                        "Digest missing for {}",
                        outcome.path
                    )))
                }
            };

            let logical = match outcome.path.strip_prefix(&prefix) {
                Some(logical) => logical.to_string(),
                None => outcome.path.clone(),
            };

            grouped.entry(primary.clone()).or_default().push(logical);
            content_paths
                .entry(primary.clone())
                .or_insert(outcome.path);

            if !digests.is_empty() {
                let entry = fixity.entry(primary).or_default();
                for (fixity_algorithm, digest) in digests {
                    entry.insert(fixity_algorithm.to_string(), digest);
                }
            }

            Ok(())
        })?;

        let state = DigestMap::new(grouped)?;

        Ok(Self {
            fs,
            state,
            content_paths,
            fixity,
        })
    }

    /// The logical state of the scanned tree
    pub fn state(&self) -> &DigestMap {
        &self.state
    }

    /// Builds a stage whose state mirrors the scanned tree, wired to this content source
    pub fn stage(&'a self, algorithm: DigestAlgorithm) -> Stage<'a> {
        Stage::new(algorithm, self.state.clone())
            .with_content_source(self)
            .with_fixity_source(self)
    }
}

impl ContentSource for DirectoryContent<'_> {
    fn resolve(&self, digest: &HexDigest) -> Option<(&dyn FileSystem, &str)> {
        self.content_paths
            .get(digest)
            .map(|path| (self.fs, path.as_str()))
    }
}

impl FixitySource for DirectoryContent<'_> {
    fn fixity(&self, digest: &HexDigest) -> BTreeMap<String, HexDigest> {
        self.fixity.get(digest).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::DirectoryContent;
    use crate::cancel::Cancel;
    use crate::digest::DigestAlgorithm;
    use crate::fs::MemoryFs;

    #[test]
    fn scan_builds_state_from_tree() {
        let fs = MemoryFs::new();
        fs.insert("src/hello.txt", "hello");
        fs.insert("src/sub/copy.txt", "hello");
        fs.insert("src/other.txt", "other");

        let content = DirectoryContent::scan(
            &fs,
            "src",
            DigestAlgorithm::Sha512,
            &[DigestAlgorithm::Md5],
            Some(2),
            &Cancel::new(),
        )
        .unwrap();

        let state = content.state();
        assert_eq!(2, state.len());

        let hello_digest = DigestAlgorithm::Sha512
            .hash_hex(&mut "hello".as_bytes())
            .unwrap();

        let mut paths: Vec<&str> = state
            .paths_for(&hello_digest)
            .unwrap()
            .iter()
            .map(|p| p.as_str())
            .collect();
        paths.sort_unstable();
        assert_eq!(vec!["hello.txt", "sub/copy.txt"], paths);

        let fixity = content.fixity.get(&hello_digest.lowercased()).unwrap();
        assert_eq!(
            DigestAlgorithm::Md5.hash_hex(&mut "hello".as_bytes()).unwrap(),
            *fixity.get("md5").unwrap()
        );

        let stage = content.stage(DigestAlgorithm::Sha512);
        let (_, path) = stage.resolve_content(&hello_digest).unwrap();
        assert!(path == "src/hello.txt" || path == "src/sub/copy.txt");
    }
}
