use core::fmt;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::io;
use std::io::{Read, Write};
use std::sync::RwLock;

use blake2::Blake2b512;
use digest::{Digest, DynDigest};
use md5::Md5;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use strum_macros::{Display as EnumDisplay, EnumString};

use crate::error::Result;

/// Enum of all digest algorithms with first-class support. Additional algorithms may be
/// made available for fixity validation through the [`AlgorithmRegistry`].
#[derive(
    Deserialize, Serialize, Debug, Hash, Eq, PartialEq, Copy, Clone, EnumString, EnumDisplay,
)]
pub enum DigestAlgorithm {
    #[serde(rename = "md5")]
    #[strum(serialize = "md5")]
    Md5,
    #[serde(rename = "sha1")]
    #[strum(serialize = "sha1")]
    Sha1,
    #[serde(rename = "sha256")]
    #[strum(serialize = "sha256")]
    Sha256,
    #[serde(rename = "sha512")]
    #[strum(serialize = "sha512")]
    Sha512,
    #[serde(rename = "blake2b-512")]
    #[strum(serialize = "blake2b-512")]
    Blake2b512,
}

/// Constructor for a digest hasher
pub type DigestFactory = fn() -> Box<dyn DynDigest + Send>;

/// Maps algorithm names to hasher constructors. Used to resolve the algorithms named in
/// inventory fixity blocks. A process-wide instance is available through
/// [`global_registry`]; tests may construct their own.
#[derive(Default)]
pub struct AlgorithmRegistry {
    factories: HashMap<String, DigestFactory>,
}

/// Reader wrapper that feeds every byte read through a hasher
pub struct DigestReader<R: Read> {
    hasher: Box<dyn DynDigest + Send>,
    source: R,
}

/// Writer wrapper that feeds every byte written through a hasher
pub struct DigestWriter<W: Write> {
    hasher: Box<dyn DynDigest + Send>,
    sink: W,
}

/// Writer wrapper that computes several digests in a single pass over the bytes. Each
/// algorithm's hash state is independent; writes are broadcast to all of them. Repeated
/// algorithms are computed once.
pub struct MultiDigestWriter<W: Write> {
    hashers: Vec<(DigestAlgorithm, Box<dyn DynDigest + Send>)>,
    sink: W,
}

/// Like `MultiDigestWriter`, but keyed by algorithm name so that registry algorithms
/// without a `DigestAlgorithm` variant can participate. Unknown names are silently
/// dropped from the output set.
pub struct NamedMultiWriter<W: Write> {
    hashers: Vec<(String, Box<dyn DynDigest + Send>)>,
    sink: W,
}

/// A digest encoded as a hex string. Comparison, ordering, and hashing are case
/// insensitive; the original case is preserved for display and serialization.
#[derive(Deserialize, Serialize, Debug, Eq, Clone)]
pub struct HexDigest(String);

static GLOBAL_REGISTRY: Lazy<RwLock<AlgorithmRegistry>> =
    Lazy::new(|| RwLock::new(AlgorithmRegistry::with_defaults()));

/// Returns the process-wide algorithm registry
pub fn global_registry() -> &'static RwLock<AlgorithmRegistry> {
    &GLOBAL_REGISTRY
}

/// Registers an algorithm in the process-wide registry. Registration is at-most-once:
/// returns false, without replacing anything, if the name is already registered.
pub fn register_algorithm(name: &str, factory: DigestFactory) -> bool {
    match GLOBAL_REGISTRY.write() {
        Ok(mut registry) => registry.register(name, factory),
        Err(_) => false,
    }
}

impl DigestAlgorithm {
    /// Hashes the input and returns its hex encoded digest
    pub fn hash_hex(&self, data: &mut impl Read) -> Result<HexDigest> {
        let mut writer = self.writer(io::sink());
        io::copy(data, &mut writer)?;
        Ok(writer.finalize_hex())
    }

    /// Wraps the specified reader in a `DigestReader`
    pub fn reader<R: Read>(&self, reader: R) -> DigestReader<R> {
        DigestReader::new(self.new_digest(), reader)
    }

    /// Wraps the specified writer in a `DigestWriter`
    pub fn writer<W: Write>(&self, writer: W) -> DigestWriter<W> {
        DigestWriter::new(self.new_digest(), writer)
    }

    fn new_digest(&self) -> Box<dyn DynDigest + Send> {
        match self {
            DigestAlgorithm::Md5 => Box::new(Md5::new()),
            DigestAlgorithm::Sha1 => Box::new(Sha1::new()),
            DigestAlgorithm::Sha256 => Box::new(Sha256::new()),
            DigestAlgorithm::Sha512 => Box::new(Sha512::new()),
            DigestAlgorithm::Blake2b512 => Box::new(Blake2b512::new()),
        }
    }
}

impl AlgorithmRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in algorithms
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("md5", || Box::new(Md5::new()));
        registry.register("sha1", || Box::new(Sha1::new()));
        registry.register("sha256", || Box::new(Sha256::new()));
        registry.register("sha512", || Box::new(Sha512::new()));
        registry.register("blake2b-512", || Box::new(Blake2b512::new()));
        registry
    }

    /// Registers an algorithm. Returns false, without replacing anything, if the name is
    /// already registered.
    pub fn register(&mut self, name: &str, factory: DigestFactory) -> bool {
        if self.factories.contains_key(name) {
            return false;
        }
        self.factories.insert(name.to_string(), factory);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns a fresh hasher for the named algorithm, or None if it is not registered
    pub fn digester(&self, name: &str) -> Option<Box<dyn DynDigest + Send>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl<R: Read> DigestReader<R> {
    pub fn new(hasher: Box<dyn DynDigest + Send>, source: R) -> Self {
        Self { hasher, source }
    }

    pub fn finalize_hex(self) -> HexDigest {
        self.hasher.finalize().to_vec().into()
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.source.read(buf)?;
        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}

impl<W: Write> DigestWriter<W> {
    pub fn new(hasher: Box<dyn DynDigest + Send>, sink: W) -> Self {
        Self { hasher, sink }
    }

    pub fn finalize_hex(self) -> HexDigest {
        self.hasher.finalize().to_vec().into()
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.sink.write(buf)?;
        self.hasher.update(&buf[..count]);
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl<W: Write> MultiDigestWriter<W> {
    pub fn new(algorithms: &[DigestAlgorithm], sink: W) -> Self {
        let mut hashers: Vec<(DigestAlgorithm, Box<dyn DynDigest + Send>)> = Vec::new();

        for algorithm in algorithms {
            if hashers.iter().any(|(existing, _)| existing == algorithm) {
                continue;
            }
            hashers.push((*algorithm, algorithm.new_digest()));
        }

        Self { hashers, sink }
    }

    pub fn finalize_hex(self) -> HashMap<DigestAlgorithm, HexDigest> {
        self.hashers
            .into_iter()
            .map(|(algorithm, hasher)| (algorithm, hasher.finalize().to_vec().into()))
            .collect()
    }
}

impl<W: Write> Write for MultiDigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.sink.write(buf)?;
        for (_, hasher) in &mut self.hashers {
            hasher.update(&buf[..count]);
        }
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl<W: Write> NamedMultiWriter<W> {
    /// Creates a writer computing every named algorithm the registry knows. Unknown names
    /// are dropped.
    pub fn new<'a>(
        names: impl IntoIterator<Item = &'a str>,
        registry: &AlgorithmRegistry,
        sink: W,
    ) -> Self {
        let mut hashers: Vec<(String, Box<dyn DynDigest + Send>)> = Vec::new();

        for name in names {
            if hashers.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            if let Some(hasher) = registry.digester(name) {
                hashers.push((name.to_string(), hasher));
            }
        }

        Self { hashers, sink }
    }

    pub fn finalize_hex(self) -> HashMap<String, HexDigest> {
        self.hashers
            .into_iter()
            .map(|(name, hasher)| (name, hasher.finalize().to_vec().into()))
            .collect()
    }
}

impl<W: Write> Write for NamedMultiWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.sink.write(buf)?;
        for (_, hasher) in &mut self.hashers {
            hasher.update(&buf[..count]);
        }
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl HexDigest {
    /// Returns a copy with all hex characters lowercased
    pub fn lowercased(&self) -> HexDigest {
        HexDigest(self.0.to_ascii_lowercase())
    }

    /// True if every hex character is already lowercase
    pub fn is_lowercase(&self) -> bool {
        !self.0.bytes().any(|b| b.is_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Vec<u8>> for HexDigest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(hex::encode(bytes))
    }
}

impl From<&str> for HexDigest {
    fn from(digest: &str) -> Self {
        Self(digest.to_string())
    }
}

impl From<String> for HexDigest {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

impl From<HexDigest> for String {
    fn from(digest: HexDigest) -> Self {
        digest.0
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Ord for HexDigest {
    /// Case insensitive comparison without allocating lowercased copies
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.0.as_bytes();
        let right = other.0.as_bytes();

        for (l, r) in left.iter().zip(right.iter()) {
            match l.to_ascii_lowercase().cmp(&r.to_ascii_lowercase()) {
                Ordering::Equal => (),
                non_eq => return non_eq,
            }
        }

        left.len().cmp(&right.len())
    }
}

impl PartialOrd for HexDigest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HexDigest {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for HexDigest {
    /// Must agree with the case insensitive `PartialEq`
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            byte.to_ascii_lowercase().hash(state);
        }
        self.0.len().hash(state);
    }
}

impl Display for HexDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
