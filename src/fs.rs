//! The filesystem abstraction the core operates over. Paths are always `/` separated
//! relative strings; implementations translate to platform paths at the boundary.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::info;

use crate::error::{OcflError, Result};
use crate::paths;

/// A directory entry: its name plus file-type classification. Anything that is not a
/// regular file or directory, eg a symbolic link, is `Other` and is rejected during tree
/// walks.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum Listing<'a> {
    File(Cow<'a, str>),
    Directory(Cow<'a, str>),
    Other(Cow<'a, str>),
}

/// Read-only filesystem operations. Implementations must be safe to share across the
/// digester pipeline's worker threads.
pub trait FileSystem: Send + Sync {
    /// Opens a file for sequential reading. Invalid paths are rejected with
    /// `IllegalArgument` and missing paths with `NotFound`.
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Reads the file at the specified path into the sink, returning the bytes copied
    fn read(&self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        let mut file = self.open_file(path)?;
        Ok(io::copy(&mut file, sink)?)
    }

    /// Reads the entire file into memory
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.read(path, &mut bytes)?;
        Ok(bytes)
    }

    /// Lists the entries of a directory, non-recursively. Entries are not sorted.
    fn read_dir(&self, path: &str) -> Result<Vec<Listing<'static>>>;

    /// True if a file or directory exists at the path
    fn exists(&self, path: &str) -> Result<bool>;
}

/// Mutating filesystem operations
pub trait WriteFileSystem: FileSystem {
    /// Creates or overwrites the file at the specified path, returning the bytes written.
    /// Parent directories are created as needed.
    fn write(&self, path: &str, reader: &mut dyn Read) -> Result<u64>;

    /// Removes a single file. Missing files are a `NotFound` error.
    fn remove(&self, path: &str) -> Result<()>;

    /// Removes a directory recursively. Missing directories are tolerated.
    fn remove_all(&self, path: &str) -> Result<()>;

    /// Copies a file within this filesystem
    fn copy(&self, dst: &str, src: &str) -> Result<u64> {
        let mut reader = self.open_file(src)?;
        self.write(dst, &mut reader)
    }
}

impl<'a> Listing<'a> {
    pub fn file(path: &str) -> Listing {
        Listing::File(Cow::Borrowed(path))
    }

    pub fn dir(path: &str) -> Listing {
        Listing::Directory(Cow::Borrowed(path))
    }

    pub fn file_owned(path: String) -> Listing<'a> {
        Listing::File(Cow::Owned(path))
    }

    pub fn dir_owned(path: String) -> Listing<'a> {
        Listing::Directory(Cow::Owned(path))
    }

    pub fn path(&self) -> &str {
        match self {
            Listing::File(path) => path,
            Listing::Directory(path) => path,
            Listing::Other(path) => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Listing::Directory(_))
    }
}

/// Recursively collects every file under `dir`, returning paths relative to the
/// filesystem root. Entries that are neither files nor directories fail the walk with
/// `InvalidFileType`.
pub fn walk_files(fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_string()];

    while let Some(current) = pending.pop() {
        for entry in fs.read_dir(&current)? {
            let joined = paths::join(&current, entry.path());
            match entry {
                Listing::File(_) => files.push(joined),
                Listing::Directory(_) => pending.push(joined),
                Listing::Other(_) => {
                    return Err(OcflError::InvalidFileType { path: joined });
                }
            }
        }
    }

    Ok(files)
}

/// Local disk implementation rooted at a directory
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Creates a filesystem rooted at an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(OcflError::IllegalState(format!(
                "Root {} does not exist",
                root.to_string_lossy()
            )));
        } else if !root.is_dir() {
            return Err(OcflError::IllegalState(format!(
                "Root {} is not a directory",
                root.to_string_lossy()
            )));
        }

        Ok(Self { root })
    }

    /// Maps a `/` separated relative path onto the local root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_fs_path(path)?;

        let mut resolved = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            resolved.push(part);
        }
        Ok(resolved)
    }
}

impl FileSystem for LocalFs {
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let resolved = self.resolve(path)?;

        match File::open(&resolved) {
            Ok(file) => {
                if !file.metadata()?.is_file() {
                    return Err(OcflError::InvalidFileType {
                        path: path.to_string(),
                    });
                }
                Ok(Box::new(file))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(OcflError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<Listing<'static>>> {
        let resolved = self.resolve(path)?;

        let entries = match fs::read_dir(&resolved) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OcflError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut listings = Vec::new();

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type()?;

            if file_type.is_file() {
                listings.push(Listing::file_owned(name));
            } else if file_type.is_dir() {
                listings.push(Listing::dir_owned(name));
            } else {
                listings.push(Listing::Other(Cow::Owned(name)));
            }
        }

        Ok(listings)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.exists())
    }
}

impl WriteFileSystem for LocalFs {
    fn write(&self, path: &str, reader: &mut dyn Read) -> Result<u64> {
        let resolved = self.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&resolved)?;
        let bytes = io::copy(reader, &mut file)?;

        Ok(bytes)
    }

    fn remove(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;

        match fs::remove_file(&resolved) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(OcflError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;

        info!("Removing directory {}", path);

        match fs::remove_dir_all(&resolved) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn copy(&self, dst: &str, src: &str) -> Result<u64> {
        let src_resolved = self.resolve(src)?;
        let dst_resolved = self.resolve(dst)?;

        if let Some(parent) = dst_resolved.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::copy(&src_resolved, &dst_resolved) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(OcflError::NotFound(src.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory implementation, used by tests and embedders that assemble objects before
/// writing them anywhere durable. Files are "irregular" in file-type terms but are
/// classified as regular files.
#[derive(Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for seeding fixture content
    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.to_string(), bytes.into());
        }
    }

    /// Returns a sorted list of every file path in the filesystem
    pub fn file_paths(&self) -> Vec<String> {
        match self.files.read() {
            Ok(files) => files.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl FileSystem for MemoryFs {
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        validate_fs_path(path)?;

        let files = self
            .files
            .read()
            .map_err(|_| OcflError::IllegalState("MemoryFs lock poisoned".to_string()))?;

        match files.get(path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(OcflError::NotFound(path.to_string())),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<Listing<'static>>> {
        validate_fs_path(path)?;

        let files = self
            .files
            .read()
            .map_err(|_| OcflError::IllegalState("MemoryFs lock poisoned".to_string()))?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let mut listings = Vec::new();
        let mut seen_dirs = std::collections::HashSet::new();
        let mut found = false;

        for key in files.keys() {
            if let Some(remainder) = key.strip_prefix(&prefix) {
                found = true;
                match remainder.find('/') {
                    Some(slash) => {
                        let dir = &remainder[0..slash];
                        if seen_dirs.insert(dir.to_string()) {
                            listings.push(Listing::dir_owned(dir.to_string()));
                        }
                    }
                    None => listings.push(Listing::file_owned(remainder.to_string())),
                }
            }
        }

        if !found && !path.is_empty() {
            return Err(OcflError::NotFound(path.to_string()));
        }

        Ok(listings)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        validate_fs_path(path)?;

        let files = self
            .files
            .read()
            .map_err(|_| OcflError::IllegalState("MemoryFs lock poisoned".to_string()))?;

        if path.is_empty() || files.contains_key(path) {
            return Ok(true);
        }

        let prefix = format!("{}/", path);
        Ok(files.keys().any(|key| key.starts_with(&prefix)))
    }
}

impl WriteFileSystem for MemoryFs {
    fn write(&self, path: &str, reader: &mut dyn Read) -> Result<u64> {
        validate_fs_path(path)?;

        let mut bytes = Vec::new();
        let count = io::copy(reader, &mut bytes)?;

        let mut files = self
            .files
            .write()
            .map_err(|_| OcflError::IllegalState("MemoryFs lock poisoned".to_string()))?;
        files.insert(path.to_string(), bytes);

        Ok(count)
    }

    fn remove(&self, path: &str) -> Result<()> {
        validate_fs_path(path)?;

        let mut files = self
            .files
            .write()
            .map_err(|_| OcflError::IllegalState("MemoryFs lock poisoned".to_string()))?;

        match files.remove(path) {
            Some(_) => Ok(()),
            None => Err(OcflError::NotFound(path.to_string())),
        }
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        validate_fs_path(path)?;

        let mut files = self
            .files
            .write()
            .map_err(|_| OcflError::IllegalState("MemoryFs lock poisoned".to_string()))?;

        let prefix = format!("{}/", path);
        files.retain(|key, _| key != path && !key.starts_with(&prefix));

        Ok(())
    }
}

/// Rejects absolute paths and paths containing `.`, `..`, or empty segments. The empty
/// path refers to the filesystem root and is valid for directory operations.
fn validate_fs_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }

    if path.starts_with('/') {
        return Err(OcflError::IllegalArgument(format!(
            "Paths may not be absolute. Found: {}",
            path
        )));
    }

    let has_illegal_part = path
        .split('/')
        .any(|part| part == "." || part == ".." || part.is_empty());

    if has_illegal_part {
        return Err(OcflError::IllegalArgument(format!(
            "Paths may not contain '.', '..', or '' parts. Found: {}",
            path
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::{walk_files, FileSystem, Listing, LocalFs, MemoryFs, WriteFileSystem};
    use crate::error::OcflError;

    #[test]
    fn memory_fs_read_write_remove() {
        let fs = MemoryFs::new();

        fs.write("a/b/file.txt", &mut "hello".as_bytes()).unwrap();
        fs.write("a/other.txt", &mut "world".as_bytes()).unwrap();

        let mut contents = String::new();
        fs.open_file("a/b/file.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!("hello", contents);

        assert!(fs.exists("a/b").unwrap());
        assert!(fs.exists("a/other.txt").unwrap());
        assert!(!fs.exists("bogus").unwrap());

        let listings = fs.read_dir("a").unwrap();
        assert!(listings.contains(&Listing::file("other.txt")));
        assert!(listings.contains(&Listing::dir("b")));

        fs.remove("a/other.txt").unwrap();
        assert!(!fs.exists("a/other.txt").unwrap());

        fs.remove_all("a").unwrap();
        assert!(!fs.exists("a").unwrap());
    }

    #[test]
    fn memory_fs_rejects_missing_and_invalid_paths() {
        let fs = MemoryFs::new();

        match fs.open_file("missing.txt") {
            Err(OcflError::NotFound(_)) => (),
            Err(other) => panic!("Expected NotFound, got: {:?}", other),
            Ok(_) => panic!("Expected NotFound, got: Ok"),
        }

        match fs.open_file("../escape.txt") {
            Err(OcflError::IllegalArgument(_)) => (),
            Err(other) => panic!("Expected IllegalArgument, got: {:?}", other),
            Ok(_) => panic!("Expected IllegalArgument, got: Ok"),
        }
    }

    #[test]
    fn local_fs_round_trip() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("dir/file.txt", &mut "content".as_bytes()).unwrap();

        let mut contents = String::new();
        fs.open_file("dir/file.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!("content", contents);

        let listings = fs.read_dir("").unwrap();
        assert_eq!(vec![Listing::dir("dir")], listings);

        fs.copy("dir/copy.txt", "dir/file.txt").unwrap();
        assert!(fs.exists("dir/copy.txt").unwrap());

        fs.remove_all("dir").unwrap();
        assert!(!fs.exists("dir").unwrap());
        // removing again is tolerated
        fs.remove_all("dir").unwrap();
    }

    #[test]
    fn walk_collects_all_files() {
        let fs = MemoryFs::new();
        fs.insert("root/a.txt", "a");
        fs.insert("root/sub/b.txt", "b");
        fs.insert("root/sub/deep/c.txt", "c");
        fs.insert("outside.txt", "d");

        let mut files = walk_files(&fs, "root").unwrap();
        files.sort();

        assert_eq!(
            vec!["root/a.txt", "root/sub/b.txt", "root/sub/deep/c.txt"],
            files
        );
    }
}
