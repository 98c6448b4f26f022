use core::fmt;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::{FromStr, Split};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OcflError, Result};
use crate::spec::SpecVersion;

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^v\d+$"#).unwrap());

/// An OCFL version number: an integer value >= 1 plus a zero-padding width. Width 0 means
/// unpadded. The textual form is `v` followed by the integer, zero-padded to the width,
/// eg `v1` or `v002`.
#[derive(Deserialize, Serialize, Debug, Copy, Clone)]
#[serde(try_from = "&str")]
#[serde(into = "String")]
pub struct VersionNum {
    pub number: u32,
    pub width: u32,
}

/// A slash-separated relative path within an inventory: either a logical path in a
/// version's state or a content path in the manifest. A path is valid iff it is
/// non-empty, not absolute, and contains no empty, `.`, or `..` segments.
#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct InventoryPath(String);

/// Metadata about a version, detached from its state
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct VersionDetails {
    /// The version number of the version
    pub version_num: VersionNum,
    /// When the version was created
    pub created: DateTime<Local>,
    /// The name of the person who created the version
    pub user_name: Option<String>,
    /// The address of the person who created the version
    pub user_address: Option<String>,
    /// A description of the version
    pub message: Option<String>,
}

/// Details about a file within a resolved version view
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FileDetails {
    /// The file's digest
    pub digest: crate::digest::HexDigest,
    /// The content path backing the file, relative to the object root
    pub content_path: InventoryPath,
    /// The version the file was last changed in
    pub last_update: VersionNum,
}

/// A fully resolved view of one version: every logical path mapped to its backing
/// content file and the version it last changed in
#[derive(Debug, Clone)]
pub struct VersionView {
    /// The object's ID
    pub id: String,
    /// Metadata about the viewed version
    pub version_details: VersionDetails,
    /// A map of logical paths in the version to details about the files
    pub state: std::collections::BTreeMap<InventoryPath, FileDetails>,
}

/// Optional metadata associated with a commit
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct CommitMeta {
    pub(crate) object_id: Option<String>,
    pub(crate) user_name: Option<String>,
    pub(crate) user_address: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) created: Option<DateTime<Local>>,
    pub(crate) spec: Option<SpecVersion>,
}

impl VersionNum {
    /// Creates a new VersionNum with width 0
    pub fn new(number: u32) -> Self {
        Self { number, width: 0 }
    }

    /// Creates a new VersionNum
    pub fn with_width(number: u32, width: u32) -> Self {
        Self { number, width }
    }

    /// The first version of a new object, `v1`
    pub fn v1() -> Self {
        Self::new(1)
    }

    /// The highest number a sequence with this padding width may reach. An unpadded
    /// sequence is unbounded; a sequence padded to width `w` may not exceed
    /// `10^(w-1) - 1` entries.
    pub fn max_number(&self) -> u32 {
        match self.width {
            0 => u32::MAX,
            width if width > 10 => u32::MAX,
            width => (10u64.pow(width - 1) - 1).min(u32::MAX as u64) as u32,
        }
    }

    /// Returns the previous version, or an Error if the previous version is invalid
    /// (less than 1).
    pub fn previous(&self) -> Result<VersionNum> {
        if self.number <= 1 {
            return Err(OcflError::IllegalState(
                "Versions cannot be less than 1".to_string(),
            ));
        }

        Ok(Self {
            number: self.number - 1,
            width: self.width,
        })
    }

    /// Returns the next version, or an Error if incrementing would overflow the padding
    /// width.
    pub fn next(&self) -> Result<VersionNum> {
        if self.number >= self.max_number() {
            return Err(OcflError::IllegalState(format!(
                "Version cannot be greater than {}",
                self.max_number()
            )));
        }

        Ok(Self {
            number: self.number + 1,
            width: self.width,
        })
    }
}

impl TryFrom<&str> for VersionNum {
    type Error = OcflError;

    /// Parses a string in the format of `v1` or `v0002` into a `VersionNum`. An error is
    /// returned if the version string is invalid.
    fn try_from(version: &str) -> Result<Self, Self::Error> {
        if !VERSION_REGEX.is_match(version) {
            return Err(OcflError::IllegalArgument(format!(
                "Invalid version {}",
                version
            )));
        }

        match version[1..].parse::<u32>() {
            Ok(num) => {
                if num < 1 {
                    return Err(OcflError::IllegalArgument(format!(
                        "Invalid version {}",
                        version
                    )));
                }

                let width = match version.starts_with("v0") {
                    true => version.len() - 1,
                    false => 0,
                };

                Ok(Self {
                    number: num,
                    width: width as u32,
                })
            }
            Err(_) => Err(OcflError::IllegalArgument(format!(
                "Invalid version {}",
                version
            ))),
        }
    }
}

impl FromStr for VersionNum {
    type Err = OcflError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionNum::try_from(s)
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{:0width$}", self.number, width = self.width as usize)
    }
}

impl From<VersionNum> for String {
    fn from(version_num: VersionNum) -> Self {
        format!("{}", version_num)
    }
}

impl PartialEq for VersionNum {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for VersionNum {}

impl Hash for VersionNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state)
    }
}

impl PartialOrd for VersionNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

/// True iff the set of version numbers forms a valid lineage: all share the same padding
/// width, the integer values are exactly `1..=n`, and a padded sequence has not overflowed
/// its width.
pub fn valid_lineage(versions: &[VersionNum]) -> bool {
    if versions.is_empty() {
        return false;
    }

    let width = versions[0].width;
    if versions.iter().any(|v| v.width != width) {
        return false;
    }

    let mut numbers: Vec<u32> = versions.iter().map(|v| v.number).collect();
    numbers.sort_unstable();
    numbers.dedup();

    if numbers.len() != versions.len() {
        return false;
    }

    let count = numbers.len() as u32;
    if count > versions[0].max_number() {
        return false;
    }

    numbers.first() == Some(&1) && numbers.last() == Some(&count)
}

/// Returns the version with the highest number, or None if the slice is empty
pub fn lineage_head(versions: &[VersionNum]) -> Option<VersionNum> {
    versions.iter().max().copied()
}

impl InventoryPath {
    /// Returns an iterable containing each segment of the path split on the `/` separator
    pub fn parts(&self) -> Split<char> {
        self.0.split('/')
    }

    /// Returns the part of the path that's after the final `/`, or the entire path if
    /// there is no `/`
    pub fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(last_slash) => &self.0.as_str()[last_slash + 1..],
            None => self.0.as_str(),
        }
    }

    /// Returns the parent directory portion of the path, or None if the path has no `/`
    pub fn parent(&self) -> Option<&str> {
        self.0.rfind('/').map(|last_slash| &self.0[0..last_slash])
    }

    /// Iterates over every ancestor directory of the path, eg `a/b/c` yields `a/b` and `a`
    pub fn ancestors(&self) -> impl Iterator<Item = &str> {
        let path = self.0.as_str();
        path.char_indices()
            .filter(|(_, c)| *c == '/')
            .map(move |(i, _)| &path[0..i])
    }

    /// Creates a new path by joining this path with another
    pub fn resolve(&self, other: &InventoryPath) -> InventoryPath {
        InventoryPath(format!("{}/{}", self.0, other.0))
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for InventoryPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(OcflError::IllegalArgument(
                "Paths may not be empty".to_string(),
            ));
        }

        if value.starts_with('/') {
            return Err(OcflError::IllegalArgument(format!(
                "Paths may not be absolute. Found: {}",
                value
            )));
        }

        let has_illegal_part = value
            .split('/')
            .any(|part| part == "." || part == ".." || part.is_empty());

        if has_illegal_part {
            return Err(OcflError::IllegalArgument(format!(
                "Paths may not contain '.', '..', or '' parts. Found: {}",
                value
            )));
        }

        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for InventoryPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InventoryPath::try_from(value.as_str())
    }
}

impl TryFrom<&String> for InventoryPath {
    type Error = OcflError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        InventoryPath::try_from(value.as_str())
    }
}

impl From<InventoryPath> for String {
    fn from(path: InventoryPath) -> Self {
        path.0
    }
}

impl AsRef<str> for InventoryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InventoryPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl CommitMeta {
    /// Creates commit meta with all values empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the object id. Required when committing to a new object; ignored otherwise.
    pub fn with_object_id(mut self, object_id: &str) -> Self {
        self.object_id = Some(object_id.to_string());
        self
    }

    /// Sets the commit user. `name` must be provided if `address` is provided.
    pub fn with_user(mut self, name: Option<String>, address: Option<String>) -> Result<Self> {
        if address.is_some() && name.is_none() {
            return Err(OcflError::IllegalArgument(
                "User name must be set when user address is set.".to_string(),
            ));
        }
        self.user_name = name;
        self.user_address = address;
        Ok(self)
    }

    /// Sets the commit message
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Sets the commit created timestamp. When unset, the commit uses the current time.
    pub fn with_created(mut self, created: Option<DateTime<Local>>) -> Self {
        self.created = created;
        self
    }

    /// Pins the OCFL spec version of the new inventory
    pub fn with_spec(mut self, spec: Option<SpecVersion>) -> Self {
        self.spec = spec;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::{lineage_head, valid_lineage, InventoryPath, VersionNum};

    #[test]
    fn parse_version_nums() {
        let unpadded = VersionNum::try_from("v3").unwrap();
        assert_eq!(3, unpadded.number);
        assert_eq!(0, unpadded.width);

        let padded = VersionNum::try_from("v002").unwrap();
        assert_eq!(2, padded.number);
        assert_eq!(3, padded.width);
        assert_eq!("v002", padded.to_string());
    }

    #[test]
    fn reject_invalid_version_nums() {
        assert!(VersionNum::try_from("v0").is_err());
        assert!(VersionNum::try_from("1").is_err());
        assert!(VersionNum::try_from("v1.1").is_err());
        assert!(VersionNum::try_from("v-1").is_err());
        assert!(VersionNum::try_from("version1").is_err());
    }

    #[test]
    fn padded_version_nums_overflow() {
        let last = VersionNum::with_width(99, 3);
        assert!(last.next().is_err());

        let next = VersionNum::with_width(8, 3).next().unwrap();
        assert_eq!(VersionNum::with_width(9, 3), next);
        assert_eq!("v009", next.to_string());
    }

    #[test]
    fn iterated_next_produces_valid_lineage() {
        let mut versions = vec![VersionNum::v1()];
        for _ in 0..9 {
            versions.push(versions.last().unwrap().next().unwrap());
        }

        assert!(valid_lineage(&versions));
        assert_eq!(VersionNum::new(10), lineage_head(&versions).unwrap());
    }

    #[test]
    fn reject_invalid_lineages() {
        assert!(!valid_lineage(&[]));
        // gap
        assert!(!valid_lineage(&[VersionNum::new(1), VersionNum::new(3)]));
        // does not start at 1
        assert!(!valid_lineage(&[VersionNum::new(2), VersionNum::new(3)]));
        // mixed padding
        assert!(!valid_lineage(&[
            VersionNum::with_width(1, 3),
            VersionNum::new(2)
        ]));
    }

    #[test]
    fn create_paths_when_valid() {
        let path = InventoryPath::try_from("foo/.bar/baz.txt").unwrap();
        assert_eq!("foo/.bar/baz.txt", path.as_str());
        assert_eq!("baz.txt", path.filename());
        assert_eq!(Some("foo/.bar"), path.parent());

        let ancestors: Vec<&str> = path.ancestors().collect();
        assert_eq!(vec!["foo", "foo/.bar"], ancestors);
    }

    #[test]
    fn reject_invalid_paths() {
        assert!(InventoryPath::try_from("").is_err());
        assert!(InventoryPath::try_from(".").is_err());
        assert!(InventoryPath::try_from("/absolute").is_err());
        assert!(InventoryPath::try_from("foo//bar").is_err());
        assert!(InventoryPath::try_from("foo/./bar").is_err());
        assert!(InventoryPath::try_from("foo/../bar").is_err());
        assert!(InventoryPath::try_from("trailing/").is_err());
    }
}
