//! The strict inventory codec: byte-level parse and serialize plus sidecar handling.
//! Parsing retains the raw bytes long enough to compute the JSON digest that the sidecar
//! must match.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::consts::INVENTORY_FILE;
use crate::digest::{DigestAlgorithm, HexDigest};
use crate::error::{OcflError, Result};
use crate::inventory::Inventory;

static SIDECAR_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\t ]+"#).unwrap());

/// Parses inventory JSON strictly: malformed JSON, unknown keys, and missing required
/// keys are all errors. On success the returned inventory carries the digest of `bytes`
/// computed under its declared `digestAlgorithm`.
pub fn parse_inventory(bytes: &[u8]) -> Result<Inventory> {
    let mut inventory: Inventory = serde_json::from_slice(bytes)?;
    inventory.spot_check()?;

    let digest = inventory.digest_algorithm().hash_hex(&mut &bytes[..])?;
    inventory.set_digest(digest);

    Ok(inventory)
}

/// Serializes an inventory to JSON bytes and computes their digest under the inventory's
/// algorithm. The same bytes are written to the version directory and the object root,
/// so the two inventories are byte-identical and sidecar-verifiable.
pub fn serialize_inventory(inventory: &Inventory, pretty: bool) -> Result<(Vec<u8>, HexDigest)> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(inventory)?
    } else {
        serde_json::to_vec(inventory)?
    };

    let digest = inventory.digest_algorithm().hash_hex(&mut bytes.as_slice())?;

    Ok((bytes, digest))
}

/// Formats the sidecar contents for an inventory digest: `<hex-digest>  inventory.json\n`
/// with a two space separator.
pub fn format_sidecar(digest: &HexDigest) -> String {
    format!("{}  {}\n", digest, INVENTORY_FILE)
}

/// Parses sidecar contents, returning the digest it declares. The contents must be the
/// hex digest and `inventory.json` separated by whitespace.
pub fn parse_sidecar(bytes: &[u8]) -> Result<HexDigest> {
    let contents = std::str::from_utf8(bytes)
        .map_err(|_| OcflError::InvalidValue("Inventory sidecar is invalid".to_string()))?;

    let parts: Vec<&str> = SIDECAR_SPLIT.split(contents.trim_end()).collect();

    if parts.len() != 2 || parts[1] != INVENTORY_FILE {
        return Err(OcflError::InvalidValue(
            "Inventory sidecar is invalid".to_string(),
        ));
    }

    Ok(HexDigest::from(parts[0]))
}

/// Returns the digest algorithm named by a sidecar filename, eg `inventory.json.sha512`
pub fn sidecar_algorithm(filename: &str) -> Option<DigestAlgorithm> {
    filename
        .strip_prefix(crate::consts::INVENTORY_SIDECAR_PREFIX)
        .and_then(|name| name.parse().ok())
}
