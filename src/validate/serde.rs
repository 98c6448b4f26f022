//! The error-collecting inventory parser. Unlike the strict codec, this parser does not
//! stop at the first problem: it records every malformed, missing, and unknown field
//! with its OCFL code and only produces an inventory when no fatal errors were found.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::TryFrom;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::digest::DigestAlgorithm;
use crate::digest_map::DigestMap;
use crate::inventory::{Inventory, User, Version};
use crate::spec::SpecVersion;
use crate::types::{InventoryPath, VersionNum};
use crate::validate::{
    map_problem_code, validate_content_dir, validate_inventory, ErrorCode, MapContext,
    MapProblem, ValidationResult,
};

const ID_FIELD: &str = "id";
const TYPE_FIELD: &str = "type";
const DIGEST_ALGORITHM_FIELD: &str = "digestAlgorithm";
const HEAD_FIELD: &str = "head";
const CONTENT_DIRECTORY_FIELD: &str = "contentDirectory";
const MANIFEST_FIELD: &str = "manifest";
const VERSIONS_FIELD: &str = "versions";
const FIXITY_FIELD: &str = "fixity";
const INVENTORY_FIELDS: &[&str] = &[
    ID_FIELD,
    TYPE_FIELD,
    DIGEST_ALGORITHM_FIELD,
    HEAD_FIELD,
    CONTENT_DIRECTORY_FIELD,
    MANIFEST_FIELD,
    VERSIONS_FIELD,
    FIXITY_FIELD,
];

const CREATED_FIELD: &str = "created";
const STATE_FIELD: &str = "state";
const MESSAGE_FIELD: &str = "message";
const USER_FIELD: &str = "user";
const VERSION_FIELDS: &[&str] = &[CREATED_FIELD, STATE_FIELD, MESSAGE_FIELD, USER_FIELD];

const NAME_FIELD: &str = "name";
const ADDRESS_FIELD: &str = "address";

/// Parses and validates inventory bytes standalone, returning the inventory when it had
/// no fatal problems plus the full validation report.
pub fn validate_inventory_bytes(
    bytes: &[u8],
    expected_spec: Option<SpecVersion>,
) -> (Option<Inventory>, ValidationResult) {
    let mut result = ValidationResult::new();
    let inventory =
        parse_inventory_collecting(bytes, super::ROOT_LOCATION, expected_spec, &mut result);

    if let Some(inventory) = &inventory {
        if result.object_id.is_none() {
            result.object_id = Some(inventory.id().to_string());
        }
    }

    (inventory, result)
}

/// Parses inventory bytes, recording every problem into `result` tagged with `location`.
/// Returns the parsed inventory only when no fatal errors were recorded, with its JSON
/// digest already computed.
pub(crate) fn parse_inventory_collecting(
    bytes: &[u8],
    location: &str,
    expected_spec: Option<SpecVersion>,
    result: &mut ValidationResult,
) -> Option<Inventory> {
    let starting_errors = result.errors.len();

    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E033,
                "Inventory could not be parsed".to_string(),
            );
            return None;
        }
    };

    let fields = match value.as_object() {
        Some(fields) => fields,
        None => {
            result.error_at(
                location,
                ErrorCode::E033,
                "Inventory must be a JSON object".to_string(),
            );
            return None;
        }
    };

    for field in fields.keys() {
        if !INVENTORY_FIELDS.contains(&field.as_str()) {
            result.error_at(
                location,
                ErrorCode::E102,
                format!("Inventory contains unknown field '{}'", field),
            );
        }
    }

    let id = parse_string_field(fields, ID_FIELD, location, result);
    let type_declaration = parse_string_field(fields, TYPE_FIELD, location, result);
    let digest_algorithm = parse_digest_algorithm(fields, location, result);
    let head = parse_head(fields, location, result);
    let content_directory = parse_content_directory(fields, location, result);
    let manifest = parse_manifest(fields, location, result);
    let versions = parse_versions(fields, location, result);
    let fixity = parse_fixity(fields, location, result);

    if result.errors.len() > starting_errors {
        return None;
    }

    // all required fields parsed; guard the head before handing off to the model
    let head = head?;
    let versions = versions?;

    if !versions.contains_key(&head) {
        result.error_at(
            location,
            ErrorCode::E040,
            format!(
                "Inventory field 'head' references version {} which does not exist",
                head
            ),
        );
        return None;
    }

    let inventory = match Inventory::new(
        id?,
        type_declaration?,
        digest_algorithm?,
        head,
        content_directory,
        manifest?,
        versions,
        fixity,
    ) {
        Ok(inventory) => inventory,
        Err(e) => {
            result.error_at(location, ErrorCode::E033, e.to_string());
            return None;
        }
    };

    validate_inventory(&inventory, expected_spec, location, result);

    if result.errors.len() > starting_errors {
        return None;
    }

    let mut inventory = inventory;
    match inventory.digest_algorithm().hash_hex(&mut &bytes[..]) {
        Ok(digest) => inventory.set_digest(digest),
        Err(_) => return None,
    }

    Some(inventory)
}

fn parse_string_field(
    fields: &serde_json::Map<String, Value>,
    field: &str,
    location: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    match fields.get(field) {
        None => {
            missing_field(field, location, result);
            None
        }
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E036,
                format!("Inventory field '{}' must be a string", field),
            );
            None
        }
    }
}

fn parse_digest_algorithm(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<DigestAlgorithm> {
    let value = match fields.get(DIGEST_ALGORITHM_FIELD) {
        None => {
            missing_field(DIGEST_ALGORITHM_FIELD, location, result);
            return None;
        }
        Some(Value::String(value)) => value,
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E036,
                format!("Inventory field '{}' must be a string", DIGEST_ALGORITHM_FIELD),
            );
            return None;
        }
    };

    match DigestAlgorithm::from_str(value) {
        Ok(algorithm) => Some(algorithm),
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E025,
                format!(
                    "Inventory field 'digestAlgorithm' must be 'sha512' or 'sha256'. Found: {}",
                    value
                ),
            );
            None
        }
    }
}

fn parse_head(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<VersionNum> {
    let value = match fields.get(HEAD_FIELD) {
        None => {
            missing_field(HEAD_FIELD, location, result);
            return None;
        }
        Some(Value::String(value)) => value,
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E104,
                "Inventory field 'head' must be a string".to_string(),
            );
            return None;
        }
    };

    match VersionNum::try_from(value.as_str()) {
        Ok(head) => Some(head),
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E104,
                format!(
                    "Inventory field 'head' must be a valid version number. Found: {}",
                    value
                ),
            );
            None
        }
    }
}

fn parse_content_directory(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    match fields.get(CONTENT_DIRECTORY_FIELD) {
        None => None,
        Some(Value::String(value)) => {
            validate_content_dir(value, location, result);
            Some(value.clone())
        }
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E017,
                "Inventory field 'contentDirectory' must be a string".to_string(),
            );
            None
        }
    }
}

fn parse_manifest(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<DigestMap> {
    match fields.get(MANIFEST_FIELD) {
        None => {
            missing_field_2(MANIFEST_FIELD, location, result);
            None
        }
        Some(Value::Object(entries)) => collect_map(
            entries,
            MapContext::Manifest,
            "manifest",
            location,
            result,
        ),
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E041,
                "Inventory field 'manifest' must be a JSON object".to_string(),
            );
            None
        }
    }
}

fn parse_versions(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<BTreeMap<VersionNum, Version>> {
    let entries = match fields.get(VERSIONS_FIELD) {
        None => {
            missing_field_2(VERSIONS_FIELD, location, result);
            return None;
        }
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E041,
                "Inventory field 'versions' must be a JSON object".to_string(),
            );
            return None;
        }
    };

    if entries.is_empty() {
        result.error_at(
            location,
            ErrorCode::E008,
            "Inventory does not contain any valid versions".to_string(),
        );
        return None;
    }

    let mut versions = BTreeMap::new();
    let mut failed = false;

    for (key, value) in entries {
        let version_num = match VersionNum::try_from(key.as_str()) {
            Ok(version_num) => version_num,
            Err(_) => {
                result.error_at(
                    location,
                    ErrorCode::E104,
                    format!(
                        "Inventory 'versions' contains an invalid version number. Found: {}",
                        key
                    ),
                );
                failed = true;
                continue;
            }
        };

        match parse_version(value, key, result) {
            Some(version) => {
                versions.insert(version_num, version);
            }
            None => failed = true,
        }
    }

    if failed {
        None
    } else {
        Some(versions)
    }
}

fn parse_version(value: &Value, location: &str, result: &mut ValidationResult) -> Option<Version> {
    let fields = match value.as_object() {
        Some(fields) => fields,
        None => {
            result.error_at(
                location,
                ErrorCode::E047,
                format!("Inventory version '{}' must be a JSON object", location),
            );
            return None;
        }
    };

    for field in fields.keys() {
        if !VERSION_FIELDS.contains(&field.as_str()) {
            result.error_at(
                location,
                ErrorCode::E102,
                format!(
                    "Inventory version '{}' contains unknown field '{}'",
                    location, field
                ),
            );
        }
    }

    let created = parse_created(fields, location, result);
    let state = parse_state(fields, location, result);
    let message = parse_message(fields, location, result);
    let user = parse_user(fields, location, result);

    Some(Version::new(created?, state?, message, user))
}

fn parse_created(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<DateTime<Local>> {
    let value = match fields.get(CREATED_FIELD) {
        None => {
            result.error_at(
                location,
                ErrorCode::E048,
                format!(
                    "Inventory version '{}' is missing required field 'created'",
                    location
                ),
            );
            return None;
        }
        Some(Value::String(value)) => value,
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E049,
                format!(
                    "Inventory version '{}' field 'created' must be an RFC3339 formatted date",
                    location
                ),
            );
            return None;
        }
    };

    match DateTime::parse_from_rfc3339(value) {
        Ok(created) => Some(created.with_timezone(&Local)),
        Err(_) => {
            result.error_at(
                location,
                ErrorCode::E049,
                format!(
                    "Inventory version '{}' field 'created' must be an RFC3339 formatted date. Found: {}",
                    location, value
                ),
            );
            None
        }
    }
}

fn parse_state(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<DigestMap> {
    match fields.get(STATE_FIELD) {
        None => {
            result.error_at(
                location,
                ErrorCode::E048,
                format!(
                    "Inventory version '{}' is missing required field 'state'",
                    location
                ),
            );
            None
        }
        Some(Value::Object(entries)) => {
            collect_map(entries, MapContext::State, "state", location, result)
        }
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E050,
                format!(
                    "Inventory version '{}' field 'state' must be a JSON object",
                    location
                ),
            );
            None
        }
    }
}

fn parse_message(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    match fields.get(MESSAGE_FIELD) {
        None => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E094,
                format!(
                    "Inventory version '{}' field 'message' must be a string",
                    location
                ),
            );
            None
        }
    }
}

fn parse_user(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<User> {
    let user_fields = match fields.get(USER_FIELD) {
        None => return None,
        Some(Value::Object(user_fields)) => user_fields,
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E054,
                format!(
                    "Inventory version '{}' field 'user' must be a JSON object",
                    location
                ),
            );
            return None;
        }
    };

    for field in user_fields.keys() {
        if field != NAME_FIELD && field != ADDRESS_FIELD {
            result.error_at(
                location,
                ErrorCode::E102,
                format!(
                    "Inventory version '{}' contains unknown field '{}'",
                    location, field
                ),
            );
        }
    }

    let name = match user_fields.get(NAME_FIELD) {
        None => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E054,
                format!(
                    "Inventory version '{}' user 'name' must be a string",
                    location
                ),
            );
            None
        }
    };

    let address = match user_fields.get(ADDRESS_FIELD) {
        None => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E054,
                format!(
                    "Inventory version '{}' user 'address' must be a string",
                    location
                ),
            );
            None
        }
    };

    Some(User::from_parts(name, address))
}

fn parse_fixity(
    fields: &serde_json::Map<String, Value>,
    location: &str,
    result: &mut ValidationResult,
) -> Option<BTreeMap<String, DigestMap>> {
    let entries = match fields.get(FIXITY_FIELD) {
        None => return None,
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            result.error_at(
                location,
                ErrorCode::E056,
                "Inventory field 'fixity' must be a JSON object".to_string(),
            );
            return None;
        }
    };

    let mut fixity = BTreeMap::new();

    for (algorithm, block) in entries {
        match block {
            Value::Object(block_entries) => {
                if let Some(map) = collect_map(
                    block_entries,
                    MapContext::Fixity,
                    &format!("fixity block '{}'", algorithm),
                    location,
                    result,
                ) {
                    fixity.insert(algorithm.clone(), map);
                }
            }
            _ => {
                result.error_at(
                    location,
                    ErrorCode::E056,
                    format!(
                        "Inventory fixity block '{}' must be a JSON object",
                        algorithm
                    ),
                );
            }
        }
    }

    if fixity.is_empty() {
        None
    } else {
        Some(fixity)
    }
}

/// Validates and builds a digest map from raw JSON entries, reporting every problem
/// rather than stopping at the first. Returns the map only when it is fully valid.
fn collect_map(
    entries: &serde_json::Map<String, Value>,
    context: MapContext,
    what: &str,
    location: &str,
    result: &mut ValidationResult,
) -> Option<DigestMap> {
    let starting_errors = result.errors.len();

    let mut collected: Vec<(String, Vec<String>)> = Vec::with_capacity(entries.len());
    let mut normalized_digests: HashMap<String, String> = HashMap::new();
    let mut seen_paths: HashSet<String> = HashSet::new();
    let mut dirs: HashSet<String> = HashSet::new();

    for (digest, paths_value) in entries {
        if let Some(twin) =
            normalized_digests.insert(digest.to_ascii_lowercase(), digest.clone())
        {
            result.error_at(
                location,
                map_problem_code(context, MapProblem::DigestConflict),
                format!(
                    "Inventory {} contains digests that differ only in case. Found: {} and {}",
                    what, twin, digest
                ),
            );
            continue;
        }

        let paths_value = match paths_value.as_array() {
            Some(paths_value) => paths_value,
            None => {
                result.error_at(
                    location,
                    map_problem_code(context, MapProblem::PathInvalid),
                    format!(
                        "Inventory {} key '{}' must map to an array of paths",
                        what, digest
                    ),
                );
                continue;
            }
        };

        if paths_value.is_empty() {
            result.error_at(
                location,
                map_problem_code(context, MapProblem::EmptyPaths),
                format!("Inventory {} key '{}' maps to no paths", what, digest),
            );
            continue;
        }

        let mut paths = Vec::with_capacity(paths_value.len());

        for path_value in paths_value {
            let path = match path_value.as_str() {
                Some(path) => path,
                None => {
                    result.error_at(
                        location,
                        map_problem_code(context, MapProblem::PathInvalid),
                        format!("Inventory {} key '{}' contains a non-string path", what, digest),
                    );
                    continue;
                }
            };

            match InventoryPath::try_from(path) {
                Ok(converted) => {
                    if !seen_paths.insert(path.to_string()) {
                        result.error_at(
                            location,
                            map_problem_code(context, MapProblem::PathConflict),
                            format!(
                                "Inventory {} contains duplicate path. Found: {}",
                                what, path
                            ),
                        );
                        continue;
                    }

                    for ancestor in converted.ancestors() {
                        dirs.insert(ancestor.to_string());
                    }

                    paths.push(path.to_string());
                }
                Err(_) => {
                    result.error_at(
                        location,
                        map_problem_code(context, MapProblem::PathInvalid),
                        format!(
                            "Inventory {} contains a path containing an illegal path part. Found: {}",
                            what, path
                        ),
                    );
                }
            }
        }

        collected.push((digest.clone(), paths));
    }

    for path in &seen_paths {
        if dirs.contains(path) {
            result.error_at(
                location,
                map_problem_code(context, MapProblem::PathConflict),
                format!(
                    "Inventory {} contains a path used as both a file and a directory. Found: {}",
                    what, path
                ),
            );
        }
    }

    if result.errors.len() > starting_errors {
        return None;
    }

    DigestMap::new(collected).ok()
}

fn missing_field(field: &str, location: &str, result: &mut ValidationResult) {
    result.error_at(
        location,
        ErrorCode::E036,
        format!("Inventory is missing required field '{}'", field),
    );
}

fn missing_field_2(field: &str, location: &str, result: &mut ValidationResult) {
    result.error_at(
        location,
        ErrorCode::E041,
        format!("Inventory is missing required field '{}'", field),
    );
}
