//! The commit planner and executor. Planning derives the next inventory from the prior
//! inventory (or none) plus a stage, and emits an ordered, idempotent sequence of write
//! activities. Execution applies the plan; the root inventory is written last so a
//! crash mid-commit leaves the object pointing at the prior head.

use std::collections::BTreeMap;
use std::io::Cursor;

use chrono::Local;
use log::info;

use crate::cancel::Cancel;
use crate::consts::INVENTORY_FILE;
use crate::digest::HexDigest;
use crate::digest_map::DigestMap;
use crate::error::{CommitError, OcflError, Result};
use crate::fs::WriteFileSystem;
use crate::inventory::{Inventory, User, Version};
use crate::paths;
use crate::serde::{format_sidecar, serialize_inventory};
use crate::spec::SpecVersion;
use crate::types::{CommitMeta, InventoryPath, VersionNum};
use crate::stage::Stage;
use crate::validate::{validate_inventory, ValidationResult};

/// Rewrites logical paths into content paths on commit, eg for deduplicating layouts
pub type ContentPathFn = Box<dyn Fn(&InventoryPath) -> String + Send + Sync>;

/// Options controlling commit behavior
#[derive(Default)]
pub struct CommitOptions {
    /// Permit a commit whose state equals the prior head's state
    pub allow_unchanged: bool,
    /// Serialize the inventory compactly instead of pretty-printed
    pub compact_json: bool,
    /// Optional rewrite applied to each logical path before it is prefixed with
    /// `<head>/<contentDirectory>/`
    pub content_path_fn: Option<ContentPathFn>,
}

/// One step of a commit plan. Activities are idempotent when re-applied to a partially
/// completed state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Activity {
    /// Remove the prior spec's NAMASTE file, tolerating its absence
    RemovePriorNamaste { spec: SpecVersion },
    /// Write the NAMASTE declaration for the new spec
    WriteNamaste { spec: SpecVersion },
    /// Copy new content into the version's content directory
    CopyContent { digest: HexDigest, dst_path: String },
    /// Write `inventory.json` and its sidecar into `dir` (empty = the object root)
    WriteInventory { dir: String },
}

/// The derived inventory plus the ordered activities that realize it on disk
pub struct CommitPlan {
    inventory: Inventory,
    inventory_bytes: Vec<u8>,
    sidecar_bytes: Vec<u8>,
    spec: SpecVersion,
    activities: Vec<Activity>,
}

impl CommitPlan {
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn spec(&self) -> SpecVersion {
        self.spec
    }

    pub fn inventory_bytes(&self) -> &[u8] {
        &self.inventory_bytes
    }
}

/// Derives the next inventory and the write plan for committing `stage` on top of
/// `prior`. Nothing is written; apply the plan with [`execute_plan`].
pub fn plan_commit(
    prior: Option<&Inventory>,
    stage: &Stage,
    meta: &CommitMeta,
    opts: &CommitOptions,
) -> Result<CommitPlan> {
    let id = match prior {
        Some(prior) => prior.id().to_string(),
        None => match &meta.object_id {
            Some(id) => id.clone(),
            None => {
                return Err(OcflError::IllegalArgument(
                    "An object id is required when committing to a new object".to_string(),
                ))
            }
        },
    };

    if let Some(prior) = prior {
        if prior.digest_algorithm() != stage.digest_algorithm() {
            return Err(OcflError::IllegalArgument(format!(
                "The digest algorithm may not change between versions. Expected: {}; Found: {}",
                prior.digest_algorithm(),
                stage.digest_algorithm()
            )));
        }
    }

    let spec = resolve_spec(prior, meta)?;
    let content_directory = prior.and_then(|prior| prior.content_directory().map(String::from));
    let content_dir_name = content_directory
        .as_deref()
        .unwrap_or(crate::consts::DEFAULT_CONTENT_DIR)
        .to_string();

    let head = match prior {
        Some(prior) => prior.head().next()?,
        None => VersionNum::v1(),
    };

    let new_state = stage.state().normalize();

    if let Some(prior) = prior {
        if !opts.allow_unchanged && prior.head_version().state().normalize() == new_state {
            return Err(OcflError::IllegalState(
                "Cannot commit: version state unchanged".to_string(),
            ));
        }
    }

    let mut manifest = prior
        .map(|prior| prior.manifest().normalize())
        .unwrap_or_default();

    // new manifest entries for content the object has not seen before
    let mut additions: Vec<(HexDigest, Vec<String>)> = Vec::new();
    let mut fixity_additions: BTreeMap<String, Vec<(HexDigest, Vec<String>)>> = BTreeMap::new();

    for (digest, logical_paths) in new_state.iter() {
        if manifest.contains_digest(digest) {
            continue;
        }

        let content_paths: Vec<String> = logical_paths
            .iter()
            .map(|logical| {
                let rewritten = match &opts.content_path_fn {
                    Some(f) => f(logical),
                    None => logical.as_str().to_string(),
                };
                paths::join(
                    &paths::join(&head.to_string(), &content_dir_name),
                    &rewritten,
                )
            })
            .collect();

        for (algorithm, fixity_digest) in stage.fixity_for(digest) {
            fixity_additions
                .entry(algorithm)
                .or_default()
                .push((fixity_digest.lowercased(), content_paths.clone()));
        }

        additions.push((digest.clone(), content_paths));
    }

    if !additions.is_empty() {
        let addition_map = DigestMap::new(additions.clone())?;
        manifest = manifest.merge(&addition_map, false)?;
    }

    let fixity = extend_fixity(prior, fixity_additions)?;
    let versions = build_versions(prior, head, new_state, meta)?;

    let inventory = Inventory::new(
        id,
        spec.inventory_type().to_string(),
        stage.digest_algorithm(),
        head,
        content_directory,
        manifest,
        versions,
        fixity,
    )?;

    let mut validation = ValidationResult::new();
    validate_inventory(&inventory, Some(spec), "new", &mut validation);

    if validation.has_errors() {
        let messages: Vec<String> = validation
            .errors
            .iter()
            .map(|e| format!("[{}] {}", e.code, e.text))
            .collect();
        return Err(OcflError::IllegalState(format!(
            "The new inventory is invalid: {}",
            messages.join("; ")
        )));
    }

    let (inventory_bytes, digest) = serialize_inventory(&inventory, !opts.compact_json)?;
    let sidecar_bytes = format_sidecar(&digest).into_bytes();

    let mut inventory = inventory;
    inventory.set_digest(digest);

    let mut activities = Vec::new();

    match prior {
        None => activities.push(Activity::WriteNamaste { spec }),
        Some(prior) => {
            let prior_spec = prior.spec_version()?;
            if prior_spec != spec {
                activities.push(Activity::RemovePriorNamaste { spec: prior_spec });
                activities.push(Activity::WriteNamaste { spec });
            }
        }
    }

    for (digest, content_paths) in &additions {
        if stage.resolve_content(digest).is_none() {
            return Err(OcflError::IllegalState(format!(
                "The stage has no content source for digest {}",
                digest
            )));
        }

        for dst_path in content_paths {
            activities.push(Activity::CopyContent {
                digest: digest.clone(),
                dst_path: dst_path.clone(),
            });
        }
    }

    activities.push(Activity::WriteInventory {
        dir: head.to_string(),
    });
    activities.push(Activity::WriteInventory { dir: String::new() });

    Ok(CommitPlan {
        inventory,
        inventory_bytes,
        sidecar_bytes,
        spec,
        activities,
    })
}

/// Applies a plan to the object rooted at `root`, returning the bytes written. On
/// failure the error's `dirty` flag indicates whether the target may contain a partial
/// write.
pub fn execute_plan(
    plan: &CommitPlan,
    stage: &Stage,
    fs: &dyn WriteFileSystem,
    root: &str,
    cancel: &Cancel,
) -> Result<u64, CommitError> {
    let mut bytes_written = 0u64;
    let mut dirty = false;

    for activity in &plan.activities {
        if let Err(e) = cancel.check() {
            return Err(wrap(dirty, e));
        }

        match activity {
            Activity::RemovePriorNamaste { spec } => {
                match fs.remove(&paths::object_namaste_path(root, *spec)) {
                    Ok(()) | Err(OcflError::NotFound(_)) => (),
                    Err(e) => return Err(wrap(dirty, e)),
                }
                dirty = true;
            }
            Activity::WriteNamaste { spec } => {
                dirty = true;
                let contents = spec.object_namaste_contents();
                let path = paths::object_namaste_path(root, *spec);
                match fs.write(&path, &mut contents.as_bytes()) {
                    Ok(count) => bytes_written += count,
                    Err(e) => return Err(wrap(dirty, e)),
                }
            }
            Activity::CopyContent { digest, dst_path } => {
                let (src_fs, src_path) = match stage.resolve_content(digest) {
                    Some(resolved) => resolved,
                    None => {
                        return Err(wrap(
                            dirty,
                            OcflError::IllegalState(format!(
                                "The stage has no content source for digest {}",
                                digest
                            )),
                        ))
                    }
                };

                dirty = true;

                let mut reader = match src_fs.open_file(src_path) {
                    Ok(reader) => reader,
                    Err(e) => return Err(wrap(dirty, e)),
                };

                match fs.write(&paths::join(root, dst_path), &mut reader) {
                    Ok(count) => bytes_written += count,
                    Err(e) => return Err(wrap(dirty, e)),
                }
            }
            Activity::WriteInventory { dir } => {
                dirty = true;
                let target = paths::join(root, dir);
                let inventory_path = paths::join(&target, INVENTORY_FILE);
                let sidecar_path = paths::sidecar_path(&target, plan.inventory.digest_algorithm());

                match fs.write(&inventory_path, &mut Cursor::new(&plan.inventory_bytes)) {
                    Ok(count) => bytes_written += count,
                    Err(e) => return Err(wrap(dirty, e)),
                }
                match fs.write(&sidecar_path, &mut Cursor::new(&plan.sidecar_bytes)) {
                    Ok(count) => bytes_written += count,
                    Err(e) => return Err(wrap(dirty, e)),
                }
            }
        }
    }

    info!(
        "Committed version {} of object {}",
        plan.inventory.head(),
        plan.inventory.id()
    );

    Ok(bytes_written)
}

/// Plans and executes a commit in one call, returning the new inventory
pub fn commit(
    fs: &dyn WriteFileSystem,
    root: &str,
    prior: Option<&Inventory>,
    stage: &Stage,
    meta: &CommitMeta,
    opts: &CommitOptions,
    cancel: &Cancel,
) -> Result<Inventory, CommitError> {
    let plan = plan_commit(prior, stage, meta, opts).map_err(CommitError::clean)?;
    execute_plan(&plan, stage, fs, root, cancel)?;
    Ok(plan.inventory)
}

fn wrap(dirty: bool, source: OcflError) -> CommitError {
    if dirty {
        CommitError::dirty(source)
    } else {
        CommitError::clean(source)
    }
}

/// The new inventory's spec: pinned by meta, inherited from the prior, or the latest.
/// Downgrades are rejected.
fn resolve_spec(prior: Option<&Inventory>, meta: &CommitMeta) -> Result<SpecVersion> {
    let prior_spec = match prior {
        Some(prior) => Some(prior.spec_version()?),
        None => None,
    };

    let spec = meta
        .spec
        .or(prior_spec)
        .unwrap_or_else(SpecVersion::latest);

    if let Some(prior_spec) = prior_spec {
        if spec < prior_spec {
            return Err(OcflError::IllegalArgument(format!(
                "The OCFL spec version may not be downgraded from {} to {}",
                prior_spec, spec
            )));
        }
    }

    Ok(spec)
}

/// Clones the prior versions with normalized states and appends the new head version
fn build_versions(
    prior: Option<&Inventory>,
    head: VersionNum,
    new_state: DigestMap,
    meta: &CommitMeta,
) -> Result<BTreeMap<VersionNum, Version>> {
    let mut versions = BTreeMap::new();

    if let Some(prior) = prior {
        for (version_num, version) in prior.versions() {
            versions.insert(
                *version_num,
                Version::new(
                    version.created(),
                    version.state().normalize(),
                    version.message().map(String::from),
                    version.user().cloned(),
                ),
            );
        }
    }

    let user = meta
        .user_name
        .clone()
        .map(|name| User::new(name, meta.user_address.clone()));

    versions.insert(
        head,
        Version::new(
            meta.created.unwrap_or_else(Local::now),
            new_state,
            meta.message.clone(),
            user,
        ),
    );

    Ok(versions)
}

/// Extends the prior fixity blocks with the new entries, normalized
fn extend_fixity(
    prior: Option<&Inventory>,
    additions: BTreeMap<String, Vec<(HexDigest, Vec<String>)>>,
) -> Result<Option<BTreeMap<String, DigestMap>>> {
    let mut fixity: BTreeMap<String, DigestMap> = prior
        .and_then(|prior| prior.fixity())
        .map(|blocks| {
            blocks
                .iter()
                .map(|(algorithm, block)| (algorithm.clone(), block.normalize()))
                .collect()
        })
        .unwrap_or_default();

    for (algorithm, entries) in additions {
        let addition_map = DigestMap::new(entries)?;

        let merged = match fixity.get(&algorithm) {
            Some(existing) => existing.merge(&addition_map, false)?,
            None => addition_map,
        };

        fixity.insert(algorithm, merged);
    }

    if fixity.is_empty() {
        Ok(None)
    } else {
        Ok(Some(fixity))
    }
}
