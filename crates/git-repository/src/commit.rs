//! Commit Builder: turns a base tree plus a set of path-keyed edits into
//! new blob, tree, and commit objects and submits them to the object
//! database in one pack.
//!
//! Construction works bottom-up: every touched path is hashed as a blob
//! first, then every directory that contains a touched path is rebuilt from
//! its deepest affected child upward, finishing at the root tree. A
//! directory's untouched entries are carried over unchanged — existing mode
//! strings are never renormalized, only entries that are actually added,
//! replaced, or removed move.

use std::collections::{BTreeMap, BTreeSet};

use bstr::{BStr, BString};
use git_hash::{HashAlgorithm, ObjectId};
use git_object::{Blob, FileMode, Object, ObjectType, Tree, TreeEntry};
use git_odb::ObjectDatabase;
use git_pack::optimizer::{plan_deltas, Candidate, PreviousRevisionLookup, DEFAULT_CHAIN_DEPTH};
use git_pack::write::write_planned_pack;
use git_utils::date::Signature;

use crate::RepoError;

/// Blobs at or above this size are written straight to loose storage instead
/// of being staged into the pack built for this commit.
const LARGE_BLOB_THRESHOLD: u64 = 512 * 1024 * 1024;

/// A single change to apply to the working tree at commit time.
#[derive(Debug, Clone)]
pub enum PathEdit {
    /// Hash `content` as a new blob and place it at this path with `mode`.
    AddOrUpdate { content: Vec<u8>, mode: FileMode },
    /// Place an already-known object at this path with `mode` (no hashing).
    AddOrUpdateId { oid: ObjectId, mode: FileMode },
    /// Remove whatever entry currently exists at this path.
    Remove,
}

/// Commit metadata supplied by the caller; everything derivable from the
/// tree edits (the `tree` field) is computed by [`build_commit`].
#[derive(Debug, Clone)]
pub struct CommitMetadata {
    pub message: BString,
    pub author: Signature,
    pub committer: Signature,
    pub parents: Vec<ObjectId>,
}

/// Build a new commit from `base_tree` (the previous commit's root tree, or
/// `None` for the first commit) and a set of path-keyed edits, writing every
/// newly created object to `odb`.
///
/// Returns the id of the new commit object.
pub fn build_commit(
    odb: &ObjectDatabase,
    hash_algo: HashAlgorithm,
    base_tree: Option<&Tree>,
    edits: &BTreeMap<String, PathEdit>,
    metadata: CommitMetadata,
) -> Result<ObjectId, RepoError> {
    let mut candidates: Vec<Candidate> = Vec::new();

    // Blobs first: hash content, remember large ones went straight to loose
    // storage, stage the rest as pack candidates.
    let mut new_blob_at_path: BTreeMap<String, (ObjectId, FileMode)> = BTreeMap::new();
    for (path, edit) in edits {
        if let PathEdit::AddOrUpdate { content, mode } = edit {
            let blob = Object::Blob(Blob::new(content.clone()));
            let oid = blob.compute_oid(hash_algo)?;
            if content.len() as u64 >= LARGE_BLOB_THRESHOLD {
                odb.write_raw(ObjectType::Blob, content)?;
            } else if !odb.contains(&oid) {
                candidates.push(Candidate {
                    id: oid,
                    obj_type: ObjectType::Blob,
                    data: content.clone(),
                    path: Some(path.clone()),
                });
            }
            new_blob_at_path.insert(path.clone(), (oid, *mode));
        }
    }

    // Every directory containing a touched path must be rebuilt, deepest
    // first, so a parent can pick up its child's freshly minted oid.
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    for path in edits.keys() {
        let mut current = path.as_str();
        loop {
            match current.rsplit_once('/') {
                Some((parent, _)) => {
                    dirs.insert(parent.to_string());
                    current = parent;
                }
                None => {
                    dirs.insert(String::new());
                    break;
                }
            }
        }
    }
    let mut dirs: Vec<String> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));

    let mut new_tree_at_path: BTreeMap<String, (ObjectId, Tree)> = BTreeMap::new();

    for dir in dirs {
        let mut tree = tree_at_dir(odb, base_tree, &dir)?;

        for (path, edit) in edits {
            let (parent, name) = split_parent(path);
            if parent != dir {
                continue;
            }
            match edit {
                PathEdit::Remove => remove_entry(&mut tree, &name),
                PathEdit::AddOrUpdate { .. } => {
                    let (oid, mode) = new_blob_at_path[path];
                    upsert_entry(&mut tree, &name, mode, oid);
                }
                PathEdit::AddOrUpdateId { oid, mode } => {
                    upsert_entry(&mut tree, &name, *mode, *oid);
                }
            }
        }

        // Fold in subdirectories already rebuilt at a deeper level.
        for (child_dir, (child_oid, child_tree)) in &new_tree_at_path {
            let (parent, name) = split_parent(child_dir);
            if parent != dir {
                continue;
            }
            if child_tree.is_empty() {
                remove_entry(&mut tree, &name);
            } else {
                upsert_entry(&mut tree, &name, FileMode::Tree, *child_oid);
            }
        }

        let oid = Object::Tree(tree.clone()).compute_oid(hash_algo)?;
        if !tree.is_empty() && !odb.contains(&oid) {
            candidates.push(Candidate {
                id: oid,
                obj_type: ObjectType::Tree,
                data: tree.serialize_content(),
                path: if dir.is_empty() { None } else { Some(dir.clone()) },
            });
        }
        new_tree_at_path.insert(dir, (oid, tree));
    }

    let root_oid = match new_tree_at_path.get("") {
        Some((oid, _)) => *oid,
        None => match base_tree {
            Some(root) => Object::Tree(root.clone()).compute_oid(hash_algo)?,
            None => Object::Tree(Tree::default()).compute_oid(hash_algo)?,
        },
    };

    let commit = git_object::Commit {
        tree: root_oid,
        parents: metadata.parents,
        author: metadata.author,
        committer: metadata.committer,
        encoding: None,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: metadata.message,
    };
    let commit_obj = Object::Commit(commit);
    let commit_oid = commit_obj.compute_oid(hash_algo)?;
    candidates.push(Candidate {
        id: commit_oid,
        obj_type: ObjectType::Commit,
        data: commit_obj.serialize_content(),
        path: None,
    });

    let mut seen_ids = std::collections::HashSet::new();
    candidates.retain(|c| seen_ids.insert(c.id));

    if !candidates.is_empty() {
        let lookup = PreviousTreeLookup { odb, base_tree };
        let planned = plan_deltas(candidates, DEFAULT_CHAIN_DEPTH, &lookup);
        let pack_dir = odb.objects_dir().join("pack");
        write_planned_pack(&pack_dir, &planned, hash_algo)?;
        odb.refresh()?;
    }

    Ok(commit_oid)
}

struct PreviousTreeLookup<'a> {
    odb: &'a ObjectDatabase,
    base_tree: Option<&'a Tree>,
}

impl PreviousRevisionLookup for PreviousTreeLookup<'_> {
    fn previous_object_for_path(&self, path: &str) -> Option<ObjectId> {
        entry_at_path(self.odb, self.base_tree, path)
            .ok()
            .flatten()
            .map(|entry| entry.oid)
    }
}

fn split_parent(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => (String::new(), path.to_string()),
    }
}

fn upsert_entry(tree: &mut Tree, name: &str, mode: FileMode, oid: ObjectId) {
    let name_bytes = BString::from(name);
    if let Some(entry) = tree.entries.iter_mut().find(|e| e.name == name_bytes) {
        entry.mode = mode;
        entry.oid = oid;
    } else {
        tree.entries.push(TreeEntry {
            mode,
            name: name_bytes,
            oid,
        });
    }
}

fn remove_entry(tree: &mut Tree, name: &str) {
    let name_bytes = BString::from(name);
    tree.entries.retain(|e| e.name != name_bytes);
}

/// Walk down from `root` following `path`'s directory segments, reading
/// intermediate trees from `odb`, and return the tree found at the end (an
/// empty tree if the path doesn't exist yet).
fn tree_at_dir(
    odb: &ObjectDatabase,
    root: Option<&Tree>,
    dir: &str,
) -> Result<Tree, RepoError> {
    if dir.is_empty() {
        return Ok(root.cloned().unwrap_or_default());
    }
    match entry_at_path(odb, root, dir)? {
        Some(entry) if entry.mode.is_tree() => match odb.read(&entry.oid)? {
            Some(Object::Tree(t)) => Ok(t),
            _ => Ok(Tree::default()),
        },
        _ => Ok(Tree::default()),
    }
}

/// Resolve `path` against `root`, reading intermediate trees from `odb`.
fn entry_at_path(
    odb: &ObjectDatabase,
    root: Option<&Tree>,
    path: &str,
) -> Result<Option<TreeEntry>, RepoError> {
    let mut current = match root {
        Some(t) => t.clone(),
        None => return Ok(None),
    };
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Ok(None);
    }
    let last = segments.pop().unwrap();

    for seg in segments {
        let entry = match current.find(BStr::new(seg.as_bytes())) {
            Some(e) if e.mode.is_tree() => e.clone(),
            _ => return Ok(None),
        };
        match odb.read(&entry.oid)? {
            Some(Object::Tree(t)) => current = t,
            _ => return Ok(None),
        }
    }

    Ok(current.find(BStr::new(last.as_bytes())).cloned())
}
