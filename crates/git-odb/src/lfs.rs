//! LFS spillover backend.
//!
//! `lfs/objects/<xx>/<yy>/<hex>` (relative to the repository's common dir)
//! holds full object bytes for blobs an external process spilled out of the
//! pack/loose stores because they were too large to benefit from, or
//! tolerate, an extra compression pass. The file content is the same
//! `"<type> <size>\0<content>"` framing as a loose object, but stored raw,
//! not zlib-compressed.
//!
//! This is the lowest-priority backend: consulted only after loose objects
//! and packs report not-found.

use std::fs;
use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use git_object::{Object, ObjectType, header};

use crate::OdbError;

/// Path to an LFS spillover object's file, given the `lfs/objects` root.
pub fn object_path(lfs_dir: &Path, oid: &ObjectId) -> PathBuf {
    let hex = oid.to_hex();
    lfs_dir.join(&hex[0..2]).join(&hex[2..4]).join(&hex[4..])
}

/// Check whether an object exists in LFS spillover.
pub fn contains(lfs_dir: &Path, oid: &ObjectId) -> bool {
    object_path(lfs_dir, oid).is_file()
}

/// Read an object from LFS spillover. Returns `Ok(None)` if absent.
pub fn read(lfs_dir: &Path, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
    let path = object_path(lfs_dir, oid);
    let raw = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(OdbError::Io(e)),
    };
    let obj = Object::parse(&raw).map_err(|e| OdbError::Corrupt {
        oid: *oid,
        reason: e.to_string(),
    })?;
    Ok(Some(obj))
}

/// Read just the header (type + size) from LFS spillover.
pub fn read_header(
    lfs_dir: &Path,
    oid: &ObjectId,
) -> Result<Option<(ObjectType, usize)>, OdbError> {
    let path = object_path(lfs_dir, oid);
    let raw = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(OdbError::Io(e)),
    };
    let (obj_type, size, _header_len) = header::parse_header(&raw).map_err(|e| OdbError::Corrupt {
        oid: *oid,
        reason: e.to_string(),
    })?;
    Ok(Some((obj_type, size)))
}
