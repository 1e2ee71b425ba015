//! Unified object database for git.
//!
//! Provides a single interface to read and write objects across loose storage,
//! packfiles, and LFS spillover. This is the primary abstraction that all
//! higher-level git operations use to access objects. Chaining into alternate
//! object databases (`objects/info/alternates`) is not supported; repositories
//! that declare one fail to open.

pub mod alternates;
pub mod backend;
pub mod lfs;
mod midx;
pub mod prefix;
mod search;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use git_hash::{HashAlgorithm, ObjectId};
use git_loose::LooseObjectStore;
use git_object::{Object, ObjectType};
use git_object::cache::ObjectCache;
use git_pack::pack::PackFile;

pub use backend::OdbBackend;
pub use error::OdbError;

mod error {
    use git_hash::ObjectId;
    use git_object::ObjectType;

    #[derive(Debug, thiserror::Error)]
    pub enum OdbError {
        #[error("object not found: {0}")]
        NotFound(ObjectId),

        #[error("ambiguous object name: {prefix} matches {count} objects")]
        Ambiguous { prefix: String, count: usize },

        #[error("corrupt object {oid}: {reason}")]
        Corrupt { oid: ObjectId, reason: String },

        #[error("unsupported repository feature: {0}")]
        Unsupported(String),

        #[error("conflicting write: {0}")]
        Conflict(String),

        #[error("operation cancelled")]
        Cancelled,

        #[error("expected {expected} object, got {actual} for {oid}")]
        TypeMismatch {
            oid: ObjectId,
            expected: ObjectType,
            actual: ObjectType,
        },

        #[error(transparent)]
        Loose(#[from] git_loose::LooseError),

        #[error(transparent)]
        Pack(#[from] git_pack::PackError),

        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}

/// Lightweight object info (header only, no content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// Unified object database providing access across all storage backends.
pub struct ObjectDatabase {
    /// Loose object store.
    loose: LooseObjectStore,
    /// Pack files (protected by RwLock for refresh).
    packs: RwLock<Vec<PackFile>>,
    /// `objects/pack/multi-pack-index`, if present, and the packs it covers.
    midx: RwLock<Option<midx::MidxSet>>,
    /// LFS spillover directory (`lfs/objects`), if the repository has one.
    lfs_dir: Option<PathBuf>,
    /// Object cache, consulted first on every lookup.
    cache: Mutex<ObjectCache>,
    /// Path to the objects directory.
    objects_dir: PathBuf,
    /// Hash algorithm in use.
    hash_algo: HashAlgorithm,
}

impl ObjectDatabase {
    /// Open the object database at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_algo(objects_dir, HashAlgorithm::Sha1)
    }

    /// Open the object database with a specific hash algorithm.
    ///
    /// Fails if the repository declares `objects/info/alternates` or
    /// `http-alternates` — this resolver does not chain into alternates.
    pub fn open_with_algo(
        objects_dir: impl AsRef<Path>,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        alternates::reject_if_present(&objects_dir)?;

        let loose = LooseObjectStore::open(&objects_dir, hash_algo);
        let packs = Self::discover_packs(&objects_dir)?;
        let midx = midx::MidxSet::discover(&objects_dir);

        let lfs_dir = objects_dir
            .parent()
            .map(|common| common.join("lfs").join("objects"))
            .filter(|p| p.is_dir());

        Ok(Self {
            loose,
            packs: RwLock::new(packs),
            midx: RwLock::new(midx),
            lfs_dir,
            cache: Mutex::new(ObjectCache::new(1024)),
            objects_dir,
            hash_algo,
        })
    }

    /// Read an object by OID. Consults the cache first, then loose storage,
    /// then each pack in turn, then LFS spillover.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(obj) = cache.get(oid) {
                return Ok(Some(obj.clone()));
            }
        }

        let obj = search::find_object(self, oid)?;

        if let Some(ref obj) = obj {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(*oid, obj.clone());
        }

        Ok(obj)
    }

    /// Read just the header (type + size) without full content.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        search::find_header(self, oid)
    }

    /// Check if an object exists (fast, no decompression for packed objects).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        search::object_exists(self, oid)
    }

    /// Write a new object (always to loose store).
    pub fn write(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(obj)?)
    }

    /// Write raw content with type (always to loose store).
    pub fn write_raw(
        &self,
        obj_type: ObjectType,
        content: &[u8],
    ) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(obj_type, content)?)
    }

    /// Resolve an OID prefix to a full OID.
    /// Returns error if prefix is ambiguous.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId, OdbError> {
        prefix::resolve_prefix(self, prefix)
    }

    /// Refresh the list of pack files (call after gc/repack).
    pub fn refresh(&self) -> Result<(), OdbError> {
        let new_packs = Self::discover_packs(&self.objects_dir)?;
        let mut packs = self.packs.write().unwrap();
        *packs = new_packs;
        let mut midx = self.midx.write().unwrap();
        *midx = midx::MidxSet::discover(&self.objects_dir);
        Ok(())
    }

    /// Iterate over all known object OIDs (for fsck/gc).
    ///
    /// A pack covered by `objects/pack/multi-pack-index` contributes its
    /// OIDs through the multi-pack index rather than its own `.idx`, so an
    /// object indexed both ways is only yielded once.
    pub fn iter_all_oids(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectId, OdbError>> + '_>, OdbError> {
        let loose_iter = self.loose.iter()?.map(|r| r.map_err(OdbError::from));

        let midx = self.midx.read().unwrap();
        let midx_pack_names: std::collections::HashSet<&str> = midx
            .as_ref()
            .map(|m| m.pack_names().iter().map(String::as_str).collect())
            .unwrap_or_default();

        let packs = self.packs.read().unwrap();
        let mut pack_oids: Vec<Result<ObjectId, OdbError>> = Vec::new();
        for pack in packs.iter() {
            let covered_by_midx = pack
                .path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| midx_pack_names.contains(name));
            if covered_by_midx {
                continue;
            }
            for (oid, _offset) in pack.index().iter() {
                pack_oids.push(Ok(oid));
            }
        }

        let midx_oids: Vec<Result<ObjectId, OdbError>> = midx
            .as_ref()
            .map(|m| m.iter_oids().map(Ok).collect())
            .unwrap_or_default();

        Ok(Box::new(loose_iter.chain(pack_oids).chain(midx_oids)))
    }

    /// Get the path to the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Get the hash algorithm in use.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Discover pack files in the objects/pack directory.
    fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, OdbError> {
        let pack_dir = objects_dir.join("pack");
        if !pack_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut packs = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&pack_dir)?
            .filter_map(|e| e.ok())
            .collect();

        // Sort by modification time (newest first) to match C git behavior
        entries.sort_by(|a, b| {
            let a_time = a.metadata().and_then(|m| m.modified()).ok();
            let b_time = b.metadata().and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        for entry in entries {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                match PackFile::open(&path) {
                    Ok(pack) => packs.push(pack),
                    Err(_) => {
                        // Skip corrupt packs (fall back to other sources)
                        continue;
                    }
                }
            }
        }

        Ok(packs)
    }
}
