//! Multi-pack index discovery and lookup wiring.
//!
//! Mirrors the per-pack `.idx` lookup path in `search.rs`/`prefix.rs`, but
//! resolves through a single `objects/pack/multi-pack-index` file covering
//! many packs at once, avoiding an O(packs) scan for repositories that have
//! been through `git multi-pack-index write`.

use std::path::Path;

use git_hash::ObjectId;
use git_object::ObjectType;
use git_pack::midx::MultiPackIndex;
use git_pack::pack::PackFile;
use git_pack::PackedObject;

use crate::OdbError;

/// A multi-pack index together with every pack file it references, opened
/// once at discovery time so a lookup resolves straight to pack data.
pub(crate) struct MidxSet {
    index: MultiPackIndex,
    packs: Vec<PackFile>,
}

impl MidxSet {
    /// Open `objects/pack/multi-pack-index`, if present, along with every
    /// pack it references. A missing file, a parse failure, or a reference
    /// to a pack that can't be opened is treated the same as having no
    /// multi-pack index at all — callers fall back to the per-pack paths.
    pub(crate) fn discover(objects_dir: &Path) -> Option<Self> {
        let pack_dir = objects_dir.join("pack");
        let midx_path = pack_dir.join("multi-pack-index");
        if !midx_path.is_file() {
            return None;
        }
        let index = MultiPackIndex::open(&midx_path).ok()?;

        let mut packs = Vec::with_capacity(index.pack_names().len());
        for name in index.pack_names() {
            packs.push(PackFile::open(pack_dir.join(name)).ok()?);
        }

        Some(Self { index, packs })
    }

    pub(crate) fn pack_names(&self) -> &[String] {
        self.index.pack_names()
    }

    pub(crate) fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    pub(crate) fn read_object(&self, oid: &ObjectId) -> Result<Option<PackedObject>, OdbError> {
        match self.index.lookup(oid) {
            Some((pack_index, offset)) => {
                let pack = &self.packs[pack_index as usize];
                Ok(Some(pack.read_at_offset(offset)?))
            }
            None => Ok(None),
        }
    }

    /// Like `read_object`, but resolves cross-pack `REF_DELTA` bases through
    /// the given resolver (loose objects, other packs).
    pub(crate) fn read_object_with_resolver(
        &self,
        oid: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, OdbError> {
        match self.index.lookup(oid) {
            Some((pack_index, offset)) => {
                let pack = &self.packs[pack_index as usize];
                Ok(Some(pack.read_at_offset_with_resolver(offset, resolver)?))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn iter_oids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.index.iter().map(|(oid, _, _)| oid)
    }
}
