//! Pack writing: create `.pack` and `.idx` files from a planned entry list.
//!
//! Entries are written in the order the optimizer produced them (bases
//! before dependents). The pack's trailing checksum is computed from a
//! running digest fed as bytes are written, never by re-reading the file,
//! so memory use stays bounded to one entry's compressed payload at a time.
//! Both files are written to unique temporaries in the target directory and
//! atomically renamed into place once both are complete; any failure leaves
//! no partial `pack-*`/`idx-*` file behind.

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use git_object::ObjectType;
use git_utils::tempfile::TempFile;

use crate::entry::{encode_entry_header, encode_ofs_delta_offset};
use crate::optimizer::{DeltaPlan, PlannedEntry};
use crate::{IDX_SIGNATURE, IDX_VERSION, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION, PackError};

struct WrittenEntry {
    id: ObjectId,
    offset: u64,
    crc32: u32,
}

fn type_number(obj_type: ObjectType) -> u8 {
    match obj_type {
        ObjectType::Commit => 1,
        ObjectType::Tree => 2,
        ObjectType::Blob => 3,
        ObjectType::Tag => 4,
    }
}

/// Streaming writer for a single pack file.
pub struct PackWriter {
    temp: TempFile,
    hasher: Hasher,
    hash_algo: HashAlgorithm,
    num_objects: u32,
    position: u64,
    entries: Vec<WrittenEntry>,
    dir: PathBuf,
}

impl PackWriter {
    /// Start a new pack in `dir`. The pack gets its final, content-addressed
    /// name only once `finish` succeeds.
    pub fn new(dir: impl AsRef<Path>, hash_algo: HashAlgorithm) -> Result<Self, PackError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut temp = TempFile::new_in(&dir)?;
        let mut hasher = Hasher::new(hash_algo);

        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        header[8..12].copy_from_slice(&0u32.to_be_bytes());
        temp.write_all(&header)?;
        hasher.update(&header);

        Ok(Self {
            temp,
            hasher,
            hash_algo,
            num_objects: 0,
            position: PACK_HEADER_SIZE as u64,
            entries: Vec::new(),
            dir,
        })
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.temp.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }

    /// Offset of the entry that will be written next.
    pub fn current_offset(&self) -> u64 {
        self.position
    }

    /// Offset of an already-written entry, if it is part of this pack.
    pub fn offset_of(&self, id: &ObjectId) -> Option<u64> {
        self.entries.iter().find(|e| &e.id == id).map(|e| e.offset)
    }

    /// Write a non-delta object.
    pub fn add_full(&mut self, obj_type: ObjectType, id: ObjectId, data: &[u8]) -> Result<(), PackError> {
        let offset = self.position;
        let header = encode_entry_header(type_number(obj_type), data.len() as u64);
        let compressed = zlib_compress(data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&compressed);
        let crc_val = crc.finalize();

        self.write_bytes(&header)?;
        self.write_bytes(&compressed)?;

        self.entries.push(WrittenEntry { id, offset, crc32: crc_val });
        self.num_objects += 1;
        Ok(())
    }

    /// Write an OFS_DELTA entry against a base already placed in this pack.
    pub fn add_ofs_delta(&mut self, base_offset: u64, id: ObjectId, delta_data: &[u8]) -> Result<(), PackError> {
        let offset = self.position;
        if base_offset >= offset {
            return Err(PackError::CorruptEntry(offset));
        }
        let header = encode_entry_header(6, delta_data.len() as u64);
        let back_offset = encode_ofs_delta_offset(offset - base_offset);
        let compressed = zlib_compress(delta_data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&back_offset);
        crc.update(&compressed);
        let crc_val = crc.finalize();

        self.write_bytes(&header)?;
        self.write_bytes(&back_offset)?;
        self.write_bytes(&compressed)?;

        self.entries.push(WrittenEntry { id, offset, crc32: crc_val });
        self.num_objects += 1;
        Ok(())
    }

    /// Write a REF_DELTA entry against a base identified by id, whether or
    /// not that base is part of this pack.
    pub fn add_ref_delta(&mut self, base_id: ObjectId, id: ObjectId, delta_data: &[u8]) -> Result<(), PackError> {
        let offset = self.position;
        let header = encode_entry_header(7, delta_data.len() as u64);
        let compressed = zlib_compress(delta_data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(base_id.as_bytes());
        crc.update(&compressed);
        let crc_val = crc.finalize();

        self.write_bytes(&header)?;
        self.write_bytes(base_id.as_bytes())?;
        self.write_bytes(&compressed)?;

        self.entries.push(WrittenEntry { id, offset, crc32: crc_val });
        self.num_objects += 1;
        Ok(())
    }

    /// Finish the pack: patch the object count, append the trailing checksum,
    /// and rename into place as `pack-<checksum>.pack`. Returns the final
    /// path, the checksum, and the (id, offset, crc32) triples needed to
    /// build the matching index.
    pub fn finish(mut self) -> Result<(PathBuf, ObjectId, Vec<(ObjectId, u64, u32)>), PackError> {
        let checksum = self.hasher.finalize().map_err(PackError::Hash)?;
        // The trailer is the checksum of everything preceding it, so it is
        // written to the file but never fed back into the digest.
        self.temp.write_all(checksum.as_bytes())?;
        self.position += checksum.as_bytes().len() as u64;

        if let Some(file) = self.temp.file_mut() {
            file.seek(SeekFrom::Start(0))?;
            let mut header = [0u8; PACK_HEADER_SIZE];
            header[0..4].copy_from_slice(PACK_SIGNATURE);
            header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
            header[8..12].copy_from_slice(&self.num_objects.to_be_bytes());
            file.write_all(&header)?;
            file.flush()?;
        }

        let final_path = self.dir.join(format!("pack-{}.pack", checksum.to_hex()));
        self.temp.persist(&final_path)?;

        let entries = self
            .entries
            .iter()
            .map(|e| (e.id, e.offset, e.crc32))
            .collect();
        Ok((final_path, checksum, entries))
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut compressed = Vec::new();
    let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(compressed)
}

/// Build a v2 pack index (`.idx`) from `(id, offset, crc32)` triples and a
/// pack checksum, writing it atomically to `dir/pack-<checksum>.idx`.
pub fn write_pack_index(
    dir: impl AsRef<Path>,
    entries: &mut [(ObjectId, u64, u32)],
    pack_checksum: &ObjectId,
    hash_algo: HashAlgorithm,
) -> Result<PathBuf, PackError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let dir = dir.as_ref();

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (oid, _, _) in entries.iter() {
        fanout[oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }

    for (oid, _, _) in entries.iter() {
        buf.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in entries.iter() {
        buf.extend_from_slice(&crc.to_be_bytes());
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset >= 0x8000_0000 {
            let idx = large_offsets.len() as u32;
            buf.extend_from_slice(&(0x8000_0000u32 | idx).to_be_bytes());
            large_offsets.push(*offset);
        } else {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    for offset in &large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    buf.extend_from_slice(pack_checksum.as_bytes());

    let mut hasher = Hasher::new(hash_algo);
    hasher.update(&buf);
    let idx_checksum = hasher.finalize().map_err(PackError::Hash)?;
    buf.extend_from_slice(idx_checksum.as_bytes());

    let mut temp = TempFile::new_in(dir)?;
    temp.write_all(&buf)?;
    let final_path = dir.join(format!("pack-{}.idx", pack_checksum.to_hex()));
    temp.persist(&final_path)?;

    Ok(final_path)
}

/// Write a complete `(pack, idx)` pair from an optimizer-planned entry list.
/// Entries must already be ordered bases-before-dependents (as produced by
/// [`crate::optimizer::plan_deltas`]).
pub fn write_planned_pack(
    dir: impl AsRef<Path>,
    planned: &[PlannedEntry],
    hash_algo: HashAlgorithm,
) -> Result<(PathBuf, PathBuf, ObjectId), PackError> {
    let dir = dir.as_ref();
    let mut writer = PackWriter::new(dir, hash_algo)?;

    for entry in planned {
        match &entry.plan {
            DeltaPlan::Full => {
                writer.add_full(entry.obj_type, entry.id, &entry.data)?;
            }
            DeltaPlan::Delta { base, data } => {
                if let Some(base_offset) = writer.offset_of(base) {
                    writer.add_ofs_delta(base_offset, entry.id, data)?;
                } else {
                    writer.add_ref_delta(*base, entry.id, data)?;
                }
            }
        }
    }

    let (pack_path, checksum, mut entries) = writer.finish()?;
    let idx_path = write_pack_index(dir, &mut entries, &checksum, hash_algo)?;
    Ok((pack_path, idx_path, checksum))
}

/// Convenience: build a pack with no delta compression from plain objects.
/// Used by tests and by callers happy to trade size for simplicity.
pub fn create_pack(
    dir: &Path,
    objects: &[(ObjectType, Vec<u8>)],
) -> Result<(PathBuf, PathBuf, ObjectId), PackError> {
    let planned: Vec<PlannedEntry> = objects
        .iter()
        .map(|(obj_type, data)| {
            let id = Hasher::hash_object(
                HashAlgorithm::Sha1,
                std::str::from_utf8(obj_type.as_bytes()).unwrap(),
                data,
            )
            .map_err(PackError::Hash)?;
            Ok(PlannedEntry {
                id,
                obj_type: *obj_type,
                data: data.clone(),
                plan: DeltaPlan::Full,
                depth: 0,
            })
        })
        .collect::<Result<_, PackError>>()?;

    write_planned_pack(dir, &planned, HashAlgorithm::Sha1)
}
