//! Compute deltas between objects using a rolling-hash match search.
//!
//! A sliding window over the source is hashed with an Adler-32-style rolling
//! hash; source positions are bucketed by that hash so the target can be
//! scanned for candidate matches in O(1) per window instead of rescanning
//! the whole source for every target position.

use super::{encode_copy, encode_insert, write_varint};

/// Width of the rolling-hash window in bytes.
const WINDOW_SIZE: usize = 16;

/// Number of buckets in the source hash table.
const HASH_TABLE_SIZE: usize = 4096;

/// Maximum number of source positions retained per bucket. Once a bucket
/// fills up, the older half is evicted to make room for more recent
/// positions, which tend to be better matches for nearby target data.
const MAX_CHAIN_PER_BUCKET: usize = 16;

/// Matches shorter than this are not worth a copy instruction's overhead.
const MIN_MATCH_LEN: usize = 4;

/// Largest match length allowed in a single copy instruction's size field
/// once it is folded into multiple instructions for very long runs.
const MAX_COPY_LEN: usize = 0x00ff_ffff;

const ADLER_MOD: u32 = 65521;

#[derive(Clone, Copy)]
struct RollingHash {
    a: u32,
    b: u32,
}

impl RollingHash {
    fn new(window: &[u8]) -> Self {
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in window {
            a = (a + byte as u32) % ADLER_MOD;
            b = (b + a) % ADLER_MOD;
        }
        Self { a, b }
    }

    fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }

    fn roll(&mut self, out: u8, input: u8, window_len: u32) {
        self.a = (self.a + ADLER_MOD + input as u32 - out as u32) % ADLER_MOD;
        self.b = (self.b + ADLER_MOD - (window_len * out as u32 + 1) % ADLER_MOD + self.a)
            % ADLER_MOD;
    }

    fn bucket(&self) -> usize {
        (self.value() as usize) % HASH_TABLE_SIZE
    }
}

/// Index of source windows keyed by rolling-hash bucket.
struct SourceIndex {
    buckets: Vec<Vec<usize>>,
}

impl SourceIndex {
    fn build(source: &[u8]) -> Self {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); HASH_TABLE_SIZE];
        if source.len() < WINDOW_SIZE {
            return Self { buckets };
        }

        let mut hash = RollingHash::new(&source[0..WINDOW_SIZE]);
        let mut pos = 0usize;
        loop {
            let bucket = &mut buckets[hash.bucket()];
            bucket.push(pos);
            if bucket.len() > MAX_CHAIN_PER_BUCKET {
                let keep_from = bucket.len() - MAX_CHAIN_PER_BUCKET / 2;
                bucket.drain(0..keep_from);
            }

            let next = pos + 1;
            if next + WINDOW_SIZE > source.len() {
                break;
            }
            hash.roll(source[pos], source[next + WINDOW_SIZE - 1], WINDOW_SIZE as u32);
            pos = next;
        }

        Self { buckets }
    }

    fn candidates(&self, hash: &RollingHash) -> &[usize] {
        &self.buckets[hash.bucket()]
    }
}

/// Compute a delta that transforms `source` into `target`.
///
/// Returns the raw delta byte stream that can be applied with `apply_delta`.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();
    delta.extend_from_slice(&write_varint(source.len()));
    delta.extend_from_slice(&write_varint(target.len()));

    if target.is_empty() {
        return delta;
    }

    let index = SourceIndex::build(source);
    let mut pending_insert: Vec<u8> = Vec::new();

    let mut tpos = 0usize;
    let mut window_hash = if target.len() >= WINDOW_SIZE {
        Some(RollingHash::new(&target[0..WINDOW_SIZE]))
    } else {
        None
    };

    while tpos < target.len() {
        let remaining = target.len() - tpos;

        if remaining >= WINDOW_SIZE {
            let hash = window_hash.expect("window hash present while remaining >= WINDOW_SIZE");
            let best = index
                .candidates(&hash)
                .iter()
                .copied()
                .filter(|&src_off| source[src_off..src_off + WINDOW_SIZE] == target[tpos..tpos + WINDOW_SIZE])
                .map(|src_off| (src_off, extend_match(source, src_off, target, tpos)))
                .max_by_key(|&(_, len)| len);

            if let Some((src_off, match_len)) = best {
                if match_len >= MIN_MATCH_LEN {
                    flush_insert(&mut delta, &mut pending_insert);
                    emit_copy(&mut delta, src_off, match_len);
                    tpos += match_len;
                    window_hash = if tpos + WINDOW_SIZE <= target.len() {
                        Some(RollingHash::new(&target[tpos..tpos + WINDOW_SIZE]))
                    } else {
                        None
                    };
                    continue;
                }
            }
        }

        pending_insert.push(target[tpos]);
        if pending_insert.len() == 127 {
            flush_insert(&mut delta, &mut pending_insert);
        }

        let next = tpos + 1;
        window_hash = match window_hash {
            Some(mut hash) if next + WINDOW_SIZE <= target.len() => {
                hash.roll(target[tpos], target[next + WINDOW_SIZE - 1], WINDOW_SIZE as u32);
                Some(hash)
            }
            _ if next + WINDOW_SIZE <= target.len() => {
                Some(RollingHash::new(&target[next..next + WINDOW_SIZE]))
            }
            _ => None,
        };
        tpos = next;
    }

    flush_insert(&mut delta, &mut pending_insert);
    delta
}

/// Extend a match between `source[src_off..]` and `target[tgt_off..]` as far as possible,
/// including backward into already-scanned target bytes that happen to share a suffix
/// with the match start (cheap win, no backtracking of already-emitted instructions needed
/// since we only extend forward from the confirmed window match).
fn extend_match(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let max_len = std::cmp::min(source.len() - src_off, target.len() - tgt_off);
    let mut len = WINDOW_SIZE;
    while len < max_len && source[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

fn flush_insert(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    while !pending.is_empty() {
        let chunk_len = std::cmp::min(pending.len(), 127);
        let chunk: Vec<u8> = pending.drain(..chunk_len).collect();
        delta.extend_from_slice(&encode_insert(&chunk));
    }
}

fn emit_copy(delta: &mut Vec<u8>, offset: usize, mut size: usize) {
    let mut off = offset;
    while size > 0 {
        let chunk = std::cmp::min(size, MAX_COPY_LEN);
        delta.extend_from_slice(&encode_copy(off as u64, chunk));
        off += chunk;
        size -= chunk;
    }
}

/// Rough estimate, in bytes saved, of delta-encoding `target` against `base`.
/// Used by the pack optimizer to rank candidate bases without materializing
/// the full instruction stream for every pair under consideration.
pub fn estimate_savings(base: &[u8], target: &[u8]) -> i64 {
    if base.len() < WINDOW_SIZE || target.len() < WINDOW_SIZE {
        return 0;
    }
    let index = SourceIndex::build(base);
    let mut covered = 0usize;
    let mut tpos = 0usize;
    let mut hash = RollingHash::new(&target[0..WINDOW_SIZE]);
    loop {
        let best = index
            .candidates(&hash)
            .iter()
            .copied()
            .filter(|&src_off| base[src_off..src_off + WINDOW_SIZE] == target[tpos..tpos + WINDOW_SIZE])
            .map(|src_off| extend_match(base, src_off, target, tpos))
            .max();
        if let Some(len) = best {
            covered += len;
            tpos += len;
        } else {
            tpos += 1;
        }
        if tpos + WINDOW_SIZE > target.len() {
            break;
        }
        hash = RollingHash::new(&target[tpos..tpos + WINDOW_SIZE]);
    }
    covered as i64 - (target.len() as i64 - covered as i64) / 8
}
