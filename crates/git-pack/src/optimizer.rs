//! Delta-base selection for pack writing.
//!
//! Given a set of candidate objects destined for one pack, picks a good
//! delta base for each (or leaves it as a full object), bounded by a
//! configurable maximum chain depth. Entries are grouped by type and
//! ordered so that bases are always placed before their dependents.

use git_hash::ObjectId;
use git_object::ObjectType;

use crate::delta::compute::{compute_delta, estimate_savings};

/// Minimum allowed chain depth.
pub const MIN_CHAIN_DEPTH: usize = 1;
/// Maximum allowed chain depth.
pub const MAX_CHAIN_DEPTH: usize = 50;
/// Default chain depth when the caller does not specify one.
pub const DEFAULT_CHAIN_DEPTH: usize = 10;

/// Size-ratio window within which a base is considered for a target.
const MIN_SIZE_RATIO: f64 = 0.5;
const MAX_SIZE_RATIO: f64 = 2.0;

/// Similarity score (0.0-1.0) at which the search stops early and accepts
/// the current best candidate rather than scanning the rest of the group.
const EARLY_TERMINATION_SIMILARITY: f64 = 0.8;

/// One object to be written to the pack.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: ObjectId,
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
    /// Repository path this object corresponds to, if known (trees/blobs
    /// produced by the commit builder carry this so the optimizer can
    /// prefer the previous revision of the same path as a delta base).
    pub path: Option<String>,
}

/// How a candidate ended up being written: as a full object, or as a delta
/// against a base (identified by id; the writer decides OFS vs REF based on
/// whether the base is also part of this pack).
#[derive(Debug, Clone)]
pub enum DeltaPlan {
    Full,
    Delta { base: ObjectId, data: Vec<u8> },
}

/// A candidate plus the plan chosen for it and the chain depth it sits at.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub id: ObjectId,
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
    pub plan: DeltaPlan,
    pub depth: usize,
}

/// Looks up the object id of the previous revision of a given path, if any
/// (e.g. by walking the parent commit's root tree). Supplied by the caller
/// building a pack from a commit operation; absent for general repacking.
pub trait PreviousRevisionLookup {
    fn previous_object_for_path(&self, path: &str) -> Option<ObjectId>;
}

/// No-op lookup: never suggests a same-path base.
pub struct NoPreviousRevisions;
impl PreviousRevisionLookup for NoPreviousRevisions {
    fn previous_object_for_path(&self, _path: &str) -> Option<ObjectId> {
        None
    }
}

/// Clamp a requested chain depth into the supported range.
pub fn clamp_chain_depth(requested: usize) -> usize {
    requested.clamp(MIN_CHAIN_DEPTH, MAX_CHAIN_DEPTH)
}

/// Select delta bases for `candidates` and return entries ordered so that
/// every base precedes its dependents (suitable for direct pack writing).
pub fn plan_deltas(
    candidates: Vec<Candidate>,
    max_chain_depth: usize,
    previous: &dyn PreviousRevisionLookup,
) -> Vec<PlannedEntry> {
    let max_chain_depth = clamp_chain_depth(max_chain_depth);

    let mut by_type: Vec<ObjectType> = Vec::new();
    for c in &candidates {
        if !by_type.contains(&c.obj_type) {
            by_type.push(c.obj_type);
        }
    }

    let mut planned: Vec<PlannedEntry> = Vec::with_capacity(candidates.len());

    for ty in by_type {
        let mut group: Vec<&Candidate> = candidates.iter().filter(|c| c.obj_type == ty).collect();
        group.sort_by_key(|c| c.data.len());

        // index into `planned` for objects already placed in this group, by id
        let mut placed_depth: std::collections::HashMap<ObjectId, usize> =
            std::collections::HashMap::new();

        for candidate in group {
            let target_len = candidate.data.len();

            let same_path_base = candidate
                .path
                .as_deref()
                .and_then(|p| previous.previous_object_for_path(p))
                .filter(|base_id| *base_id != candidate.id);

            let mut best: Option<(usize, i64, usize)> = None; // (planned_index, score, depth)

            let mut consider = |idx: usize, base_id: ObjectId, base_data: &[u8], base_depth: usize| {
                if base_depth >= max_chain_depth {
                    return None;
                }
                let ratio = base_data.len() as f64 / target_len.max(1) as f64;
                if !(MIN_SIZE_RATIO..=MAX_SIZE_RATIO).contains(&ratio) {
                    return None;
                }
                let score = estimate_savings(base_data, &candidate.data);
                if score <= 0 {
                    return None;
                }
                let _ = base_id;
                Some((idx, score, base_depth + 1))
            };

            if let Some(base_id) = same_path_base {
                if let Some(&idx) = index_of(&planned, base_id).as_ref() {
                    let base_depth = planned[idx].depth;
                    if let Some(result) = consider(idx, base_id, &planned[idx].data, base_depth) {
                        best = Some(result);
                    }
                }
            }

            if best.is_none()
                || similarity_ratio(best.unwrap().1, target_len) < EARLY_TERMINATION_SIMILARITY
            {
                for (idx, entry) in planned.iter().enumerate() {
                    if entry.obj_type != ty {
                        continue;
                    }
                    let base_depth = *placed_depth.get(&entry.id).unwrap_or(&entry.depth);
                    if let Some(candidate_result) =
                        consider(idx, entry.id, &entry.data, base_depth)
                    {
                        let better = match best {
                            None => true,
                            Some((_, best_score, _)) => candidate_result.1 > best_score,
                        };
                        if better {
                            best = Some(candidate_result);
                        }
                        if similarity_ratio(candidate_result.1, target_len)
                            >= EARLY_TERMINATION_SIMILARITY
                        {
                            break;
                        }
                    }
                }
            }

            match best {
                Some((idx, _, depth)) => {
                    let base_id = planned[idx].id;
                    let delta = compute_delta(&planned[idx].data, &candidate.data);
                    placed_depth.insert(candidate.id, depth);
                    planned.push(PlannedEntry {
                        id: candidate.id,
                        obj_type: ty,
                        data: candidate.data.clone(),
                        plan: DeltaPlan::Delta { base: base_id, data: delta },
                        depth,
                    });
                }
                None => {
                    placed_depth.insert(candidate.id, 0);
                    planned.push(PlannedEntry {
                        id: candidate.id,
                        obj_type: ty,
                        data: candidate.data.clone(),
                        plan: DeltaPlan::Full,
                        depth: 0,
                    });
                }
            }
        }
    }

    planned
}

fn index_of(planned: &[PlannedEntry], id: ObjectId) -> Option<usize> {
    planned.iter().position(|e| e.id == id)
}

fn similarity_ratio(score: i64, target_len: usize) -> f64 {
    if target_len == 0 {
        return 0.0;
    }
    (score.max(0) as f64) / target_len as f64
}
