use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::core::types::{DuplicateGroup, PhotoScore};

/// Applies oracle-reported duplicate groups to the full score set.
///
/// Returns a patched copy of the scores plus the set of suppressed indices,
/// so later stages never have to re-derive duplicate membership. Originals
/// are left untouched and remain ordinary candidates.
///
/// Group indices pointing outside the batch are ignored rather than treated
/// as fatal; a malformed group loses only its bad entries. When two groups
/// claim the same photo, the claim with the lowest original index wins, so
/// resolution is deterministic regardless of group order.
pub fn resolve_duplicates(
    mut scores: Vec<PhotoScore>,
    groups: &[DuplicateGroup],
) -> (Vec<PhotoScore>, HashSet<usize>) {
    let total = scores.len();

    // duplicate index -> winning original
    let mut claims: HashMap<usize, usize> = HashMap::new();

    for group in groups {
        if group.original >= total {
            warn!(
                original = group.original,
                total, "duplicate group original out of range, skipping group"
            );
            continue;
        }
        for &dup in &group.duplicates {
            if dup >= total {
                warn!(index = dup, total, "duplicate index out of range, skipping");
                continue;
            }
            if dup == group.original {
                continue;
            }
            claims
                .entry(dup)
                .and_modify(|original| {
                    if group.original < *original {
                        *original = group.original;
                    }
                })
                .or_insert(group.original);
        }
    }

    for (&dup, &original) in &claims {
        let score = &mut scores[dup];
        score.is_duplicate = true;
        score.is_selected = false;
        score.duplicate_of_index = Some(original);
        score.selection_reason = "Duplicate of another photo".to_string();
    }

    let suppressed: HashSet<usize> = claims.into_keys().collect();
    (scores, suppressed)
}
