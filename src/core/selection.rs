use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::core::types::{PhotoScore, RoomType};

/// Default cap on how many photos of a single room type the fill tier may
/// select. Stops a long bedroom burst from crowding out listing variety.
pub const MAX_PER_ROOM: usize = 4;

/// Picks at most `target_count` photos from the non-duplicate candidates.
///
/// Selection runs in three strictly ordered tiers, each skipped once the
/// target is reached:
///
/// 1. Hero: the single best `exterior-front` shot leads the listing.
/// 2. Coverage: one photo per required room type, so the listing is complete
///    even when those rooms score poorly.
/// 3. Fill: remaining candidates by descending quality, capped at
///    `max_per_room` per room type.
///
/// Returns a patched copy of the full score set; rejected candidates keep
/// their records with an explanatory reason. `target_count == 0` selects
/// nothing. Expects `scores[i].photo_index == i` (the batch invariant).
pub fn select_photos(
    mut scores: Vec<PhotoScore>,
    target_count: usize,
    duplicates: &HashSet<usize>,
    max_per_room: usize,
) -> Vec<PhotoScore> {
    // Quality-descending candidate order; index ascending keeps ties stable.
    let mut candidates: Vec<usize> = scores
        .iter()
        .filter(|s| !s.is_duplicate && !duplicates.contains(&s.photo_index))
        .map(|s| s.photo_index)
        .collect();
    candidates.sort_by(|&a, &b| {
        scores[b]
            .quality_score
            .cmp(&scores[a].quality_score)
            .then(a.cmp(&b))
    });

    let mut selected: HashSet<usize> = HashSet::new();
    let mut room_counts: HashMap<RoomType, usize> = HashMap::new();

    fn pick(
        idx: usize,
        reason: String,
        scores: &mut [PhotoScore],
        selected: &mut HashSet<usize>,
        room_counts: &mut HashMap<RoomType, usize>,
    ) {
        scores[idx].is_selected = true;
        scores[idx].selection_reason = reason;
        *room_counts.entry(scores[idx].room_type).or_insert(0) += 1;
        selected.insert(idx);
    }

    // Tier 1: hero shot. Candidates are quality-sorted, so the first
    // exterior-front hit is the best one.
    if selected.len() < target_count {
        if let Some(&hero) = candidates
            .iter()
            .find(|&&idx| scores[idx].room_type == RoomType::ExteriorFront)
        {
            debug!(photo_index = hero, quality = scores[hero].quality_score, "hero selected");
            pick(
                hero,
                "Hero image - best exterior front".to_string(),
                &mut scores,
                &mut selected,
                &mut room_counts,
            );
        }
    }

    // Tier 2: required room coverage.
    for room in RoomType::REQUIRED_COVERAGE {
        if selected.len() >= target_count {
            break;
        }
        let best = candidates
            .iter()
            .find(|&&idx| !selected.contains(&idx) && scores[idx].room_type == room);
        if let Some(&idx) = best {
            pick(
                idx,
                format!("Room coverage - {room}"),
                &mut scores,
                &mut selected,
                &mut room_counts,
            );
        }
    }

    // Tier 3: quality fill, capped per room type.
    for &idx in &candidates {
        if selected.len() >= target_count {
            break;
        }
        if selected.contains(&idx) {
            continue;
        }
        let room = scores[idx].room_type;
        if room_counts.get(&room).copied().unwrap_or(0) >= max_per_room {
            continue;
        }
        pick(
            idx,
            "Selected for overall quality".to_string(),
            &mut scores,
            &mut selected,
            &mut room_counts,
        );
    }

    // Everything left in the candidate pool lost on quality or room caps.
    for &idx in &candidates {
        if !selected.contains(&idx) {
            scores[idx].selection_reason = "Lower quality than selected photos".to_string();
        }
    }

    debug!(
        selected = selected.len(),
        candidates = candidates.len(),
        target_count,
        "selection complete"
    );

    scores
}
