use crate::core::types::PhotoScore;

/// Numbers the selected photos into MLS presentation order.
///
/// Selected photos sort by room-type priority (exterior front leads, utility
/// rooms trail), ties broken by descending quality, then receive
/// `recommended_order` 1..N. Unselected photos keep `recommended_order = None`.
/// Returns the patched score set.
pub fn assign_order(mut scores: Vec<PhotoScore>) -> Vec<PhotoScore> {
    let mut selected: Vec<usize> = scores
        .iter()
        .filter(|s| s.is_selected)
        .map(|s| s.photo_index)
        .collect();

    selected.sort_by(|&a, &b| {
        let pa = scores[a].room_type.presentation_priority();
        let pb = scores[b].room_type.presentation_priority();
        pa.cmp(&pb)
            .then(scores[b].quality_score.cmp(&scores[a].quality_score))
            .then(a.cmp(&b))
    });

    for (position, &idx) in selected.iter().enumerate() {
        scores[idx].recommended_order = Some(position + 1);
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RoomType;

    fn selected_photo(index: usize, room: RoomType, quality: u8) -> PhotoScore {
        let mut s = PhotoScore::unanalyzed(index, format!("https://photos.test/{index}.jpg"));
        s.room_type = room;
        s.quality_score = quality;
        s.is_selected = true;
        s
    }

    fn order_of(scores: &[PhotoScore], index: usize) -> usize {
        scores[index].recommended_order.unwrap()
    }

    #[test]
    fn test_exterior_front_leads_laundry_trails() {
        let scores = vec![
            selected_photo(0, RoomType::Laundry, 99),
            selected_photo(1, RoomType::Kitchen, 80),
            selected_photo(2, RoomType::ExteriorFront, 60),
        ];

        let scores = assign_order(scores);

        assert_eq!(order_of(&scores, 2), 1);
        assert_eq!(order_of(&scores, 1), 2);
        assert_eq!(order_of(&scores, 0), 3);
    }

    #[test]
    fn test_quality_breaks_priority_ties() {
        let scores = vec![
            selected_photo(0, RoomType::ExteriorFront, 90),
            selected_photo(1, RoomType::ExteriorFront, 70),
            selected_photo(2, RoomType::ExteriorFront, 95),
        ];

        let scores = assign_order(scores);

        assert_eq!(order_of(&scores, 2), 1);
        assert_eq!(order_of(&scores, 0), 2);
        assert_eq!(order_of(&scores, 1), 3);
    }

    #[test]
    fn test_orders_are_contiguous_and_skip_unselected() {
        let mut scores = vec![
            selected_photo(0, RoomType::Bedroom, 50),
            selected_photo(1, RoomType::Garage, 40),
            selected_photo(2, RoomType::Foyer, 70),
        ];
        scores[1].is_selected = false;

        let scores = assign_order(scores);

        let mut orders: Vec<usize> = scores
            .iter()
            .filter_map(|s| s.recommended_order)
            .collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(scores[1].recommended_order, None);
    }
}
