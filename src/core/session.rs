use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::duplicate::resolve_duplicates;
use crate::core::ordering::assign_order;
use crate::core::selection::{MAX_PER_ROOM, select_photos};
use crate::core::types::{CullSessionResult, DuplicateGroup, PhotoScore, RoomType};
use crate::services::oracle::{CHUNK_SIZE, OracleClient, VisionOracle, default_batch};

/// Default size of the shortlist when the caller does not specify one.
pub const DEFAULT_TARGET_COUNT: usize = 25;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Photos per oracle call.
    pub chunk_size: usize,
    /// Pause between consecutive oracle calls. Rate-limit courtesy only,
    /// not a correctness requirement.
    pub chunk_delay: Duration,
    /// Fill-tier cap on selected photos per room type.
    pub max_per_room: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_secs(1),
            max_per_room: MAX_PER_ROOM,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("photo batch is empty, nothing to triage")]
    EmptyBatch,
}

/// Drives the full triage pipeline over a photo batch: chunked oracle
/// scoring, duplicate resolution, constrained selection, MLS ordering, and
/// summary statistics.
pub struct CullSession<O: VisionOracle> {
    client: OracleClient<O>,
    config: SessionConfig,
}

impl<O: VisionOracle> CullSession<O> {
    pub fn new(oracle: O) -> Self {
        Self::with_config(oracle, SessionConfig::default())
    }

    pub fn with_config(oracle: O, config: SessionConfig) -> Self {
        Self {
            client: OracleClient::new(oracle),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs a session to completion with no external cancellation.
    pub async fn run(
        &self,
        photo_urls: &[String],
        target_count: usize,
    ) -> Result<CullSessionResult, SessionError> {
        self.run_with_cancellation(photo_urls, target_count, CancellationToken::new())
            .await
    }

    /// Runs a session, honoring a caller-supplied cancellation token.
    ///
    /// Cancellation is graceful: in-flight and pending chunks fall back to
    /// default mid-range scores and the session still returns a complete
    /// result. The only fatal error is an empty batch. Oracle failures never
    /// surface; affected chunks simply compete poorly in selection.
    pub async fn run_with_cancellation(
        &self,
        photo_urls: &[String],
        target_count: usize,
        cancel: CancellationToken,
    ) -> Result<CullSessionResult, SessionError> {
        if photo_urls.is_empty() {
            return Err(SessionError::EmptyBatch);
        }

        let start = Instant::now();
        let total = photo_urls.len();
        let chunk_size = self.config.chunk_size.max(1);
        let chunk_count = total.div_ceil(chunk_size);
        info!(total, chunk_count, target_count, "starting cull session");

        // Every chunk must land before any cross-chunk stage runs; duplicate
        // groups and room coverage need the complete score set.
        let mut all_scores: Vec<PhotoScore> = Vec::with_capacity(total);
        let mut all_groups: Vec<DuplicateGroup> = Vec::new();

        for (i, chunk) in photo_urls.chunks(chunk_size).enumerate() {
            let offset = i * chunk_size;

            let batch = if cancel.is_cancelled() {
                warn!(chunk = i, "session cancelled, defaulting remaining chunk");
                default_batch(chunk, offset)
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!(chunk = i, "session cancelled mid-call, defaulting chunk");
                        default_batch(chunk, offset)
                    }
                    batch = self.client.score_chunk(chunk, offset, target_count) => batch,
                }
            };

            all_scores.extend(batch.scores);
            all_groups.extend(batch.duplicate_groups);

            if i + 1 < chunk_count && !cancel.is_cancelled() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.chunk_delay) => {}
                }
            }
        }

        let (scores, suppressed) = resolve_duplicates(all_scores, &all_groups);
        let scores = select_photos(scores, target_count, &suppressed, self.config.max_per_room);
        let scores = assign_order(scores);

        let mut room_type_counts: BTreeMap<RoomType, usize> = BTreeMap::new();
        let mut quality_sum: u64 = 0;
        for score in &scores {
            *room_type_counts.entry(score.room_type).or_insert(0) += 1;
            quality_sum += u64::from(score.quality_score);
        }
        let average_quality = quality_sum as f64 / total as f64;

        let (mut selected_photos, rejected_photos): (Vec<PhotoScore>, Vec<PhotoScore>) =
            scores.into_iter().partition(|s| s.is_selected);
        selected_photos.sort_by_key(|s| s.recommended_order);

        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            selected = selected_photos.len(),
            rejected = rejected_photos.len(),
            duplicate_groups = all_groups.len(),
            average_quality,
            processing_time_ms,
            "cull session complete"
        );

        Ok(CullSessionResult {
            total_photos: total,
            selected_photos,
            rejected_photos,
            duplicate_groups: all_groups,
            room_type_counts,
            average_quality,
            processing_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oracle::OracleError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays one canned reply per call, in order. Repeats the last reply
    /// if the session asks for more chunks than were scripted.
    struct ScriptedOracle {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<&str>) -> Self {
            let mut replies: Vec<String> = replies.into_iter().map(String::from).collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl VisionOracle for ScriptedOracle {
        async fn analyze(&self, _: &[String], _: &str) -> Result<String, OracleError> {
            let mut replies = self.replies.lock().unwrap();
            match replies.len() {
                0 => Err(OracleError::EmptyReply),
                1 => Ok(replies[0].clone()),
                _ => Ok(replies.pop().unwrap()),
            }
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl VisionOracle for FailingOracle {
        async fn analyze(&self, _: &[String], _: &str) -> Result<String, OracleError> {
            Err(OracleError::EmptyReply)
        }
    }

    fn urls(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("https://photos.test/{i}.jpg"))
            .collect()
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            chunk_delay: Duration::from_millis(0),
            ..SessionConfig::default()
        }
    }

    const LISTING_REPLY: &str = r#"```json
    {
        "photos": [
            {"index": 0, "quality_score": 90, "room_type": "exterior-front"},
            {"index": 1, "quality_score": 95, "room_type": "exterior-front"},
            {"index": 2, "quality_score": 60, "room_type": "kitchen"},
            {"index": 3, "quality_score": 58, "room_type": "kitchen",
             "is_duplicate": true, "duplicate_of_index": 2},
            {"index": 4, "quality_score": 82, "room_type": "living-room"},
            {"index": 5, "quality_score": 75, "room_type": "laundry"}
        ],
        "duplicate_groups": [{"original": 2, "duplicates": [3]}]
    }
    ```"#;

    #[tokio::test]
    async fn test_empty_batch_is_fatal() {
        let session = CullSession::with_config(FailingOracle, fast_config());
        let result = session.run(&[], 25).await;
        assert!(matches!(result, Err(SessionError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_full_pipeline_selects_orders_and_counts() {
        let session = CullSession::with_config(
            ScriptedOracle::new(vec![LISTING_REPLY]),
            fast_config(),
        );
        let result = session.run(&urls(6), 4).await.unwrap();

        assert_eq!(result.total_photos, 6);
        assert_eq!(result.selected_photos.len(), 4);

        // Hero leads the ordering.
        let lead = &result.selected_photos[0];
        assert_eq!(lead.photo_index, 1);
        assert_eq!(lead.recommended_order, Some(1));
        assert_eq!(lead.selection_reason, "Hero image - best exterior front");

        // Orders are contiguous 1..N.
        let orders: Vec<usize> = result
            .selected_photos
            .iter()
            .map(|s| s.recommended_order.unwrap())
            .collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);

        // The duplicate kitchen shot is rejected, its original is not.
        let dup = result
            .rejected_photos
            .iter()
            .find(|s| s.photo_index == 3)
            .unwrap();
        assert!(dup.is_duplicate);
        assert!(!dup.is_selected);
        assert!(result.selected_photos.iter().any(|s| s.photo_index == 2));

        // Histogram covers all photos, duplicates included.
        assert_eq!(result.room_type_counts[&RoomType::Kitchen], 2);
        assert_eq!(result.room_type_counts[&RoomType::ExteriorFront], 2);
        let counted: usize = result.room_type_counts.values().sum();
        assert_eq!(counted, 6);

        let expected_avg = (90 + 95 + 60 + 58 + 82 + 75) as f64 / 6.0;
        assert!((result.average_quality - expected_avg).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_oracle_failure_still_yields_full_result() {
        let session = CullSession::with_config(
            FailingOracle,
            SessionConfig {
                chunk_size: 3,
                ..fast_config()
            },
        );
        let result = session.run(&urls(7), 5).await.unwrap();

        assert_eq!(result.total_photos, 7);
        assert_eq!(
            result.selected_photos.len() + result.rejected_photos.len(),
            7
        );
        // All defaulted photos land in `other`, so the per-room cap holds
        // selection to 4 even though the target was 5.
        assert_eq!(result.selected_photos.len(), 4);
        for photo in result
            .selected_photos
            .iter()
            .chain(result.rejected_photos.iter())
        {
            assert_eq!(photo.quality_score, crate::core::types::DEFAULT_SCORE);
        }
        assert!((result.average_quality - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_multi_chunk_indices_are_rebased() {
        let chunk_two = r#"{"photos": [
            {"index": 0, "quality_score": 97, "room_type": "master-bedroom"},
            {"index": 1, "quality_score": 40, "room_type": "master-bedroom",
             "is_duplicate": true, "duplicate_of_index": 0}
        ], "duplicate_groups": [{"original": 0, "duplicates": [1]}]}"#;
        let chunk_one = r#"{"photos": [
            {"index": 0, "quality_score": 85, "room_type": "exterior-front"},
            {"index": 1, "quality_score": 66, "room_type": "garage"}
        ]}"#;

        let session = CullSession::with_config(
            ScriptedOracle::new(vec![chunk_one, chunk_two]),
            SessionConfig {
                chunk_size: 2,
                ..fast_config()
            },
        );
        let result = session.run(&urls(4), 10).await.unwrap();

        // Photo 3 (second chunk, local index 1) is the duplicate.
        let dup = result
            .rejected_photos
            .iter()
            .find(|s| s.photo_index == 3)
            .unwrap();
        assert!(dup.is_duplicate);
        assert_eq!(dup.duplicate_of_index, Some(2));
        assert_eq!(result.duplicate_groups, vec![DuplicateGroup {
            original: 2,
            duplicates: vec![3],
        }]);
    }

    #[tokio::test]
    async fn test_cancellation_degrades_to_defaults() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let session = CullSession::with_config(
            ScriptedOracle::new(vec![LISTING_REPLY]),
            fast_config(),
        );
        let result = session
            .run_with_cancellation(&urls(6), 4, cancel)
            .await
            .unwrap();

        // Cancelled before any chunk: everything defaulted, result complete.
        assert_eq!(result.total_photos, 6);
        for photo in result
            .selected_photos
            .iter()
            .chain(result.rejected_photos.iter())
        {
            assert_eq!(photo.quality_score, crate::core::types::DEFAULT_SCORE);
        }
        assert_eq!(result.selected_photos.len(), 4);
    }

    #[tokio::test]
    async fn test_identical_oracle_output_is_deterministic() {
        let mut results = Vec::new();
        for _ in 0..2 {
            let session = CullSession::with_config(
                ScriptedOracle::new(vec![LISTING_REPLY]),
                fast_config(),
            );
            let mut result = session.run(&urls(6), 4).await.unwrap();
            result.processing_time_ms = 0;
            results.push(result);
        }
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn test_target_zero_selects_nothing_without_error() {
        let session = CullSession::with_config(
            ScriptedOracle::new(vec![LISTING_REPLY]),
            fast_config(),
        );
        let result = session.run(&urls(6), 0).await.unwrap();
        assert!(result.selected_photos.is_empty());
        assert_eq!(result.rejected_photos.len(), 6);
    }
}
