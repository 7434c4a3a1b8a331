use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{DuplicateGroup, PhotoScore, RoomType};

/// Maximum number of photos submitted to the oracle in one call.
pub const CHUNK_SIZE: usize = 20;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle reply contained no text")]
    EmptyReply,

    #[error("no JSON object found in oracle reply")]
    MissingJson,

    #[error("malformed oracle payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// External vision-capable scoring service. Implementations take a batch of
/// image references plus free-text instructions and return the model's raw
/// textual reply; all structure is recovered downstream.
#[async_trait]
pub trait VisionOracle: Send + Sync {
    async fn analyze(
        &self,
        photo_urls: &[String],
        instructions: &str,
    ) -> Result<String, OracleError>;
}

/// Gemini-backed oracle using the `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiOracle {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiOracle {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the endpoint, mainly for pointing at a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl VisionOracle for GeminiOracle {
    async fn analyze(
        &self,
        photo_urls: &[String],
        instructions: &str,
    ) -> Result<String, OracleError> {
        let url = format!(
            "{}/{model}:generateContent?key={api_key}",
            self.base_url,
            model = self.model,
            api_key = self.api_key
        );

        let mut prompt = String::from(instructions);
        prompt.push_str("\n\nPhotos (index: url):\n");
        for (i, photo_url) in photo_urls.iter().enumerate() {
            prompt.push_str(&format!("{i}: {photo_url}\n"));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self.client.post(url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(OracleError::Status { status, body });
        }

        let payload: Value = response.json().await?;
        extract_reply_text(&payload).ok_or(OracleError::EmptyReply)
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

/// Concatenates the text parts of the first candidate.
fn extract_reply_text(root: &Value) -> Option<String> {
    let parts = root
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() { None } else { Some(text) }
}

/// Normalized output of one oracle call, with all indices re-based to the
/// full batch.
#[derive(Debug, Clone)]
pub struct ScoreBatch {
    pub scores: Vec<PhotoScore>,
    pub duplicate_groups: Vec<DuplicateGroup>,
}

/// Typed adapter over a [`VisionOracle`]. All of the string-parsing
/// fragility of the oracle's natural-language contract lives here.
pub struct OracleClient<O: VisionOracle> {
    oracle: O,
}

impl<O: VisionOracle> OracleClient<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    /// Scores one chunk of at most [`CHUNK_SIZE`] photos.
    ///
    /// `chunk_offset` is the chunk's position in the full batch; every index
    /// in the returned records is absolute. `target_count` is passed to the
    /// oracle as context only, never enforced here.
    ///
    /// This never fails: any transport or parse error downgrades the whole
    /// chunk to default mid-range records so the session can keep going.
    pub async fn score_chunk(
        &self,
        photo_urls: &[String],
        chunk_offset: usize,
        target_count: usize,
    ) -> ScoreBatch {
        let instructions = build_instructions(photo_urls.len(), target_count);

        let parsed = match self.oracle.analyze(photo_urls, &instructions).await {
            Ok(reply) => parse_reply(&reply, photo_urls, chunk_offset),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(batch) => {
                debug!(
                    chunk_offset,
                    photos = batch.scores.len(),
                    groups = batch.duplicate_groups.len(),
                    "chunk scored"
                );
                batch
            }
            Err(e) => {
                warn!(chunk_offset, error = %e, "oracle chunk failed, using default scores");
                default_batch(photo_urls, chunk_offset)
            }
        }
    }
}

/// Default mid-range records for an entire chunk the oracle could not score.
pub fn default_batch(photo_urls: &[String], chunk_offset: usize) -> ScoreBatch {
    let scores = photo_urls
        .iter()
        .enumerate()
        .map(|(i, url)| PhotoScore::unanalyzed(chunk_offset + i, url))
        .collect();
    ScoreBatch {
        scores,
        duplicate_groups: Vec::new(),
    }
}

/// Instruction text sent alongside each chunk.
fn build_instructions(photo_count: usize, target_count: usize) -> String {
    let rooms: Vec<&str> = RoomType::all().map(|r| r.label()).collect();
    format!(
        "You are a real-estate photo editor preparing an MLS submission. \
         Analyze the {photo_count} listing photos below; the full shoot will be \
         trimmed to the best {target_count} images overall.\n\
         For each photo report: index (0-based, as listed), quality_score, \
         blur_score, exposure_score and composition_score (integers 0-100), \
         room_type (one of: {rooms}), is_exterior (boolean), and a short \
         feedback string.\n\
         Also report near-duplicate shots as duplicate_groups entries of the \
         form {{\"original\": <index of the best shot>, \"duplicates\": \
         [<indices>]}}.\n\
         Reply with a single JSON object: {{\"photos\": [...], \
         \"duplicate_groups\": [...]}}.",
        rooms = rooms.join(", "),
    )
}

/// Pulls a JSON object out of a reply that may be wrapped in a Markdown code
/// fence or surrounded by prose.
fn extract_json_object(reply: &str) -> Option<&str> {
    if let Some(start) = reply.find("```") {
        let after = &reply[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let first = reply.find('{')?;
    let last = reply.rfind('}')?;
    if last > first { Some(&reply[first..=last]) } else { None }
}

// Wire shapes are maximally tolerant: every field optional, unknown fields
// ignored, scores clamped after the fact.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireResponse {
    photos: Vec<WirePhoto>,
    duplicate_groups: Vec<WireGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WirePhoto {
    index: Option<i64>,
    quality_score: Option<i64>,
    blur_score: Option<i64>,
    exposure_score: Option<i64>,
    composition_score: Option<i64>,
    room_type: Option<String>,
    is_exterior: Option<bool>,
    is_duplicate: Option<bool>,
    duplicate_of_index: Option<i64>,
    similarity_score: Option<i64>,
    feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireGroup {
    original: Option<i64>,
    duplicates: Vec<i64>,
}

fn clamp_score(value: Option<i64>) -> u8 {
    match value {
        Some(v) => v.clamp(0, 100) as u8,
        None => crate::core::types::DEFAULT_SCORE,
    }
}

/// Parses one oracle reply into typed records, re-basing all chunk-relative
/// indices by `chunk_offset`. Photos the oracle skipped get default records,
/// so the output always covers the whole chunk in input order.
fn parse_reply(
    reply: &str,
    photo_urls: &[String],
    chunk_offset: usize,
) -> Result<ScoreBatch, OracleError> {
    let json = extract_json_object(reply).ok_or(OracleError::MissingJson)?;
    let wire: WireResponse = serde_json::from_str(json)?;

    let chunk_len = photo_urls.len();
    let mut slots: Vec<Option<WirePhoto>> = (0..chunk_len).map(|_| None).collect();
    for photo in wire.photos {
        match photo.index {
            Some(i) if (0..chunk_len as i64).contains(&i) => slots[i as usize] = Some(photo),
            other => warn!(index = ?other, chunk_len, "oracle photo index out of range, dropped"),
        }
    }

    let scores = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| match slot {
            Some(photo) => {
                let room_type = photo
                    .room_type
                    .as_deref()
                    .map(RoomType::from_label)
                    .unwrap_or(RoomType::Other);
                let is_duplicate = photo.is_duplicate.unwrap_or(false);
                PhotoScore {
                    photo_index: chunk_offset + i,
                    photo_url: photo_urls[i].clone(),
                    quality_score: clamp_score(photo.quality_score),
                    blur_score: clamp_score(photo.blur_score),
                    exposure_score: clamp_score(photo.exposure_score),
                    composition_score: clamp_score(photo.composition_score),
                    room_type,
                    is_exterior: photo.is_exterior.unwrap_or_else(|| room_type.is_exterior()),
                    is_duplicate,
                    duplicate_of_index: if is_duplicate {
                        photo
                            .duplicate_of_index
                            .filter(|&d| d >= 0)
                            .map(|d| d as usize + chunk_offset)
                    } else {
                        None
                    },
                    similarity_score: photo.similarity_score.map(|s| s.clamp(0, 100) as u8),
                    is_selected: false,
                    selection_reason: String::new(),
                    recommended_order: None,
                    ai_feedback: photo.feedback.unwrap_or_default(),
                }
            }
            None => PhotoScore::unanalyzed(chunk_offset + i, &photo_urls[i]),
        })
        .collect();

    let duplicate_groups = wire
        .duplicate_groups
        .into_iter()
        .filter_map(|group| {
            let original = group.original.filter(|&o| o >= 0)? as usize + chunk_offset;
            let duplicates: Vec<usize> = group
                .duplicates
                .iter()
                .filter(|&&d| d >= 0)
                .map(|&d| d as usize + chunk_offset)
                .collect();
            if duplicates.is_empty() {
                None
            } else {
                Some(DuplicateGroup {
                    original,
                    duplicates,
                })
            }
        })
        .collect();

    Ok(ScoreBatch {
        scores,
        duplicate_groups,
    })
}
