//! Photo triage and selection engine for MLS listing submissions.
//!
//! Takes an unordered batch of listing photo URLs, scores them in chunks
//! through an external vision oracle, suppresses near-duplicates, selects a
//! bounded shortlist under room-coverage constraints, and orders the result
//! the way MLS listings conventionally present photos.

pub mod core;
pub mod services;

pub use crate::core::session::{
    CullSession, DEFAULT_TARGET_COUNT, SessionConfig, SessionError,
};
pub use crate::core::types::{CullSessionResult, DuplicateGroup, PhotoScore, RoomType};
pub use crate::services::oracle::{
    CHUNK_SIZE, GeminiOracle, OracleClient, OracleError, ScoreBatch, VisionOracle,
};
