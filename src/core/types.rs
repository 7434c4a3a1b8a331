use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Score assigned to a photo when the oracle could not analyze it.
pub const DEFAULT_SCORE: u8 = 50;

/// What space a photograph depicts. Drives both coverage requirements during
/// selection and presentation order in the final MLS sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum RoomType {
    ExteriorFront,
    ExteriorAerial,
    ExteriorBack,
    ExteriorPool,
    ExteriorYard,
    ExteriorPatio,
    Foyer,
    LivingRoom,
    FamilyRoom,
    Kitchen,
    DiningRoom,
    BreakfastNook,
    MasterBedroom,
    MasterBathroom,
    Bedroom,
    Bathroom,
    Office,
    Den,
    BonusRoom,
    Laundry,
    Garage,
    #[default]
    Other,
}

impl RoomType {
    /// Room types that must be represented in a complete listing, in the
    /// order coverage slots are filled.
    pub const REQUIRED_COVERAGE: [RoomType; 8] = [
        RoomType::Kitchen,
        RoomType::LivingRoom,
        RoomType::MasterBedroom,
        RoomType::MasterBathroom,
        RoomType::DiningRoom,
        RoomType::FamilyRoom,
        RoomType::ExteriorBack,
        RoomType::ExteriorPool,
    ];

    /// MLS presentation priority: curb appeal first, utility rooms last.
    /// Lower values sort earlier in the final photo sequence.
    pub fn presentation_priority(&self) -> u8 {
        match self {
            RoomType::ExteriorFront => 1,
            RoomType::ExteriorAerial => 2,
            RoomType::ExteriorBack => 3,
            RoomType::ExteriorPool => 4,
            RoomType::ExteriorYard => 5,
            RoomType::ExteriorPatio => 6,
            RoomType::Foyer => 10,
            RoomType::LivingRoom => 11,
            RoomType::FamilyRoom => 12,
            RoomType::Kitchen => 15,
            RoomType::DiningRoom => 16,
            RoomType::BreakfastNook => 17,
            RoomType::MasterBedroom => 20,
            RoomType::MasterBathroom => 21,
            RoomType::Bedroom => 25,
            RoomType::Bathroom => 26,
            RoomType::Office => 30,
            RoomType::Den => 31,
            RoomType::BonusRoom => 32,
            RoomType::Laundry => 40,
            RoomType::Garage => 45,
            RoomType::Other => 50,
        }
    }

    pub fn is_exterior(&self) -> bool {
        matches!(
            self,
            RoomType::ExteriorFront
                | RoomType::ExteriorAerial
                | RoomType::ExteriorBack
                | RoomType::ExteriorPool
                | RoomType::ExteriorYard
                | RoomType::ExteriorPatio
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoomType::ExteriorFront => "exterior-front",
            RoomType::ExteriorAerial => "exterior-aerial",
            RoomType::ExteriorBack => "exterior-back",
            RoomType::ExteriorPool => "exterior-pool",
            RoomType::ExteriorYard => "exterior-yard",
            RoomType::ExteriorPatio => "exterior-patio",
            RoomType::Foyer => "foyer",
            RoomType::LivingRoom => "living-room",
            RoomType::FamilyRoom => "family-room",
            RoomType::Kitchen => "kitchen",
            RoomType::DiningRoom => "dining-room",
            RoomType::BreakfastNook => "breakfast-nook",
            RoomType::MasterBedroom => "master-bedroom",
            RoomType::MasterBathroom => "master-bathroom",
            RoomType::Bedroom => "bedroom",
            RoomType::Bathroom => "bathroom",
            RoomType::Office => "office",
            RoomType::Den => "den",
            RoomType::BonusRoom => "bonus-room",
            RoomType::Laundry => "laundry",
            RoomType::Garage => "garage",
            RoomType::Other => "other",
        }
    }

    /// Lossy parse of an oracle-reported room label. Oracles occasionally use
    /// underscores or stray casing; anything unrecognized falls back to `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "exterior-front" => RoomType::ExteriorFront,
            "exterior-aerial" => RoomType::ExteriorAerial,
            "exterior-back" => RoomType::ExteriorBack,
            "exterior-pool" => RoomType::ExteriorPool,
            "exterior-yard" => RoomType::ExteriorYard,
            "exterior-patio" => RoomType::ExteriorPatio,
            "foyer" => RoomType::Foyer,
            "living-room" => RoomType::LivingRoom,
            "family-room" => RoomType::FamilyRoom,
            "kitchen" => RoomType::Kitchen,
            "dining-room" => RoomType::DiningRoom,
            "breakfast-nook" => RoomType::BreakfastNook,
            "master-bedroom" => RoomType::MasterBedroom,
            "master-bathroom" => RoomType::MasterBathroom,
            "bedroom" => RoomType::Bedroom,
            "bathroom" => RoomType::Bathroom,
            "office" => RoomType::Office,
            "den" => RoomType::Den,
            "bonus-room" => RoomType::BonusRoom,
            "laundry" => RoomType::Laundry,
            "garage" => RoomType::Garage,
            _ => RoomType::Other,
        }
    }

    pub fn all() -> impl Iterator<Item = RoomType> {
        [
            RoomType::ExteriorFront,
            RoomType::ExteriorAerial,
            RoomType::ExteriorBack,
            RoomType::ExteriorPool,
            RoomType::ExteriorYard,
            RoomType::ExteriorPatio,
            RoomType::Foyer,
            RoomType::LivingRoom,
            RoomType::FamilyRoom,
            RoomType::Kitchen,
            RoomType::DiningRoom,
            RoomType::BreakfastNook,
            RoomType::MasterBedroom,
            RoomType::MasterBathroom,
            RoomType::Bedroom,
            RoomType::Bathroom,
            RoomType::Office,
            RoomType::Den,
            RoomType::BonusRoom,
            RoomType::Laundry,
            RoomType::Garage,
            RoomType::Other,
        ]
        .into_iter()
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-photo scoring record. Created once per photo when its chunk's oracle
/// call returns (or fails), then patched by the duplicate and selection stages.
/// `photo_index` equals the photo's position in the original input batch and
/// is the join key for everything downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoScore {
    pub photo_index: usize,
    pub photo_url: String,
    pub quality_score: u8,
    pub blur_score: u8,
    pub exposure_score: u8,
    pub composition_score: u8,
    pub room_type: RoomType,
    pub is_exterior: bool,
    pub is_duplicate: bool,
    pub duplicate_of_index: Option<usize>,
    pub similarity_score: Option<u8>,
    pub is_selected: bool,
    pub selection_reason: String,
    pub recommended_order: Option<usize>,
    pub ai_feedback: String,
}

impl PhotoScore {
    /// Fallback record for a photo the oracle could not analyze. Mid-range
    /// scores keep it in the running without letting it beat real candidates.
    pub fn unanalyzed(photo_index: usize, photo_url: impl Into<String>) -> Self {
        Self {
            photo_index,
            photo_url: photo_url.into(),
            quality_score: DEFAULT_SCORE,
            blur_score: DEFAULT_SCORE,
            exposure_score: DEFAULT_SCORE,
            composition_score: DEFAULT_SCORE,
            room_type: RoomType::Other,
            is_exterior: false,
            is_duplicate: false,
            duplicate_of_index: None,
            similarity_score: None,
            is_selected: false,
            selection_reason: "Unable to analyze - included by default".to_string(),
            recommended_order: None,
            ai_feedback: String::new(),
        }
    }
}

/// Cluster of near-identical shots. All `duplicates` are suppressed from
/// selection; the `original` stays a normal candidate. Indices are absolute
/// positions in the input batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub original: usize,
    pub duplicates: Vec<usize>,
}

/// Everything a cull session produces. Rejected photos are retained for
/// audit; nothing is ever dropped from the record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CullSessionResult {
    pub total_photos: usize,
    /// Selected photos in ascending `recommended_order`.
    pub selected_photos: Vec<PhotoScore>,
    pub rejected_photos: Vec<PhotoScore>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Histogram over all input photos, selected or not.
    pub room_type_counts: BTreeMap<RoomType, usize>,
    /// Mean quality score over all input photos.
    pub average_quality: f64,
    pub processing_time_ms: u64,
}
