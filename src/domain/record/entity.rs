use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

/// A user-authored entry documenting one attendance of a Performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Generated identifier, also the media namespace key
    pub id: String,

    /// Owning Performance (REQUIRED, immutable)
    pub performance_id: String,

    pub viewed_at: DateTime<Utc>,

    /// Always within MIN_RATING..=MAX_RATING
    pub rating: f64,

    pub note: String,

    /// Owned image ids in the order the user attached them
    pub image_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User input for a Record that does not exist yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub performance_id: String,
    pub viewed_at: DateTime<Utc>,
    pub rating: f64,
    pub note: String,
}

/// Partial update; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub viewed_at: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
    pub note: Option<String>,
}

/// Clamp a rating into the supported range; NaN becomes the minimum
pub fn clamp_rating(rating: f64) -> f64 {
    if rating.is_nan() {
        return MIN_RATING;
    }
    rating.clamp(MIN_RATING, MAX_RATING)
}

impl NewRecord {
    pub fn new(
        performance_id: impl Into<String>,
        viewed_at: DateTime<Utc>,
        rating: f64,
        note: impl Into<String>,
    ) -> Self {
        Self {
            performance_id: performance_id.into(),
            viewed_at,
            rating,
            note: note.into(),
        }
    }
}

impl Record {
    /// Materialize a draft with a freshly generated id
    pub fn from_draft(draft: NewRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            performance_id: draft.performance_id,
            viewed_at: draft.viewed_at,
            rating: clamp_rating(draft.rating),
            note: draft.note,
            image_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply only the supplied fields
    pub fn apply_patch(&mut self, patch: RecordPatch) {
        if let Some(viewed_at) = patch.viewed_at {
            self.viewed_at = viewed_at;
        }
        if let Some(rating) = patch.rating {
            self.rating = clamp_rating(rating);
        }
        if let Some(note) = patch.note {
            self.note = note;
        }
        self.updated_at = Utc::now();
    }
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.viewed_at.is_none() && self.rating.is_none() && self.note.is_none()
    }
}
