use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::DomainError;

/// A cached catalog entry for a show or concert
///
/// Fetched from the remote catalog and kept offline. Remote image URLs are
/// only meaningful before `save`; after `save` the local image ids are the
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// External catalog identifier (stable)
    pub id: String,

    pub name: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    pub venue_name: String,

    pub genre: Genre,
    pub area: Area,
    pub state: PerformanceState,

    /// Remote poster location, as decoded from the catalog
    pub poster_url: Option<String>,

    /// Local poster image id (media namespace of this Performance)
    pub poster_id: Option<String>,

    pub detail: Option<PerformanceDetail>,

    /// Owned Record ids in creation order
    /// Materialized from the records table on read; never written directly.
    pub record_ids: Vec<String>,

    pub updated_at: DateTime<Utc>,
}

/// Extended information only present once the detail endpoint was fetched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDetail {
    pub cast: String,
    pub crew: String,
    pub runtime: String,
    pub age_limit: String,
    pub synopsis: String,
    pub price_info: String,

    pub related_links: Vec<RelatedLink>,

    /// Remote detail image locations in display order
    pub detail_image_urls: Vec<String>,

    /// Local detail image ids in display order
    pub detail_image_ids: Vec<String>,
}

/// Booking site or related page of a Performance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedLink {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl RelatedLink {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
        }
    }
}

impl Performance {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_date,
            end_date,
            venue_name: String::new(),
            genre: Genre::Unknown,
            area: Area::Unknown,
            state: PerformanceState::Upcoming,
            poster_url: None,
            poster_id: None,
            detail: None,
            record_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Local detail image ids, empty when no detail was fetched
    pub fn detail_image_ids(&self) -> &[String] {
        self.detail
            .as_ref()
            .map(|d| d.detail_image_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Remote detail image URLs, empty when no detail was fetched
    pub fn detail_image_urls(&self) -> &[String] {
        self.detail
            .as_ref()
            .map(|d| d.detail_image_urls.as_slice())
            .unwrap_or(&[])
    }

    pub fn related_links(&self) -> &[RelatedLink] {
        self.detail
            .as_ref()
            .map(|d| d.related_links.as_slice())
            .unwrap_or(&[])
    }

    /// Every local image id owned by this Performance (poster first)
    pub fn owned_image_ids(&self) -> Vec<String> {
        self.poster_id
            .iter()
            .chain(self.detail_image_ids().iter())
            .cloned()
            .collect()
    }
}

// ============================================================================
// CATALOG ENUMS
// ============================================================================

/// Declares a catalog enum stored as a stable snake_case code
macro_rules! catalog_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => write!(f, $code)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok($name::$variant),)+
                    other => Err(DomainError::InvariantViolation(format!(
                        "Unknown {} code: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

catalog_enum!(
    /// Catalog genre
    Genre {
        Theater => "theater",
        Musical => "musical",
        Classical => "classical",
        KoreanTraditional => "korean_traditional",
        PopularMusic => "popular_music",
        Dance => "dance",
        Circus => "circus",
        Complex => "complex",
        Unknown => "unknown",
    }
);

catalog_enum!(
    /// Region the venue is located in
    Area {
        Seoul => "seoul",
        Gyeonggi => "gyeonggi",
        Incheon => "incheon",
        Busan => "busan",
        Daegu => "daegu",
        Gwangju => "gwangju",
        Daejeon => "daejeon",
        Ulsan => "ulsan",
        Gangwon => "gangwon",
        Chungcheong => "chungcheong",
        Jeolla => "jeolla",
        Gyeongsang => "gyeongsang",
        Jeju => "jeju",
        Unknown => "unknown",
    }
);

catalog_enum!(
    /// Run state of a Performance
    PerformanceState {
        Upcoming => "upcoming",
        Ongoing => "ongoing",
        Completed => "completed",
    }
);
