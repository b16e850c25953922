use serde::{Deserialize, Serialize};

/// Which kind of entity owns a media namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaCategory {
    Performance,
    Record,
}

impl MediaCategory {
    /// Directory segment under `Images/`
    ///
    /// Record media lives under "Reviews"; existing installs depend on it.
    pub fn path_segment(&self) -> &'static str {
        match self {
            MediaCategory::Performance => "Performances",
            MediaCategory::Record => "Reviews",
        }
    }
}

impl std::fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaCategory::Performance => write!(f, "performance"),
            MediaCategory::Record => write!(f, "record"),
        }
    }
}
