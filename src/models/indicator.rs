use serde::{Deserialize, Serialize};

/// What an indicator points at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Cursor,
    Pointer,
}

/// Where an indicator is located. A cursor carries a caret offset into the
/// plain text, a pointer carries coordinates relative to the editing surface.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum IndicatorLocation {
    Caret { position: usize },
    Point { x: f64, y: f64 },
}

/// Transient presence signal for one participant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub user_id: String,
    pub kind: IndicatorKind,
    pub color: String,
    /// Milliseconds since the epoch on the sender's clock. Informational only.
    pub timestamp: i64,
    #[serde(flatten)]
    pub location: IndicatorLocation,
}

impl Indicator {
    pub fn cursor(user_id: impl Into<String>, color: impl Into<String>, position: usize) -> Self {
        Self {
            user_id: user_id.into(),
            kind: IndicatorKind::Cursor,
            color: color.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            location: IndicatorLocation::Caret { position },
        }
    }

    pub fn pointer(user_id: impl Into<String>, color: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            user_id: user_id.into(),
            kind: IndicatorKind::Pointer,
            color: color.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            location: IndicatorLocation::Point { x, y },
        }
    }

    /// Caret offset, if this is a cursor indicator.
    pub fn position(&self) -> Option<usize> {
        match self.location {
            IndicatorLocation::Caret { position } => Some(position),
            IndicatorLocation::Point { .. } => None,
        }
    }
}
