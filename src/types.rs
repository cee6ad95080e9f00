//! Core data types for the Anamnesis association engine
//!
//! This module defines the identifiers and records passed between the
//! tokenizer, the model, the intervention ledger and the recommendation
//! engine. Tokens are positional: they are only meaningful relative to the
//! vocabulary generation that assigned them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Dense, zero-based identifier for a resource
///
/// Assigned in strict order of first appearance in the replayed visit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub usize);

impl Token {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unordered pair of two distinct tokens
///
/// Stored normalized (`low < high`) so `{a, b}` and `{b, a}` hash identically.
/// Self-pairs cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenPair {
    low: Token,
    high: Token,
}

impl TokenPair {
    /// Create a pair, returning `None` when both tokens are equal
    pub fn new(a: Token, b: Token) -> Option<Self> {
        match a.cmp(&b) {
            Ordering::Less => Some(Self { low: a, high: b }),
            Ordering::Greater => Some(Self { low: b, high: a }),
            Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> Token {
        self.low
    }

    pub fn high(&self) -> Token {
        self.high
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{}}}", self.low, self.high)
    }
}

/// User-confirmed judgment about a resource pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intervention {
    Similar,
    Dissimilar,
}

impl Intervention {
    /// Single-letter code used in the intervention log
    pub fn code(self) -> &'static str {
        match self {
            Intervention::Similar => "s",
            Intervention::Dissimilar => "d",
        }
    }

    /// Parse a log type code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "s" => Some(Intervention::Similar),
            "d" => Some(Intervention::Dissimilar),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Intervention::Similar => Intervention::Dissimilar,
            Intervention::Dissimilar => Intervention::Similar,
        }
    }
}

impl fmt::Display for Intervention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intervention::Similar => write!(f, "similar"),
            Intervention::Dissimilar => write!(f, "dissimilar"),
        }
    }
}

impl FromStr for Intervention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "similar" | "sim" | "s" | "y" => Ok(Intervention::Similar),
            "dissimilar" | "dissim" | "d" | "n" => Ok(Intervention::Dissimilar),
            other => Err(format!("unknown intervention '{}'", other)),
        }
    }
}

/// Intervention status attached to a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    #[default]
    Open,
    ConfirmedSimilar,
    ConfirmedDissimilar,
}

impl InterventionStatus {
    /// Ranking tier: confirmed-similar > open > confirmed-dissimilar
    pub fn rank(self) -> u8 {
        match self {
            InterventionStatus::ConfirmedSimilar => 2,
            InterventionStatus::Open => 1,
            InterventionStatus::ConfirmedDissimilar => 0,
        }
    }
}

impl From<Option<Intervention>> for InterventionStatus {
    fn from(intervention: Option<Intervention>) -> Self {
        match intervention {
            Some(Intervention::Similar) => InterventionStatus::ConfirmedSimilar,
            Some(Intervention::Dissimilar) => InterventionStatus::ConfirmedDissimilar,
            None => InterventionStatus::Open,
        }
    }
}

/// Paths with no visible characters never identify a resource
pub fn is_blank_path(path: &str) -> bool {
    path.trim().is_empty()
}

/// One row of the visitation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceVisit {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub process: String,
    #[serde(default)]
    pub window_title: String,
}

impl ResourceVisit {
    pub fn new(path: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            path: path.into(),
            process: process.into(),
            window_title: String::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_window(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }
}

/// Foreground resource pushed by the active-resource notifier
///
/// An empty path means the notifier could not resolve a resource (e.g. the
/// browser or accessibility query failed) and is treated as "no active resource".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveResource {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
}

impl ActiveResource {
    pub fn new(path: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        is_blank_path(&self.path)
    }
}

/// Display metadata remembered for a resource from its latest visit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub app_name: String,
    pub window_title: String,
}

/// A resource recommended for the current context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedResource {
    pub path: String,
    #[serde(default)]
    pub meta: ResourceMeta,
    /// Raw cosine similarity to the active resource
    pub similarity: f32,
    pub status: InterventionStatus,
}

impl AssociatedResource {
    /// Ordering used for display: status tier first, then raw similarity
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        other
            .status
            .rank()
            .cmp(&self.status.rank())
            .then_with(|| other.similarity.total_cmp(&self.similarity))
    }
}

/// Result of recording an intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RecordOutcome {
    /// First intervention for the pair, appended to the log
    Recorded,
    /// Same intervention was already present; nothing changed
    AlreadyRecorded,
    /// Opposite intervention replaced the previous one; log rewritten
    Switched { from: Intervention, to: Intervention },
}
