//! Probe-versus-gallery comparison.
//!
//! The gallery is scanned linearly in registration order. A record is
//! compared by its closest encoding; a distance at or below the threshold
//! counts as a match.

use crate::types::{Embedding, StudentRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of matching one probe against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Index of the matched record in the gallery slice.
    pub index: usize,
    /// Euclidean distance between the probe and the matched record.
    pub distance: f32,
}

/// Strategy for comparing a probe embedding against the registered gallery.
pub trait Matcher: Send + Sync {
    fn find(&self, probe: &Embedding, gallery: &[StudentRecord], threshold: f32)
        -> Option<MatchResult>;
}

/// Returns the first record (in gallery order) within the threshold.
pub struct FirstMatch;

impl Matcher for FirstMatch {
    fn find(
        &self,
        probe: &Embedding,
        gallery: &[StudentRecord],
        threshold: f32,
    ) -> Option<MatchResult> {
        gallery.iter().enumerate().find_map(|(index, record)| {
            let distance = record.distance_to(probe);
            (distance <= threshold).then_some(MatchResult { index, distance })
        })
    }
}

/// Returns the closest record within the threshold. Ties keep the earlier record.
pub struct BestMatch;

impl Matcher for BestMatch {
    fn find(
        &self,
        probe: &Embedding,
        gallery: &[StudentRecord],
        threshold: f32,
    ) -> Option<MatchResult> {
        let mut best: Option<MatchResult> = None;
        for (index, record) in gallery.iter().enumerate() {
            let distance = record.distance_to(probe);
            if distance > threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(MatchResult { index, distance });
            }
        }
        best
    }
}

/// Configurable choice between [`FirstMatch`] and [`BestMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    #[default]
    First,
    Best,
}

impl MatchStrategy {
    pub fn matcher(self) -> Box<dyn Matcher> {
        match self {
            Self::First => Box::new(FirstMatch),
            Self::Best => Box::new(BestMatch),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Best => f.write_str("best"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "best" => Ok(Self::Best),
            other => Err(format!("unknown match strategy '{other}' (expected first or best)")),
        }
    }
}
