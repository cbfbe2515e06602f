//! Ranking of students within a class/term by average score.
//!
//! The tie rule is explicit: every [`Ranking`] carries the [`RankingMode`]
//! it was built with so consumers can tell shared ranks from positions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::average::round2;
use crate::model::RankingEntry;

/// How students with equal averages are ranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    /// Ties share a rank; the next rank follows without a gap (1, 1, 2).
    #[default]
    Dense,
    /// Ties share a rank; the next rank skips (1, 1, 3).
    Competition,
    /// Every student gets a distinct position; ties keep input order.
    Positional,
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingMode::Dense => write!(f, "dense"),
            RankingMode::Competition => write!(f, "competition"),
            RankingMode::Positional => write!(f, "positional"),
        }
    }
}

impl FromStr for RankingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dense" => Ok(RankingMode::Dense),
            "competition" | "standard" => Ok(RankingMode::Competition),
            "positional" | "position" => Ok(RankingMode::Positional),
            other => Err(format!("unknown ranking mode: {other}")),
        }
    }
}

/// An ordered ranking and the tie rule used to build it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub mode: RankingMode,
    pub entries: Vec<RankingEntry>,
}

impl Ranking {
    /// Look up a student's entry. `None` means "no rank", not an error.
    pub fn entry_for(&self, student_id: &str) -> Option<&RankingEntry> {
        self.entries.iter().find(|e| e.student_id == student_id)
    }

    pub fn rank_of(&self, student_id: &str) -> Option<u32> {
        self.entry_for(student_id).map(|e| e.rank)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-rank entries received from elsewhere under `mode`, ignoring
    /// whatever ranks they already carry.
    pub fn from_entries(entries: &[RankingEntry], mode: RankingMode) -> Self {
        rank_students(
            entries.iter().map(|e| (e.student_id.clone(), e.average)),
            mode,
        )
    }
}

/// Sort `(student_id, average)` pairs descending and assign ranks.
///
/// Averages are compared after rounding to two decimals; the sort is stable
/// so equal averages keep their input order.
pub fn rank_students<I>(averages: I, mode: RankingMode) -> Ranking
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut rows: Vec<(String, f64)> = averages
        .into_iter()
        .map(|(id, avg)| (id, round2(avg)))
        .collect();
    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut entries = Vec::with_capacity(rows.len());
    let mut previous: Option<f64> = None;
    let mut current_rank = 0u32;

    for (position, (student_id, average)) in rows.into_iter().enumerate() {
        let position = position as u32 + 1;
        let tied = previous == Some(average);
        current_rank = match mode {
            RankingMode::Positional => position,
            RankingMode::Competition if tied => current_rank,
            RankingMode::Competition => position,
            RankingMode::Dense if tied => current_rank,
            RankingMode::Dense => current_rank + 1,
        };
        previous = Some(average);
        entries.push(RankingEntry {
            student_id,
            average,
            rank: current_rank,
        });
    }

    Ranking { mode, entries }
}
