//! Weighted subject averages, letter grades and pass/fail classification.
//!
//! Accumulation happens in full `f64` precision; only the published
//! `average` is rounded to two decimals.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ScoreRecord, StudentScoreSet};

/// Passing threshold on the 10-point scale.
pub const DEFAULT_PASSING_THRESHOLD: f64 = 5.0;

/// Round to two decimal places (half away from zero).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// The weighted mean of one student's scores in one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectAverage {
    /// Published value, rounded to two decimals. 0 when there is no data.
    pub average: f64,
    /// Unrounded weighted mean, for further aggregation.
    pub raw: f64,
    /// At least one non-absent score exists.
    pub has_data: bool,
    pub graded_count: usize,
    pub absent_count: usize,
}

impl SubjectAverage {
    pub const NO_DATA: SubjectAverage = SubjectAverage {
        average: 0.0,
        raw: 0.0,
        has_data: false,
        graded_count: 0,
        absent_count: 0,
    };

    /// The published average, or `None` when there is nothing to publish.
    pub fn value(&self) -> Option<f64> {
        self.has_data.then_some(self.average)
    }
}

/// Compute Σ(score × weight) / Σ(weight) over the non-absent records.
pub fn weighted_average<'a, I>(records: I) -> SubjectAverage
where
    I: IntoIterator<Item = &'a ScoreRecord>,
{
    let mut weighted_sum = 0.0f64;
    let mut weight_sum = 0.0f64;
    let mut graded_count = 0usize;
    let mut absent_count = 0usize;

    for record in records {
        if record.is_absent {
            absent_count += 1;
            continue;
        }
        graded_count += 1;
        weighted_sum += record.score * record.weight;
        weight_sum += record.weight;
    }

    if graded_count == 0 {
        return SubjectAverage {
            absent_count,
            ..SubjectAverage::NO_DATA
        };
    }

    let raw = if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        0.0
    };

    SubjectAverage {
        average: round2(raw),
        raw,
        has_data: true,
        graded_count,
        absent_count,
    }
}

/// Average of a whole [`StudentScoreSet`].
pub fn score_set_average(set: &StudentScoreSet) -> SubjectAverage {
    weighted_average(&set.scores)
}

/// Letter grade on the 10-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterGrade {
    Excellent,
    Good,
    Average,
    Weak,
    Poor,
}

impl LetterGrade {
    /// Step function over an already-rounded average.
    pub fn from_average(average: f64) -> Self {
        if average >= 8.0 {
            LetterGrade::Excellent
        } else if average >= 6.5 {
            LetterGrade::Good
        } else if average >= 5.0 {
            LetterGrade::Average
        } else if average >= 3.5 {
            LetterGrade::Weak
        } else {
            LetterGrade::Poor
        }
    }

    /// `None` for students with no data.
    pub fn for_subject(avg: &SubjectAverage) -> Option<Self> {
        avg.value().map(Self::from_average)
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LetterGrade::Excellent => write!(f, "Excellent"),
            LetterGrade::Good => write!(f, "Good"),
            LetterGrade::Average => write!(f, "Average"),
            LetterGrade::Weak => write!(f, "Weak"),
            LetterGrade::Poor => write!(f, "Poor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Passed,
    Failed,
    Ungraded,
}

impl PassStatus {
    pub fn classify(avg: &SubjectAverage, passing_threshold: f64) -> Self {
        match avg.value() {
            None => PassStatus::Ungraded,
            Some(v) if v >= passing_threshold => PassStatus::Passed,
            Some(_) => PassStatus::Failed,
        }
    }
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassStatus::Passed => write!(f, "passed"),
            PassStatus::Failed => write!(f, "failed"),
            PassStatus::Ungraded => write!(f, "n/a"),
        }
    }
}

/// One student's row in a subject view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverageRow {
    pub student_id: String,
    pub student_name: String,
    pub average: SubjectAverage,
    pub letter: Option<LetterGrade>,
    pub status: PassStatus,
}

pub fn student_rows(sets: &[StudentScoreSet], passing_threshold: f64) -> Vec<StudentAverageRow> {
    sets.iter()
        .map(|set| {
            let average = score_set_average(set);
            StudentAverageRow {
                student_id: set.student_id.clone(),
                student_name: set.student_name.clone(),
                letter: LetterGrade::for_subject(&average),
                status: PassStatus::classify(&average, passing_threshold),
                average,
            }
        })
        .collect()
}
