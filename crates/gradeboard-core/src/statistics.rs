//! Class-level descriptive statistics over per-student subject averages.

use serde::{Deserialize, Serialize};

use crate::average::{round2, score_set_average, SubjectAverage};
use crate::model::StudentScoreSet;

/// Aggregate statistics for one (class, subject, term) scope.
///
/// Every numeric field is rounded to two decimals; aggregation itself runs
/// on the unrounded per-student means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    /// Mean of the averages of students with data.
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    /// All students in scope, including those without data.
    pub total_students: usize,
    /// Students with at least one graded score.
    pub graded_students: usize,
    pub passed_students: usize,
    /// `passed_students / total_students × 100`.
    pub pass_rate: f64,
    /// `graded_students / total_students × 100`.
    pub completion_rate: f64,
}

impl ClassStatistics {
    pub const EMPTY: ClassStatistics = ClassStatistics {
        average: 0.0,
        highest: 0.0,
        lowest: 0.0,
        total_students: 0,
        graded_students: 0,
        passed_students: 0,
        pass_rate: 0.0,
        completion_rate: 0.0,
    };
}

/// Compute statistics for every score set in a scope.
pub fn compute_class_statistics(sets: &[StudentScoreSet], passing_threshold: f64) -> ClassStatistics {
    let averages: Vec<SubjectAverage> = sets.iter().map(score_set_average).collect();
    statistics_from_averages(&averages, passing_threshold)
}

/// Compute statistics from already-computed subject averages.
pub fn statistics_from_averages(
    averages: &[SubjectAverage],
    passing_threshold: f64,
) -> ClassStatistics {
    let total_students = averages.len();
    if total_students == 0 {
        return ClassStatistics::EMPTY;
    }

    let graded: Vec<&SubjectAverage> = averages.iter().filter(|a| a.has_data).collect();
    let graded_students = graded.len();

    let (average, highest, lowest) = if graded.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = graded.iter().map(|a| a.raw).sum();
        let highest = graded
            .iter()
            .map(|a| a.raw)
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = graded.iter().map(|a| a.raw).fold(f64::INFINITY, f64::min);
        (sum / graded_students as f64, highest, lowest)
    };

    // Pass/fail follows the published (rounded) student average so a student
    // shown as 5.00 is never counted as failing.
    let passed_students = graded
        .iter()
        .filter(|a| a.average >= passing_threshold)
        .count();

    let total = total_students as f64;
    ClassStatistics {
        average: round2(average),
        highest: round2(highest),
        lowest: round2(lowest),
        total_students,
        graded_students,
        passed_students,
        pass_rate: round2(passed_students as f64 / total * 100.0),
        completion_rate: round2(graded_students as f64 / total * 100.0),
    }
}
