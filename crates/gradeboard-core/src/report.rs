//! Class report snapshots with JSON persistence and markdown rendering.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::average::StudentAverageRow;
use crate::behavior::ClassBehavior;
use crate::coordinator::{Coordinator, ReadOptions};
use crate::error::EngineError;
use crate::model::SubjectScope;
use crate::ranking::Ranking;
use crate::statistics::ClassStatistics;

/// Everything a teacher sees for one class and subject in a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scope: SubjectScope,
    pub passing_threshold: f64,
    pub statistics: ClassStatistics,
    pub students: Vec<StudentAverageRow>,
    /// Term ranking across all subjects of the class.
    pub ranking: Ranking,
    /// `None` when behavior notes could not be loaded.
    #[serde(default)]
    pub behavior: Option<ClassBehavior>,
}

impl ClassReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ClassReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let s = &self.statistics;

        md.push_str(&format!("# Class report: {}\n\n", self.scope));
        md.push_str(&format!(
            "Generated {} (report {})\n\n",
            self.created_at.format("%Y-%m-%d %H:%M UTC"),
            self.id
        ));

        md.push_str("## Statistics\n\n");
        md.push_str("| Average | Highest | Lowest | Graded | Passed | Pass rate | Completion |\n");
        md.push_str("|---------|---------|--------|--------|--------|-----------|------------|\n");
        md.push_str(&format!(
            "| {:.2} | {:.2} | {:.2} | {}/{} | {} | {:.2}% | {:.2}% |\n\n",
            s.average,
            s.highest,
            s.lowest,
            s.graded_students,
            s.total_students,
            s.passed_students,
            s.pass_rate,
            s.completion_rate
        ));

        md.push_str("## Students\n\n");
        md.push_str("| Student | Average | Grade | Status |\n");
        md.push_str("|---------|---------|-------|--------|\n");
        for row in &self.students {
            let average = row
                .average
                .value()
                .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
            let letter = row.letter.map_or_else(|| "-".to_string(), |l| l.to_string());
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                escape_cell(display_name(row)),
                average,
                letter,
                row.status
            ));
        }
        md.push('\n');

        md.push_str(&format!("## Term ranking ({})\n\n", self.ranking.mode));
        if self.ranking.is_empty() {
            md.push_str("No ranked students.\n\n");
        } else {
            md.push_str("| Rank | Student | Average |\n");
            md.push_str("|------|---------|---------|\n");
            for entry in &self.ranking.entries {
                md.push_str(&format!(
                    "| {} | {} | {:.2} |\n",
                    entry.rank,
                    escape_cell(&entry.student_id),
                    entry.average
                ));
            }
            md.push('\n');
        }

        if let Some(behavior) = &self.behavior {
            let b = &behavior.summary;
            md.push_str("## Behavior\n\n");
            md.push_str(&format!(
                "excellent {} / good {} / normal {} / warning {} / serious {}\n\n",
                b.excellent, b.good, b.normal, b.warning, b.serious
            ));
            if !behavior.early_warning.is_empty() {
                md.push_str(&format!(
                    "**Early warning:** {}\n",
                    behavior.early_warning.join(", ")
                ));
            }
        }

        md
    }
}

fn display_name(row: &StudentAverageRow) -> &str {
    if row.student_name.is_empty() {
        &row.student_id
    } else {
        &row.student_name
    }
}

/// Keep a value from splitting a markdown table cell.
fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

/// Assemble a report through the coordinator's cache.
pub async fn build_class_report(
    coordinator: &Coordinator,
    scope: &SubjectScope,
) -> Result<ClassReport, EngineError> {
    let options = ReadOptions::default();
    let statistics = coordinator.class_statistics(scope, options).await?;
    let students = coordinator.subject_averages(scope, options).await?;
    let ranking = coordinator
        .class_ranking(&scope.class_id, &scope.term_id, options)
        .await?;

    let behavior = match coordinator.class_behavior(&scope.class_id, options).await {
        Ok(b) => Some(b.as_ref().clone()),
        Err(e) => {
            tracing::warn!(class = %scope.class_id, error = %e, "behavior notes unavailable");
            None
        }
    };

    Ok(ClassReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        scope: scope.clone(),
        passing_threshold: coordinator.config().passing_threshold,
        statistics,
        students,
        ranking: ranking.as_ref().clone(),
        behavior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::average::student_rows;
    use crate::behavior::ClassBehavior;
    use crate::model::{ScoreRecord, StudentScoreSet};
    use crate::ranking::{rank_students, RankingMode};
    use crate::statistics::{compute_class_statistics, statistics_from_averages};

    fn make_report() -> ClassReport {
        let sets: Vec<StudentScoreSet> = [("an", 9.0), ("binh", 4.0)]
            .iter()
            .map(|(id, score)| StudentScoreSet {
                student_id: id.to_string(),
                student_name: id.to_uppercase(),
                scores: vec![ScoreRecord {
                    id: format!("{id}-quiz"),
                    assessment_id: "quiz".into(),
                    student_id: id.to_string(),
                    score: *score,
                    max_score: 10.0,
                    is_absent: false,
                    weight: 1.0,
                    comment: None,
                }],
            })
            .collect();

        ClassReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            scope: SubjectScope::new("10A", "math", "t1"),
            passing_threshold: 5.0,
            statistics: compute_class_statistics(&sets, 5.0),
            students: student_rows(&sets, 5.0),
            ranking: rank_students(
                vec![("an".to_string(), 9.0), ("binh".to_string(), 4.0)],
                RankingMode::Dense,
            ),
            behavior: Some(ClassBehavior::from_notes("10A", Vec::new())),
        }
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("10A.json");

        report.save_json(&path).unwrap();
        let loaded = ClassReport::load_json(&path).unwrap();

        assert_eq!(loaded, report);

        let averages: Vec<_> = loaded.students.iter().map(|row| row.average).collect();
        assert_eq!(
            statistics_from_averages(&averages, loaded.passing_threshold),
            report.statistics
        );
    }

    #[test]
    fn markdown_output() {
        let md = make_report().to_markdown();
        assert!(md.contains("# Class report: 10A/math/t1"));
        assert!(md.contains("| 6.50 | 9.00 | 4.00 | 2/2 | 1 | 50.00% | 100.00% |"));
        assert!(md.contains("| BINH | 4.00 | Weak | failed |"));
        assert!(md.contains("## Term ranking (dense)"));
        assert!(!md.contains("Early warning"));
    }

    #[test]
    fn markdown_escapes_pipes_in_names() {
        let mut report = make_report();
        report.students[0].student_name = "An | Nguyen".into();
        report.ranking.entries[1].student_id = "binh|2".into();

        let md = report.to_markdown();
        assert!(md.contains("| An \\| Nguyen | 9.00 |"));
        assert!(md.contains("| 2 | binh\\|2 | 4.00 |"));
    }
}
