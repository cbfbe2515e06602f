//! Record types exchanged with the record store.
//!
//! Field names serialize in camelCase to match the REST API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The (class, subject, term) coordinate of a score query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScope {
    pub class_id: String,
    pub subject_id: String,
    pub term_id: String,
}

impl SubjectScope {
    pub fn new(
        class_id: impl Into<String>,
        subject_id: impl Into<String>,
        term_id: impl Into<String>,
    ) -> Self {
        Self {
            class_id: class_id.into(),
            subject_id: subject_id.into(),
            term_id: term_id.into(),
        }
    }
}

impl fmt::Display for SubjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.class_id, self.subject_id, self.term_id)
    }
}

/// One assessment result for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub is_absent: bool,
    /// Weight inherited from the grade component the assessment belongs to.
    pub weight: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A student's score records within one [`SubjectScope`], in assessment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScoreSet {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub scores: Vec<ScoreRecord>,
}

/// Body of a score update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePatch {
    pub score: f64,
    pub is_absent: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Grade component part of an assessment creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeComponentSpec {
    pub name: String,
    pub weight: f64,
}

/// Assessment part of an assessment creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSpec {
    pub name: String,
    pub max_score: f64,
}

/// Request to create an assessment (and its grade component) in a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssessment {
    pub class_id: String,
    pub subject_id: String,
    pub term_id: String,
    pub grade_component: GradeComponentSpec,
    pub assessment: AssessmentSpec,
    /// Create an empty (absent) score for every student in the class.
    #[serde(default)]
    pub initialize_scores: bool,
}

impl NewAssessment {
    pub fn scope(&self) -> SubjectScope {
        SubjectScope::new(&self.class_id, &self.subject_id, &self.term_id)
    }
}

/// Identifiers returned after creating an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAssessment {
    pub grade_component_id: String,
    pub assessment_id: String,
}

/// A student's position in a class/term ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub student_id: String,
    pub average: f64,
    pub rank: u32,
}

/// Per-subject averages of one student in one term.
///
/// `None` marks a subject with no graded scores yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub student_id: String,
    pub term_id: String,
    pub averages: BTreeMap<String, Option<f64>>,
}

impl Transcript {
    /// Mean of the subjects that have data, or `None` if none do.
    pub fn overall(&self) -> Option<f64> {
        let graded: Vec<f64> = self.averages.values().filter_map(|v| *v).collect();
        if graded.is_empty() {
            None
        } else {
            Some(graded.iter().sum::<f64>() / graded.len() as f64)
        }
    }
}

/// Severity of a behavior note, most positive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorLevel {
    Excellent,
    Good,
    Normal,
    Warning,
    Serious,
}

impl BehaviorLevel {
    pub const ALL: [BehaviorLevel; 5] = [
        BehaviorLevel::Excellent,
        BehaviorLevel::Good,
        BehaviorLevel::Normal,
        BehaviorLevel::Warning,
        BehaviorLevel::Serious,
    ];

    /// Everything except the two neutral middle levels.
    pub fn is_significant(self) -> bool {
        !matches!(self, BehaviorLevel::Good | BehaviorLevel::Normal)
    }

    pub fn is_concerning(self) -> bool {
        matches!(self, BehaviorLevel::Warning | BehaviorLevel::Serious)
    }
}

impl fmt::Display for BehaviorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviorLevel::Excellent => write!(f, "excellent"),
            BehaviorLevel::Good => write!(f, "good"),
            BehaviorLevel::Normal => write!(f, "normal"),
            BehaviorLevel::Warning => write!(f, "warning"),
            BehaviorLevel::Serious => write!(f, "serious"),
        }
    }
}

impl FromStr for BehaviorLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excellent" => Ok(BehaviorLevel::Excellent),
            "good" => Ok(BehaviorLevel::Good),
            "normal" | "neutral" => Ok(BehaviorLevel::Normal),
            "warning" => Ok(BehaviorLevel::Warning),
            "serious" => Ok(BehaviorLevel::Serious),
            other => Err(format!("unknown behavior level: {other}")),
        }
    }
}

/// A teacher's note about a student's conduct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorNote {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub level: BehaviorLevel,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBehaviorNote {
    pub student_id: String,
    pub class_id: String,
    pub level: BehaviorLevel,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorNotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<BehaviorLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Which notes a behavior query returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BehaviorFilter {
    Student(String),
    Class(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_record_uses_camel_case_on_the_wire() {
        let json = serde_json::json!({
            "id": "sc-1",
            "assessmentId": "as-1",
            "studentId": "st-1",
            "score": 8.5,
            "maxScore": 10.0,
            "isAbsent": false,
            "weight": 2.0
        });
        let record: ScoreRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.assessment_id, "as-1");
        assert!(record.comment.is_none());

        let back = serde_json::to_value(&record).unwrap();
        assert!(back.get("maxScore").is_some());
    }

    #[test]
    fn behavior_level_parse_and_significance() {
        assert_eq!(
            "Serious".parse::<BehaviorLevel>().unwrap(),
            BehaviorLevel::Serious
        );
        assert_eq!(
            "neutral".parse::<BehaviorLevel>().unwrap(),
            BehaviorLevel::Normal
        );
        assert!("rowdy".parse::<BehaviorLevel>().is_err());

        let significant: Vec<_> = BehaviorLevel::ALL
            .into_iter()
            .filter(|l| l.is_significant())
            .collect();
        assert_eq!(
            significant,
            vec![
                BehaviorLevel::Excellent,
                BehaviorLevel::Warning,
                BehaviorLevel::Serious
            ]
        );
    }

    #[test]
    fn transcript_overall_skips_missing_subjects() {
        let mut averages = BTreeMap::new();
        averages.insert("math".to_string(), Some(8.0));
        averages.insert("lit".to_string(), None);
        averages.insert("bio".to_string(), Some(6.0));
        let t = Transcript {
            student_id: "st-1".into(),
            term_id: "t1".into(),
            averages,
        };
        assert_eq!(t.overall(), Some(7.0));

        let empty = Transcript {
            student_id: "st-2".into(),
            term_id: "t1".into(),
            averages: BTreeMap::new(),
        };
        assert_eq!(empty.overall(), None);
    }
}
