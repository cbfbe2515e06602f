//! TOML school fixtures.
//!
//! A fixture describes a small school (classes, students, assessments,
//! scores and behavior notes) for the in-memory record store, demos and
//! tests. Loads from files and directories, and validates them.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{BehaviorLevel, BehaviorNote, ScoreRecord, StudentScoreSet, SubjectScope};

/// Intermediate TOML structure for fixture files.
#[derive(Debug, Deserialize)]
struct TomlFixtureFile {
    #[serde(default)]
    school: Option<TomlSchool>,
    #[serde(default)]
    classes: Vec<TomlNamed>,
    #[serde(default)]
    subjects: Vec<TomlNamed>,
    #[serde(default)]
    terms: Vec<TomlNamed>,
    #[serde(default)]
    students: Vec<TomlStudent>,
    #[serde(default)]
    assessments: Vec<TomlAssessment>,
    #[serde(default)]
    scores: Vec<TomlScore>,
    #[serde(default)]
    behavior_notes: Vec<TomlBehaviorNote>,
}

#[derive(Debug, Deserialize)]
struct TomlSchool {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlNamed {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlStudent {
    id: String,
    name: String,
    class_id: String,
}

#[derive(Debug, Deserialize)]
struct TomlAssessment {
    id: String,
    class_id: String,
    subject_id: String,
    term_id: String,
    name: String,
    grade_component: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default = "default_max_score")]
    max_score: f64,
}

fn default_weight() -> f64 {
    1.0
}

fn default_max_score() -> f64 {
    10.0
}

#[derive(Debug, Deserialize)]
struct TomlScore {
    #[serde(default)]
    id: Option<String>,
    assessment_id: String,
    student_id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    absent: bool,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlBehaviorNote {
    id: String,
    student_id: String,
    #[serde(default)]
    class_id: Option<String>,
    level: String,
    #[serde(default)]
    content: String,
    created_at: String,
}

/// A class, subject or term with a display name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureStudent {
    pub id: String,
    pub name: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureAssessment {
    pub id: String,
    pub class_id: String,
    pub subject_id: String,
    pub term_id: String,
    pub name: String,
    pub grade_component: String,
    pub weight: f64,
    pub max_score: f64,
}

impl FixtureAssessment {
    pub fn scope(&self) -> SubjectScope {
        SubjectScope::new(&self.class_id, &self.subject_id, &self.term_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureScore {
    pub id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub score: f64,
    pub absent: bool,
    pub comment: Option<String>,
}

/// A parsed school fixture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fixture {
    pub school_name: String,
    pub classes: Vec<NamedEntity>,
    pub subjects: Vec<NamedEntity>,
    pub terms: Vec<NamedEntity>,
    pub students: Vec<FixtureStudent>,
    pub assessments: Vec<FixtureAssessment>,
    pub scores: Vec<FixtureScore>,
    pub behavior_notes: Vec<BehaviorNote>,
}

impl Fixture {
    pub fn student(&self, id: &str) -> Option<&FixtureStudent> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn assessment(&self, id: &str) -> Option<&FixtureAssessment> {
        self.assessments.iter().find(|a| a.id == id)
    }

    pub fn students_in<'a>(&'a self, class_id: &'a str) -> impl Iterator<Item = &'a FixtureStudent> {
        self.students.iter().filter(move |s| s.class_id == class_id)
    }

    /// Distinct subjects that have at least one assessment for this class
    /// and term, in first-seen order.
    pub fn subjects_for(&self, class_id: &str, term_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.assessments
            .iter()
            .filter(|a| a.class_id == class_id && a.term_id == term_id)
            .filter(|a| seen.insert(a.subject_id.clone()))
            .map(|a| a.subject_id.clone())
            .collect()
    }

    /// Score sets for every student of the scope's class, in roster order.
    /// Each set lists the student's records in assessment order.
    pub fn score_sets(&self, scope: &SubjectScope) -> Vec<StudentScoreSet> {
        let assessments: Vec<&FixtureAssessment> = self
            .assessments
            .iter()
            .filter(|a| a.scope() == *scope)
            .collect();

        self.students_in(&scope.class_id)
            .map(|student| {
                let scores = assessments
                    .iter()
                    .flat_map(|a| {
                        self.scores
                            .iter()
                            .filter(move |s| s.assessment_id == a.id && s.student_id == student.id)
                            .map(move |s| ScoreRecord {
                                id: s.id.clone(),
                                assessment_id: a.id.clone(),
                                student_id: student.id.clone(),
                                score: s.score,
                                max_score: a.max_score,
                                is_absent: s.absent,
                                weight: a.weight,
                                comment: s.comment.clone(),
                            })
                    })
                    .collect();
                StudentScoreSet {
                    student_id: student.id.clone(),
                    student_name: student.name.clone(),
                    scores,
                }
            })
            .collect()
    }

    /// Combine several fixtures into one. Later fixtures append to earlier
    /// ones; the first non-empty school name wins.
    pub fn merge(fixtures: impl IntoIterator<Item = Fixture>) -> Fixture {
        let mut merged = Fixture::default();
        for f in fixtures {
            if merged.school_name.is_empty() {
                merged.school_name = f.school_name;
            }
            merged.classes.extend(f.classes);
            merged.subjects.extend(f.subjects);
            merged.terms.extend(f.terms);
            merged.students.extend(f.students);
            merged.assessments.extend(f.assessments);
            merged.scores.extend(f.scores);
            merged.behavior_notes.extend(f.behavior_notes);
        }
        merged
    }
}

/// Parse a single fixture file.
pub fn load_fixture(path: &Path) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture file: {}", path.display()))?;

    parse_fixture_str(&content, path)
}

/// Parse fixture TOML (useful for testing).
pub fn parse_fixture_str(content: &str, source_path: &Path) -> Result<Fixture> {
    let parsed: TomlFixtureFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let named = |items: Vec<TomlNamed>| -> Vec<NamedEntity> {
        items
            .into_iter()
            .map(|n| NamedEntity {
                name: n.name.unwrap_or_else(|| n.id.clone()),
                id: n.id,
            })
            .collect()
    };

    let students: Vec<FixtureStudent> = parsed
        .students
        .into_iter()
        .map(|s| FixtureStudent {
            id: s.id,
            name: s.name,
            class_id: s.class_id,
        })
        .collect();

    let behavior_notes = parsed
        .behavior_notes
        .into_iter()
        .map(|n| {
            let level: BehaviorLevel = n
                .level
                .parse()
                .map_err(|e: String| anyhow::anyhow!("behavior note {}: {}", n.id, e))?;
            let created_at: DateTime<Utc> = n
                .created_at
                .parse()
                .with_context(|| format!("behavior note {}: invalid created_at", n.id))?;
            let class_id = match n.class_id {
                Some(c) => c,
                None => students
                    .iter()
                    .find(|s| s.id == n.student_id)
                    .map(|s| s.class_id.clone())
                    .with_context(|| {
                        format!("behavior note {}: no class_id and unknown student", n.id)
                    })?,
            };
            Ok(BehaviorNote {
                id: n.id,
                student_id: n.student_id,
                class_id,
                level,
                content: n.content,
                created_at,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Fixture {
        school_name: parsed.school.map(|s| s.name).unwrap_or_default(),
        classes: named(parsed.classes),
        subjects: named(parsed.subjects),
        terms: named(parsed.terms),
        students,
        assessments: parsed
            .assessments
            .into_iter()
            .map(|a| FixtureAssessment {
                id: a.id,
                class_id: a.class_id,
                subject_id: a.subject_id,
                term_id: a.term_id,
                name: a.name,
                grade_component: a.grade_component,
                weight: a.weight,
                max_score: a.max_score,
            })
            .collect(),
        scores: parsed
            .scores
            .into_iter()
            .map(|s| FixtureScore {
                id: s
                    .id
                    .unwrap_or_else(|| format!("{}:{}", s.assessment_id, s.student_id)),
                assessment_id: s.assessment_id,
                student_id: s.student_id,
                score: s.score,
                absent: s.absent,
                comment: s.comment,
            })
            .collect(),
        behavior_notes,
    })
}

/// Recursively load all `.toml` fixtures from a directory.
pub fn load_fixture_directory(dir: &Path) -> Result<Vec<Fixture>> {
    let mut fixtures = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            fixtures.extend(load_fixture_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match load_fixture(&path) {
                Ok(fixture) => fixtures.push(fixture),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(fixtures)
}

/// Load a fixture file, or merge every fixture under a directory.
pub fn load_fixture_path(path: &Path) -> Result<Fixture> {
    if path.is_dir() {
        Ok(Fixture::merge(load_fixture_directory(path)?))
    } else {
        load_fixture(path)
    }
}

/// A warning from fixture validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// What the warning is about, e.g. `score sc-1`.
    pub subject: String,
    pub message: String,
}

fn warn(warnings: &mut Vec<ValidationWarning>, subject: String, message: String) {
    warnings.push(ValidationWarning { subject, message });
}

fn duplicates<'a>(kind: &str, ids: impl Iterator<Item = &'a str>, out: &mut Vec<ValidationWarning>) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            warn(out, format!("{kind} {id}"), format!("duplicate {kind} ID: {id}"));
        }
    }
}

/// Validate a fixture for common issues.
pub fn validate_fixture(fixture: &Fixture) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    duplicates("class", fixture.classes.iter().map(|c| c.id.as_str()), &mut warnings);
    duplicates("student", fixture.students.iter().map(|s| s.id.as_str()), &mut warnings);
    duplicates(
        "assessment",
        fixture.assessments.iter().map(|a| a.id.as_str()),
        &mut warnings,
    );
    duplicates("score", fixture.scores.iter().map(|s| s.id.as_str()), &mut warnings);
    duplicates(
        "behavior note",
        fixture.behavior_notes.iter().map(|n| n.id.as_str()),
        &mut warnings,
    );

    let classes: HashSet<&str> = fixture.classes.iter().map(|c| c.id.as_str()).collect();
    let subjects: HashSet<&str> = fixture.subjects.iter().map(|s| s.id.as_str()).collect();
    let terms: HashSet<&str> = fixture.terms.iter().map(|t| t.id.as_str()).collect();

    // Declared lists are optional; only check references against them when present.
    let dangling = |declared: &HashSet<&str>, id: &str| !declared.is_empty() && !declared.contains(id);

    for student in &fixture.students {
        if dangling(&classes, &student.class_id) {
            warn(
                &mut warnings,
                format!("student {}", student.id),
                format!("unknown class: {}", student.class_id),
            );
        }
    }

    for a in &fixture.assessments {
        let subject = format!("assessment {}", a.id);
        if dangling(&classes, &a.class_id) {
            warn(&mut warnings, subject.clone(), format!("unknown class: {}", a.class_id));
        }
        if dangling(&subjects, &a.subject_id) {
            warn(&mut warnings, subject.clone(), format!("unknown subject: {}", a.subject_id));
        }
        if dangling(&terms, &a.term_id) {
            warn(&mut warnings, subject.clone(), format!("unknown term: {}", a.term_id));
        }
        if a.weight < 0.0 || !a.weight.is_finite() {
            warn(&mut warnings, subject.clone(), format!("invalid weight: {}", a.weight));
        }
        if a.max_score <= 0.0 || !a.max_score.is_finite() {
            warn(&mut warnings, subject, format!("max score must be positive: {}", a.max_score));
        }
    }

    let assessments: HashMap<&str, &FixtureAssessment> = fixture
        .assessments
        .iter()
        .map(|a| (a.id.as_str(), a))
        .collect();
    let mut pairs = HashSet::new();

    for score in &fixture.scores {
        let subject = format!("score {}", score.id);
        let student = fixture.student(&score.student_id);
        if student.is_none() {
            warn(&mut warnings, subject.clone(), format!("unknown student: {}", score.student_id));
        }
        let Some(assessment) = assessments.get(score.assessment_id.as_str()) else {
            warn(
                &mut warnings,
                subject,
                format!("unknown assessment: {}", score.assessment_id),
            );
            continue;
        };
        if let Some(student) = student {
            if student.class_id != assessment.class_id {
                warn(
                    &mut warnings,
                    subject.clone(),
                    format!(
                        "student {} is in class {}, assessment {} belongs to {}",
                        student.id, student.class_id, assessment.id, assessment.class_id
                    ),
                );
            }
        }
        if !score.absent && (score.score < 0.0 || score.score > assessment.max_score) {
            warn(
                &mut warnings,
                subject.clone(),
                format!("score {} outside [0, {}]", score.score, assessment.max_score),
            );
        }
        if !pairs.insert((score.assessment_id.as_str(), score.student_id.as_str())) {
            warn(
                &mut warnings,
                subject,
                format!(
                    "student {} has more than one score for assessment {}",
                    score.student_id, score.assessment_id
                ),
            );
        }
    }

    for note in &fixture.behavior_notes {
        if fixture.student(&note.student_id).is_none() {
            warn(
                &mut warnings,
                format!("behavior note {}", note.id),
                format!("unknown student: {}", note.student_id),
            );
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[school]
name = "Riverside High"

[[classes]]
id = "10A"

[[subjects]]
id = "math"
name = "Mathematics"

[[terms]]
id = "t1"

[[students]]
id = "an"
name = "An Nguyen"
class_id = "10A"

[[students]]
id = "binh"
name = "Binh Tran"
class_id = "10A"

[[assessments]]
id = "quiz1"
class_id = "10A"
subject_id = "math"
term_id = "t1"
name = "Quiz 1"
grade_component = "Quizzes"

[[assessments]]
id = "final"
class_id = "10A"
subject_id = "math"
term_id = "t1"
name = "Final exam"
grade_component = "Exams"
weight = 3.0

[[scores]]
assessment_id = "quiz1"
student_id = "an"
score = 8.0

[[scores]]
assessment_id = "final"
student_id = "an"
score = 9.0

[[scores]]
assessment_id = "quiz1"
student_id = "binh"
absent = true

[[behavior_notes]]
id = "n1"
student_id = "binh"
level = "warning"
content = "Late three times"
created_at = "2024-09-12T08:00:00Z"
"#;

    fn parse(toml: &str) -> Fixture {
        parse_fixture_str(toml, &PathBuf::from("test.toml")).unwrap()
    }

    #[test]
    fn parse_valid_fixture() {
        let f = parse(VALID_TOML);
        assert_eq!(f.school_name, "Riverside High");
        assert_eq!(f.subjects[0].name, "Mathematics");
        assert_eq!(f.terms[0].name, "t1");
        assert_eq!(f.assessments[0].weight, 1.0);
        assert_eq!(f.assessments[0].max_score, 10.0);
        assert_eq!(f.scores[0].id, "quiz1:an");
        assert_eq!(f.behavior_notes[0].class_id, "10A");
        assert_eq!(f.behavior_notes[0].level, BehaviorLevel::Warning);
        assert!(validate_fixture(&f).is_empty());
    }

    #[test]
    fn score_sets_follow_roster_and_assessment_order() {
        let f = parse(VALID_TOML);
        let sets = f.score_sets(&SubjectScope::new("10A", "math", "t1"));
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].student_name, "An Nguyen");
        let weights: Vec<f64> = sets[0].scores.iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![1.0, 3.0]);
        assert!(sets[1].scores[0].is_absent);

        assert!(f
            .score_sets(&SubjectScope::new("10A", "math", "t2"))
            .iter()
            .all(|s| s.scores.is_empty()));
        assert_eq!(f.subjects_for("10A", "t1"), vec!["math".to_string()]);
    }

    #[test]
    fn validate_reports_broken_references_and_ranges() {
        let toml = r#"
[[classes]]
id = "10A"

[[students]]
id = "an"
name = "An"
class_id = "10B"

[[students]]
id = "an"
name = "An again"
class_id = "10A"

[[assessments]]
id = "quiz1"
class_id = "10A"
subject_id = "math"
term_id = "t1"
name = "Quiz"
grade_component = "Quizzes"
weight = -2.0

[[scores]]
assessment_id = "quiz1"
student_id = "an"
score = 12.5

[[scores]]
assessment_id = "missing"
student_id = "ghost"
score = 1.0
"#;
        let warnings = validate_fixture(&parse(toml));
        let has = |needle: &str| warnings.iter().any(|w| w.message.contains(needle));
        assert!(has("duplicate student ID"));
        assert!(has("unknown class: 10B"));
        assert!(has("invalid weight"));
        assert!(has("outside [0, 10]"));
        assert!(has("unknown assessment: missing"));
        assert!(has("unknown student: ghost"));
    }

    #[test]
    fn bad_behavior_level_is_an_error() {
        let toml = r#"
[[students]]
id = "an"
name = "An"
class_id = "10A"

[[behavior_notes]]
id = "n1"
student_id = "an"
level = "rowdy"
created_at = "2024-09-12T08:00:00Z"
"#;
        let err = parse_fixture_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("unknown behavior level"));
    }

    #[test]
    fn parse_malformed_toml() {
        let result = parse_fixture_str("this is not [valid toml }{", &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.toml"), VALID_TOML).unwrap();
        std::fs::write(
            dir.path().join("b.toml"),
            "[[students]]\nid = \"chi\"\nname = \"Chi\"\nclass_id = \"10A\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let fixtures = load_fixture_directory(dir.path()).unwrap();
        assert_eq!(fixtures.len(), 2);

        let merged = load_fixture_path(dir.path()).unwrap();
        assert_eq!(merged.school_name, "Riverside High");
        assert_eq!(merged.students_in("10A").count(), 3);
    }
}
