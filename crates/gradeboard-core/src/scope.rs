//! Typed cache keys, mutation fingerprints and the invalidation rule table.
//!
//! Which cached scopes a mutation invalidates is data: each
//! [`InvalidationRule`] names a mutation kind, a target scope kind and the
//! coordinates that must match exactly. A key is invalidated when any rule
//! for the mutation's kind targets the key's kind and every listed
//! coordinate is equal on both sides.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::SubjectScope;

/// A coordinate that scope keys and fingerprints may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coord {
    Class,
    Subject,
    Term,
    Student,
}

/// What a cached value summarizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScopeKey {
    ScoreSets(SubjectScope),
    ClassStatistics(SubjectScope),
    #[serde(rename_all = "camelCase")]
    ClassRanking { class_id: String, term_id: String },
    #[serde(rename_all = "camelCase")]
    StudentRank {
        student_id: String,
        class_id: String,
        term_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StudentTranscript {
        student_id: String,
        class_id: String,
        term_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StudentBehavior { student_id: String },
    #[serde(rename_all = "camelCase")]
    ClassBehavior { class_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    ScoreSets,
    ClassStatistics,
    ClassRanking,
    StudentRank,
    StudentTranscript,
    StudentBehavior,
    ClassBehavior,
}

impl ScopeKey {
    pub fn class_ranking(class_id: impl Into<String>, term_id: impl Into<String>) -> Self {
        ScopeKey::ClassRanking {
            class_id: class_id.into(),
            term_id: term_id.into(),
        }
    }

    pub fn student_rank(
        student_id: impl Into<String>,
        class_id: impl Into<String>,
        term_id: impl Into<String>,
    ) -> Self {
        ScopeKey::StudentRank {
            student_id: student_id.into(),
            class_id: class_id.into(),
            term_id: term_id.into(),
        }
    }

    pub fn student_transcript(
        student_id: impl Into<String>,
        class_id: impl Into<String>,
        term_id: impl Into<String>,
    ) -> Self {
        ScopeKey::StudentTranscript {
            student_id: student_id.into(),
            class_id: class_id.into(),
            term_id: term_id.into(),
        }
    }

    pub fn student_behavior(student_id: impl Into<String>) -> Self {
        ScopeKey::StudentBehavior {
            student_id: student_id.into(),
        }
    }

    pub fn class_behavior(class_id: impl Into<String>) -> Self {
        ScopeKey::ClassBehavior {
            class_id: class_id.into(),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeKey::ScoreSets(_) => ScopeKind::ScoreSets,
            ScopeKey::ClassStatistics(_) => ScopeKind::ClassStatistics,
            ScopeKey::ClassRanking { .. } => ScopeKind::ClassRanking,
            ScopeKey::StudentRank { .. } => ScopeKind::StudentRank,
            ScopeKey::StudentTranscript { .. } => ScopeKind::StudentTranscript,
            ScopeKey::StudentBehavior { .. } => ScopeKind::StudentBehavior,
            ScopeKey::ClassBehavior { .. } => ScopeKind::ClassBehavior,
        }
    }

    pub fn coord(&self, coord: Coord) -> Option<&str> {
        match (self, coord) {
            (ScopeKey::ScoreSets(s) | ScopeKey::ClassStatistics(s), Coord::Class) => {
                Some(&s.class_id)
            }
            (ScopeKey::ScoreSets(s) | ScopeKey::ClassStatistics(s), Coord::Subject) => {
                Some(&s.subject_id)
            }
            (ScopeKey::ScoreSets(s) | ScopeKey::ClassStatistics(s), Coord::Term) => {
                Some(&s.term_id)
            }
            (ScopeKey::ClassRanking { class_id, .. }, Coord::Class) => Some(class_id),
            (ScopeKey::ClassRanking { term_id, .. }, Coord::Term) => Some(term_id),
            (
                ScopeKey::StudentRank {
                    student_id,
                    class_id,
                    term_id,
                }
                | ScopeKey::StudentTranscript {
                    student_id,
                    class_id,
                    term_id,
                },
                c,
            ) => match c {
                Coord::Student => Some(student_id),
                Coord::Class => Some(class_id),
                Coord::Term => Some(term_id),
                Coord::Subject => None,
            },
            (ScopeKey::StudentBehavior { student_id }, Coord::Student) => Some(student_id),
            (ScopeKey::ClassBehavior { class_id }, Coord::Class) => Some(class_id),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::ScoreSets(s) => write!(f, "scores[{s}]"),
            ScopeKey::ClassStatistics(s) => write!(f, "statistics[{s}]"),
            ScopeKey::ClassRanking { class_id, term_id } => {
                write!(f, "ranking[{class_id}/{term_id}]")
            }
            ScopeKey::StudentRank {
                student_id,
                class_id,
                term_id,
            } => write!(f, "rank[{student_id}@{class_id}/{term_id}]"),
            ScopeKey::StudentTranscript {
                student_id,
                class_id,
                term_id,
            } => write!(f, "transcript[{student_id}@{class_id}/{term_id}]"),
            ScopeKey::StudentBehavior { student_id } => write!(f, "behavior[student {student_id}]"),
            ScopeKey::ClassBehavior { class_id } => write!(f, "behavior[class {class_id}]"),
        }
    }
}

/// Refresh policy attached to a cached view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Standard,
    /// Shorter freshness window; refetched eagerly after invalidation.
    Realtime,
}

/// Full cache key: a scope plus its refresh variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub scope: ScopeKey,
    pub variant: Variant,
}

impl CacheKey {
    pub fn standard(scope: ScopeKey) -> Self {
        Self {
            scope,
            variant: Variant::Standard,
        }
    }

    pub fn realtime(scope: ScopeKey) -> Self {
        Self {
            scope,
            variant: Variant::Realtime,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Variant::Standard => write!(f, "{}", self.scope),
            Variant::Realtime => write!(f, "{} (realtime)", self.scope),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Score,
    Assessment,
    Behavior,
}

/// The coordinates a successful mutation implicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mutation", rename_all = "camelCase")]
pub enum Fingerprint {
    #[serde(rename_all = "camelCase")]
    ScoreChanged {
        class_id: String,
        subject_id: String,
        term_id: String,
        student_id: String,
    },
    #[serde(rename_all = "camelCase")]
    AssessmentCreated {
        class_id: String,
        subject_id: String,
        term_id: String,
    },
    #[serde(rename_all = "camelCase")]
    BehaviorChanged { class_id: String, student_id: String },
}

impl Fingerprint {
    pub fn score_changed(scope: &SubjectScope, student_id: impl Into<String>) -> Self {
        Fingerprint::ScoreChanged {
            class_id: scope.class_id.clone(),
            subject_id: scope.subject_id.clone(),
            term_id: scope.term_id.clone(),
            student_id: student_id.into(),
        }
    }

    pub fn assessment_created(scope: &SubjectScope) -> Self {
        Fingerprint::AssessmentCreated {
            class_id: scope.class_id.clone(),
            subject_id: scope.subject_id.clone(),
            term_id: scope.term_id.clone(),
        }
    }

    pub fn behavior_changed(class_id: impl Into<String>, student_id: impl Into<String>) -> Self {
        Fingerprint::BehaviorChanged {
            class_id: class_id.into(),
            student_id: student_id.into(),
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Fingerprint::ScoreChanged { .. } => MutationKind::Score,
            Fingerprint::AssessmentCreated { .. } => MutationKind::Assessment,
            Fingerprint::BehaviorChanged { .. } => MutationKind::Behavior,
        }
    }

    pub fn coord(&self, coord: Coord) -> Option<&str> {
        match (self, coord) {
            (
                Fingerprint::ScoreChanged { class_id, .. }
                | Fingerprint::AssessmentCreated { class_id, .. }
                | Fingerprint::BehaviorChanged { class_id, .. },
                Coord::Class,
            ) => Some(class_id),
            (
                Fingerprint::ScoreChanged { subject_id, .. }
                | Fingerprint::AssessmentCreated { subject_id, .. },
                Coord::Subject,
            ) => Some(subject_id),
            (
                Fingerprint::ScoreChanged { term_id, .. }
                | Fingerprint::AssessmentCreated { term_id, .. },
                Coord::Term,
            ) => Some(term_id),
            (
                Fingerprint::ScoreChanged { student_id, .. }
                | Fingerprint::BehaviorChanged { student_id, .. },
                Coord::Student,
            ) => Some(student_id),
            _ => None,
        }
    }

    /// Whether a cached value under `scope` depends on this mutation.
    pub fn invalidates(&self, scope: &ScopeKey) -> bool {
        let kind = self.kind();
        let target = scope.kind();
        INVALIDATION_RULES
            .iter()
            .filter(|rule| rule.mutation == kind && rule.target == target)
            .any(|rule| rule.matches(self, scope))
    }
}

/// "A `mutation` invalidates every `target` scope whose `match_on`
/// coordinates equal the fingerprint's."
#[derive(Debug, Clone, Copy)]
pub struct InvalidationRule {
    pub mutation: MutationKind,
    pub target: ScopeKind,
    pub match_on: &'static [Coord],
}

impl InvalidationRule {
    fn matches(&self, fingerprint: &Fingerprint, scope: &ScopeKey) -> bool {
        self.match_on.iter().all(|&c| match (fingerprint.coord(c), scope.coord(c)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
    }
}

const CLASS_SUBJECT_TERM: &[Coord] = &[Coord::Class, Coord::Subject, Coord::Term];
const CLASS_TERM: &[Coord] = &[Coord::Class, Coord::Term];

pub const INVALIDATION_RULES: &[InvalidationRule] = &[
    // One score edit moves the student's subject average, which moves the
    // class statistics, the class ranking and therefore every rank in it.
    InvalidationRule {
        mutation: MutationKind::Score,
        target: ScopeKind::ScoreSets,
        match_on: CLASS_SUBJECT_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Score,
        target: ScopeKind::ClassStatistics,
        match_on: CLASS_SUBJECT_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Score,
        target: ScopeKind::ClassRanking,
        match_on: CLASS_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Score,
        target: ScopeKind::StudentRank,
        match_on: CLASS_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Score,
        target: ScopeKind::StudentTranscript,
        match_on: &[Coord::Student, Coord::Class, Coord::Term],
    },
    // A new assessment may seed scores for every student in the class.
    InvalidationRule {
        mutation: MutationKind::Assessment,
        target: ScopeKind::ScoreSets,
        match_on: CLASS_SUBJECT_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Assessment,
        target: ScopeKind::ClassStatistics,
        match_on: CLASS_SUBJECT_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Assessment,
        target: ScopeKind::ClassRanking,
        match_on: CLASS_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Assessment,
        target: ScopeKind::StudentRank,
        match_on: CLASS_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Assessment,
        target: ScopeKind::StudentTranscript,
        match_on: CLASS_TERM,
    },
    InvalidationRule {
        mutation: MutationKind::Behavior,
        target: ScopeKind::StudentBehavior,
        match_on: &[Coord::Student],
    },
    InvalidationRule {
        mutation: MutationKind::Behavior,
        target: ScopeKind::ClassBehavior,
        match_on: &[Coord::Class],
    },
];
