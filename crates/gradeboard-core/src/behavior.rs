//! Behavior note summaries and early-warning selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{BehaviorLevel, BehaviorNote};

/// Note counts per severity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub excellent: u32,
    pub good: u32,
    pub normal: u32,
    pub warning: u32,
    pub serious: u32,
}

impl BehaviorSummary {
    pub fn count(&self, level: BehaviorLevel) -> u32 {
        match level {
            BehaviorLevel::Excellent => self.excellent,
            BehaviorLevel::Good => self.good,
            BehaviorLevel::Normal => self.normal,
            BehaviorLevel::Warning => self.warning,
            BehaviorLevel::Serious => self.serious,
        }
    }

    pub fn record(&mut self, level: BehaviorLevel) {
        let slot = match level {
            BehaviorLevel::Excellent => &mut self.excellent,
            BehaviorLevel::Good => &mut self.good,
            BehaviorLevel::Normal => &mut self.normal,
            BehaviorLevel::Warning => &mut self.warning,
            BehaviorLevel::Serious => &mut self.serious,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u32 {
        BehaviorLevel::ALL.iter().map(|l| self.count(*l)).sum()
    }

    pub fn has_concerns(&self) -> bool {
        self.warning > 0 || self.serious > 0
    }
}

/// The most recent significant note, or an explicit "none".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "note", rename_all = "lowercase")]
pub enum LatestSignificant {
    #[default]
    None,
    Note(BehaviorNote),
}

impl LatestSignificant {
    pub fn note(&self) -> Option<&BehaviorNote> {
        match self {
            LatestSignificant::None => None,
            LatestSignificant::Note(n) => Some(n),
        }
    }
}

pub fn summarize<'a, I>(notes: I) -> BehaviorSummary
where
    I: IntoIterator<Item = &'a BehaviorNote>,
{
    let mut summary = BehaviorSummary::default();
    for note in notes {
        summary.record(note.level);
    }
    summary
}

/// Pick the newest note whose level is significant. Equal timestamps
/// resolve to the later note in input order.
pub fn latest_significant(notes: &[BehaviorNote]) -> LatestSignificant {
    let mut best: Option<&BehaviorNote> = None;
    for note in notes.iter().filter(|n| n.level.is_significant()) {
        if best.map_or(true, |b| note.created_at >= b.created_at) {
            best = Some(note);
        }
    }
    best.map_or(LatestSignificant::None, |n| LatestSignificant::Note(n.clone()))
}

/// Behavior view of a single student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBehavior {
    pub student_id: String,
    pub summary: BehaviorSummary,
    pub latest_significant: LatestSignificant,
    pub notes: Vec<BehaviorNote>,
}

impl StudentBehavior {
    pub fn from_notes(student_id: impl Into<String>, notes: Vec<BehaviorNote>) -> Self {
        Self {
            student_id: student_id.into(),
            summary: summarize(&notes),
            latest_significant: latest_significant(&notes),
            notes,
        }
    }
}

/// Behavior view of a whole class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassBehavior {
    pub class_id: String,
    pub summary: BehaviorSummary,
    pub per_student: BTreeMap<String, BehaviorSummary>,
    /// Students with at least one warning or serious note.
    pub early_warning: Vec<String>,
    pub latest_significant: LatestSignificant,
    pub notes: Vec<BehaviorNote>,
}

impl ClassBehavior {
    pub fn from_notes(class_id: impl Into<String>, notes: Vec<BehaviorNote>) -> Self {
        let mut per_student: BTreeMap<String, BehaviorSummary> = BTreeMap::new();
        for note in &notes {
            per_student
                .entry(note.student_id.clone())
                .or_default()
                .record(note.level);
        }
        let early_warning = per_student
            .iter()
            .filter(|(_, s)| s.has_concerns())
            .map(|(id, _)| id.clone())
            .collect();

        Self {
            class_id: class_id.into(),
            summary: summarize(&notes),
            per_student,
            early_warning,
            latest_significant: latest_significant(&notes),
            notes,
        }
    }
}
