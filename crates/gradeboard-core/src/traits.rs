//! Core trait definitions for the record store and the clock.
//!
//! `RecordStore` is implemented by the `gradeboard-client` crate (HTTP and
//! in-memory). `Clock` is injected into the coordinator so freshness can be
//! tested without sleeping.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    BehaviorFilter, BehaviorNote, BehaviorNotePatch, CreatedAssessment, NewAssessment,
    NewBehaviorNote, RankingEntry, ScorePatch, ScoreRecord, StudentScoreSet, SubjectScope,
    Transcript,
};

// ---------------------------------------------------------------------------
// Record store trait
// ---------------------------------------------------------------------------

/// Typed access to the remote score/behavior records.
///
/// Pure I/O boundary: implementations never aggregate. Every method is a
/// suspension point for the coordinator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Human-readable store name (e.g. "http", "memory").
    fn name(&self) -> &str;

    /// `GET scores(classId, subjectId, termId)`
    async fn fetch_scores(&self, scope: &SubjectScope) -> Result<Vec<StudentScoreSet>, StoreError>;

    /// `PUT score(id, {score, isAbsent, comment})`
    async fn update_score(
        &self,
        score_id: &str,
        patch: &ScorePatch,
    ) -> Result<ScoreRecord, StoreError>;

    /// `POST assessment(...)`
    async fn create_assessment(
        &self,
        request: &NewAssessment,
    ) -> Result<CreatedAssessment, StoreError>;

    /// `GET classRanking(classId, termId)`
    async fn fetch_class_ranking(
        &self,
        class_id: &str,
        term_id: &str,
    ) -> Result<Vec<RankingEntry>, StoreError>;

    /// `GET studentTranscript(studentId, termId)`
    async fn fetch_student_transcript(
        &self,
        student_id: &str,
        term_id: &str,
    ) -> Result<Transcript, StoreError>;

    async fn fetch_behavior_notes(
        &self,
        filter: &BehaviorFilter,
    ) -> Result<Vec<BehaviorNote>, StoreError>;

    async fn create_behavior_note(&self, note: &NewBehaviorNote)
        -> Result<BehaviorNote, StoreError>;

    async fn update_behavior_note(
        &self,
        note_id: &str,
        patch: &BehaviorNotePatch,
    ) -> Result<BehaviorNote, StoreError>;

    async fn delete_behavior_note(&self, note_id: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of monotonic time for freshness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}
