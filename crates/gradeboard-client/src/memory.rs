//! Fixture-backed record store for offline use and testing.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use gradeboard_core::average::weighted_average;
use gradeboard_core::error::StoreError;
use gradeboard_core::fixture::{load_fixture_path, Fixture, FixtureAssessment, FixtureScore};
use gradeboard_core::model::{
    BehaviorFilter, BehaviorNote, BehaviorNotePatch, CreatedAssessment, NewAssessment,
    NewBehaviorNote, RankingEntry, ScorePatch, ScoreRecord, StudentScoreSet, SubjectScope,
    Transcript,
};
use gradeboard_core::ranking::{rank_students, RankingMode};
use gradeboard_core::traits::RecordStore;

/// One method of the [`RecordStore`] surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    FetchScores,
    UpdateScore,
    CreateAssessment,
    FetchRanking,
    FetchTranscript,
    FetchBehavior,
    CreateBehavior,
    UpdateBehavior,
    DeleteBehavior,
}

/// A [`RecordStore`] that answers from an in-memory [`Fixture`].
///
/// Writes mutate the fixture, so later reads see them the way they would
/// against the real server. Tests can count calls per endpoint, queue
/// failures and add latency.
pub struct InMemoryStore {
    fixture: Mutex<Fixture>,
    calls: Mutex<HashMap<Endpoint, u32>>,
    failures: Mutex<HashMap<Endpoint, VecDeque<StoreError>>>,
    latency: Mutex<Duration>,
    next_id: AtomicU32,
}

impl InMemoryStore {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture: Mutex::new(fixture),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
            next_id: AtomicU32::new(1),
        }
    }

    /// Load a fixture file or directory.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(load_fixture_path(path)?))
    }

    /// Number of calls made to `endpoint`, including failed ones.
    pub fn calls(&self, endpoint: Endpoint) -> u32 {
        lock(&self.calls).get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        lock(&self.calls).values().sum()
    }

    /// Make the next call to `endpoint` fail with `error`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, endpoint: Endpoint, error: StoreError) {
        lock(&self.failures)
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// A copy of the current records.
    pub fn fixture(&self) -> Fixture {
        lock(&self.fixture).clone()
    }

    async fn enter(&self, endpoint: Endpoint) -> Result<(), StoreError> {
        *lock(&self.calls).entry(endpoint).or_insert(0) += 1;

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let injected = lock(&self.failures)
            .get_mut(&endpoint)
            .and_then(|queue| queue.pop_front());
        match injected {
            Some(error) => {
                tracing::debug!(?endpoint, %error, "injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn unprocessable(message: impl Into<String>) -> StoreError {
    StoreError::Rejected {
        status: 422,
        message: message.into(),
    }
}

/// Mean of the student's subject averages over the subjects with data.
fn term_averages(fixture: &Fixture, class_id: &str, term_id: &str) -> Vec<(String, f64)> {
    let per_subject: Vec<Vec<StudentScoreSet>> = fixture
        .subjects_for(class_id, term_id)
        .into_iter()
        .map(|subject| fixture.score_sets(&SubjectScope::new(class_id, subject, term_id)))
        .collect();

    fixture
        .students_in(class_id)
        .filter_map(|student| {
            let graded: Vec<f64> = per_subject
                .iter()
                .filter_map(|sets| sets.iter().find(|s| s.student_id == student.id))
                .filter_map(|set| weighted_average(&set.scores).value())
                .collect();
            if graded.is_empty() {
                None
            } else {
                let mean = graded.iter().sum::<f64>() / graded.len() as f64;
                Some((student.id.clone(), mean))
            }
        })
        .collect()
}

fn score_record(score: &FixtureScore, assessment: &FixtureAssessment) -> ScoreRecord {
    ScoreRecord {
        id: score.id.clone(),
        assessment_id: assessment.id.clone(),
        student_id: score.student_id.clone(),
        score: score.score,
        max_score: assessment.max_score,
        is_absent: score.absent,
        weight: assessment.weight,
        comment: score.comment.clone(),
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_scores(&self, scope: &SubjectScope) -> Result<Vec<StudentScoreSet>, StoreError> {
        self.enter(Endpoint::FetchScores).await?;
        Ok(lock(&self.fixture).score_sets(scope))
    }

    async fn update_score(
        &self,
        score_id: &str,
        patch: &ScorePatch,
    ) -> Result<ScoreRecord, StoreError> {
        self.enter(Endpoint::UpdateScore).await?;
        let mut fixture = lock(&self.fixture);

        let index = fixture
            .scores
            .iter()
            .position(|s| s.id == score_id)
            .ok_or_else(|| StoreError::NotFound(format!("score {score_id}")))?;
        let assessment = fixture
            .assessment(&fixture.scores[index].assessment_id)
            .cloned()
            .ok_or_else(|| unprocessable(format!("score {score_id} has no assessment")))?;

        if !patch.score.is_finite() || patch.score < 0.0 || patch.score > assessment.max_score {
            return Err(unprocessable(format!(
                "score {} is outside [0, {}]",
                patch.score, assessment.max_score
            )));
        }

        let score = &mut fixture.scores[index];
        score.score = patch.score;
        score.absent = patch.is_absent;
        score.comment = patch.comment.clone();
        Ok(score_record(score, &assessment))
    }

    async fn create_assessment(
        &self,
        request: &NewAssessment,
    ) -> Result<CreatedAssessment, StoreError> {
        self.enter(Endpoint::CreateAssessment).await?;

        let weight = request.grade_component.weight;
        let max_score = request.assessment.max_score;
        if !weight.is_finite() || weight < 0.0 {
            return Err(unprocessable(format!("invalid weight {weight}")));
        }
        if !max_score.is_finite() || max_score <= 0.0 {
            return Err(unprocessable(format!("invalid max score {max_score}")));
        }
        if request.assessment.name.trim().is_empty() {
            return Err(unprocessable("assessment name is required"));
        }

        let created = CreatedAssessment {
            grade_component_id: self.next_id("gc"),
            assessment_id: self.next_id("as"),
        };

        let mut fixture = lock(&self.fixture);
        fixture.assessments.push(FixtureAssessment {
            id: created.assessment_id.clone(),
            class_id: request.class_id.clone(),
            subject_id: request.subject_id.clone(),
            term_id: request.term_id.clone(),
            name: request.assessment.name.clone(),
            grade_component: request.grade_component.name.clone(),
            weight,
            max_score,
        });

        if request.initialize_scores {
            let blank: Vec<FixtureScore> = fixture
                .students_in(&request.class_id)
                .map(|student| FixtureScore {
                    id: format!("{}:{}", created.assessment_id, student.id),
                    assessment_id: created.assessment_id.clone(),
                    student_id: student.id.clone(),
                    score: 0.0,
                    absent: true,
                    comment: None,
                })
                .collect();
            fixture.scores.extend(blank);
        }

        Ok(created)
    }

    async fn fetch_class_ranking(
        &self,
        class_id: &str,
        term_id: &str,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        self.enter(Endpoint::FetchRanking).await?;
        let fixture = lock(&self.fixture);
        let averages = term_averages(&fixture, class_id, term_id);
        Ok(rank_students(averages, RankingMode::Competition).entries)
    }

    async fn fetch_student_transcript(
        &self,
        student_id: &str,
        term_id: &str,
    ) -> Result<Transcript, StoreError> {
        self.enter(Endpoint::FetchTranscript).await?;
        let fixture = lock(&self.fixture);

        let class_id = fixture
            .student(student_id)
            .map(|s| s.class_id.clone())
            .ok_or_else(|| StoreError::NotFound(format!("student {student_id}")))?;

        let averages = fixture
            .subjects_for(&class_id, term_id)
            .into_iter()
            .map(|subject| {
                let scope = SubjectScope::new(&class_id, &subject, term_id);
                let average = fixture
                    .score_sets(&scope)
                    .iter()
                    .find(|s| s.student_id == student_id)
                    .and_then(|set| weighted_average(&set.scores).value());
                (subject, average)
            })
            .collect();

        Ok(Transcript {
            student_id: student_id.to_string(),
            term_id: term_id.to_string(),
            averages,
        })
    }

    async fn fetch_behavior_notes(
        &self,
        filter: &BehaviorFilter,
    ) -> Result<Vec<BehaviorNote>, StoreError> {
        self.enter(Endpoint::FetchBehavior).await?;
        let fixture = lock(&self.fixture);
        Ok(fixture
            .behavior_notes
            .iter()
            .filter(|n| match filter {
                BehaviorFilter::Student(id) => n.student_id == *id,
                BehaviorFilter::Class(id) => n.class_id == *id,
            })
            .cloned()
            .collect())
    }

    async fn create_behavior_note(
        &self,
        note: &NewBehaviorNote,
    ) -> Result<BehaviorNote, StoreError> {
        self.enter(Endpoint::CreateBehavior).await?;
        if note.content.trim().is_empty() {
            return Err(unprocessable("note content is required"));
        }

        let mut fixture = lock(&self.fixture);
        if fixture.student(&note.student_id).is_none() {
            return Err(unprocessable(format!("unknown student {}", note.student_id)));
        }

        let created = BehaviorNote {
            id: self.next_id("bn"),
            student_id: note.student_id.clone(),
            class_id: note.class_id.clone(),
            level: note.level,
            content: note.content.clone(),
            created_at: Utc::now(),
        };
        fixture.behavior_notes.push(created.clone());
        Ok(created)
    }

    async fn update_behavior_note(
        &self,
        note_id: &str,
        patch: &BehaviorNotePatch,
    ) -> Result<BehaviorNote, StoreError> {
        self.enter(Endpoint::UpdateBehavior).await?;
        let mut fixture = lock(&self.fixture);

        let note = fixture
            .behavior_notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| StoreError::NotFound(format!("behavior note {note_id}")))?;
        if let Some(level) = patch.level {
            note.level = level;
        }
        if let Some(content) = &patch.content {
            note.content = content.clone();
        }
        Ok(note.clone())
    }

    async fn delete_behavior_note(&self, note_id: &str) -> Result<(), StoreError> {
        self.enter(Endpoint::DeleteBehavior).await?;
        let mut fixture = lock(&self.fixture);

        let before = fixture.behavior_notes.len();
        fixture.behavior_notes.retain(|n| n.id != note_id);
        if fixture.behavior_notes.len() == before {
            return Err(StoreError::NotFound(format!("behavior note {note_id}")));
        }
        Ok(())
    }
}
