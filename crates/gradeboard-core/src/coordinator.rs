//! The coordinator: cached reads, single-flight fetches, mutations with
//! optimistic updates, and rule-driven invalidation.
//!
//! All cache state lives behind one `std::sync::Mutex` that is never held
//! across an `.await`. Fetches are `Shared` futures parked in an in-flight
//! map so concurrent readers of one key attach to a single store call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use uuid::Uuid;

use crate::average::{student_rows, StudentAverageRow, DEFAULT_PASSING_THRESHOLD};
use crate::behavior::{ClassBehavior, StudentBehavior};
use crate::cache::{CacheTable, DerivedValue, EntrySnapshot, Lookup, SavedEntry};
use crate::error::{EngineError, StoreError, ValidationError};
use crate::model::{
    BehaviorFilter, BehaviorNote, BehaviorNotePatch, CreatedAssessment, NewAssessment,
    NewBehaviorNote, RankingEntry, ScorePatch, ScoreRecord, StudentScoreSet, SubjectScope,
    Transcript,
};
use crate::ranking::{Ranking, RankingMode};
use crate::scope::{CacheKey, Fingerprint, ScopeKey, Variant};
use crate::statistics::{compute_class_statistics, ClassStatistics};
use crate::traits::{Clock, RecordStore, SystemClock};

/// Upper bound for the exponential fetch backoff.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

const VARIANTS: [Variant; 2] = [Variant::Standard, Variant::Realtime];

type SharedFetch = Shared<BoxFuture<'static, Result<DerivedValue, EngineError>>>;

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a standard entry stays fresh.
    pub freshness: Duration,
    /// How long a realtime entry stays fresh.
    pub realtime_freshness: Duration,
    pub passing_threshold: f64,
    pub ranking_mode: RankingMode,
    /// Retries for transient read failures (0 = no retries).
    pub max_fetch_retries: u32,
    /// Initial backoff between read retries; doubled on each attempt.
    pub retry_delay: Duration,
    /// Refetch evicted realtime entries in the background.
    pub eager_realtime_refetch: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(300),
            realtime_freshness: Duration::from_secs(15),
            passing_threshold: DEFAULT_PASSING_THRESHOLD,
            ranking_mode: RankingMode::Dense,
            max_fetch_retries: 3,
            retry_delay: Duration::from_millis(500),
            eager_realtime_refetch: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn freshness_for(&self, variant: Variant) -> Duration {
        match variant {
            Variant::Standard => self.freshness,
            Variant::Realtime => self.realtime_freshness,
        }
    }
}

/// What a read does with a value past its freshness window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Never serve a stale value; wait for a refetch.
    #[default]
    FreshOnly,
    /// Serve the stale value now and refresh in the background.
    StaleWhileRevalidate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub variant: Variant,
    pub policy: ReadPolicy,
}

impl ReadOptions {
    pub fn realtime() -> Self {
        Self {
            variant: Variant::Realtime,
            ..Self::default()
        }
    }

    pub fn stale_while_revalidate(mut self) -> Self {
        self.policy = ReadPolicy::StaleWhileRevalidate;
        self
    }

    fn key(&self, scope: ScopeKey) -> CacheKey {
        CacheKey {
            scope,
            variant: self.variant,
        }
    }
}

macro_rules! expect_value {
    ($value:expr, $variant:path, $key:expr) => {
        match $value {
            $variant(inner) => Ok(inner),
            _ => Err(EngineError::UnexpectedValue {
                key: $key.to_string(),
            }),
        }
    };
}

struct InFlight {
    generation: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct State {
    table: CacheTable,
    inflight: HashMap<CacheKey, InFlight>,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared handle to the derived-data cache. Cloning is cheap; every clone
/// sees the same cache.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn RecordStore>, config: CoordinatorConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    /// Number of entries currently holding a value.
    pub fn cached_len(&self) -> usize {
        self.inner.lock().table.len()
    }

    /// Observable state of one entry.
    pub fn snapshot(&self, key: &CacheKey) -> EntrySnapshot {
        let state = self.inner.lock();
        state.table.snapshot(
            key,
            self.inner.clock.now(),
            self.inner.config.freshness_for(key.variant),
            state.inflight.contains_key(key),
        )
    }

    // -- reads --------------------------------------------------------------

    /// Read any cached scope.
    pub async fn read(&self, key: &CacheKey, policy: ReadPolicy) -> Result<DerivedValue, EngineError> {
        let fetch = {
            let mut state = self.inner.lock();
            let now = self.inner.clock.now();
            let freshness = self.inner.config.freshness_for(key.variant);
            match state.table.lookup(key, now, freshness) {
                Lookup::Fresh(value) => {
                    tracing::debug!(%key, "cache hit");
                    return Ok(value);
                }
                Lookup::Stale(value) if policy == ReadPolicy::StaleWhileRevalidate => {
                    tracing::debug!(%key, "serving stale value while revalidating");
                    let refresh = self.ensure_fetch(&mut state, key);
                    spawn_refresh(refresh);
                    return Ok(value);
                }
                _ => self.ensure_fetch(&mut state, key),
            }
        };
        fetch.await
    }

    pub async fn score_sets(
        &self,
        scope: &SubjectScope,
        options: ReadOptions,
    ) -> Result<Arc<Vec<StudentScoreSet>>, EngineError> {
        let key = options.key(ScopeKey::ScoreSets(scope.clone()));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::ScoreSets, key)
    }

    /// Per-student averages, letters and pass status for a subject.
    pub async fn subject_averages(
        &self,
        scope: &SubjectScope,
        options: ReadOptions,
    ) -> Result<Vec<StudentAverageRow>, EngineError> {
        let sets = self.score_sets(scope, options).await?;
        Ok(student_rows(&sets, self.inner.config.passing_threshold))
    }

    pub async fn class_statistics(
        &self,
        scope: &SubjectScope,
        options: ReadOptions,
    ) -> Result<ClassStatistics, EngineError> {
        let key = options.key(ScopeKey::ClassStatistics(scope.clone()));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::Statistics, key)
    }

    pub async fn class_ranking(
        &self,
        class_id: &str,
        term_id: &str,
        options: ReadOptions,
    ) -> Result<Arc<Ranking>, EngineError> {
        let key = options.key(ScopeKey::class_ranking(class_id, term_id));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::Ranking, key)
    }

    /// A student's ranking entry. `Ok(None)` means the student is not ranked.
    pub async fn student_rank(
        &self,
        student_id: &str,
        class_id: &str,
        term_id: &str,
        options: ReadOptions,
    ) -> Result<Option<RankingEntry>, EngineError> {
        let key = options.key(ScopeKey::student_rank(student_id, class_id, term_id));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::Rank, key)
    }

    pub async fn student_transcript(
        &self,
        student_id: &str,
        class_id: &str,
        term_id: &str,
        options: ReadOptions,
    ) -> Result<Arc<Transcript>, EngineError> {
        let key = options.key(ScopeKey::student_transcript(student_id, class_id, term_id));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::Transcript, key)
    }

    pub async fn student_behavior(
        &self,
        student_id: &str,
        options: ReadOptions,
    ) -> Result<Arc<StudentBehavior>, EngineError> {
        let key = options.key(ScopeKey::student_behavior(student_id));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::StudentBehavior, key)
    }

    pub async fn class_behavior(
        &self,
        class_id: &str,
        options: ReadOptions,
    ) -> Result<Arc<ClassBehavior>, EngineError> {
        let key = options.key(ScopeKey::class_behavior(class_id));
        expect_value!(self.read(&key, options.policy).await?, DerivedValue::ClassBehavior, key)
    }

    // -- fetching -----------------------------------------------------------

    /// Return the in-flight fetch for `key`, starting one if there is none.
    fn ensure_fetch(&self, state: &mut State, key: &CacheKey) -> SharedFetch {
        if let Some(inflight) = state.inflight.get(key) {
            tracing::debug!(%key, "joining in-flight fetch");
            return inflight.future.clone();
        }

        let generation = state.table.begin_fetch(key);
        tracing::debug!(%key, generation, "cache miss, fetching");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let owned_key = key.clone();
        let future = async move {
            let Some(inner) = weak.upgrade() else {
                return Err(EngineError::from(StoreError::Network(
                    "coordinator was dropped".into(),
                )));
            };
            let coordinator = Coordinator { inner };
            let result = coordinator.fetch_uncached(&owned_key).await;
            coordinator.finish_fetch(&owned_key, generation, &result);
            result
        }
        .boxed()
        .shared();

        state.inflight.insert(
            key.clone(),
            InFlight {
                generation,
                future: future.clone(),
            },
        );
        future
    }

    fn finish_fetch(
        &self,
        key: &CacheKey,
        generation: u64,
        result: &Result<DerivedValue, EngineError>,
    ) {
        let mut state = self.inner.lock();
        match result {
            Ok(value) => {
                let now = self.inner.clock.now();
                if state.table.complete_fetch(key, value.clone(), now, generation) {
                    tracing::debug!(%key, "cached fetched value");
                } else {
                    tracing::debug!(%key, "discarding result of superseded fetch");
                }
            }
            Err(err) => tracing::warn!(%key, error = %err, "fetch failed"),
        }
        if state
            .inflight
            .get(key)
            .is_some_and(|f| f.generation == generation)
        {
            state.inflight.remove(key);
        }
    }

    async fn fetch_uncached(&self, key: &CacheKey) -> Result<DerivedValue, EngineError> {
        let store = &self.inner.store;
        let config = &self.inner.config;
        let nested = ReadOptions {
            variant: key.variant,
            policy: ReadPolicy::FreshOnly,
        };

        let value = match &key.scope {
            ScopeKey::ScoreSets(scope) => {
                let sets = self.with_retry(key, move || store.fetch_scores(scope)).await?;
                DerivedValue::ScoreSets(Arc::new(sets))
            }
            ScopeKey::ClassStatistics(scope) => {
                let sets = self.score_sets(scope, nested).await?;
                DerivedValue::Statistics(compute_class_statistics(&sets, config.passing_threshold))
            }
            ScopeKey::ClassRanking { class_id, term_id } => {
                let entries = self
                    .with_retry(key, move || store.fetch_class_ranking(class_id, term_id))
                    .await?;
                DerivedValue::Ranking(Arc::new(Ranking::from_entries(
                    &entries,
                    config.ranking_mode,
                )))
            }
            ScopeKey::StudentRank {
                student_id,
                class_id,
                term_id,
            } => {
                let ranking = self.class_ranking(class_id, term_id, nested).await?;
                DerivedValue::Rank(ranking.entry_for(student_id).cloned())
            }
            ScopeKey::StudentTranscript {
                student_id,
                term_id,
                ..
            } => {
                let transcript = self
                    .with_retry(key, move || store.fetch_student_transcript(student_id, term_id))
                    .await?;
                DerivedValue::Transcript(Arc::new(transcript))
            }
            ScopeKey::StudentBehavior { student_id } => {
                let filter = BehaviorFilter::Student(student_id.clone());
                let filter = &filter;
                let notes = self
                    .with_retry(key, move || store.fetch_behavior_notes(filter))
                    .await?;
                DerivedValue::StudentBehavior(Arc::new(StudentBehavior::from_notes(
                    student_id.as_str(),
                    notes,
                )))
            }
            ScopeKey::ClassBehavior { class_id } => {
                let filter = BehaviorFilter::Class(class_id.clone());
                let filter = &filter;
                let notes = self
                    .with_retry(key, move || store.fetch_behavior_notes(filter))
                    .await?;
                DerivedValue::ClassBehavior(Arc::new(ClassBehavior::from_notes(
                    class_id.as_str(),
                    notes,
                )))
            }
        };
        Ok(value)
    }

    /// Run a store read, retrying transient failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, key: &CacheKey, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_retries = self.inner.config.max_fetch_retries;
        let mut delay = self.inner.config.retry_delay;
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_retries => {
                    attempt += 1;
                    // Use the store's retry-after hint if available
                    if let Some(ms) = err.retry_after_ms() {
                        delay = Duration::from_millis(ms);
                    }
                    tracing::warn!(
                        %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
    }

    // -- invalidation -------------------------------------------------------

    /// Evict every entry the mutation described by `fingerprint` affects,
    /// detach their in-flight fetches, and refetch realtime entries.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> Vec<CacheKey> {
        let mut state = self.inner.lock();
        // Tombstones from earlier invalidations and failed fetches go first.
        let State { table, inflight } = &mut *state;
        let pruned = table.prune(|key| inflight.contains_key(key));
        if pruned > 0 {
            tracing::debug!(pruned, "dropped empty cache entries");
        }

        let evicted = state.table.evict_matching(fingerprint);
        for key in &evicted {
            state.inflight.remove(key);
        }
        tracing::info!(?fingerprint, evicted = evicted.len(), "invalidated cached scopes");

        if self.inner.config.eager_realtime_refetch {
            for key in evicted.iter().filter(|k| k.variant == Variant::Realtime) {
                let refresh = self.ensure_fetch(&mut state, key);
                spawn_refresh(refresh);
            }
        }
        evicted
    }

    /// Start an optimistic transaction against this coordinator's cache.
    pub fn begin_optimistic(&self) -> OptimisticTxn {
        OptimisticTxn {
            inner: Arc::clone(&self.inner),
            applied: Vec::new(),
            finished: false,
        }
    }

    // -- mutations ----------------------------------------------------------

    /// Update one score. Cached score sets show the new value until the
    /// store answers; on success every dependent scope is evicted.
    #[tracing::instrument(skip(self, scope, current, patch), fields(scope = %scope, score_id = %current.id))]
    pub async fn update_score(
        &self,
        scope: &SubjectScope,
        current: &ScoreRecord,
        patch: ScorePatch,
    ) -> Result<ScoreRecord, EngineError> {
        validate_score_patch(&patch, current.max_score)?;

        let mut txn = self.begin_optimistic();
        for variant in VARIANTS {
            let key = CacheKey {
                scope: ScopeKey::ScoreSets(scope.clone()),
                variant,
            };
            txn.apply(&key, |value| match value {
                DerivedValue::ScoreSets(sets) => Some(DerivedValue::ScoreSets(Arc::new(
                    patch_score(sets, &current.id, &patch),
                ))),
                _ => None,
            });
        }

        match self.inner.store.update_score(&current.id, &patch).await {
            Ok(updated) => {
                txn.commit();
                self.invalidate(&Fingerprint::score_changed(scope, current.student_id.as_str()));
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(error = %err, "score update failed, rolling back");
                txn.rollback();
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip(self, request), fields(scope = %request.scope()))]
    pub async fn create_assessment(
        &self,
        request: &NewAssessment,
    ) -> Result<CreatedAssessment, EngineError> {
        validate_assessment(request)?;
        let created = self.inner.store.create_assessment(request).await?;
        self.invalidate(&Fingerprint::assessment_created(&request.scope()));
        Ok(created)
    }

    #[tracing::instrument(skip(self, note), fields(student = %note.student_id, class = %note.class_id))]
    pub async fn create_behavior_note(
        &self,
        note: NewBehaviorNote,
    ) -> Result<BehaviorNote, EngineError> {
        require_non_empty(&note.student_id, "student id")?;
        require_non_empty(&note.class_id, "class id")?;

        let pending = BehaviorNote {
            id: format!("pending-{}", Uuid::new_v4()),
            student_id: note.student_id.clone(),
            class_id: note.class_id.clone(),
            level: note.level,
            content: note.content.clone(),
            created_at: Utc::now(),
        };
        let mut txn = self.begin_optimistic();
        apply_to_behavior(&mut txn, &note.class_id, &note.student_id, |notes| {
            notes.push(pending.clone())
        });

        match self.inner.store.create_behavior_note(&note).await {
            Ok(created) => {
                txn.commit();
                self.invalidate(&Fingerprint::behavior_changed(
                    created.class_id.as_str(),
                    created.student_id.as_str(),
                ));
                Ok(created)
            }
            Err(err) => {
                tracing::warn!(error = %err, "behavior note creation failed, rolling back");
                txn.rollback();
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip(self, current, patch), fields(note = %current.id))]
    pub async fn update_behavior_note(
        &self,
        current: &BehaviorNote,
        patch: BehaviorNotePatch,
    ) -> Result<BehaviorNote, EngineError> {
        let mut edited = current.clone();
        if let Some(level) = patch.level {
            edited.level = level;
        }
        if let Some(content) = &patch.content {
            edited.content = content.clone();
        }

        let mut txn = self.begin_optimistic();
        apply_to_behavior(&mut txn, &current.class_id, &current.student_id, |notes| {
            for note in notes.iter_mut().filter(|n| n.id == edited.id) {
                *note = edited.clone();
            }
        });

        match self.inner.store.update_behavior_note(&current.id, &patch).await {
            Ok(updated) => {
                txn.commit();
                self.invalidate(&Fingerprint::behavior_changed(
                    updated.class_id.as_str(),
                    updated.student_id.as_str(),
                ));
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(error = %err, "behavior note update failed, rolling back");
                txn.rollback();
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip(self, note), fields(note = %note.id))]
    pub async fn delete_behavior_note(&self, note: &BehaviorNote) -> Result<(), EngineError> {
        let mut txn = self.begin_optimistic();
        apply_to_behavior(&mut txn, &note.class_id, &note.student_id, |notes| {
            notes.retain(|n| n.id != note.id)
        });

        match self.inner.store.delete_behavior_note(&note.id).await {
            Ok(()) => {
                txn.commit();
                self.invalidate(&Fingerprint::behavior_changed(
                    note.class_id.as_str(),
                    note.student_id.as_str(),
                ));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "behavior note deletion failed, rolling back");
                txn.rollback();
                Err(err.into())
            }
        }
    }
}

/// Drive a fetch to completion without a waiting caller.
fn spawn_refresh(fetch: SharedFetch) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fetch);
        }
        Err(_) => tracing::debug!("no runtime available, skipping background refresh"),
    }
}

fn patch_score(sets: &[StudentScoreSet], score_id: &str, patch: &ScorePatch) -> Vec<StudentScoreSet> {
    let mut sets = sets.to_vec();
    for record in sets.iter_mut().flat_map(|s| s.scores.iter_mut()) {
        if record.id == score_id {
            record.score = patch.score;
            record.is_absent = patch.is_absent;
            record.comment = patch.comment.clone();
        }
    }
    sets
}

fn apply_to_behavior<F>(txn: &mut OptimisticTxn, class_id: &str, student_id: &str, edit: F)
where
    F: Fn(&mut Vec<BehaviorNote>),
{
    for variant in VARIANTS {
        txn.apply(
            &CacheKey {
                scope: ScopeKey::student_behavior(student_id),
                variant,
            },
            |value| match value {
                DerivedValue::StudentBehavior(view) => {
                    let mut notes = view.notes.clone();
                    edit(&mut notes);
                    Some(DerivedValue::StudentBehavior(Arc::new(
                        StudentBehavior::from_notes(view.student_id.as_str(), notes),
                    )))
                }
                _ => None,
            },
        );
        txn.apply(
            &CacheKey {
                scope: ScopeKey::class_behavior(class_id),
                variant,
            },
            |value| match value {
                DerivedValue::ClassBehavior(view) => {
                    let mut notes = view.notes.clone();
                    edit(&mut notes);
                    Some(DerivedValue::ClassBehavior(Arc::new(ClassBehavior::from_notes(
                        view.class_id.as_str(),
                        notes,
                    ))))
                }
                _ => None,
            },
        );
    }
}

fn validate_score_patch(patch: &ScorePatch, max_score: f64) -> Result<(), ValidationError> {
    if !patch.score.is_finite() {
        return Err(ValidationError::NotFinite { field: "score" });
    }
    if patch.score < 0.0 || patch.score > max_score {
        return Err(ValidationError::ScoreOutOfRange {
            score: patch.score,
            max_score,
        });
    }
    Ok(())
}

fn validate_assessment(request: &NewAssessment) -> Result<(), ValidationError> {
    require_non_empty(&request.grade_component.name, "grade component name")?;
    require_non_empty(&request.assessment.name, "assessment name")?;

    let weight = request.grade_component.weight;
    if !weight.is_finite() {
        return Err(ValidationError::NotFinite { field: "weight" });
    }
    if weight < 0.0 {
        return Err(ValidationError::NegativeWeight(weight));
    }

    let max_score = request.assessment.max_score;
    if !max_score.is_finite() {
        return Err(ValidationError::NotFinite { field: "max score" });
    }
    if max_score <= 0.0 {
        return Err(ValidationError::NonPositiveMaxScore(max_score));
    }
    Ok(())
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty { field })
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Optimistic transactions
// ---------------------------------------------------------------------------

struct AppliedWrite {
    key: CacheKey,
    saved: SavedEntry,
    generation: u64,
}

/// A set of optimistic cache writes that is either committed or rolled back.
///
/// Dropping an unfinished transaction rolls it back. A rollback only
/// restores an entry nobody has written since; otherwise the entry is
/// evicted so the next read refetches.
pub struct OptimisticTxn {
    inner: Arc<Inner>,
    applied: Vec<AppliedWrite>,
    finished: bool,
}

impl OptimisticTxn {
    /// Replace the cached value of `key` with `update(current)`. Does
    /// nothing when the key holds no value or `update` returns `None`.
    pub fn apply<F>(&mut self, key: &CacheKey, update: F) -> bool
    where
        F: FnOnce(&DerivedValue) -> Option<DerivedValue>,
    {
        let mut state = self.inner.lock();
        let Some(next) = state.table.value(key).and_then(update) else {
            return false;
        };
        let saved = state.table.save(key);
        let generation = state.table.overwrite(key, next);

        // Keep the earliest snapshot when a key is written twice.
        match self.applied.iter_mut().find(|w| &w.key == key) {
            Some(write) => write.generation = generation,
            None => self.applied.push(AppliedWrite {
                key: key.clone(),
                saved,
                generation,
            }),
        }
        tracing::debug!(%key, "applied optimistic write");
        true
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn commit(mut self) {
        self.finished = true;
        if !self.applied.is_empty() {
            tracing::debug!(writes = self.applied.len(), "committed optimistic writes");
        }
    }

    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self.inner.lock();
        for write in self.applied.drain(..).rev() {
            if state
                .table
                .restore(&write.key, &write.saved, write.generation)
            {
                tracing::debug!(key = %write.key, "rolled back optimistic write");
            } else {
                tracing::info!(key = %write.key, "entry changed since optimistic write, evicting");
                state.table.evict(&write.key);
                state.inflight.remove(&write.key);
            }
        }
    }
}

impl Drop for OptimisticTxn {
    fn drop(&mut self) {
        self.undo();
    }
}
