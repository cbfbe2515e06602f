//! Engine scenarios wired through the real record stores.
//!
//! These tests run the coordinator against the in-memory store (and the
//! REST store behind wiremock) to check the cache stays consistent with
//! the records across reads, writes and failures.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gradeboard_client::{Credential, Endpoint, HttpRecordStore, InMemoryStore};
use gradeboard_core::cache::{DerivedValue, EntryState};
use gradeboard_core::fixture::parse_fixture_str;
use gradeboard_core::model::{
    AssessmentSpec, BehaviorLevel, BehaviorNotePatch, GradeComponentSpec, NewAssessment,
    NewBehaviorNote, ScorePatch, SubjectScope,
};
use gradeboard_core::view::ScopedView;
use gradeboard_core::{
    CacheKey, Coordinator, CoordinatorConfig, EngineError, ReadOptions, ScopeKey, StoreError,
};

const TWO_CLASSES: &str = r#"
[school]
name = "Scenario school"

[[students]]
id = "s1"
name = "One"
class_id = "C1"

[[students]]
id = "s2"
name = "Two"
class_id = "C1"

[[students]]
id = "s3"
name = "Three"
class_id = "C1"

[[students]]
id = "s4"
name = "Four"
class_id = "C2"

[[assessments]]
id = "q1"
class_id = "C1"
subject_id = "S1"
term_id = "T1"
name = "Quiz"
grade_component = "oral"

[[assessments]]
id = "e1"
class_id = "C1"
subject_id = "S2"
term_id = "T1"
name = "Essay"
grade_component = "written"

[[assessments]]
id = "q2"
class_id = "C2"
subject_id = "S1"
term_id = "T1"
name = "Quiz"
grade_component = "oral"

[[scores]]
assessment_id = "q1"
student_id = "s1"
score = 9.0

[[scores]]
assessment_id = "q1"
student_id = "s2"
score = 9.0

[[scores]]
assessment_id = "q1"
student_id = "s3"
score = 7.0

[[scores]]
assessment_id = "e1"
student_id = "s1"
score = 6.0

[[scores]]
assessment_id = "q2"
student_id = "s4"
score = 8.0
"#;

fn setup() -> (Arc<InMemoryStore>, Coordinator) {
    let fixture = parse_fixture_str(TWO_CLASSES, Path::new("scenario.toml")).unwrap();
    let store = Arc::new(InMemoryStore::new(fixture));
    let config = CoordinatorConfig {
        retry_delay: Duration::from_millis(10),
        eager_realtime_refetch: false,
        ..CoordinatorConfig::default()
    };
    let coordinator = Coordinator::new(store.clone(), config);
    (store, coordinator)
}

fn scope(class: &str, subject: &str) -> SubjectScope {
    SubjectScope::new(class, subject, "T1")
}

fn stats_key(class: &str, subject: &str) -> CacheKey {
    CacheKey::standard(ScopeKey::ClassStatistics(scope(class, subject)))
}

async fn score_record(
    coordinator: &Coordinator,
    scope: &SubjectScope,
    student: &str,
) -> gradeboard_core::model::ScoreRecord {
    let sets = coordinator
        .score_sets(scope, ReadOptions::default())
        .await
        .unwrap();
    sets.iter()
        .find(|s| s.student_id == student)
        .and_then(|s| s.scores.first())
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn editing_a_score_updates_statistics_and_spares_other_classes() {
    let (store, coordinator) = setup();
    let c1 = scope("C1", "S1");
    let c2 = scope("C2", "S1");

    let stats = coordinator
        .class_statistics(&c1, ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.average, 8.33);
    assert_eq!(stats.highest, 9.0);
    assert_eq!(stats.lowest, 7.0);
    assert_eq!(stats.passed_students, 3);
    assert_eq!(stats.pass_rate, 100.0);

    let other = coordinator
        .class_statistics(&c2, ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(store.calls(Endpoint::FetchScores), 2);

    let record = score_record(&coordinator, &c1, "s3").await;
    coordinator
        .update_score(
            &c1,
            &record,
            ScorePatch {
                score: 4.0,
                is_absent: false,
                comment: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        coordinator.snapshot(&stats_key("C1", "S1")).state,
        EntryState::Evicted
    );
    assert_eq!(
        coordinator.snapshot(&stats_key("C2", "S1")).state,
        EntryState::Fresh
    );

    let stats = coordinator
        .class_statistics(&c1, ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.passed_students, 2);
    assert_eq!(stats.pass_rate, 66.67);
    assert_eq!(store.calls(Endpoint::FetchScores), 3);

    let again = coordinator
        .class_statistics(&c2, ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(again, other);
    assert_eq!(store.calls(Endpoint::FetchScores), 3);
}

#[tokio::test]
async fn score_mutation_evicts_only_dependent_scopes() {
    let (store, coordinator) = setup();
    let opts = ReadOptions::default();

    coordinator.class_statistics(&scope("C1", "S1"), opts).await.unwrap();
    coordinator.class_statistics(&scope("C1", "S2"), opts).await.unwrap();
    coordinator.class_ranking("C1", "T1", opts).await.unwrap();
    coordinator.class_ranking("C2", "T1", opts).await.unwrap();
    coordinator.student_rank("s1", "C1", "T1", opts).await.unwrap();
    coordinator
        .student_transcript("s2", "C1", "T1", opts)
        .await
        .unwrap();
    coordinator.class_behavior("C1", opts).await.unwrap();
    assert_eq!(store.calls(Endpoint::FetchRanking), 2);

    let record = score_record(&coordinator, &scope("C1", "S1"), "s1").await;
    coordinator
        .update_score(
            &scope("C1", "S1"),
            &record,
            ScorePatch {
                score: 5.0,
                is_absent: false,
                comment: Some("regrade".into()),
            },
        )
        .await
        .unwrap();

    let state = |scope: ScopeKey| coordinator.snapshot(&CacheKey::standard(scope)).state;

    assert_eq!(state(ScopeKey::ClassStatistics(scope("C1", "S1"))), EntryState::Evicted);
    assert_eq!(state(ScopeKey::class_ranking("C1", "T1")), EntryState::Evicted);
    assert_eq!(state(ScopeKey::student_rank("s1", "C1", "T1")), EntryState::Evicted);

    assert_eq!(state(ScopeKey::ClassStatistics(scope("C1", "S2"))), EntryState::Fresh);
    assert_eq!(state(ScopeKey::class_ranking("C2", "T1")), EntryState::Fresh);
    assert_eq!(
        state(ScopeKey::student_transcript("s2", "C1", "T1")),
        EntryState::Fresh
    );
    assert_eq!(state(ScopeKey::class_behavior("C1")), EntryState::Fresh);

    // s1: S1 now 5.0, S2 6.0 -> 5.5, behind s2 (9.0) and s3 (7.0).
    let rank = coordinator
        .student_rank("s1", "C1", "T1", opts)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rank.average, 5.5);
    assert_eq!(rank.rank, 3);
}

#[tokio::test]
async fn rejected_update_restores_the_cached_entry() {
    let (store, coordinator) = setup();
    let c1 = scope("C1", "S1");
    let key = CacheKey::standard(ScopeKey::ScoreSets(c1.clone()));

    let record = score_record(&coordinator, &c1, "s2").await;
    let before = coordinator.snapshot(&key);

    store.fail_next(
        Endpoint::UpdateScore,
        StoreError::Rejected {
            status: 422,
            message: "term is locked".into(),
        },
    );
    let err = coordinator
        .update_score(
            &c1,
            &record,
            ScorePatch {
                score: 1.0,
                is_absent: false,
                comment: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.store_error(),
        Some(StoreError::Rejected { status: 422, .. })
    ));
    assert_eq!(coordinator.snapshot(&key), before);
    assert_eq!(store.fixture().scores[1].score, 9.0);
}

#[tokio::test]
async fn invalid_patch_never_reaches_the_store() {
    let (store, coordinator) = setup();
    let c1 = scope("C1", "S1");
    let record = score_record(&coordinator, &c1, "s1").await;

    let err = coordinator
        .update_score(
            &c1,
            &record,
            ScorePatch {
                score: f64::NAN,
                is_absent: false,
                comment: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(store.calls(Endpoint::UpdateScore), 0);
}

#[tokio::test]
async fn behavior_note_lifecycle_refreshes_summaries() {
    let (store, coordinator) = setup();
    let opts = ReadOptions::default();

    assert_eq!(coordinator.class_behavior("C1", opts).await.unwrap().summary.total(), 0);
    assert_eq!(coordinator.student_behavior("s1", opts).await.unwrap().summary.total(), 0);
    coordinator.class_behavior("C2", opts).await.unwrap();
    assert_eq!(store.calls(Endpoint::FetchBehavior), 3);

    let note = coordinator
        .create_behavior_note(NewBehaviorNote {
            student_id: "s1".into(),
            class_id: "C1".into(),
            level: BehaviorLevel::Serious,
            content: "Fight in the yard".into(),
        })
        .await
        .unwrap();
    assert_eq!(
        coordinator
            .snapshot(&CacheKey::standard(ScopeKey::class_behavior("C2")))
            .state,
        EntryState::Fresh
    );

    let class = coordinator.class_behavior("C1", opts).await.unwrap();
    assert_eq!(class.summary.serious, 1);
    assert_eq!(class.early_warning, vec!["s1".to_string()]);
    let student = coordinator.student_behavior("s1", opts).await.unwrap();
    assert_eq!(student.summary.serious, 1);

    let updated = coordinator
        .update_behavior_note(
            &note,
            BehaviorNotePatch {
                level: Some(BehaviorLevel::Good),
                content: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.level, BehaviorLevel::Good);

    let class = coordinator.class_behavior("C1", opts).await.unwrap();
    assert_eq!(class.summary.good, 1);
    assert_eq!(class.summary.serious, 0);
    assert!(class.early_warning.is_empty());
    let student = coordinator.student_behavior("s1", opts).await.unwrap();
    assert_eq!(student.summary.good, 1);

    coordinator.delete_behavior_note(&updated).await.unwrap();
    assert_eq!(coordinator.class_behavior("C1", opts).await.unwrap().summary.total(), 0);
    assert_eq!(coordinator.student_behavior("s1", opts).await.unwrap().summary.total(), 0);

    // C2 was never refetched.
    coordinator.class_behavior("C2", opts).await.unwrap();
    assert_eq!(store.calls(Endpoint::FetchBehavior), 9);
}

#[tokio::test]
async fn new_assessment_evicts_its_scope_only() {
    let (store, coordinator) = setup();
    let opts = ReadOptions::default();

    coordinator.class_statistics(&scope("C1", "S1"), opts).await.unwrap();
    coordinator.class_statistics(&scope("C1", "S2"), opts).await.unwrap();
    coordinator.class_ranking("C1", "T1", opts).await.unwrap();
    coordinator.class_ranking("C2", "T1", opts).await.unwrap();
    coordinator
        .student_transcript("s1", "C1", "T1", opts)
        .await
        .unwrap();

    let created = coordinator
        .create_assessment(&NewAssessment {
            class_id: "C1".into(),
            subject_id: "S1".into(),
            term_id: "T1".into(),
            grade_component: GradeComponentSpec {
                name: "project".into(),
                weight: 2.0,
            },
            assessment: AssessmentSpec {
                name: "Project".into(),
                max_score: 10.0,
            },
            initialize_scores: true,
        })
        .await
        .unwrap();
    assert_eq!(store.calls(Endpoint::CreateAssessment), 1);

    let state = |scope: ScopeKey| coordinator.snapshot(&CacheKey::standard(scope)).state;
    assert_eq!(state(ScopeKey::ScoreSets(scope("C1", "S1"))), EntryState::Evicted);
    assert_eq!(state(ScopeKey::ClassStatistics(scope("C1", "S1"))), EntryState::Evicted);
    assert_eq!(state(ScopeKey::class_ranking("C1", "T1")), EntryState::Evicted);
    assert_eq!(
        state(ScopeKey::student_transcript("s1", "C1", "T1")),
        EntryState::Evicted
    );
    assert_eq!(state(ScopeKey::ClassStatistics(scope("C1", "S2"))), EntryState::Fresh);
    assert_eq!(state(ScopeKey::class_ranking("C2", "T1")), EntryState::Fresh);

    // Seeded scores are absent, so the statistics do not move.
    let sets = coordinator.score_sets(&scope("C1", "S1"), opts).await.unwrap();
    for set in sets.iter() {
        let seeded = set
            .scores
            .iter()
            .find(|s| s.assessment_id == created.assessment_id)
            .unwrap();
        assert!(seeded.is_absent);
    }
    let stats = coordinator.class_statistics(&scope("C1", "S1"), opts).await.unwrap();
    assert_eq!(stats.average, 8.33);
    assert_eq!(stats.passed_students, 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_fetch() {
    let (store, coordinator) = setup();
    store.set_latency(Duration::from_millis(200));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        tasks.spawn(async move {
            coordinator
                .class_statistics(&scope("C1", "S1"), ReadOptions::default())
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let stats = joined.unwrap().unwrap();
        assert_eq!(stats.total_students, 3);
    }
    assert_eq!(store.calls(Endpoint::FetchScores), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let (store, coordinator) = setup();
    store.fail_next(Endpoint::FetchRanking, StoreError::Timeout(30));
    store.fail_next(
        Endpoint::FetchRanking,
        StoreError::Api {
            status: 502,
            message: "bad gateway".into(),
        },
    );

    let ranking = coordinator
        .class_ranking("C1", "T1", ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(ranking.entries[0].student_id, "s2");
    assert_eq!(store.calls(Endpoint::FetchRanking), 3);
}

#[tokio::test(start_paused = true)]
async fn superseded_view_drops_its_result() {
    let (store, coordinator) = setup();
    store.set_latency(Duration::from_millis(100));

    let view = Arc::new(ScopedView::new(coordinator, ReadOptions::default()));
    view.select(ScopeKey::ClassStatistics(scope("C1", "S1")));

    let loading = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.load().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    view.select(ScopeKey::ClassStatistics(scope("C2", "S1")));

    assert_eq!(loading.await.unwrap().unwrap(), None);

    match view.load().await.unwrap() {
        Some(DerivedValue::Statistics(stats)) => assert_eq!(stats.total_students, 1),
        other => panic!("expected C2 statistics, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_signs_out_and_leaves_cache_empty() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/classes/C1/subjects/S1/terms/T1/scores"))
        .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
        .expect(1)
        .mount(&server)
        .await;

    let credential = Credential::new("old-token");
    let store = HttpRecordStore::new(&server.uri(), credential.clone(), 5).unwrap();
    let coordinator = Coordinator::new(Arc::new(store), CoordinatorConfig::default());

    let err = coordinator
        .class_statistics(&scope("C1", "S1"), ReadOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Store(StoreError::Unauthorized("session expired".into()))
    );
    assert!(!credential.is_valid());
    assert_eq!(coordinator.cached_len(), 0);
    assert_eq!(
        coordinator.snapshot(&stats_key("C1", "S1")).state,
        EntryState::Empty
    );
}
