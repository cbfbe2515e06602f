//! REST record store.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::instrument;

use gradeboard_core::error::StoreError;
use gradeboard_core::model::{
    BehaviorFilter, BehaviorNote, BehaviorNotePatch, CreatedAssessment, NewAssessment,
    NewBehaviorNote, RankingEntry, ScorePatch, ScoreRecord, StudentScoreSet, SubjectScope,
    Transcript,
};
use gradeboard_core::traits::RecordStore;

use crate::credential::Credential;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Used when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Record store backed by the school portal's REST API.
pub struct HttpRecordStore {
    base_url: Url,
    timeout_secs: u64,
    credential: Credential,
    client: reqwest::Client,
}

impl HttpRecordStore {
    pub fn new(base_url: &str, credential: Credential, timeout_secs: u64) -> anyhow::Result<Self> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };
        let base_url = Url::parse(base)
            .with_context(|| format!("invalid record store URL: {base}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("record store URL cannot carry a path: {base}");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url,
            timeout_secs,
            credential,
            client,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Append percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Attach auth, send, and map transport and status failures.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let request = match self.credential.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                StoreError::Network(format!("record store not reachable at {}", self.base_url))
            } else {
                StoreError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status < 400 {
            return Ok(response);
        }

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                * 1000;
            return Err(StoreError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            401 => {
                self.credential.invalidate();
                StoreError::Unauthorized(body)
            }
            404 => StoreError::NotFound(what.to_string()),
            400..=499 => StoreError::Rejected {
                status,
                message: body,
            },
            _ => StoreError::Api {
                status,
                message: body,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, StoreError> {
        let response = self.send(request, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, scope), fields(scope = %scope))]
    async fn fetch_scores(&self, scope: &SubjectScope) -> Result<Vec<StudentScoreSet>, StoreError> {
        let url = self.url(&[
            "classes",
            scope.class_id.as_str(),
            "subjects",
            scope.subject_id.as_str(),
            "terms",
            scope.term_id.as_str(),
            "scores",
        ]);
        self.send_json(self.client.get(url), &format!("scores for {scope}"))
            .await
    }

    #[instrument(skip(self, patch))]
    async fn update_score(
        &self,
        score_id: &str,
        patch: &ScorePatch,
    ) -> Result<ScoreRecord, StoreError> {
        let url = self.url(&["scores", score_id]);
        self.send_json(self.client.put(url).json(patch), &format!("score {score_id}"))
            .await
    }

    #[instrument(skip(self, request), fields(scope = %request.scope()))]
    async fn create_assessment(
        &self,
        request: &NewAssessment,
    ) -> Result<CreatedAssessment, StoreError> {
        let url = self.url(&["assessments"]);
        self.send_json(self.client.post(url).json(request), "assessments")
            .await
    }

    #[instrument(skip(self))]
    async fn fetch_class_ranking(
        &self,
        class_id: &str,
        term_id: &str,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        let url = self.url(&["classes", class_id, "terms", term_id, "ranking"]);
        self.send_json(
            self.client.get(url),
            &format!("ranking for {class_id}/{term_id}"),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn fetch_student_transcript(
        &self,
        student_id: &str,
        term_id: &str,
    ) -> Result<Transcript, StoreError> {
        let url = self.url(&["students", student_id, "terms", term_id, "transcript"]);
        let averages: BTreeMap<String, Option<f64>> = self
            .send_json(
                self.client.get(url),
                &format!("transcript of {student_id} in {term_id}"),
            )
            .await?;
        Ok(Transcript {
            student_id: student_id.to_string(),
            term_id: term_id.to_string(),
            averages,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_behavior_notes(
        &self,
        filter: &BehaviorFilter,
    ) -> Result<Vec<BehaviorNote>, StoreError> {
        let (key, id) = match filter {
            BehaviorFilter::Student(id) => ("studentId", id),
            BehaviorFilter::Class(id) => ("classId", id),
        };
        let mut url = self.url(&["behavior-notes"]);
        url.query_pairs_mut().append_pair(key, id);
        self.send_json(self.client.get(url), "behavior notes").await
    }

    #[instrument(skip(self, note), fields(student = %note.student_id))]
    async fn create_behavior_note(
        &self,
        note: &NewBehaviorNote,
    ) -> Result<BehaviorNote, StoreError> {
        let url = self.url(&["behavior-notes"]);
        self.send_json(self.client.post(url).json(note), "behavior notes")
            .await
    }

    #[instrument(skip(self, patch))]
    async fn update_behavior_note(
        &self,
        note_id: &str,
        patch: &BehaviorNotePatch,
    ) -> Result<BehaviorNote, StoreError> {
        let url = self.url(&["behavior-notes", note_id]);
        self.send_json(
            self.client.put(url).json(patch),
            &format!("behavior note {note_id}"),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_behavior_note(&self, note_id: &str) -> Result<(), StoreError> {
        let url = self.url(&["behavior-notes", note_id]);
        self.send(self.client.delete(url), &format!("behavior note {note_id}"))
            .await?;
        Ok(())
    }
}
