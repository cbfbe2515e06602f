//! The `gradeboard set-score` command.

use anyhow::{Context, Result};

use gradeboard_core::model::{ScorePatch, SubjectScope};
use gradeboard_core::ReadOptions;

use super::stats::print_statistics;
use super::{Session, SourceArgs};

/// The score record being edited.
pub struct Target {
    pub class: String,
    pub subject: String,
    pub term: String,
    pub student: String,
    pub assessment: String,
}

pub async fn execute(
    target: Target,
    score: f64,
    absent: bool,
    comment: Option<String>,
    source: SourceArgs,
) -> Result<()> {
    let session = Session::open(&source)?;
    let coordinator = session.coordinator();
    let scope = SubjectScope::new(target.class, target.subject, target.term);

    let before = coordinator
        .class_statistics(&scope, ReadOptions::default())
        .await?;

    let sets = coordinator
        .score_sets(&scope, ReadOptions::default())
        .await?;
    let current = sets
        .iter()
        .find(|s| s.student_id == target.student)
        .and_then(|s| {
            s.scores
                .iter()
                .find(|r| r.assessment_id == target.assessment)
        })
        .cloned()
        .with_context(|| {
            format!(
                "no score for student '{}' on assessment '{}' in {scope}",
                target.student, target.assessment
            )
        })?;

    let patch = ScorePatch {
        score,
        is_absent: absent,
        comment,
    };
    let updated = coordinator.update_score(&scope, &current, patch).await?;

    println!(
        "Updated {}: {} -> {}",
        updated.id,
        describe(current.score, current.is_absent),
        describe(updated.score, updated.is_absent)
    );

    let after = coordinator
        .class_statistics(&scope, ReadOptions::default())
        .await?;
    println!("Before:");
    print_statistics(&before);
    println!("After:");
    print_statistics(&after);
    Ok(())
}

fn describe(score: f64, absent: bool) -> String {
    if absent {
        "absent".to_string()
    } else {
        format!("{score:.2}")
    }
}
