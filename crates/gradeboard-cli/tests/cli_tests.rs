//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const DEMO: &str = "../../fixtures/demo-school.toml";

fn gradeboard() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("gradeboard").unwrap()
}

fn with_demo(args: &[&str]) -> Command {
    let mut cmd = gradeboard();
    cmd.args(args).arg("--fixture").arg(DEMO);
    cmd
}

#[test]
fn validate_demo_fixture() {
    gradeboard()
        .arg("validate")
        .arg("--fixture")
        .arg(DEMO)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Riverside High (5 students, 4 assessments, 11 scores)",
        ))
        .stdout(predicate::str::contains("All fixtures valid"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[[students]]
id = "s1"
name = "One"
class_id = "6A"

[[assessments]]
id = "quiz"
class_id = "6A"
subject_id = "math"
term_id = "t1"
name = "Quiz"
grade_component = "oral"
weight = -1.0

[[scores]]
assessment_id = "quiz"
student_id = "s1"
score = 12.0
"#,
    )
    .unwrap();

    gradeboard()
        .arg("validate")
        .arg("--fixture")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("invalid weight"))
        .stdout(predicate::str::contains("outside [0, 10]"))
        .stdout(predicate::str::contains("2 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    gradeboard()
        .arg("validate")
        .arg("--fixture")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn stats_table() {
    with_demo(&["stats", "--class", "10A", "--subject", "math", "--term", "hk1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scope: 10A/math/hk1"))
        .stdout(predicate::str::contains("8.33"))
        .stdout(predicate::str::contains("3/3"))
        .stdout(predicate::str::contains("100.00%"))
        .stdout(predicate::str::contains("Le Minh Chi"));
}

#[test]
fn stats_json() {
    let output = with_demo(&[
        "stats", "--class", "10A", "--subject", "math", "--term", "hk1", "--format", "json",
    ])
    .output()
    .unwrap();
    assert!(output.status.success());

    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["statistics"]["average"], 8.33);
    assert_eq!(body["statistics"]["passedStudents"], 3);
    assert_eq!(body["students"].as_array().unwrap().len(), 3);
}

#[test]
fn ranking_table_and_single_student() {
    with_demo(&["ranking", "--class", "10A", "--term", "hk1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ranking 10A/hk1 (dense)"))
        .stdout(predicate::str::contains("8.50"))
        .stdout(predicate::str::contains("7.50"));

    with_demo(&[
        "ranking", "--class", "10A", "--term", "hk1", "--student", "chi", "--mode", "positional",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("chi: rank 3 in 10A (7.00)"));
}

#[test]
fn ranking_rejects_unknown_mode() {
    with_demo(&["ranking", "--class", "10A", "--term", "hk1", "--mode", "alphabetical"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown ranking mode"));
}

#[test]
fn transcript_marks_missing_subjects() {
    with_demo(&["transcript", "--student", "chi", "--class", "10A", "--term", "hk1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Transcript of chi in hk1"))
        .stdout(predicate::str::contains("Overall: 7.00"))
        .stdout(predicate::str::contains("Rank: 3"));
}

#[test]
fn behavior_for_class_lists_early_warning() {
    with_demo(&["behavior", "--class", "10A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Behavior of 10A (4 notes)"))
        .stdout(predicate::str::contains("Early warning: chi"))
        .stdout(predicate::str::contains(
            "Latest significant: [serious] Left school without permission (2026-10-02)",
        ));
}

#[test]
fn behavior_needs_a_target() {
    with_demo(&["behavior"]).assert().failure();
}

#[test]
fn set_score_refreshes_statistics() {
    with_demo(&[
        "set-score",
        "--class",
        "10A",
        "--subject",
        "math",
        "--term",
        "hk1",
        "--student",
        "chi",
        "--assessment",
        "m-oral",
        "--score",
        "4",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Updated m-oral:chi: 7.00 -> 4.00"))
    .stdout(predicate::str::contains("66.67%"));
}

#[test]
fn set_score_rejects_out_of_range() {
    with_demo(&[
        "set-score",
        "--class",
        "10A",
        "--subject",
        "math",
        "--term",
        "hk1",
        "--student",
        "chi",
        "--assessment",
        "m-oral",
        "--score",
        "11",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("outside [0, 10]"));
}

#[test]
fn set_score_unknown_assessment() {
    with_demo(&[
        "set-score",
        "--class",
        "10A",
        "--subject",
        "math",
        "--term",
        "hk1",
        "--student",
        "chi",
        "--assessment",
        "nope",
        "--score",
        "5",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no score for student 'chi'"));
}

#[test]
fn report_markdown_and_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out").join("10A.json");

    with_demo(&["report", "--class", "10A", "--subject", "math", "--term", "hk1"])
        .arg("--output")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("# Class report: 10A/math/hk1"))
        .stdout(predicate::str::contains("**Early warning:** chi"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["scope"]["classId"], "10A");
    assert_eq!(saved["ranking"]["mode"], "dense");
}

#[test]
fn unreachable_api_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("gradeboard.toml");
    std::fs::write(
        &config,
        "max_retries = 0\n\n[api]\nbase_url = \"http://127.0.0.1:1\"\ntimeout_secs = 2\n",
    )
    .unwrap();

    gradeboard()
        .args(["stats", "--class", "10A", "--subject", "math", "--term", "hk1"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    gradeboard()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created gradeboard.toml"))
        .stdout(predicate::str::contains("Created fixtures/example-school.toml"));

    assert!(dir.path().join("gradeboard.toml").exists());

    gradeboard()
        .current_dir(dir.path())
        .args(["validate", "--fixture", "fixtures/example-school.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All fixtures valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    gradeboard()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    gradeboard()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    gradeboard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Score aggregation"));
}

#[test]
fn version_output() {
    gradeboard()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gradeboard"));
}
