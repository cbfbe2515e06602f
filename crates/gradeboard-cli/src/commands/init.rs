//! The `gradeboard init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("gradeboard.toml").exists() {
        println!("gradeboard.toml already exists, skipping.");
    } else {
        std::fs::write("gradeboard.toml", SAMPLE_CONFIG)?;
        println!("Created gradeboard.toml");
    }

    std::fs::create_dir_all("fixtures")?;
    let example_path = Path::new("fixtures/example-school.toml");
    if example_path.exists() {
        println!("fixtures/example-school.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_FIXTURE)?;
        println!("Created fixtures/example-school.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit gradeboard.toml with your portal URL and token");
    println!("  2. Run: gradeboard validate --fixture fixtures/example-school.toml");
    println!(
        "  3. Run: gradeboard stats --fixture fixtures/example-school.toml \
         --class 6A --subject math --term t1"
    );

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# gradeboard configuration

max_retries = 3
retry_delay_ms = 500

[api]
base_url = "http://localhost:8080/api"
token = "${GRADEBOARD_TOKEN}"
timeout_secs = 30

[cache]
freshness_secs = 300
realtime_freshness_secs = 15

[grading]
passing_threshold = 5.0
ranking_mode = "dense"
"#;

const EXAMPLE_FIXTURE: &str = r#"[school]
name = "Example School"

[[classes]]
id = "6A"

[[subjects]]
id = "math"
name = "Mathematics"

[[terms]]
id = "t1"
name = "Term 1"

[[students]]
id = "s1"
name = "First Student"
class_id = "6A"

[[students]]
id = "s2"
name = "Second Student"
class_id = "6A"

[[assessments]]
id = "quiz"
class_id = "6A"
subject_id = "math"
term_id = "t1"
name = "Quiz"
grade_component = "oral"
weight = 1.0

[[assessments]]
id = "exam"
class_id = "6A"
subject_id = "math"
term_id = "t1"
name = "Exam"
grade_component = "final"
weight = 2.0
max_score = 10.0

[[scores]]
assessment_id = "quiz"
student_id = "s1"
score = 8.0

[[scores]]
assessment_id = "exam"
student_id = "s1"
score = 7.0

[[scores]]
assessment_id = "quiz"
student_id = "s2"
score = 5.5

[[scores]]
assessment_id = "exam"
student_id = "s2"
absent = true

[[behavior_notes]]
id = "n1"
student_id = "s2"
level = "warning"
content = "Missed the exam without notice"
created_at = "2026-10-01T08:00:00Z"
"#;
