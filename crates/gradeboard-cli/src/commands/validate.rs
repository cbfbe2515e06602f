//! The `gradeboard validate` command.

use std::path::PathBuf;

use anyhow::Result;

use gradeboard_core::fixture::{load_fixture, load_fixture_directory, validate_fixture};

pub fn execute(fixture_path: PathBuf) -> Result<()> {
    let fixtures = if fixture_path.is_dir() {
        load_fixture_directory(&fixture_path)?
    } else {
        vec![load_fixture(&fixture_path)?]
    };

    let mut total_warnings = 0;

    for fixture in &fixtures {
        let name = if fixture.school_name.is_empty() {
            "(unnamed)"
        } else {
            fixture.school_name.as_str()
        };
        println!(
            "Fixture: {name} ({} students, {} assessments, {} scores)",
            fixture.students.len(),
            fixture.assessments.len(),
            fixture.scores.len()
        );

        let warnings = validate_fixture(fixture);
        for w in &warnings {
            println!("  [{}] WARNING: {}", w.subject, w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All fixtures valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
