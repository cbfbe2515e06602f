//! The `gradeboard stats` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradeboard_core::average::StudentAverageRow;
use gradeboard_core::model::SubjectScope;
use gradeboard_core::statistics::ClassStatistics;
use gradeboard_core::ReadOptions;

use super::{fmt_opt, Session, SourceArgs};

pub async fn execute(
    class: String,
    subject: String,
    term: String,
    format: String,
    source: SourceArgs,
) -> Result<()> {
    let session = Session::open(&source)?;
    let coordinator = session.coordinator();
    let scope = SubjectScope::new(class, subject, term);

    let statistics = coordinator
        .class_statistics(&scope, ReadOptions::default())
        .await?;
    let rows = coordinator
        .subject_averages(&scope, ReadOptions::default())
        .await?;

    match format.as_str() {
        "json" => {
            let body = serde_json::json!({
                "scope": scope,
                "statistics": statistics,
                "students": rows,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        _ => {
            println!("Scope: {scope}");
            print_statistics(&statistics);
            print_students(&rows);
        }
    }

    Ok(())
}

pub fn print_statistics(s: &ClassStatistics) {
    let mut table = Table::new();
    table.set_header(vec![
        "Average",
        "Highest",
        "Lowest",
        "Graded",
        "Passed",
        "Pass rate",
        "Completion",
    ]);
    table.add_row(vec![
        Cell::new(format!("{:.2}", s.average)),
        Cell::new(format!("{:.2}", s.highest)),
        Cell::new(format!("{:.2}", s.lowest)),
        Cell::new(format!("{}/{}", s.graded_students, s.total_students)),
        Cell::new(s.passed_students),
        Cell::new(format!("{:.2}%", s.pass_rate)),
        Cell::new(format!("{:.2}%", s.completion_rate)),
    ]);
    println!("{table}");
}

fn print_students(rows: &[StudentAverageRow]) {
    let mut table = Table::new();
    table.set_header(vec!["Student", "Name", "Average", "Grade", "Status", "Absent"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.student_id),
            Cell::new(&row.student_name),
            Cell::new(fmt_opt(row.average.value())),
            Cell::new(row.letter.map_or_else(|| "-".to_string(), |l| l.to_string())),
            Cell::new(row.status),
            Cell::new(row.average.absent_count),
        ]);
    }
    println!("{table}");
}
