//! The `gradeboard behavior` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradeboard_core::behavior::{BehaviorSummary, LatestSignificant};
use gradeboard_core::model::BehaviorLevel;
use gradeboard_core::ReadOptions;

use super::{Session, SourceArgs};

pub async fn execute(
    student: Option<String>,
    class: Option<String>,
    source: SourceArgs,
) -> Result<()> {
    let session = Session::open(&source)?;
    let coordinator = session.coordinator();

    match (student, class) {
        (Some(student), _) => {
            let behavior = coordinator
                .student_behavior(&student, ReadOptions::default())
                .await?;
            println!("Behavior of {student} ({} notes)", behavior.summary.total());
            print_summary(&behavior.summary);
            print_latest(&behavior.latest_significant);
        }
        (None, Some(class)) => {
            let behavior = coordinator
                .class_behavior(&class, ReadOptions::default())
                .await?;
            println!("Behavior of {class} ({} notes)", behavior.summary.total());
            print_summary(&behavior.summary);
            print_latest(&behavior.latest_significant);
            if behavior.early_warning.is_empty() {
                println!("Early warning: none");
            } else {
                println!("Early warning: {}", behavior.early_warning.join(", "));
            }
        }
        (None, None) => anyhow::bail!("pass --student or --class"),
    }

    Ok(())
}

fn print_summary(summary: &BehaviorSummary) {
    let mut table = Table::new();
    table.set_header(vec!["Level", "Notes"]);
    for level in BehaviorLevel::ALL {
        table.add_row(vec![Cell::new(level), Cell::new(summary.count(level))]);
    }
    println!("{table}");
}

fn print_latest(latest: &LatestSignificant) {
    match latest.note() {
        Some(note) => println!(
            "Latest significant: [{}] {} ({})",
            note.level,
            note.content,
            note.created_at.format("%Y-%m-%d")
        ),
        None => println!("Latest significant: none"),
    }
}
