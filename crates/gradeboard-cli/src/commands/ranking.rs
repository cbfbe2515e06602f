//! The `gradeboard ranking` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradeboard_core::ranking::RankingMode;
use gradeboard_core::ReadOptions;

use super::{Session, SourceArgs};

pub async fn execute(
    class: String,
    term: String,
    mode: Option<RankingMode>,
    student: Option<String>,
    source: SourceArgs,
) -> Result<()> {
    let mut session = Session::open(&source)?;
    if let Some(mode) = mode {
        session.config.grading.ranking_mode = mode;
    }
    let coordinator = session.coordinator();

    if let Some(student) = student {
        match coordinator
            .student_rank(&student, &class, &term, ReadOptions::default())
            .await?
        {
            Some(entry) => println!(
                "{student}: rank {} in {class} ({:.2})",
                entry.rank, entry.average
            ),
            None => println!("{student}: not ranked in {class}/{term}"),
        }
        return Ok(());
    }

    let ranking = coordinator
        .class_ranking(&class, &term, ReadOptions::default())
        .await?;

    if ranking.is_empty() {
        println!("No ranked students in {class}/{term}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Rank", "Student", "Average"]);
    for entry in &ranking.entries {
        table.add_row(vec![
            Cell::new(entry.rank),
            Cell::new(&entry.student_id),
            Cell::new(format!("{:.2}", entry.average)),
        ]);
    }

    println!("Ranking {class}/{term} ({})", ranking.mode);
    println!("{table}");
    Ok(())
}
