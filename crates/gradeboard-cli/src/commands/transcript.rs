//! The `gradeboard transcript` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradeboard_core::ReadOptions;

use super::{fmt_opt, Session, SourceArgs};

pub async fn execute(
    student: String,
    class: String,
    term: String,
    source: SourceArgs,
) -> Result<()> {
    let session = Session::open(&source)?;
    let coordinator = session.coordinator();

    let transcript = coordinator
        .student_transcript(&student, &class, &term, ReadOptions::default())
        .await?;
    let rank = coordinator
        .student_rank(&student, &class, &term, ReadOptions::default())
        .await?;

    let mut table = Table::new();
    table.set_header(vec!["Subject", "Average"]);
    for (subject, average) in &transcript.averages {
        table.add_row(vec![Cell::new(subject), Cell::new(fmt_opt(*average))]);
    }

    println!("Transcript of {student} in {term}");
    println!("{table}");
    println!("Overall: {}", fmt_opt(transcript.overall()));
    match rank {
        Some(entry) => println!("Rank: {}", entry.rank),
        None => println!("Rank: -"),
    }
    Ok(())
}
