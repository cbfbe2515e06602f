//! The `gradeboard report` command.

use std::path::PathBuf;

use anyhow::Result;

use gradeboard_core::model::SubjectScope;
use gradeboard_core::report::build_class_report;

use super::{Session, SourceArgs};

pub async fn execute(
    class: String,
    subject: String,
    term: String,
    output: Option<PathBuf>,
    format: String,
    source: SourceArgs,
) -> Result<()> {
    let session = Session::open(&source)?;
    let coordinator = session.coordinator();
    let scope = SubjectScope::new(class, subject, term);

    let report = build_class_report(&coordinator, &scope).await?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{}", report.to_markdown()),
    }

    if let Some(path) = output {
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}
