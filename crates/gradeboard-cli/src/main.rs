//! The `gradeboard` binary: class statistics, rankings and score edits from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use gradeboard_core::ranking::RankingMode;

mod commands;

use commands::SourceArgs;

#[derive(Parser)]
#[command(
    name = "gradeboard",
    version,
    about = "Score aggregation and class statistics for the school portal"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Class statistics and per-student averages for one subject
    Stats {
        #[arg(long)]
        class: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        term: String,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Term ranking of a class across all subjects
    Ranking {
        #[arg(long)]
        class: String,

        #[arg(long)]
        term: String,

        /// Tie rule: dense, competition, positional (default from config)
        #[arg(long)]
        mode: Option<RankingMode>,

        /// Show only this student's rank
        #[arg(long)]
        student: Option<String>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Per-subject averages of one student in a term
    Transcript {
        #[arg(long)]
        student: String,

        #[arg(long)]
        class: String,

        #[arg(long)]
        term: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Behavior summary of a student or a class
    Behavior {
        #[arg(long, conflicts_with = "class", required_unless_present = "class")]
        student: Option<String>,

        #[arg(long)]
        class: Option<String>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Update one score and show the refreshed statistics
    SetScore {
        #[arg(long)]
        class: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        term: String,

        #[arg(long)]
        student: String,

        #[arg(long)]
        assessment: String,

        #[arg(long, allow_negative_numbers = true)]
        score: f64,

        /// Mark the student absent for this assessment
        #[arg(long)]
        absent: bool,

        #[arg(long)]
        comment: Option<String>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Build a class report
    Report {
        #[arg(long)]
        class: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        term: String,

        /// Write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: markdown, json
        #[arg(long, default_value = "markdown")]
        format: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Validate fixture TOML files
    Validate {
        /// Path to a fixture file or directory
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Create a starter config and an example fixture
    Init,
}

#[tokio::main]
async fn main() {
    let directive: tracing_subscriber::filter::Directive = match "gradeboard=info".parse() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: invalid log directive: {e}");
            process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stats {
            class,
            subject,
            term,
            format,
            source,
        } => commands::stats::execute(class, subject, term, format, source).await,
        Commands::Ranking {
            class,
            term,
            mode,
            student,
            source,
        } => commands::ranking::execute(class, term, mode, student, source).await,
        Commands::Transcript {
            student,
            class,
            term,
            source,
        } => commands::transcript::execute(student, class, term, source).await,
        Commands::Behavior {
            student,
            class,
            source,
        } => commands::behavior::execute(student, class, source).await,
        Commands::SetScore {
            class,
            subject,
            term,
            student,
            assessment,
            score,
            absent,
            comment,
            source,
        } => {
            let target = commands::set_score::Target {
                class,
                subject,
                term,
                student,
                assessment,
            };
            commands::set_score::execute(target, score, absent, comment, source).await
        }
        Commands::Report {
            class,
            subject,
            term,
            output,
            format,
            source,
        } => commands::report::execute(class, subject, term, output, format, source).await,
        Commands::Validate { fixture } => commands::validate::execute(fixture),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
