use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;

mod attainment;
mod config;
mod db;
mod models;
mod objectives;
mod paginate;
mod report;
mod repository;

use attainment::FetchStrategy;
use models::{CourseOffering, Taxonomy};
use objectives::SaveObjectivesRequest;
use repository::{ObjectiveRepository, ScoreRepository};

#[derive(Parser)]
#[command(name = "course-outcome-attainment")]
#[command(about = "Course outcome attainment tracking and reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import score rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Save the objective list of a course offering from a JSON request body
    SaveObjectives {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the objective list of a course offering as JSON
    Objectives {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
    },
    /// Show taxonomy attainment for one student
    Attainment {
        #[arg(long)]
        student_id: String,
        /// Fetch objective lists for all course offerings at once
        #[arg(long)]
        concurrent: bool,
    },
    /// Print dashboard entries for a session and program outcome as JSON
    Dashboard {
        #[arg(long)]
        session: String,
        #[arg(long)]
        po: String,
    },
    /// Generate a paginated report
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Per-student assessment report with the attainment overview
    Student {
        #[arg(long)]
        student_id: String,
        #[arg(long, default_value = "student-report.md")]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long)]
        concurrent: bool,
    },
    /// Program outcome report for a session
    Po {
        #[arg(long)]
        session: String,
        #[arg(long)]
        po: String,
        #[arg(long, default_value = "po-report.md")]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

fn strategy(concurrent: bool) -> FetchStrategy {
    if concurrent {
        FetchStrategy::Concurrent
    } else {
        FetchStrategy::Sequential
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::AppConfig::from_env()?;
    config::init_tracing(&config.log_filter)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = db::PgStore::new(pool);

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&store).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let written = db::import_csv(store.pool(), &csv).await?;
            println!("Wrote {written} score rows from {}.", csv.display());
        }
        Commands::SaveObjectives { file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let request: SaveObjectivesRequest = serde_json::from_str(&body)
                .with_context(|| format!("{} is not a valid request body", file.display()))?;
            let validated = request.validate()?;
            let outcome = store
                .upsert_objectives(&validated.offering, &validated.objectives)
                .await?;
            println!("{}", outcome.message());
        }
        Commands::Objectives {
            teacher,
            course,
            session,
        } => {
            let offering = CourseOffering {
                course_id: course,
                session,
                teacher_id: teacher,
            };
            let objectives = store.objectives(&offering).await?;
            println!("{}", serde_json::to_string_pretty(&objectives)?);
        }
        Commands::Attainment {
            student_id,
            concurrent,
        } => {
            let records = store.results_for_student(&student_id).await?;
            if records.is_empty() {
                println!("No data found for the student ID: {student_id}");
                return Ok(());
            }

            let result = attainment::aggregate(&store, &records, strategy(concurrent)).await;
            println!(
                "Profile achievement for {} ({student_id}) across {} records:",
                records[0].student_name,
                records.len()
            );
            for taxonomy in Taxonomy::ALL {
                println!("- {}: {}", taxonomy, result.tally.get(taxonomy).summary());
            }
            if !result.skipped.is_empty() {
                tracing::warn!(
                    target: "attainment",
                    student_id = %student_id,
                    skipped = result.skipped.len(),
                    "records reference course objectives that do not exist"
                );
            }
        }
        Commands::Dashboard { session, po } => {
            let entries = store.entries_for_outcome(&session, &po).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::Report { kind } => match kind {
            ReportKind::Student {
                student_id,
                out,
                format,
                concurrent,
            } => {
                let records = store.results_for_student(&student_id).await?;
                let result = attainment::aggregate(&store, &records, strategy(concurrent)).await;
                let rendered =
                    report::build_student_report(&student_id, &records, &result, chrono::Utc::now());
                let contents = match format {
                    ReportFormat::Markdown => rendered.document.clone(),
                    ReportFormat::Json => rendered.placements_json()?,
                };
                std::fs::write(&out, contents)?;
                println!(
                    "Report written to {} ({} pages).",
                    out.display(),
                    paginate::page_count(&rendered.placements)
                );
            }
            ReportKind::Po {
                session,
                po,
                out,
                format,
            } => {
                let entries = store.entries_for_outcome(&session, &po).await?;
                let rendered = report::build_po_report(&session, &po, &entries);
                let contents = match format {
                    ReportFormat::Markdown => rendered.document.clone(),
                    ReportFormat::Json => rendered.placements_json()?,
                };
                std::fs::write(&out, contents)?;
                println!(
                    "Report written to {} ({} pages).",
                    out.display(),
                    paginate::page_count(&rendered.placements)
                );
            }
        },
    }

    Ok(())
}
