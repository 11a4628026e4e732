//! Local Gig Connect: a job board over the gigboard document store.
//!
//! Runs one scripted session against the configured databases: seeds demo
//! jobs on first start, posts a job through the form with an AI-written
//! description, moves it along the status workflow and saves a note. The
//! dashboard live query logs every change as it happens.

mod board;
mod config;

use gigboard_core::{JobStatus, TemplateGenerator};
use gigboard_store::{registry, DraftPatch, QueryResult};
use log::{info, warn};

use board::JobBoard;
use config::AppConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!(
        "Starting with data dir {} (jobs: '{}', notes: '{}')",
        config.data_dir.display(),
        config.jobs_database,
        config.notes_database
    );

    if !registry::install_global(config.store_config()) {
        warn!("Database registry was already initialised");
    }
    let jobs = registry::global().open(&config.jobs_database)?;
    let notes = registry::global().open(&config.notes_database)?;

    let board = JobBoard::new(
        jobs.clone(),
        notes,
        TemplateGenerator::new(config.demo_jobs),
        config.demo_jobs,
    )?;

    let _dashboard = board.dashboard(log_dashboard)?;
    let (_latest, latest) = board.watch_dashboard()?;

    if jobs.all_docs().is_empty() {
        let seeded = board.generate_demo_data().await?;
        info!("Seeded {} demo jobs", seeded.len());
    }

    board.reset_form();
    board.edit(
        DraftPatch::new()
            .set("title", "Fix leaking kitchen sink")
            .set("category", "Plumbing")
            .set("location", "Fremont, Seattle")
            .set("budget", "120"),
    );
    let description = board.generate_description().await?;
    info!("Generated description ({} chars)", description.len());
    let posted = board.post_job()?;
    info!("Form cleared for draft #{}", board.draft().instance());

    for status in [JobStatus::InProgress, JobStatus::Completed] {
        board.update_status(posted.id.as_str(), status)?;
    }
    info!("Job {} is now {}", posted.id, board.job(posted.id.as_str())?.status);

    let cancelled: Vec<String> = jobs
        .all_docs()
        .into_iter()
        .filter(|doc| doc.get_str("status") == Some(JobStatus::Cancelled.as_str()))
        .map(|doc| doc.id.to_string())
        .collect();
    for id in &cancelled {
        board.delete_job(id)?;
    }

    board
        .ask("Give me three tips for writing a clear \"local job\" posting")
        .await?;
    for note in board.notes()? {
        info!("Note from {}: {} chars", note.created_at, note.content.len());
    }

    let changes = jobs.changes_since(0)?;
    info!(
        "Session done: {} commits in '{}', sequence {}, {} jobs listed",
        changes.len(),
        jobs.name(),
        jobs.sequence(),
        latest.borrow().len()
    );
    jobs.sync()?;
    Ok(())
}

fn log_dashboard(result: &QueryResult) {
    info!("Dashboard: {} jobs (sequence {})", result.len(), result.seq);
    for doc in result.docs().take(3) {
        info!(
            "  {} [{}] {}",
            doc.get_str("title").unwrap_or("(untitled)"),
            doc.get_str("status").unwrap_or("Open"),
            doc.id
        );
    }
}
