//! The analyze command: drive the extraction pipeline with progress display.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::cache::ExtractionCache;
use crate::cli::helpers::truncate;
use crate::config::Settings;
use crate::llm::GeminiClient;
use crate::pipeline::{ExtractionService, PipelineEvent, RunReport};
use crate::rate_limit::Pacer;

use super::open_store;

/// Run the extraction pipeline.
pub async fn cmd_analyze(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    // Configuration problems are fatal before any work starts.
    settings.validate_for_run(true)?;

    let store = open_store(settings)?;
    if let Some(version) = &settings.active_prompt_version {
        store.activate_prompt(version)?;
    }
    let cache = ExtractionCache::new(&settings.cache_dir())?;
    let backend = Arc::new(GeminiClient::from_settings(&settings.llm)?);
    let pacer = Pacer::new(Duration::from_millis(
        settings.pipeline.min_request_interval_ms,
    ));

    let mut pipeline_settings = settings.pipeline.clone();
    if limit > 0 {
        pipeline_settings.batch_limit = limit;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let service = ExtractionService::new(store, cache, backend, pacer, pipeline_settings)
        .with_cancel_flag(cancel.clone());

    // Ctrl-C stops between narratives, never mid-request.
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping after the current narrative...");
                cancel.store(true, Ordering::Relaxed);
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(64);

    let event_handler = tokio::spawn(async move {
        let mut progress: Option<ProgressBar> = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::Started { total } => {
                    let bar = ProgressBar::new(total as u64);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                            .unwrap()
                            .progress_chars("█▓░"),
                    );
                    bar.set_message("Extracting...");
                    progress = Some(bar);
                }
                PipelineEvent::UnitStarted { title, .. } => {
                    if let Some(bar) = &progress {
                        bar.set_message(truncate(&title, 40));
                    }
                }
                PipelineEvent::Extracted { .. } | PipelineEvent::UnitFailed { .. } => {
                    if let Some(bar) = &progress {
                        bar.inc(1);
                    }
                }
                PipelineEvent::CacheHit { .. } => {}
                PipelineEvent::Complete { .. } => {
                    if let Some(bar) = &progress {
                        bar.finish_and_clear();
                    }
                }
            }
        }
    });

    let report = service.run(event_tx).await?;
    let _ = event_handler.await;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("\n{}", style("Run Report").bold());
    println!("{}", "-".repeat(50));
    println!("  Selected:            {}", report.selected);
    println!("  Skipped (too short): {}", report.skipped_short);
    println!("  Duplicate text:      {}", report.duplicates);
    println!("  Already extracted:   {}", report.already_completed);
    println!("  Already failed:      {}", report.already_failed);
    println!("  Cache hits:          {}", report.cache_hits);
    println!(
        "  Newly completed:     {} ({} accepted, {} low-confidence)",
        report.completed,
        style(report.accepted).green(),
        style(report.low_confidence).yellow()
    );
    println!("  Newly failed:        {}", style(report.failed).red());
    println!("  Live model calls:    {}", report.live_calls);
    println!("  Estimated cost:      ${:.4}", report.estimated_cost);
    println!("  Elapsed:             {:.1?}", report.elapsed);
}
