//! Status, aggregation report, question, triage and export commands.

use std::io::Write;
use std::path::Path;

use console::style;

use crate::aggregate::{AggregationEngine, QueryAnswer, QueryTranslator, TrendGranularity};
use crate::cli::helpers::short_fingerprint;
use crate::config::Settings;
use crate::models::AttemptStatus;
use crate::repository::Store;

use super::{open_store, ExportFormat};

/// Show store status and pending work.
pub fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings)?;

    println!("\n{}", style("Store Status").bold());
    println!("{}", "-".repeat(50));
    println!("  Narratives: {}", store.count_narratives()?);

    match store.active_prompt()? {
        Some(prompt) => {
            println!("  Active prompt version: {}", prompt.version);

            let mut pending = 0;
            let mut completed = 0;
            let mut failed = 0;
            for (status, count) in store.count_attempts_by_status(&prompt.version)? {
                match status {
                    AttemptStatus::Pending => pending = count,
                    AttemptStatus::Completed => completed = count,
                    AttemptStatus::Failed => failed = count,
                }
            }
            println!(
                "  Attempts: {} completed, {} pending, {} failed",
                completed, pending, failed
            );

            let (accepted, low_confidence) = store.count_extractions(&prompt.version)?;
            println!(
                "  Extractions: {} accepted, {} low-confidence",
                style(accepted).green(),
                style(low_confidence).yellow()
            );
            println!(
                "  Terminal failures: {}",
                style(store.count_failed_extractions(&prompt.version)?).red()
            );

            let cache = crate::cache::ExtractionCache::new(&settings.cache_dir())?;
            println!("  Cached responses: {}", cache.len(&prompt.version));

            let engine = AggregationEngine::new(&store);
            let stats =
                engine.summary_statistics(&prompt.version, settings.pipeline.confidence_threshold)?;
            if stats.total_records > 0 {
                println!("\n{}", style("Extraction Summary").bold());
                println!("{}", "-".repeat(50));
                println!("  Qualifying records: {}", stats.total_records);
                println!("  Average sentiment:  {:.2}", stats.avg_sentiment);
                println!("  High enthusiasm:    {}", stats.high_enthusiasm);
                println!("  Clear problem:      {}", stats.clear_problem);
                println!("  PII flagged:        {}", stats.pii_flagged);
                if let Some(theme) = stats.top_theme {
                    println!("  Top theme:          {theme}");
                }
            }
        }
        None => {
            println!(
                "  {} No active prompt version. Run `narramine init`.",
                style("!").yellow()
            );
        }
    }
    Ok(())
}

fn threshold(settings: &Settings, min_confidence: Option<f64>) -> f64 {
    min_confidence.unwrap_or(settings.pipeline.confidence_threshold)
}

fn active_version(store: &Store) -> anyhow::Result<String> {
    Ok(store.require_active_prompt()?.version)
}

/// Theme distribution report.
pub fn cmd_report_themes(
    settings: &Settings,
    store: &Store,
    min_confidence: Option<f64>,
) -> anyhow::Result<()> {
    let version = active_version(store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(store);
    let summary = engine.theme_summary(&version, min_confidence)?;

    println!(
        "\n{} (confidence >= {})",
        style("Theme Distribution").bold(),
        min_confidence
    );
    println!("{}", "-".repeat(62));
    println!(
        "  {:<32} {:>6} {:>10} {:>9}",
        "Theme", "Count", "Sentiment", "Share"
    );
    for entry in summary {
        println!(
            "  {:<32} {:>6} {:>10.2} {:>8.1}%",
            entry.theme, entry.count, entry.avg_sentiment, entry.percentage
        );
    }
    Ok(())
}

/// Project type distribution report.
pub fn cmd_report_types(
    settings: &Settings,
    store: &Store,
    min_confidence: Option<f64>,
) -> anyhow::Result<()> {
    let version = active_version(store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(store);

    println!("\n{}", style("Project Types").bold());
    println!("{}", "-".repeat(50));
    for entry in engine.project_type_distribution(&version, min_confidence)? {
        println!(
            "  {:<26} {:>6} {:>8.1}%",
            entry.project_type, entry.count, entry.percentage
        );
    }
    Ok(())
}

/// Theme co-occurrence report.
pub fn cmd_report_cooccurrence(
    settings: &Settings,
    store: &Store,
    min_confidence: Option<f64>,
) -> anyhow::Result<()> {
    let version = active_version(store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(store);

    println!("\n{}", style("Theme Co-occurrence").bold());
    println!("{}", "-".repeat(70));
    for pair in engine.theme_co_occurrence(&version, min_confidence)? {
        println!(
            "  {:<30} + {:<30} {:>4}",
            pair.first, pair.second, pair.count
        );
    }
    Ok(())
}

/// Quality flags and sentiment histogram report.
pub fn cmd_report_quality(
    settings: &Settings,
    store: &Store,
    min_confidence: Option<f64>,
) -> anyhow::Result<()> {
    let version = active_version(store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(store);
    let rollup = engine.quality_rollup(&version, min_confidence)?;

    println!("\n{}", style("Quality Rollup").bold());
    println!("{}", "-".repeat(50));
    println!("  Records:            {}", rollup.total);
    println!(
        "  Clear problem:      {:.1}%",
        rollup.clear_problem_rate * 100.0
    );
    println!(
        "  Clear solution:     {:.1}%",
        rollup.clear_solution_rate * 100.0
    );
    println!(
        "  Impact metrics:     {:.1}%",
        rollup.impact_metrics_rate * 100.0
    );
    println!("  PII flagged:        {}", rollup.pii_count);
    println!("  Average sentiment:  {:.2}", rollup.avg_sentiment);

    println!("\n  Sentiment histogram:");
    let max = rollup
        .sentiment_histogram
        .iter()
        .map(|b| b.count)
        .max()
        .unwrap_or(0)
        .max(1);
    for bucket in &rollup.sentiment_histogram {
        let width = (bucket.count * 30 / max) as usize;
        println!(
            "  [{:>4.1}, {:>4.1}) {:>5} {}",
            bucket.lo,
            bucket.hi,
            bucket.count,
            "█".repeat(width)
        );
    }
    Ok(())
}

/// Theme trend report.
pub fn cmd_report_trend(
    settings: &Settings,
    store: &Store,
    granularity: TrendGranularity,
    min_confidence: Option<f64>,
) -> anyhow::Result<()> {
    let version = active_version(store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(store);

    println!("\n{}", style("Theme Trend").bold());
    println!("{}", "-".repeat(62));
    for point in engine.theme_trend(&version, granularity, min_confidence)? {
        let change = match point.change_pct {
            Some(pct) => format!("{pct:+.1}%"),
            None => "-".to_string(),
        };
        println!(
            "  {:<32} {:<8} {:>5} {:>8}",
            point.theme, point.period, point.count, change
        );
    }
    Ok(())
}

/// Technology mention report.
pub fn cmd_report_technologies(
    settings: &Settings,
    store: &Store,
    theme: Option<&str>,
    min_confidence: Option<f64>,
    limit: usize,
) -> anyhow::Result<()> {
    let version = active_version(store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(store);

    match theme {
        Some(theme) => println!("\n{} in {}", style("Technologies").bold(), theme),
        None => println!("\n{}", style("Technologies").bold()),
    }
    println!("{}", "-".repeat(40));
    for entry in engine.technology_summary(&version, theme, min_confidence, limit)? {
        println!("  {:<28} {:>5}", entry.technology, entry.count);
    }
    Ok(())
}

/// Answer a templated question.
pub fn cmd_ask(
    settings: &Settings,
    question: &str,
    min_confidence: Option<f64>,
) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let version = active_version(&store)?;
    let min_confidence = threshold(settings, min_confidence);
    let engine = AggregationEngine::new(&store);
    let translator = QueryTranslator::new();

    match translator.answer(&engine, &version, min_confidence, question)? {
        QueryAnswer::TopThemes(themes) => {
            for entry in themes {
                println!(
                    "  {:<32} {:>5} ({:.1}%)",
                    entry.theme, entry.count, entry.percentage
                );
            }
        }
        QueryAnswer::TopProjects { theme, projects } => {
            println!("Top projects in {theme}:");
            for hit in projects {
                println!(
                    "  {} (confidence {:.2}, sentiment {:+.2})",
                    hit.title, hit.theme_confidence, hit.sentiment_score
                );
                if !hit.summary.is_empty() {
                    println!("    {}", hit.summary);
                }
            }
        }
        QueryAnswer::ThemeCount { themes, count } => {
            println!("{} projects in {}", count, themes.join(" and "));
        }
        QueryAnswer::AverageSentiment {
            theme,
            average,
            count,
        } => match average {
            Some(avg) => println!("Average sentiment in {theme}: {avg:.2} across {count} projects"),
            None => println!("No projects found in {theme}"),
        },
        QueryAnswer::Technologies {
            theme,
            technologies,
        } => {
            println!("Technologies used in {theme}:");
            for entry in technologies {
                println!("  {:<28} {:>5}", entry.technology, entry.count);
            }
        }
        QueryAnswer::TopProjectTypes(types) => {
            for entry in types {
                println!(
                    "  {:<26} {:>5} ({:.1}%)",
                    entry.project_type, entry.count, entry.percentage
                );
            }
        }
    }
    Ok(())
}

/// List permanently failed extractions.
pub fn cmd_failures(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let version = active_version(&store)?;
    let failures = store.list_failed_extractions(&version)?;

    if failures.is_empty() {
        println!("{} No failed extractions", style("✓").green());
        return Ok(());
    }

    println!("\n{}", style("Failed Extractions").bold());
    println!("{}", "-".repeat(70));
    for failure in failures {
        println!(
            "  {} retries={} {}",
            short_fingerprint(&failure.fingerprint),
            failure.retry_count,
            style(&failure.error).red()
        );
        if let Some(raw) = &failure.raw_response {
            let preview: String = raw.chars().take(120).collect();
            println!("    payload: {preview}");
        }
    }
    Ok(())
}

/// Export extraction records to NDJSON or CSV.
pub fn cmd_export(
    settings: &Settings,
    format: ExportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let version = active_version(&store)?;
    let extractions = store.list_extractions(&version)?;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        ExportFormat::Ndjson => {
            for extraction in &extractions {
                serde_json::to_writer(&mut writer, extraction)?;
                writeln!(writer)?;
            }
        }
        ExportFormat::Csv => {
            writeln!(
                writer,
                "narrative_id,fingerprint,themes,theme_confidence,project_type,\
                 sentiment_score,enthusiasm,low_confidence,summary"
            )?;
            for e in &extractions {
                writeln!(
                    writer,
                    "{},{},{},{},{},{},{},{},{}",
                    csv_escape(&e.narrative_id),
                    csv_escape(&e.fingerprint),
                    csv_escape(&e.themes.join(";")),
                    e.theme_confidence,
                    e.project_type.as_str(),
                    e.sentiment_score,
                    e.enthusiasm.as_str(),
                    e.low_confidence,
                    csv_escape(&e.summary),
                )?;
            }
        }
    }

    if let Some(path) = output {
        eprintln!(
            "{} Exported {} records to {}",
            style("✓").green(),
            extractions.len(),
            path.display()
        );
    }
    Ok(())
}

/// Quote a CSV field when it contains separators, quotes or newlines.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
