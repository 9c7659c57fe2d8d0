//! Aggregation engine over the extraction store.
//!
//! Multi-valued fields (themes, technologies) are aggregated with explode
//! semantics: one contribution per element, never more than one contribution
//! per record within a single element's bucket. The exploding is centralized
//! in the SQL fragments here so every aggregation applies identical rules.
//!
//! Every operation takes a minimum confidence threshold and is recomputed
//! from the store on each call; there is no incremental state.

mod query;

pub use query::{QueryAnswer, QueryError, QueryTranslator};

use std::collections::BTreeMap;

use rusqlite::params;

use crate::repository::{Result, Store};

/// Distinct (record, theme) pairs above the confidence floor.
/// DISTINCT guards against a model emitting a duplicated theme label.
const EXPLODED_THEMES: &str = "SELECT DISTINCT e.id, j.value AS theme, e.sentiment_score
     FROM extractions e, json_each(e.themes) j
     WHERE e.prompt_version = ?1 AND e.theme_confidence >= ?2";

/// Fixed sentiment histogram bucket edges.
pub const SENTIMENT_BUCKET_EDGES: [f64; 6] = [-1.0, -0.6, -0.2, 0.2, 0.6, 1.0];

/// Per-theme distribution entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeSummary {
    pub theme: String,
    pub count: u64,
    pub avg_sentiment: f64,
    /// Share of qualifying records carrying this theme, in percent.
    pub percentage: f64,
}

/// Unordered theme pair co-occurrence count.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemePair {
    pub first: String,
    pub second: String,
    pub count: u64,
}

/// Time bucketing granularity for trend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TrendGranularity {
    Month,
    Quarter,
    Year,
}

/// One (theme, period) trend point.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub theme: String,
    /// Period label: "2025-03", "2025-Q1" or "2025".
    pub period: String,
    pub count: u64,
    /// Percentage change versus the immediately preceding calendar period;
    /// None when that period had zero records.
    pub change_pct: Option<f64>,
}

/// Sentiment histogram bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentBucket {
    pub lo: f64,
    pub hi: f64,
    pub count: u64,
}

/// Boolean quality flag fractions plus the sentiment histogram.
#[derive(Debug, Clone, Default)]
pub struct QualityRollup {
    pub total: u64,
    pub clear_problem_rate: f64,
    pub clear_solution_rate: f64,
    pub impact_metrics_rate: f64,
    pub pii_count: u64,
    pub avg_sentiment: f64,
    pub sentiment_histogram: Vec<SentimentBucket>,
}

/// Project type distribution entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCount {
    pub project_type: String,
    pub count: u64,
    pub percentage: f64,
}

/// Technology mention count.
#[derive(Debug, Clone, PartialEq)]
pub struct TechCount {
    pub technology: String,
    pub count: u64,
}

/// A project surfaced by a theme query.
#[derive(Debug, Clone)]
pub struct ProjectHit {
    pub narrative_id: String,
    pub title: String,
    pub theme_confidence: f64,
    pub sentiment_score: f64,
    pub summary: String,
}

/// Headline statistics for the extraction set.
#[derive(Debug, Clone, Default)]
pub struct SummaryStatistics {
    pub total_records: u64,
    pub avg_sentiment: f64,
    pub high_enthusiasm: u64,
    pub clear_problem: u64,
    pub pii_flagged: u64,
    pub top_theme: Option<String>,
}

/// Read-only aggregation engine over the analytics store.
pub struct AggregationEngine<'a> {
    store: &'a Store,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Count of records qualifying under the confidence floor.
    fn qualifying_total(&self, version: &str, min_confidence: f64) -> Result<u64> {
        let conn = self.store.connect()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM extractions
             WHERE prompt_version = ?1 AND theme_confidence >= ?2",
            params![version, min_confidence],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// Theme distribution: per-theme record count, average sentiment among
    /// members, and percentage of all qualifying records.
    pub fn theme_summary(&self, version: &str, min_confidence: f64) -> Result<Vec<ThemeSummary>> {
        let total = self.qualifying_total(version, min_confidence)?;
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT theme, COUNT(*), AVG(sentiment_score)
             FROM ({EXPLODED_THEMES})
             GROUP BY theme
             ORDER BY COUNT(*) DESC, theme"
        ))?;
        let summaries = stmt
            .query_map(params![version, min_confidence], |row| {
                let count = row.get::<_, i64>(1)? as u64;
                Ok(ThemeSummary {
                    theme: row.get(0)?,
                    count,
                    avg_sentiment: row.get(2)?,
                    percentage: if total > 0 {
                        count as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Unordered theme pair counts within the same record. Self-pairs are
    /// excluded by the strict ordering join.
    pub fn theme_co_occurrence(
        &self,
        version: &str,
        min_confidence: f64,
    ) -> Result<Vec<ThemePair>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(&format!(
            "WITH exploded AS ({EXPLODED_THEMES})
             SELECT a.theme, b.theme, COUNT(*)
             FROM exploded a
             JOIN exploded b ON a.id = b.id AND a.theme < b.theme
             GROUP BY a.theme, b.theme
             ORDER BY COUNT(*) DESC, a.theme, b.theme"
        ))?;
        let pairs = stmt
            .query_map(params![version, min_confidence], |row| {
                Ok(ThemePair {
                    first: row.get(0)?,
                    second: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    /// Per-theme counts bucketed by submission time, with period-over-period
    /// change. Records whose narrative has no submission timestamp are
    /// excluded.
    pub fn theme_trend(
        &self,
        version: &str,
        granularity: TrendGranularity,
        min_confidence: f64,
    ) -> Result<Vec<TrendPoint>> {
        let conn = self.store.connect()?;
        // Always bucket by month in SQL; coarser granularities fold below.
        let mut stmt = conn.prepare(
            "SELECT j.value, strftime('%Y-%m', n.submitted_at), COUNT(DISTINCT e.id)
             FROM extractions e
             JOIN narratives n ON n.id = e.narrative_id, json_each(e.themes) j
             WHERE e.prompt_version = ?1 AND e.theme_confidence >= ?2
               AND n.submitted_at IS NOT NULL
             GROUP BY j.value, strftime('%Y-%m', n.submitted_at)",
        )?;
        let rows = stmt
            .query_map(params![version, min_confidence], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // theme -> period -> count, folded to the requested granularity.
        let mut buckets: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for (theme, month, count) in rows {
            let period = fold_period(&month, granularity);
            *buckets
                .entry(theme)
                .or_default()
                .entry(period)
                .or_default() += count;
        }

        let mut points = Vec::new();
        for (theme, periods) in &buckets {
            for (period, count) in periods {
                let change_pct = previous_period(period, granularity)
                    .and_then(|prev| periods.get(&prev).copied())
                    .filter(|&prev_count| prev_count > 0)
                    .map(|prev_count| {
                        (*count as f64 - prev_count as f64) / prev_count as f64 * 100.0
                    });
                points.push(TrendPoint {
                    theme: theme.clone(),
                    period: period.clone(),
                    count: *count,
                    change_pct,
                });
            }
        }
        Ok(points)
    }

    /// Fractions of records with each quality flag true, plus the sentiment
    /// histogram over fixed bucket edges.
    pub fn quality_rollup(&self, version: &str, min_confidence: f64) -> Result<QualityRollup> {
        let conn = self.store.connect()?;
        let (total, problem, solution, impact, pii, avg_sentiment) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(AVG(has_clear_problem), 0.0),
                    COALESCE(AVG(has_clear_solution), 0.0),
                    COALESCE(AVG(has_impact_metrics), 0.0),
                    COALESCE(SUM(contains_pii), 0),
                    COALESCE(AVG(sentiment_score), 0.0)
             FROM extractions
             WHERE prompt_version = ?1 AND theme_confidence >= ?2",
            params![version, min_confidence],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)? as u64,
                    row.get::<_, f64>(5)?,
                ))
            },
        )?;

        let mut histogram: Vec<SentimentBucket> = SENTIMENT_BUCKET_EDGES
            .windows(2)
            .map(|edge| SentimentBucket {
                lo: edge[0],
                hi: edge[1],
                count: 0,
            })
            .collect();

        let mut stmt = conn.prepare(
            "SELECT sentiment_score FROM extractions
             WHERE prompt_version = ?1 AND theme_confidence >= ?2",
        )?;
        let scores = stmt
            .query_map(params![version, min_confidence], |row| row.get::<_, f64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for score in scores {
            // Upper edge inclusive on the last bucket so 1.0 lands somewhere.
            let idx = histogram
                .iter()
                .position(|b| score < b.hi)
                .unwrap_or(histogram.len() - 1);
            histogram[idx].count += 1;
        }

        Ok(QualityRollup {
            total,
            clear_problem_rate: problem,
            clear_solution_rate: solution,
            impact_metrics_rate: impact,
            pii_count: pii,
            avg_sentiment,
            sentiment_histogram: histogram,
        })
    }

    /// Record counts per project type.
    pub fn project_type_distribution(
        &self,
        version: &str,
        min_confidence: f64,
    ) -> Result<Vec<TypeCount>> {
        let total = self.qualifying_total(version, min_confidence)?;
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT project_type, COUNT(*) FROM extractions
             WHERE prompt_version = ?1 AND theme_confidence >= ?2
             GROUP BY project_type ORDER BY COUNT(*) DESC, project_type",
        )?;
        let counts = stmt
            .query_map(params![version, min_confidence], |row| {
                let count = row.get::<_, i64>(1)? as u64;
                Ok(TypeCount {
                    project_type: row.get(0)?,
                    count,
                    percentage: if total > 0 {
                        count as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Technology mention counts, optionally restricted to records carrying
    /// a theme.
    pub fn technology_summary(
        &self,
        version: &str,
        theme: Option<&str>,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<TechCount>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT tech, COUNT(*) FROM (
                 SELECT DISTINCT e.id, LOWER(t.value) AS tech
                 FROM extractions e, json_each(e.technologies) t
                 WHERE e.prompt_version = ?1 AND e.theme_confidence >= ?2
                   AND (?3 IS NULL OR EXISTS (
                        SELECT 1 FROM json_each(e.themes) th WHERE th.value = ?3))
             )
             GROUP BY tech ORDER BY COUNT(*) DESC, tech LIMIT ?4",
        )?;
        let counts = stmt
            .query_map(
                params![version, min_confidence, theme, limit as i64],
                |row| {
                    Ok(TechCount {
                        technology: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Highest-confidence projects carrying a theme.
    pub fn top_projects_in_theme(
        &self,
        version: &str,
        theme: &str,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<ProjectHit>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT e.narrative_id, n.title, e.theme_confidence, e.sentiment_score, e.summary
             FROM extractions e
             JOIN narratives n ON n.id = e.narrative_id
             WHERE e.prompt_version = ?1 AND e.theme_confidence >= ?2
               AND EXISTS (SELECT 1 FROM json_each(e.themes) j WHERE j.value = ?3)
             ORDER BY e.theme_confidence DESC, e.sentiment_score DESC, e.narrative_id
             LIMIT ?4",
        )?;
        let hits = stmt
            .query_map(
                params![version, min_confidence, theme, limit as i64],
                |row| {
                    Ok(ProjectHit {
                        narrative_id: row.get(0)?,
                        title: row.get(1)?,
                        theme_confidence: row.get(2)?,
                        sentiment_score: row.get(3)?,
                        summary: row.get(4)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Count of records carrying every listed theme.
    pub fn count_in_themes(
        &self,
        version: &str,
        themes: &[String],
        min_confidence: f64,
    ) -> Result<u64> {
        let conn = self.store.connect()?;
        let mut sql = String::from(
            "SELECT COUNT(*) FROM extractions e
             WHERE e.prompt_version = ?1 AND e.theme_confidence >= ?2",
        );
        for i in 0..themes.len() {
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM json_each(e.themes) j WHERE j.value = ?{})",
                i + 3
            ));
        }
        let mut stmt = conn.prepare(&sql)?;
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(version.to_string()), Box::new(min_confidence)];
        for theme in themes {
            query_params.push(Box::new(theme.clone()));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = stmt.query_row(param_refs.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Headline statistics over the qualifying extraction set.
    pub fn summary_statistics(
        &self,
        version: &str,
        min_confidence: f64,
    ) -> Result<SummaryStatistics> {
        let conn = self.store.connect()?;
        let (total, avg_sentiment, high, problem, pii) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(AVG(sentiment_score), 0.0),
                    COALESCE(SUM(CASE WHEN enthusiasm = 'high' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(has_clear_problem), 0),
                    COALESCE(SUM(contains_pii), 0)
             FROM extractions
             WHERE prompt_version = ?1 AND theme_confidence >= ?2",
            params![version, min_confidence],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)? as u64,
                    row.get::<_, i64>(3)? as u64,
                    row.get::<_, i64>(4)? as u64,
                ))
            },
        )?;
        let top_theme = self
            .theme_summary(version, min_confidence)?
            .into_iter()
            .next()
            .map(|s| s.theme);
        Ok(SummaryStatistics {
            total_records: total,
            avg_sentiment,
            high_enthusiasm: high,
            clear_problem: problem,
            pii_flagged: pii,
            top_theme,
        })
    }
}

/// Fold a "%Y-%m" month key into the requested period label.
fn fold_period(month: &str, granularity: TrendGranularity) -> String {
    match granularity {
        TrendGranularity::Month => month.to_string(),
        TrendGranularity::Quarter => {
            let (year, m) = split_month(month);
            format!("{year}-Q{}", (m - 1) / 3 + 1)
        }
        TrendGranularity::Year => split_month(month).0.to_string(),
    }
}

/// The calendar period immediately before the given label.
fn previous_period(period: &str, granularity: TrendGranularity) -> Option<String> {
    match granularity {
        TrendGranularity::Month => {
            let (year, month) = split_month(period);
            Some(if month == 1 {
                format!("{:04}-12", year - 1)
            } else {
                format!("{year:04}-{:02}", month - 1)
            })
        }
        TrendGranularity::Quarter => {
            let (year, quarter) = period.split_once("-Q")?;
            let year: i32 = year.parse().ok()?;
            let quarter: u32 = quarter.parse().ok()?;
            Some(if quarter == 1 {
                format!("{}-Q4", year - 1)
            } else {
                format!("{year}-Q{}", quarter - 1)
            })
        }
        TrendGranularity::Year => {
            let year: i32 = period.parse().ok()?;
            Some((year - 1).to_string())
        }
    }
}

fn split_month(month: &str) -> (i32, u32) {
    let (year, m) = month.split_once('-').unwrap_or((month, "1"));
    (
        year.parse().unwrap_or(1970),
        m.parse().unwrap_or(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::models::{
        EnthusiasmLevel, Narrative, ProjectType, StructuredExtraction,
    };

    fn seed(
        store: &Store,
        id: &str,
        themes: &[&str],
        confidence: f64,
        sentiment: f64,
        technologies: &[&str],
        month: u32,
    ) {
        store
            .insert_narrative(&Narrative {
                id: id.to_string(),
                title: format!("Project {id}"),
                text: format!("narrative text for {id}, long enough to matter"),
                technologies: Vec::new(),
                event: None,
                submitted_at: Some(Utc.with_ymd_and_hms(2025, month, 5, 9, 0, 0).unwrap()),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .insert_extraction(&StructuredExtraction {
                id: 0,
                narrative_id: id.to_string(),
                fingerprint: format!("fp-{id}"),
                prompt_version: "v2".to_string(),
                themes: themes.iter().map(|t| t.to_string()).collect(),
                theme_confidence: confidence,
                project_type: ProjectType::WebApp,
                use_cases: Vec::new(),
                target_audience: Vec::new(),
                technologies: technologies.iter().map(|t| t.to_string()).collect(),
                sentiment_score: sentiment,
                enthusiasm: EnthusiasmLevel::Neutral,
                summary: String::new(),
                key_innovation: String::new(),
                problem_addressed: String::new(),
                solution_approach: String::new(),
                has_clear_problem: true,
                has_clear_solution: false,
                has_impact_metrics: false,
                contains_pii: false,
                narrative_length: 50,
                low_confidence: confidence < 0.6,
                processed_at: Utc::now(),
            })
            .unwrap();
    }

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_theme_summary_explodes_without_double_counting() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha", "beta"], 0.9, 0.5, &[], 3);
        seed(&store, "s2", &["alpha"], 0.9, -0.5, &[], 4);
        seed(&store, "s3", &["beta", "gamma"], 0.4, 0.0, &[], 3);

        let engine = AggregationEngine::new(&store);
        let summary = engine.theme_summary("v2", 0.6).unwrap();

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].theme, "alpha");
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].avg_sentiment, 0.0);
        assert_eq!(summary[0].percentage, 100.0);
        assert_eq!(summary[1].theme, "beta");
        assert_eq!(summary[1].count, 1);
        assert_eq!(summary[1].percentage, 50.0);
    }

    #[test]
    fn test_theme_summary_ignores_duplicate_labels() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha", "alpha"], 0.9, 0.2, &[], 3);

        let engine = AggregationEngine::new(&store);
        let summary = engine.theme_summary("v2", 0.6).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 1);
    }

    #[test]
    fn test_co_occurrence_excludes_self_pairs_and_low_confidence() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha", "beta"], 0.9, 0.5, &[], 3);
        seed(&store, "s2", &["alpha"], 0.9, 0.0, &[], 3);
        seed(&store, "s3", &["beta", "gamma"], 0.4, 0.0, &[], 3);

        let engine = AggregationEngine::new(&store);
        let pairs = engine.theme_co_occurrence("v2", 0.6).unwrap();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].first, "alpha");
        assert_eq!(pairs[0].second, "beta");
        assert_eq!(pairs[0].count, 1);
    }

    #[test]
    fn test_trend_change_is_none_after_empty_period() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha"], 0.9, 0.0, &[], 3);
        seed(&store, "s2", &["alpha"], 0.9, 0.0, &[], 4);
        seed(&store, "s3", &["alpha"], 0.9, 0.0, &[], 4);

        let engine = AggregationEngine::new(&store);
        let points = engine
            .theme_trend("v2", TrendGranularity::Month, 0.6)
            .unwrap();

        assert_eq!(points.len(), 2);
        let march = points.iter().find(|p| p.period == "2025-03").unwrap();
        assert_eq!(march.count, 1);
        assert_eq!(march.change_pct, None);
        let april = points.iter().find(|p| p.period == "2025-04").unwrap();
        assert_eq!(april.count, 2);
        assert_eq!(april.change_pct, Some(100.0));
    }

    #[test]
    fn test_quality_rollup_histogram_buckets() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha"], 0.9, -0.9, &[], 3);
        seed(&store, "s2", &["alpha"], 0.9, 0.0, &[], 3);
        seed(&store, "s3", &["alpha"], 0.9, 1.0, &[], 3);

        let engine = AggregationEngine::new(&store);
        let rollup = engine.quality_rollup("v2", 0.6).unwrap();

        assert_eq!(rollup.total, 3);
        assert_eq!(rollup.clear_problem_rate, 1.0);
        assert_eq!(rollup.clear_solution_rate, 0.0);
        assert_eq!(rollup.pii_count, 0);
        let counts: Vec<u64> = rollup.sentiment_histogram.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_count_in_themes_requires_all() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha", "beta"], 0.9, 0.0, &[], 3);
        seed(&store, "s2", &["alpha"], 0.9, 0.0, &[], 3);

        let engine = AggregationEngine::new(&store);
        let both = engine
            .count_in_themes("v2", &["alpha".to_string(), "beta".to_string()], 0.6)
            .unwrap();
        assert_eq!(both, 1);
        let alpha = engine
            .count_in_themes("v2", &["alpha".to_string()], 0.6)
            .unwrap();
        assert_eq!(alpha, 2);
    }

    #[test]
    fn test_technology_summary_theme_filter() {
        let (_dir, store) = test_store();
        seed(&store, "s1", &["alpha"], 0.9, 0.0, &["rust", "sqlite"], 3);
        seed(&store, "s2", &["beta"], 0.9, 0.0, &["rust"], 3);

        let engine = AggregationEngine::new(&store);
        let all = engine.technology_summary("v2", None, 0.6, 10).unwrap();
        assert_eq!(all[0].technology, "rust");
        assert_eq!(all[0].count, 2);

        let alpha_only = engine
            .technology_summary("v2", Some("alpha"), 0.6, 10)
            .unwrap();
        assert_eq!(alpha_only.len(), 2);
        assert!(alpha_only.iter().all(|t| t.count == 1));
    }

    #[test]
    fn test_fold_period() {
        assert_eq!(fold_period("2025-03", TrendGranularity::Month), "2025-03");
        assert_eq!(fold_period("2025-03", TrendGranularity::Quarter), "2025-Q1");
        assert_eq!(fold_period("2025-12", TrendGranularity::Quarter), "2025-Q4");
        assert_eq!(fold_period("2025-03", TrendGranularity::Year), "2025");
    }

    #[test]
    fn test_previous_period() {
        assert_eq!(
            previous_period("2025-03", TrendGranularity::Month).unwrap(),
            "2025-02"
        );
        assert_eq!(
            previous_period("2025-01", TrendGranularity::Month).unwrap(),
            "2024-12"
        );
        assert_eq!(
            previous_period("2025-Q1", TrendGranularity::Quarter).unwrap(),
            "2024-Q4"
        );
        assert_eq!(
            previous_period("2025", TrendGranularity::Year).unwrap(),
            "2024"
        );
    }
}
