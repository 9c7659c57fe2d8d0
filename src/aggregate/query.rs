//! Natural-language question templates over the aggregation engine.
//!
//! A small closed set of question shapes maps onto parameterized aggregation
//! calls. Anything outside the set is rejected with an unsupported-query
//! error rather than guessed at.

use regex::Regex;
use thiserror::Error;

use super::{AggregationEngine, ProjectHit, TechCount, ThemeSummary, TypeCount};
use crate::repository::RepositoryError;

/// Errors from query translation.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(
        "Unsupported query: {0}. Recognized shapes: \
         'top N themes', 'top N projects in theme X', \
         'how many projects in theme X [and Y]', \
         'average sentiment in theme X', 'technologies used in theme X', \
         'top project types'"
    )]
    Unsupported(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Structured answer to a recognized question.
#[derive(Debug)]
pub enum QueryAnswer {
    TopThemes(Vec<ThemeSummary>),
    TopProjects {
        theme: String,
        projects: Vec<ProjectHit>,
    },
    ThemeCount {
        themes: Vec<String>,
        count: u64,
    },
    AverageSentiment {
        theme: String,
        average: Option<f64>,
        count: u64,
    },
    Technologies {
        theme: String,
        technologies: Vec<TechCount>,
    },
    TopProjectTypes(Vec<TypeCount>),
}

/// Translator from question templates to aggregation calls.
pub struct QueryTranslator {
    top_themes: Regex,
    top_projects: Regex,
    theme_count: Regex,
    avg_sentiment: Regex,
    technologies: Regex,
    project_types: Regex,
}

impl QueryTranslator {
    pub fn new() -> Self {
        Self {
            top_themes: Regex::new(r"(?i)^\s*top\s+(\d+)\s+themes\s*\??\s*$").unwrap(),
            top_projects: Regex::new(
                r#"(?i)^\s*top\s+(\d+)\s+projects?\s+in\s+(?:the\s+)?(?:theme\s+)?"?([\w ]+?)"?\s*\??\s*$"#,
            )
            .unwrap(),
            theme_count: Regex::new(
                r#"(?i)^\s*(?:how\s+many|count\s+of)\s+projects?\s+(?:are\s+)?in\s+(?:themes?\s+)?"?([\w ]+?)"?(?:\s+and\s+"?([\w ]+?)"?)?\s*\??\s*$"#,
            )
            .unwrap(),
            avg_sentiment: Regex::new(
                r#"(?i)^\s*(?:what\s+is\s+the\s+)?average\s+sentiment\s+(?:in|for|of)\s+(?:the\s+)?(?:theme\s+)?"?([\w ]+?)"?(?:\s+projects?)?\s*\??\s*$"#,
            )
            .unwrap(),
            technologies: Regex::new(
                r#"(?i)^\s*(?:what\s+|which\s+)?technologies\s+(?:are\s+)?used\s+in\s+(?:the\s+)?(?:theme\s+)?"?([\w ]+?)"?(?:\s+projects?)?\s*\??\s*$"#,
            )
            .unwrap(),
            project_types: Regex::new(r"(?i)^\s*top\s+project\s+types\s*\??\s*$").unwrap(),
        }
    }

    /// Answer a question against the given engine, or reject it.
    pub fn answer(
        &self,
        engine: &AggregationEngine,
        version: &str,
        min_confidence: f64,
        question: &str,
    ) -> Result<QueryAnswer, QueryError> {
        if let Some(caps) = self.top_themes.captures(question) {
            let n: usize = caps[1].parse().unwrap_or(10);
            let mut summary = engine.theme_summary(version, min_confidence)?;
            summary.truncate(n);
            return Ok(QueryAnswer::TopThemes(summary));
        }

        if let Some(caps) = self.top_projects.captures(question) {
            let n: usize = caps[1].parse().unwrap_or(10);
            let theme = normalize_theme(&caps[2]);
            let projects = engine.top_projects_in_theme(version, &theme, min_confidence, n)?;
            return Ok(QueryAnswer::TopProjects { theme, projects });
        }

        if let Some(caps) = self.theme_count.captures(question) {
            let mut themes = vec![normalize_theme(&caps[1])];
            if let Some(second) = caps.get(2) {
                themes.push(normalize_theme(second.as_str()));
            }
            let count = engine.count_in_themes(version, &themes, min_confidence)?;
            return Ok(QueryAnswer::ThemeCount { themes, count });
        }

        if let Some(caps) = self.avg_sentiment.captures(question) {
            let theme = normalize_theme(&caps[1]);
            let entry = engine
                .theme_summary(version, min_confidence)?
                .into_iter()
                .find(|s| s.theme == theme);
            return Ok(QueryAnswer::AverageSentiment {
                theme,
                average: entry.as_ref().map(|s| s.avg_sentiment),
                count: entry.map(|s| s.count).unwrap_or(0),
            });
        }

        if let Some(caps) = self.technologies.captures(question) {
            let theme = normalize_theme(&caps[1]);
            let technologies =
                engine.technology_summary(version, Some(&theme), min_confidence, 25)?;
            return Ok(QueryAnswer::Technologies {
                theme,
                technologies,
            });
        }

        if self.project_types.is_match(question) {
            return Ok(QueryAnswer::TopProjectTypes(
                engine.project_type_distribution(version, min_confidence)?,
            ));
        }

        Err(QueryError::Unsupported(question.trim().to_string()))
    }
}

impl Default for QueryTranslator {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a spoken theme ("healthcare medical") onto its taxonomy label.
fn normalize_theme(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}
