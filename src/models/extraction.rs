//! Extraction attempt and structured extraction models.
//!
//! An attempt is one unit of extraction work per (fingerprint, prompt version)
//! pair. Attempts transition status but are never deleted; they double as the
//! audit log for what was asked of the model and what came back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of an extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One record of requesting structured data for a fingerprint under a prompt
/// version. The (fingerprint, prompt_version) pair is the true dedup key.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub fingerprint: String,
    pub prompt_version: String,
    /// Model identifier the request was (or will be) issued against.
    pub model: String,
    /// Raw response payload, stored verbatim. Opaque until validated.
    pub raw_response: Option<String>,
    pub status: AttemptStatus,
    pub error: Option<String>,
    /// Retries consumed so far; persisted so a crashed run resumes here.
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Closed enumeration of project types the extraction schema recognizes.
///
/// Unknown values from the model map to `Other` rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    MobileApp,
    WebApp,
    ApiBackend,
    Game,
    DashboardVisualization,
    BrowserExtension,
    DesktopApp,
    CliTool,
    HardwareDevice,
    Chatbot,
    PlatformMarketplace,
    Other,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MobileApp => "mobile_app",
            Self::WebApp => "web_app",
            Self::ApiBackend => "api_backend",
            Self::Game => "game",
            Self::DashboardVisualization => "dashboard_visualization",
            Self::BrowserExtension => "browser_extension",
            Self::DesktopApp => "desktop_app",
            Self::CliTool => "cli_tool",
            Self::HardwareDevice => "hardware_device",
            Self::Chatbot => "chatbot",
            Self::PlatformMarketplace => "platform_marketplace",
            Self::Other => "other",
        }
    }

    /// Parse a model-reported type, falling back to `Other` for anything
    /// outside the closed set.
    pub fn parse_or_other(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "mobile_app" => Self::MobileApp,
            "web_app" => Self::WebApp,
            "api_backend" => Self::ApiBackend,
            "game" => Self::Game,
            "dashboard_visualization" => Self::DashboardVisualization,
            "browser_extension" => Self::BrowserExtension,
            "desktop_app" => Self::DesktopApp,
            "cli_tool" => Self::CliTool,
            "hardware_device" => Self::HardwareDevice,
            "chatbot" => Self::Chatbot,
            "platform_marketplace" => Self::PlatformMarketplace,
            _ => Self::Other,
        }
    }
}

/// Reported enthusiasm level in the narrative's tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnthusiasmLevel {
    Low,
    Neutral,
    High,
}

impl EnthusiasmLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Neutral => "neutral",
            Self::High => "high",
        }
    }

    pub fn parse_or_neutral(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Neutral,
        }
    }
}

/// The accepted, typed result of an extraction attempt.
///
/// Immutable after creation; re-extraction creates a new record under a new
/// prompt version instead of mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredExtraction {
    /// Database row id (0 before insert).
    #[serde(skip)]
    pub id: i64,
    /// External id of the representative source narrative.
    pub narrative_id: String,
    pub fingerprint: String,
    pub prompt_version: String,
    pub themes: Vec<String>,
    /// Model-reported confidence in the theme extraction, in [0, 1].
    pub theme_confidence: f64,
    pub project_type: ProjectType,
    pub use_cases: Vec<String>,
    pub target_audience: Vec<String>,
    pub technologies: Vec<String>,
    /// Sentiment in [-1, 1].
    pub sentiment_score: f64,
    pub enthusiasm: EnthusiasmLevel,
    pub summary: String,
    pub key_innovation: String,
    pub problem_addressed: String,
    pub solution_approach: String,
    pub has_clear_problem: bool,
    pub has_clear_solution: bool,
    pub has_impact_metrics: bool,
    pub contains_pii: bool,
    /// Character length of the original narrative text.
    pub narrative_length: i64,
    /// Set when theme_confidence fell below the acceptance threshold.
    /// The record is kept either way; aggregations filter at query time.
    pub low_confidence: bool,
    pub processed_at: DateTime<Utc>,
}

/// Terminal record for an attempt that exhausted retries or failed
/// validation irrecoverably. Kept for manual triage.
#[derive(Debug, Clone)]
pub struct FailedExtraction {
    pub fingerprint: String,
    pub prompt_version: String,
    pub raw_response: Option<String>,
    pub error: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
}

/// A named, versioned extraction prompt configuration.
///
/// Exactly one version is active at a time; activating a new version re-opens
/// every fingerprint for re-processing under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub version: String,
    /// Instruction template. Supports {title}, {event}, {technologies},
    /// {narrative} and {taxonomy} placeholders.
    pub instruction: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_status_round_trip() {
        for status in [
            AttemptStatus::Pending,
            AttemptStatus::Completed,
            AttemptStatus::Failed,
        ] {
            assert_eq!(AttemptStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(AttemptStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_project_type_fallback() {
        assert_eq!(ProjectType::parse_or_other("mobile_app"), ProjectType::MobileApp);
        assert_eq!(ProjectType::parse_or_other("Web_App"), ProjectType::WebApp);
        assert_eq!(ProjectType::parse_or_other("hologram"), ProjectType::Other);
        assert_eq!(ProjectType::parse_or_other(""), ProjectType::Other);
    }

    #[test]
    fn test_enthusiasm_fallback() {
        assert_eq!(EnthusiasmLevel::parse_or_neutral("HIGH"), EnthusiasmLevel::High);
        assert_eq!(EnthusiasmLevel::parse_or_neutral("meh"), EnthusiasmLevel::Neutral);
    }
}
