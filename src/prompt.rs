//! Prompt rendering for narrative extraction.
//!
//! Rendering is a pure function of the narrative fields and the prompt
//! version: the same inputs always produce byte-identical output, so the
//! extraction cache key faithfully reflects what would be asked.

use crate::models::{Narrative, PromptVersion};

/// Name of the built-in prompt version seeded at init.
pub const DEFAULT_PROMPT_VERSION: &str = "v2";

/// Default generation temperature. Extraction wants near-deterministic output.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default response token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Closed theme taxonomy rendered into every extraction prompt.
///
/// The model is instructed to choose only from these labels; the validator
/// accepts whatever comes back structurally, so taxonomy drift shows up in
/// aggregations rather than as hard failures.
pub const THEME_TAXONOMY: &[(&str, &str)] = &[
    (
        "artificial_intelligence_ml",
        "Machine learning, AI models, computer vision, NLP, or generative AI",
    ),
    (
        "healthcare_medical",
        "Health, medicine, diagnostics, patient care, or medical research",
    ),
    (
        "education_learning",
        "Teaching, learning tools, tutoring, or educational content",
    ),
    (
        "climate_sustainability",
        "Climate, energy, recycling, conservation, or environmental impact",
    ),
    (
        "finance_fintech",
        "Payments, banking, investing, budgeting, or financial inclusion",
    ),
    (
        "accessibility_inclusion",
        "Assistive technology or inclusion of underserved groups",
    ),
    (
        "social_community",
        "Social networks, community organizing, or civic engagement",
    ),
    (
        "productivity_tools",
        "Workflow, collaboration, automation, or developer tooling",
    ),
    (
        "entertainment_gaming",
        "Games, media, music, or creative entertainment",
    ),
    (
        "security_privacy",
        "Security, privacy protection, fraud detection, or identity",
    ),
    (
        "agriculture_food",
        "Farming, food supply, nutrition, or food waste",
    ),
    (
        "transportation_mobility",
        "Transit, logistics, navigation, or vehicle technology",
    ),
];

/// Default instruction template for the built-in prompt version.
pub const DEFAULT_INSTRUCTION: &str = r#"You are analyzing a project submission to extract structured data from the narrative.

**Project Information:**
- Title: {title}
- Event: {event}
- Technologies Used: {technologies}
- Narrative: {narrative}

**Your Task:**
Extract structured information from this project narrative and return ONLY valid JSON matching this schema:

{
  "themes": [list of applicable themes from the taxonomy below],
  "theme_confidence": float from 0.0 to 1.0,
  "project_type": "one of: mobile_app, web_app, api_backend, game, dashboard_visualization, browser_extension, desktop_app, cli_tool, hardware_device, chatbot, platform_marketplace",
  "use_cases": [short phrases describing what the project does],
  "target_audience": [who this project is for],
  "technologies_mentioned": [technologies mentioned in the narrative, normalized],
  "sentiment_score": float from -1.0 to 1.0,
  "enthusiasm_level": "low, neutral, or high",
  "summary_200": "concise summary in 200 chars or less",
  "key_innovation": "main innovation or unique aspect",
  "problem_addressed": "what problem does this solve",
  "solution_approach": "how does it solve the problem",
  "has_clear_problem": true/false,
  "has_clear_solution": true/false,
  "has_impact_metrics": true/false,
  "contains_pii": true/false (check for emails, phone numbers, addresses)
}

**Theme Taxonomy (choose all that apply):**
{taxonomy}

**Guidelines:**
1. Only use themes from the taxonomy above
2. Be conservative with theme selection - only include if clearly relevant
3. Extract actual use cases mentioned, not generic descriptions
4. Normalize technology names (e.g., "react.js" becomes "react")
5. Sentiment should reflect the tone and enthusiasm in the narrative
6. If information is not available, use empty strings or empty arrays

Return ONLY the JSON object, no additional text or markdown formatting."#;

/// Render the taxonomy as "label: description" lines.
fn render_taxonomy() -> String {
    THEME_TAXONOMY
        .iter()
        .map(|(label, description)| format!("- {label}: {description}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the extraction request for a narrative under a prompt version.
pub fn render_prompt(narrative: &Narrative, version: &PromptVersion) -> String {
    version
        .instruction
        .replace("{title}", narrative.title.trim())
        .replace(
            "{event}",
            narrative.event.as_deref().unwrap_or("N/A").trim(),
        )
        .replace(
            "{technologies}",
            &if narrative.technologies.is_empty() {
                "N/A".to_string()
            } else {
                narrative.technologies.join(", ")
            },
        )
        .replace("{narrative}", narrative.text.trim())
        .replace("{taxonomy}", &render_taxonomy())
}

/// The built-in prompt version seeded into a fresh store.
pub fn default_prompt_version() -> PromptVersion {
    PromptVersion {
        version: DEFAULT_PROMPT_VERSION.to_string(),
        instruction: DEFAULT_INSTRUCTION.to_string(),
        temperature: DEFAULT_TEMPERATURE,
        max_tokens: DEFAULT_MAX_TOKENS,
        active: true,
        created_at: chrono::Utc::now(),
    }
}
