//! Prompt version management commands.

use console::style;

use crate::config::Settings;

use super::open_store;

/// List registered prompt versions.
pub fn cmd_prompt_list(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let prompts = store.list_prompt_versions()?;

    if prompts.is_empty() {
        println!("No prompt versions registered. Run `narramine init` first.");
        return Ok(());
    }

    println!("\n{}", style("Prompt Versions").bold());
    println!("{}", "-".repeat(50));
    for prompt in prompts {
        let marker = if prompt.active {
            style("* active").green().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<12} temp={:<4} max_tokens={:<6} {}",
            prompt.version, prompt.temperature, prompt.max_tokens, marker
        );
    }
    Ok(())
}

/// Activate a prompt version. All fingerprints re-open under it.
pub fn cmd_prompt_activate(settings: &Settings, version: &str) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    store.activate_prompt(version)?;
    println!(
        "{} Activated prompt version {}. Previously processed narratives are eligible for re-extraction under it.",
        style("✓").green(),
        version
    );
    Ok(())
}
