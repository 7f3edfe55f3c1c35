use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Editor, Input, Select};

use crate::error::{AppError, Result};
use crate::workflow::checkpoint::{CheckpointName, Decision, HumanInput};

/// Characters of the proposed value shown before the menu.
const PREVIEW_CHARS: usize = 1500;

const OPTIONS: &[&str] = &[
    "Approve",
    "Edit",
    "Skip (clear this value)",
    "Abort the review",
];

/// Asks on the controlling terminal. Each prompt runs on the blocking pool.
pub struct ConsoleInput;

#[async_trait]
impl HumanInput for ConsoleInput {
    async fn ask(&self, checkpoint: CheckpointName, proposed: &str) -> Result<Decision> {
        let proposed = proposed.to_string();
        tokio::task::spawn_blocking(move || prompt(checkpoint, &proposed))
            .await
            .map_err(|e| AppError::HumanInput(format!("Prompt task failed: {e}")))?
    }
}

fn prompt(checkpoint: CheckpointName, proposed: &str) -> Result<Decision> {
    println!();
    println!("=== Checkpoint: {checkpoint} ===");
    println!("{}", preview(proposed));
    println!();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(checkpoint.prompt())
        .items(OPTIONS)
        .default(0)
        .interact()
        .map_err(|e| AppError::HumanInput(e.to_string()))?;

    match selection {
        0 => Ok(Decision::Approve),
        1 => edit(checkpoint, proposed).map(Decision::Edit),
        2 => Ok(Decision::OverrideSkip),
        _ => Ok(Decision::Abort),
    }
}

fn edit(checkpoint: CheckpointName, proposed: &str) -> Result<String> {
    if checkpoint != CheckpointName::TagReview {
        match Editor::new().extension(".md").edit(proposed) {
            Ok(Some(text)) => return Ok(text.trim().to_string()),
            Ok(None) => return Ok(proposed.to_string()),
            Err(e) => tracing::warn!(error = %e, "No editor available, reading a single line"),
        }
    }

    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(match checkpoint {
            CheckpointName::TagReview => "Tags (comma separated)",
            _ => "Replacement text",
        })
        .with_initial_text(proposed)
        .interact_text()
        .map(|text| text.trim().to_string())
        .map_err(|e| AppError::HumanInput(e.to_string()))
}

fn preview(text: &str) -> String {
    if text.is_empty() {
        return "(empty)".to_string();
    }
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("\n[... truncated for display]");
    cut
}
