// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt template rendering.
//!
//! Templates come from the `task_types` table and use `{{name}}`
//! placeholders. Unknown placeholders render empty so a template written
//! for a richer context degrades quietly.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use tq_core::{Project, Task};
use tq_storage::Store;

use crate::error::EngineError;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([a-z_]+)\}\}").expect("constant regex pattern is valid"));

/// Fallback when a task references an unknown type.
const BARE_TEMPLATE: &str = "# {{title}}\n\n{{body}}\n\n{{attachments}}\n{{history}}";

/// Interpolate `{{name}}` placeholders from the vars map. Unknown
/// placeholders become empty strings.
pub fn interpolate(template: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .to_string()
}

/// Render the full prompt for a task: type template plus project
/// instructions, memories, attachments, and compaction history.
pub async fn render_prompt(
    store: &Store,
    task: &Task,
    project: &Project,
) -> Result<String, EngineError> {
    let template = match store.get_task_type(&task.task_type).await? {
        Some(tt) => tt.prompt_template,
        None => {
            tracing::warn!(task_type = %task.task_type, "unknown task type, using bare template");
            BARE_TEMPLATE.to_string()
        }
    };

    let attachments = store.attachments_for_task(task.id).await?;
    let memories = store.memories_for_project(&project.name).await?;
    let history = store.latest_compaction_summary(task.id).await?;

    let mut vars = HashMap::new();
    vars.insert("project".to_string(), project.name.clone());
    vars.insert(
        "project_instructions".to_string(),
        project.prompt_instructions.clone(),
    );
    vars.insert("title".to_string(), task.title.clone());
    vars.insert("body".to_string(), task.body.clone());
    vars.insert(
        "memories".to_string(),
        memories
            .iter()
            .map(|m| format!("- {}", m.content))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    vars.insert(
        "attachments".to_string(),
        attachments
            .iter()
            .map(|a| format!("## {}\n\n{}", a.filename, a.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
    );
    vars.insert(
        "history".to_string(),
        history
            .map(|h| format!("Summary of the previous session:\n\n{}", h.content))
            .unwrap_or_default(),
    );

    Ok(interpolate(&template, &vars))
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
