use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChecklistError {
    #[error("Unknown checklist type: {0}")]
    UnknownType(String),
    #[error("Failed to parse template for {slug}: {source}")]
    Parse {
        slug: String,
        source: serde_json::Error,
    },
    #[error("Invalid template for {slug}: {reason}")]
    Invalid { slug: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecklistType {
    pub slug: &'static str,
    pub display_name: &'static str,
    /// Three-character code that is never handed out as a session key.
    pub reserved_key: &'static str,
    template: &'static str,
}

pub const DEFAULT_TYPE: &str = "camtasia";

const KNOWN_TYPES: [ChecklistType; 7] = [
    ChecklistType {
        slug: "word",
        display_name: "Word",
        reserved_key: "WRD",
        template: include_str!("../templates/word.json"),
    },
    ChecklistType {
        slug: "powerpoint",
        display_name: "PowerPoint",
        reserved_key: "PPT",
        template: include_str!("../templates/powerpoint.json"),
    },
    ChecklistType {
        slug: "excel",
        display_name: "Excel",
        reserved_key: "XLS",
        template: include_str!("../templates/excel.json"),
    },
    ChecklistType {
        slug: "docs",
        display_name: "Google Docs",
        reserved_key: "DOC",
        template: include_str!("../templates/docs.json"),
    },
    ChecklistType {
        slug: "slides",
        display_name: "Google Slides",
        reserved_key: "SLD",
        template: include_str!("../templates/slides.json"),
    },
    ChecklistType {
        slug: "camtasia",
        display_name: "Camtasia",
        reserved_key: "CAM",
        template: include_str!("../templates/camtasia.json"),
    },
    ChecklistType {
        slug: "dojo",
        display_name: "Dojo",
        reserved_key: "DJO",
        template: include_str!("../templates/dojo.json"),
    },
];

pub fn known_types() -> &'static [ChecklistType] {
    &KNOWN_TYPES
}

pub fn find_type(slug: &str) -> Option<&'static ChecklistType> {
    let needle = slug.trim();
    KNOWN_TYPES.iter().find(|ty| ty.slug == needle)
}

pub fn is_known_type(slug: &str) -> bool {
    find_type(slug).is_some()
}

/// Maps a legacy display name ("PowerPoint", "Google Docs") or a slug to a known slug.
pub fn type_from_display_name(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    KNOWN_TYPES
        .iter()
        .find(|ty| ty.display_name.to_lowercase() == needle || ty.slug == needle)
        .map(|ty| ty.slug)
}

pub fn reserved_keys() -> Vec<&'static str> {
    KNOWN_TYPES.iter().map(|ty| ty.reserved_key).collect()
}

pub fn is_reserved_key(key: &str) -> bool {
    KNOWN_TYPES
        .iter()
        .any(|ty| ty.reserved_key.eq_ignore_ascii_case(key.trim()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateTask {
    pub task: String,
    #[serde(default)]
    pub info_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCheckpoint {
    pub number: u32,
    pub caption: String,
    pub tasks: Vec<TemplateTask>,
}

impl TemplateCheckpoint {
    pub fn section_id(&self) -> String {
        checkpoint_section_id(self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub slug: String,
    pub title: String,
    pub checkpoints: Vec<TemplateCheckpoint>,
}

pub fn load_template(slug: &str) -> Result<ChecklistTemplate, ChecklistError> {
    let ty = find_type(slug).ok_or_else(|| ChecklistError::UnknownType(slug.to_string()))?;
    let template: ChecklistTemplate =
        serde_json::from_str(ty.template).map_err(|source| ChecklistError::Parse {
            slug: ty.slug.to_string(),
            source,
        })?;
    validate_template(&template)?;
    Ok(template)
}

fn validate_template(template: &ChecklistTemplate) -> Result<(), ChecklistError> {
    let invalid = |reason: String| ChecklistError::Invalid {
        slug: template.slug.clone(),
        reason,
    };
    if template.checkpoints.is_empty() {
        return Err(invalid("no checkpoints".to_string()));
    }
    for (idx, checkpoint) in template.checkpoints.iter().enumerate() {
        let expected = idx as u32 + 1;
        if checkpoint.number != expected {
            return Err(invalid(format!(
                "checkpoint {} is numbered {}",
                expected, checkpoint.number
            )));
        }
        if checkpoint.tasks.iter().any(|task| task.task.trim().is_empty()) {
            return Err(invalid(format!("checkpoint {} has an empty task", expected)));
        }
    }
    Ok(())
}

pub fn row_id(checkpoint: u32, index: usize) -> String {
    format!("{}.{}", checkpoint, index)
}

pub fn checkpoint_section_id(checkpoint: u32) -> String {
    format!("checkpoint-{}", checkpoint)
}

pub fn notes_widget_id(row: &str) -> String {
    format!("textarea-{}", row)
}

pub fn status_widget_id(row: &str) -> String {
    format!("status-{}", row)
}

pub fn restart_widget_id(row: &str) -> String {
    format!("reset-{}", row)
}

pub fn task_widget_id(row: &str) -> String {
    format!("task-{}", row)
}

pub fn delete_widget_id(row: &str) -> String {
    format!("delete-{}", row)
}

/// Splits a row id like `"2.4"` into its checkpoint number and row index.
pub fn parse_row_id(row: &str) -> Option<(u32, usize)> {
    let (checkpoint, index) = row.trim().split_once('.')?;
    let checkpoint = checkpoint.parse::<u32>().ok()?;
    let index = index.parse::<usize>().ok()?;
    if checkpoint == 0 || index == 0 {
        return None;
    }
    Some((checkpoint, index))
}
