use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::{RowStatus, StatusFlag, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SidePanel {
    #[serde(default = "expanded_default")]
    pub expanded: bool,
    #[serde(default)]
    pub active_section: String,
}

fn expanded_default() -> bool {
    true
}

impl Default for SidePanel {
    fn default() -> Self {
        Self {
            expanded: true,
            active_section: String::new(),
        }
    }
}

/// A task row added by the user at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManualRow {
    pub id: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub status_flag: StatusFlag,
    #[serde(default = "manual_default")]
    pub is_manual: bool,
    #[serde(default)]
    pub info_link: Option<String>,
}

fn manual_default() -> bool {
    true
}

impl ManualRow {
    pub fn row_status(&self) -> RowStatus {
        RowStatus::new(self.status, self.status_flag)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default)]
    pub side_panel: SidePanel,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    #[serde(default)]
    pub status_buttons: BTreeMap<String, RowStatus>,
    #[serde(default)]
    pub restart_buttons: BTreeMap<String, bool>,
    #[serde(default, alias = "principleRows")]
    pub checkpoint_rows: BTreeMap<String, Vec<ManualRow>>,
}

impl StateDocument {
    pub fn manual_row_count(&self) -> usize {
        self.checkpoint_rows.values().map(Vec::len).sum()
    }

    /// Returns the first duplicated manual-row id, if any checkpoint repeats one.
    pub fn duplicate_manual_row(&self) -> Option<&str> {
        for rows in self.checkpoint_rows.values() {
            for (idx, row) in rows.iter().enumerate() {
                if rows[..idx].iter().any(|other| other.id == row.id) {
                    return Some(row.id.as_str());
                }
            }
        }
        None
    }
}
