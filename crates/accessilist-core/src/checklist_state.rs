use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::checklist::{
    checkpoint_section_id, load_template, notes_widget_id, parse_row_id, restart_widget_id, row_id,
    status_widget_id, ChecklistError, ChecklistTemplate,
};
use crate::state::{ManualRow, SidePanel, StateDocument};
use crate::status::{RowStatus, StatusCounts};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecklistStateError {
    #[error("Unknown task row: {0}")]
    UnknownRow(String),
    #[error("Unknown checkpoint: {0}")]
    UnknownCheckpoint(String),
    #[error("Task row {0} is not a manual row")]
    NotManual(String),
    #[error("Task row {0} is done and cannot be edited")]
    RowLocked(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub id: String,
    pub task: String,
    pub info_link: Option<String>,
    pub notes: String,
    pub status: RowStatus,
    pub restart_visible: bool,
    pub manual: bool,
}

impl TaskRow {
    fn from_manual(row: &ManualRow) -> Self {
        let status = row.row_status();
        Self {
            id: row.id.clone(),
            task: row.task.clone(),
            info_link: row.info_link.clone(),
            notes: row.notes.clone(),
            status,
            restart_visible: status.is_locked(),
            manual: true,
        }
    }

    fn to_manual(&self) -> ManualRow {
        ManualRow {
            id: self.id.clone(),
            task: self.task.clone(),
            notes: self.notes.clone(),
            status: self.status.state,
            status_flag: self.status.flag,
            is_manual: true,
            info_link: self.info_link.clone(),
        }
    }

    /// Notes (and the task text of manual rows) are read-only once done.
    pub fn is_editable(&self) -> bool {
        !self.status.is_locked()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointSection {
    pub number: u32,
    pub caption: String,
    pub rows: Vec<TaskRow>,
}

impl CheckpointSection {
    pub fn section_id(&self) -> String {
        checkpoint_section_id(self.number)
    }

    fn next_row_index(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|row| parse_row_id(&row.id).map(|(_, index)| index))
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// One step of a restore, in the order it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RestoreStep {
    ScrollTo { section: String },
    Notes { applied: usize },
    StatusButtons { applied: usize, locked: usize },
    RestartButtons { applied: usize },
    ManualRows { rendered: usize },
    SidePanel { expanded: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub steps: Vec<RestoreStep>,
    pub unknown_widgets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRow {
    pub id: String,
    pub checkpoint: u32,
    /// Manual row directly above the deleted one, if any.
    pub previous_row: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistState {
    pub type_slug: String,
    pub title: String,
    pub side_panel: SidePanel,
    pub checkpoints: Vec<CheckpointSection>,
}

#[derive(Default)]
struct PendingWidgets {
    notes: BTreeMap<String, String>,
    status: BTreeMap<String, RowStatus>,
    restart: BTreeMap<String, bool>,
}

impl ChecklistState {
    pub fn from_template(template: &ChecklistTemplate) -> Self {
        let checkpoints = template
            .checkpoints
            .iter()
            .map(|checkpoint| CheckpointSection {
                number: checkpoint.number,
                caption: checkpoint.caption.clone(),
                rows: checkpoint
                    .tasks
                    .iter()
                    .enumerate()
                    .map(|(idx, task)| TaskRow {
                        id: row_id(checkpoint.number, idx + 1),
                        task: task.task.clone(),
                        info_link: task.info_link.clone(),
                        notes: String::new(),
                        status: RowStatus::default(),
                        restart_visible: false,
                        manual: false,
                    })
                    .collect(),
            })
            .collect();
        Self {
            type_slug: template.slug.clone(),
            title: template.title.clone(),
            side_panel: SidePanel::default(),
            checkpoints,
        }
    }

    pub fn for_type(slug: &str) -> Result<Self, ChecklistError> {
        Ok(Self::from_template(&load_template(slug)?))
    }

    pub fn rows(&self) -> impl Iterator<Item = &TaskRow> {
        self.checkpoints.iter().flat_map(|checkpoint| checkpoint.rows.iter())
    }

    pub fn row(&self, id: &str) -> Option<&TaskRow> {
        self.rows().find(|row| row.id == id)
    }

    fn row_mut(&mut self, id: &str) -> Result<&mut TaskRow, ChecklistStateError> {
        self.checkpoints
            .iter_mut()
            .flat_map(|checkpoint| checkpoint.rows.iter_mut())
            .find(|row| row.id == id)
            .ok_or_else(|| ChecklistStateError::UnknownRow(id.to_string()))
    }

    fn row_by_widget_mut(&mut self, widget_id: &str, prefix: &str) -> Option<&mut TaskRow> {
        let row = widget_id.strip_prefix(prefix)?;
        self.row_mut(row).ok()
    }

    pub fn checkpoint(&self, number: u32) -> Option<&CheckpointSection> {
        self.checkpoints
            .iter()
            .find(|checkpoint| checkpoint.number == number)
    }

    pub fn summary(&self) -> StatusCounts {
        self.rows().map(|row| &row.status).collect()
    }

    /// Projects the tree onto a state document. Every row contributes a
    /// notes, status and restart entry; manual rows are also listed under
    /// their checkpoint in insertion order.
    pub fn collect(&self) -> StateDocument {
        let mut doc = StateDocument {
            side_panel: self.side_panel.clone(),
            ..StateDocument::default()
        };
        for checkpoint in &self.checkpoints {
            let mut manual = Vec::new();
            for row in &checkpoint.rows {
                doc.notes.insert(notes_widget_id(&row.id), row.notes.clone());
                doc.status_buttons
                    .insert(status_widget_id(&row.id), row.status);
                doc.restart_buttons
                    .insert(restart_widget_id(&row.id), row.restart_visible);
                if row.manual {
                    manual.push(row.to_manual());
                }
            }
            if !manual.is_empty() {
                doc.checkpoint_rows.insert(checkpoint.section_id(), manual);
            }
        }
        doc
    }

    /// Applies a stored document. The scroll target is settled first, then
    /// notes, statuses, restart controls, manual rows and finally the side
    /// panel. Entries for manual rows are held back until those rows exist.
    pub fn restore(&mut self, doc: &StateDocument) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut pending = PendingWidgets::default();

        let section = doc.side_panel.active_section.trim();
        if !section.is_empty() && self.has_section(section) {
            report.steps.push(RestoreStep::ScrollTo {
                section: section.to_string(),
            });
        }

        let mut applied = 0;
        for (widget, text) in &doc.notes {
            match self.row_by_widget_mut(widget, "textarea-") {
                Some(row) => {
                    row.notes = text.clone();
                    applied += 1;
                }
                None => {
                    pending.notes.insert(widget.clone(), text.clone());
                }
            }
        }
        report.steps.push(RestoreStep::Notes { applied });

        let mut applied = 0;
        let mut locked = 0;
        for (widget, status) in &doc.status_buttons {
            match self.row_by_widget_mut(widget, "status-") {
                Some(row) => {
                    row.status = *status;
                    applied += 1;
                    if status.is_locked() {
                        locked += 1;
                    }
                }
                None => {
                    pending.status.insert(widget.clone(), *status);
                }
            }
        }
        report
            .steps
            .push(RestoreStep::StatusButtons { applied, locked });

        let mut applied = 0;
        for (widget, visible) in &doc.restart_buttons {
            match self.row_by_widget_mut(widget, "reset-") {
                Some(row) => {
                    row.restart_visible = *visible;
                    applied += 1;
                }
                None => {
                    pending.restart.insert(widget.clone(), *visible);
                }
            }
        }
        report.steps.push(RestoreStep::RestartButtons { applied });

        let mut rendered = 0;
        for (section_id, rows) in &doc.checkpoint_rows {
            let Some(checkpoint) = self
                .checkpoints
                .iter_mut()
                .find(|checkpoint| checkpoint.section_id() == *section_id)
            else {
                report.unknown_widgets.push(section_id.clone());
                continue;
            };
            for manual in rows {
                if checkpoint.rows.iter().any(|row| row.id == manual.id) {
                    continue;
                }
                checkpoint.rows.push(TaskRow::from_manual(manual));
                rendered += 1;
            }
        }
        self.apply_pending(pending, &mut report);
        report.steps.push(RestoreStep::ManualRows { rendered });

        self.side_panel = doc.side_panel.clone();
        report.steps.push(RestoreStep::SidePanel {
            expanded: self.side_panel.expanded,
        });
        report
    }

    fn apply_pending(&mut self, pending: PendingWidgets, report: &mut RestoreReport) {
        for (widget, text) in pending.notes {
            match self.row_by_widget_mut(&widget, "textarea-") {
                Some(row) => row.notes = text,
                None => report.unknown_widgets.push(widget),
            }
        }
        for (widget, status) in pending.status {
            match self.row_by_widget_mut(&widget, "status-") {
                Some(row) => row.status = status,
                None => report.unknown_widgets.push(widget),
            }
        }
        for (widget, visible) in pending.restart {
            match self.row_by_widget_mut(&widget, "reset-") {
                Some(row) => row.restart_visible = visible,
                None => report.unknown_widgets.push(widget),
            }
        }
    }

    fn has_section(&self, section: &str) -> bool {
        self.checkpoints
            .iter()
            .any(|checkpoint| checkpoint.section_id() == section)
    }

    pub fn click_status(&mut self, id: &str) -> Result<RowStatus, ChecklistStateError> {
        let row = self.row_mut(id)?;
        row.status = row.status.click();
        row.restart_visible = row.status.is_locked();
        Ok(row.status)
    }

    pub fn input_notes(&mut self, id: &str, text: &str) -> Result<RowStatus, ChecklistStateError> {
        let row = self.row_mut(id)?;
        if !row.is_editable() {
            return Err(ChecklistStateError::RowLocked(id.to_string()));
        }
        row.notes = text.to_string();
        row.status = row.status.notes_changed(text);
        Ok(row.status)
    }

    pub fn input_task(&mut self, id: &str, text: &str) -> Result<(), ChecklistStateError> {
        let row = self.row_mut(id)?;
        if !row.manual {
            return Err(ChecklistStateError::NotManual(id.to_string()));
        }
        if !row.is_editable() {
            return Err(ChecklistStateError::RowLocked(id.to_string()));
        }
        row.task = text.to_string();
        Ok(())
    }

    pub fn reset_row(&mut self, id: &str) -> Result<(), ChecklistStateError> {
        let row = self.row_mut(id)?;
        row.status = RowStatus::reset();
        row.notes.clear();
        row.restart_visible = false;
        Ok(())
    }

    pub fn add_manual_row(
        &mut self,
        checkpoint: u32,
        task: &str,
    ) -> Result<String, ChecklistStateError> {
        let section = self
            .checkpoints
            .iter_mut()
            .find(|section| section.number == checkpoint)
            .ok_or_else(|| ChecklistStateError::UnknownCheckpoint(checkpoint_section_id(checkpoint)))?;
        let id = row_id(checkpoint, section.next_row_index());
        section.rows.push(TaskRow {
            id: id.clone(),
            task: task.trim().to_string(),
            info_link: None,
            notes: String::new(),
            status: RowStatus::default(),
            restart_visible: false,
            manual: true,
        });
        Ok(id)
    }

    /// Removes a manual row; the manual rows after it shift up one id slot.
    pub fn delete_manual_row(&mut self, id: &str) -> Result<DeletedRow, ChecklistStateError> {
        let (checkpoint, _) =
            parse_row_id(id).ok_or_else(|| ChecklistStateError::UnknownRow(id.to_string()))?;
        let section = self
            .checkpoints
            .iter_mut()
            .find(|section| section.number == checkpoint)
            .ok_or_else(|| ChecklistStateError::UnknownRow(id.to_string()))?;
        let position = section
            .rows
            .iter()
            .position(|row| row.id == id)
            .ok_or_else(|| ChecklistStateError::UnknownRow(id.to_string()))?;
        if !section.rows[position].manual {
            return Err(ChecklistStateError::NotManual(id.to_string()));
        }

        let slots: Vec<String> = section.rows[position..]
            .iter()
            .map(|row| row.id.clone())
            .collect();
        section.rows.remove(position);
        for (row, slot) in section.rows[position..].iter_mut().zip(slots) {
            row.id = slot;
        }

        let previous_row = section.rows[..position]
            .iter()
            .rev()
            .find(|row| row.manual)
            .map(|row| row.id.clone());
        Ok(DeletedRow {
            id: id.to_string(),
            checkpoint,
            previous_row,
        })
    }

    pub fn toggle_side_panel(&mut self) -> bool {
        self.side_panel.expanded = !self.side_panel.expanded;
        self.side_panel.expanded
    }

    pub fn navigate(&mut self, section: &str) -> Result<(), ChecklistStateError> {
        if !self.has_section(section) {
            return Err(ChecklistStateError::UnknownCheckpoint(section.to_string()));
        }
        self.side_panel.active_section = section.to_string();
        Ok(())
    }
}
