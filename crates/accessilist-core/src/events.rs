use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::autosave::AutoSaveController;
use crate::checklist::{delete_widget_id, restart_widget_id, status_widget_id, task_widget_id};
use crate::checklist_state::{ChecklistState, ChecklistStateError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Unknown action tag: {0}")]
    UnknownTag(String),
    #[error("Action {0} requires a value")]
    MissingValue(&'static str),
    #[error("Invalid action target: {0}")]
    InvalidTarget(String),
    #[error("A confirmation dialog is open")]
    ModalOpen,
    #[error("No confirmation dialog is open")]
    NoModal,
    #[error(transparent)]
    State(#[from] ChecklistStateError),
}

/// Semantic tag carried by every interactive control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionTag {
    Status,
    Reset,
    DeleteRow,
    SidePanelToggle,
    CheckpointCaption,
    Notes,
    Task,
    AddRow,
    Confirm,
    Cancel,
}

impl ActionTag {
    pub const ALL: [ActionTag; 10] = [
        ActionTag::Status,
        ActionTag::Reset,
        ActionTag::DeleteRow,
        ActionTag::SidePanelToggle,
        ActionTag::CheckpointCaption,
        ActionTag::Notes,
        ActionTag::Task,
        ActionTag::AddRow,
        ActionTag::Confirm,
        ActionTag::Cancel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionTag::Status => "status",
            ActionTag::Reset => "reset",
            ActionTag::DeleteRow => "delete-row",
            ActionTag::SidePanelToggle => "side-panel-toggle",
            ActionTag::CheckpointCaption => "checkpoint-caption",
            ActionTag::Notes => "notes",
            ActionTag::Task => "task",
            ActionTag::AddRow => "add-row",
            ActionTag::Confirm => "confirm",
            ActionTag::Cancel => "cancel",
        }
    }

    pub fn parse(value: &str) -> Result<Self, EventError> {
        let needle = value.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == needle)
            .ok_or_else(|| EventError::UnknownTag(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub tag: ActionTag,
    /// Row id, section id or checkpoint number, depending on the tag.
    pub target: String,
    pub value: Option<String>,
}

impl Action {
    pub fn new(tag: ActionTag, target: impl Into<String>) -> Self {
        Self {
            tag,
            target: target.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn value(&self) -> Result<&str, EventError> {
        self.value
            .as_deref()
            .ok_or(EventError::MissingValue(self.tag.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum FocusTarget {
    Widget(String),
    ModalPrimary,
    Home,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "row", rename_all = "kebab-case")]
pub enum ModalKind {
    Reset(String),
    DeleteRow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmModal {
    pub kind: ModalKind,
    pub title: String,
    pub primary_label: &'static str,
    /// Control that opened the dialog; focus returns here on cancel.
    pub trigger: FocusTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub dirty: bool,
    pub focus: Option<FocusTarget>,
}

impl Outcome {
    fn dirty() -> Self {
        Self {
            dirty: true,
            focus: None,
        }
    }

    fn focus(target: FocusTarget) -> Self {
        Self {
            dirty: false,
            focus: Some(target),
        }
    }
}

type Handler = fn(&mut AppContext, &Action) -> Result<Outcome, EventError>;

/// Everything the event handlers touch, passed explicitly instead of globals.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub checklist: ChecklistState,
    pub autosave: AutoSaveController,
    pub modal: Option<ConfirmModal>,
    handlers: HashMap<ActionTag, Handler>,
}

impl AppContext {
    pub fn new(checklist: ChecklistState) -> Self {
        let mut handlers: HashMap<ActionTag, Handler> = HashMap::new();
        handlers.insert(ActionTag::Status, on_status);
        handlers.insert(ActionTag::Reset, on_reset);
        handlers.insert(ActionTag::DeleteRow, on_delete_row);
        handlers.insert(ActionTag::SidePanelToggle, on_side_panel_toggle);
        handlers.insert(ActionTag::CheckpointCaption, on_checkpoint_caption);
        handlers.insert(ActionTag::Notes, on_notes);
        handlers.insert(ActionTag::Task, on_task);
        handlers.insert(ActionTag::AddRow, on_add_row);
        handlers.insert(ActionTag::Confirm, on_confirm);
        handlers.insert(ActionTag::Cancel, on_cancel);
        Self {
            checklist,
            autosave: AutoSaveController::new(),
            modal: None,
            handlers,
        }
    }

    pub fn dispatch(&mut self, action: &Action, now: Instant) -> Result<Outcome, EventError> {
        if self.modal.is_some() && !matches!(action.tag, ActionTag::Confirm | ActionTag::Cancel) {
            return Err(EventError::ModalOpen);
        }
        let handler = *self
            .handlers
            .get(&action.tag)
            .ok_or_else(|| EventError::UnknownTag(action.tag.as_str().to_string()))?;
        let outcome = handler(self, action)?;
        if outcome.dirty {
            self.autosave.mark_dirty(now);
        }
        Ok(outcome)
    }

    fn open_modal(
        &mut self,
        kind: ModalKind,
        title: String,
        primary_label: &'static str,
        trigger: FocusTarget,
    ) -> Outcome {
        self.modal = Some(ConfirmModal {
            kind,
            title,
            primary_label,
            trigger,
        });
        Outcome::focus(FocusTarget::ModalPrimary)
    }
}

fn on_status(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    ctx.checklist.click_status(&action.target)?;
    Ok(Outcome::dirty())
}

fn on_reset(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    let row = ctx
        .checklist
        .row(&action.target)
        .ok_or_else(|| ChecklistStateError::UnknownRow(action.target.clone()))?;
    // The reset control only exists on completed rows.
    if !row.restart_visible {
        return Err(EventError::InvalidTarget(action.target.clone()));
    }
    let title = format!("Reset task {}?", row.id);
    Ok(ctx.open_modal(
        ModalKind::Reset(action.target.clone()),
        title,
        "Reset",
        FocusTarget::Widget(restart_widget_id(&action.target)),
    ))
}

fn on_delete_row(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    let row = ctx
        .checklist
        .row(&action.target)
        .ok_or_else(|| ChecklistStateError::UnknownRow(action.target.clone()))?;
    if !row.manual {
        return Err(ChecklistStateError::NotManual(action.target.clone()).into());
    }
    let title = format!("Delete task {}?", row.id);
    Ok(ctx.open_modal(
        ModalKind::DeleteRow(action.target.clone()),
        title,
        "Delete",
        FocusTarget::Widget(delete_widget_id(&action.target)),
    ))
}

fn on_side_panel_toggle(ctx: &mut AppContext, _action: &Action) -> Result<Outcome, EventError> {
    ctx.checklist.toggle_side_panel();
    Ok(Outcome::dirty())
}

fn on_checkpoint_caption(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    ctx.checklist.navigate(&action.target)?;
    Ok(Outcome::dirty())
}

fn on_notes(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    let text = action.value()?;
    ctx.checklist.input_notes(&action.target, text)?;
    Ok(Outcome::dirty())
}

fn on_task(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    let text = action.value()?;
    ctx.checklist.input_task(&action.target, text)?;
    Ok(Outcome::dirty())
}

fn on_add_row(ctx: &mut AppContext, action: &Action) -> Result<Outcome, EventError> {
    let checkpoint = action
        .target
        .trim()
        .trim_start_matches("checkpoint-")
        .parse::<u32>()
        .map_err(|_| EventError::InvalidTarget(action.target.clone()))?;
    let task = action.value.as_deref().unwrap_or_default();
    let id = ctx.checklist.add_manual_row(checkpoint, task)?;
    Ok(Outcome {
        dirty: true,
        focus: Some(FocusTarget::Widget(task_widget_id(&id))),
    })
}

fn on_confirm(ctx: &mut AppContext, _action: &Action) -> Result<Outcome, EventError> {
    let modal = ctx.modal.take().ok_or(EventError::NoModal)?;
    match modal.kind {
        ModalKind::Reset(row) => {
            ctx.checklist.reset_row(&row)?;
            Ok(Outcome {
                dirty: true,
                focus: Some(FocusTarget::Widget(status_widget_id(&row))),
            })
        }
        ModalKind::DeleteRow(row) => {
            let deleted = ctx.checklist.delete_manual_row(&row)?;
            let focus = match deleted.previous_row {
                Some(previous) => FocusTarget::Widget(delete_widget_id(&previous)),
                None => FocusTarget::Home,
            };
            Ok(Outcome {
                dirty: true,
                focus: Some(focus),
            })
        }
    }
}

fn on_cancel(ctx: &mut AppContext, _action: &Action) -> Result<Outcome, EventError> {
    let modal = ctx.modal.take().ok_or(EventError::NoModal)?;
    Ok(Outcome::focus(modal.trigger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{RowStatus, StatusFlag, TaskStatus};

    fn context() -> AppContext {
        let mut ctx = AppContext::new(ChecklistState::for_type("camtasia").expect("template"));
        ctx.autosave.enable_auto_save();
        ctx
    }

    #[test]
    fn every_tag_parses_and_has_a_handler() {
        let ctx = context();
        for tag in ActionTag::ALL {
            assert_eq!(ActionTag::parse(tag.as_str()).expect("parse"), tag);
            assert!(ctx.handlers.contains_key(&tag));
        }
        assert!(ActionTag::parse("hover").is_err());
    }

    #[test]
    fn status_click_marks_dirty() {
        let mut ctx = context();
        let now = Instant::now();
        let outcome = ctx
            .dispatch(&Action::new(ActionTag::Status, "1.1"), now)
            .expect("dispatch");
        assert!(outcome.dirty);
        assert!(ctx.autosave.is_dirty());
        assert_eq!(
            ctx.checklist.row("1.1").expect("row").status,
            RowStatus::new(TaskStatus::Active, StatusFlag::ActiveManual)
        );
    }

    #[test]
    fn notes_input_drives_auto_status() {
        let mut ctx = context();
        let now = Instant::now();
        ctx.dispatch(&Action::new(ActionTag::Notes, "2.1").with_value("hi"), now)
            .expect("type");
        assert_eq!(
            ctx.checklist.row("2.1").expect("row").status,
            RowStatus::new(TaskStatus::Active, StatusFlag::ActiveAuto)
        );
        ctx.dispatch(&Action::new(ActionTag::Notes, "2.1").with_value(""), now)
            .expect("clear");
        assert_eq!(ctx.checklist.row("2.1").expect("row").status, RowStatus::default());
        assert_eq!(
            ctx.dispatch(&Action::new(ActionTag::Notes, "2.1"), now),
            Err(EventError::MissingValue("notes"))
        );
    }

    #[test]
    fn reset_confirmation_focuses_primary_then_status() {
        let mut ctx = context();
        let now = Instant::now();
        ctx.dispatch(&Action::new(ActionTag::Notes, "1.1").with_value("x"), now)
            .expect("type");
        ctx.dispatch(&Action::new(ActionTag::Status, "1.1"), now)
            .expect("done");

        let opened = ctx
            .dispatch(&Action::new(ActionTag::Reset, "1.1"), now)
            .expect("open");
        assert_eq!(opened.focus, Some(FocusTarget::ModalPrimary));
        assert!(!opened.dirty);
        assert_eq!(
            ctx.dispatch(&Action::new(ActionTag::Status, "1.2"), now),
            Err(EventError::ModalOpen)
        );

        let confirmed = ctx
            .dispatch(&Action::new(ActionTag::Confirm, ""), now)
            .expect("confirm");
        assert_eq!(confirmed.focus, Some(FocusTarget::Widget("status-1.1".to_string())));
        let row = ctx.checklist.row("1.1").expect("row");
        assert!(row.notes.is_empty());
        assert_eq!(row.status, RowStatus::default());
    }

    #[test]
    fn cancel_returns_focus_to_trigger() {
        let mut ctx = context();
        let now = Instant::now();
        ctx.dispatch(&Action::new(ActionTag::Status, "1.2"), now)
            .expect("active");
        ctx.dispatch(&Action::new(ActionTag::Status, "1.2"), now)
            .expect("done");
        ctx.dispatch(&Action::new(ActionTag::Reset, "1.2"), now)
            .expect("open");
        let cancelled = ctx
            .dispatch(&Action::new(ActionTag::Cancel, ""), now)
            .expect("cancel");
        assert_eq!(cancelled.focus, Some(FocusTarget::Widget("reset-1.2".to_string())));
        assert!(ctx.modal.is_none());
        assert_eq!(
            ctx.dispatch(&Action::new(ActionTag::Cancel, ""), now),
            Err(EventError::NoModal)
        );
    }

    #[test]
    fn deleting_rows_moves_focus_up_then_home() {
        let mut ctx = context();
        let now = Instant::now();
        let first = ctx
            .dispatch(&Action::new(ActionTag::AddRow, "checkpoint-2").with_value("A"), now)
            .expect("add");
        assert_eq!(first.focus, Some(FocusTarget::Widget("task-2.3".to_string())));
        ctx.dispatch(&Action::new(ActionTag::AddRow, "2").with_value("B"), now)
            .expect("add");

        ctx.dispatch(&Action::new(ActionTag::DeleteRow, "2.4"), now)
            .expect("open");
        let deleted = ctx
            .dispatch(&Action::new(ActionTag::Confirm, ""), now)
            .expect("confirm");
        assert_eq!(deleted.focus, Some(FocusTarget::Widget("delete-2.3".to_string())));

        ctx.dispatch(&Action::new(ActionTag::DeleteRow, "2.3"), now)
            .expect("open");
        let deleted = ctx
            .dispatch(&Action::new(ActionTag::Confirm, ""), now)
            .expect("confirm");
        assert_eq!(deleted.focus, Some(FocusTarget::Home));
    }

    #[test]
    fn reset_is_refused_until_the_row_is_done() {
        let mut ctx = context();
        let now = Instant::now();
        ctx.dispatch(&Action::new(ActionTag::Status, "1.1"), now)
            .expect("active");
        assert_eq!(
            ctx.dispatch(&Action::new(ActionTag::Reset, "1.1"), now),
            Err(EventError::InvalidTarget("1.1".to_string()))
        );
        assert!(ctx.modal.is_none());

        ctx.dispatch(&Action::new(ActionTag::Status, "1.1"), now)
            .expect("done");
        ctx.dispatch(&Action::new(ActionTag::Reset, "1.1"), now)
            .expect("open");
        assert!(ctx.modal.is_some());
    }

    #[test]
    fn template_rows_cannot_open_delete_dialog() {
        let mut ctx = context();
        let err = ctx
            .dispatch(&Action::new(ActionTag::DeleteRow, "1.1"), Instant::now())
            .unwrap_err();
        assert_eq!(err, EventError::State(ChecklistStateError::NotManual("1.1".to_string())));
        assert!(ctx.modal.is_none());
    }

    #[test]
    fn side_panel_and_navigation_are_tracked() {
        let mut ctx = context();
        let now = Instant::now();
        ctx.dispatch(&Action::new(ActionTag::SidePanelToggle, ""), now)
            .expect("toggle");
        ctx.dispatch(&Action::new(ActionTag::CheckpointCaption, "checkpoint-3"), now)
            .expect("nav");
        assert!(!ctx.checklist.side_panel.expanded);
        assert_eq!(ctx.checklist.side_panel.active_section, "checkpoint-3");
        assert!(ctx
            .dispatch(&Action::new(ActionTag::CheckpointCaption, "checkpoint-9"), now)
            .is_err());
    }
}
