use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Ready,
    Active,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ready" => Some(Self::Ready),
            "active" => Some(Self::Active),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            TaskStatus::Ready => TaskStatus::Active,
            TaskStatus::Active => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Ready,
        }
    }

    /// Accessible label announced for the status control.
    pub fn aria_label(self) -> &'static str {
        match self {
            TaskStatus::Ready => "Task status: ready. Activate to mark in progress",
            TaskStatus::Active => "Task status: in progress. Activate to mark done",
            TaskStatus::Done => "Task status: done. Activate to mark ready",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready-1.svg",
            TaskStatus::Active => "active-1.svg",
            TaskStatus::Done => "done-1.svg",
        }
    }
}

/// Records how the current status was reached so auto-inference never
/// overrides a choice the user made explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFlag {
    #[default]
    TextManual,
    ActiveAuto,
    ActiveManual,
}

impl StatusFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFlag::TextManual => "text-manual",
            StatusFlag::ActiveAuto => "active-auto",
            StatusFlag::ActiveManual => "active-manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text-manual" => Some(Self::TextManual),
            "active-auto" => Some(Self::ActiveAuto),
            "active-manual" => Some(Self::ActiveManual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RowStatus {
    pub state: TaskStatus,
    pub flag: StatusFlag,
}

impl RowStatus {
    pub fn new(state: TaskStatus, flag: StatusFlag) -> Self {
        Self { state, flag }
    }

    pub fn click(self) -> Self {
        let state = self.state.next();
        let flag = match (self.state, state) {
            (TaskStatus::Ready, TaskStatus::Active) => {
                if self.flag == StatusFlag::ActiveAuto {
                    StatusFlag::ActiveAuto
                } else {
                    StatusFlag::ActiveManual
                }
            }
            (TaskStatus::Done, TaskStatus::Ready) => StatusFlag::TextManual,
            _ => self.flag,
        };
        Self { state, flag }
    }

    pub fn notes_changed(self, notes: &str) -> Self {
        let has_text = !notes.trim().is_empty();
        match (self.state, self.flag) {
            (TaskStatus::Ready, StatusFlag::TextManual) if has_text => {
                Self::new(TaskStatus::Active, StatusFlag::ActiveAuto)
            }
            (TaskStatus::Active, StatusFlag::ActiveAuto) if !has_text => Self::default(),
            _ => self,
        }
    }

    pub fn reset() -> Self {
        Self::default()
    }

    /// Done rows have their text fields disabled and the reset control shown.
    pub fn is_locked(self) -> bool {
        self.state == TaskStatus::Done
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub ready: usize,
    pub active: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Ready => self.ready += 1,
            TaskStatus::Active => self.active += 1,
            TaskStatus::Done => self.done += 1,
        }
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.ready += other.ready;
        self.active += other.active;
        self.done += other.done;
    }

    pub fn total(&self) -> usize {
        self.ready + self.active + self.done
    }
}

impl<'a> FromIterator<&'a RowStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = &'a RowStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.record(status.state);
        }
        counts
    }
}
