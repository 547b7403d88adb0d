use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::autosave::{SaveDecision, SaveTrigger};
use crate::checklist::ChecklistError;
use crate::checklist_state::{ChecklistState, RestoreReport};
use crate::events::{Action, AppContext, EventError, Outcome};
use crate::state::StateDocument;
use crate::store::{now_ms, SessionDocument, SessionStore, SessionWrite, StoreError};

const MESSAGE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Checklist(#[from] ChecklistError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Body of a save request as it goes over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    pub session_key: String,
    pub type_slug: String,
    pub timestamp: i64,
    pub state: StateDocument,
}

pub trait SaveTransport {
    /// `Ok(None)` means nothing is stored for the key yet.
    fn restore(&mut self, key: &str) -> Result<Option<SessionDocument>, TransportError>;
    fn save(&mut self, payload: &SavePayload) -> Result<(), TransportError>;
}

/// Talks to a session store on the local filesystem.
#[derive(Debug, Clone)]
pub struct StoreTransport {
    store: SessionStore,
}

impl StoreTransport {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

impl SaveTransport for StoreTransport {
    fn restore(&mut self, key: &str) -> Result<Option<SessionDocument>, TransportError> {
        match self.store.read(key) {
            Ok(document) => Ok(Some(document)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, payload: &SavePayload) -> Result<(), TransportError> {
        self.store.write(
            &payload.session_key,
            &SessionWrite {
                type_slug: payload.type_slug.clone(),
                metadata: None,
                state: payload.state.clone(),
            },
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Success,
    Error,
}

/// Transient footer message; it clears itself after a few seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Restored(RestoreReport),
    /// Nothing was stored; an initial save established the baseline.
    Initialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRecord {
    pub trigger: SaveTrigger,
    pub succeeded: bool,
}

/// One open checklist: state tree, event handlers and the save loop.
pub struct ChecklistSession<T: SaveTransport> {
    key: String,
    context: AppContext,
    transport: T,
    message: Option<StatusMessage>,
}

impl<T: SaveTransport> ChecklistSession<T> {
    /// Restores the stored document, or performs the initial save when the
    /// key has nothing stored yet.
    pub fn open(
        key: &str,
        type_slug: &str,
        transport: T,
        now: Instant,
    ) -> Result<(Self, OpenOutcome), ClientError> {
        let mut session = Self {
            key: key.to_string(),
            context: AppContext::new(ChecklistState::for_type(type_slug)?),
            transport,
            message: None,
        };
        match session.transport.restore(key) {
            Ok(Some(document)) => {
                if document.type_slug != session.context.checklist.type_slug {
                    session.context.checklist = ChecklistState::for_type(&document.type_slug)?;
                }
                let report = session.context.checklist.restore(&document.state);
                session.context.autosave.enable_auto_save();
                Ok((session, OpenOutcome::Restored(report)))
            }
            Ok(None) => {
                let records = session.run_save(SaveTrigger::Initial, now);
                match records.last() {
                    Some(record) if record.succeeded => Ok((session, OpenOutcome::Initialized)),
                    _ => Err(TransportError::Failed(format!("initial save of {} failed", key)).into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn checklist(&self) -> &ChecklistState {
        &self.context.checklist
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn handle(&mut self, action: &Action, now: Instant) -> Result<Outcome, ClientError> {
        Ok(self.context.dispatch(action, now)?)
    }

    /// Runs the debounced auto-save if it is due.
    pub fn tick(&mut self, now: Instant) -> Vec<SaveRecord> {
        match self.context.autosave.poll(now) {
            Some(SaveDecision::Start(trigger)) => self.perform(trigger, now),
            _ => Vec::new(),
        }
    }

    pub fn save_now(&mut self, now: Instant) -> Vec<SaveRecord> {
        self.run_save(SaveTrigger::Manual, now)
    }

    fn run_save(&mut self, trigger: SaveTrigger, now: Instant) -> Vec<SaveRecord> {
        match self.context.autosave.request(trigger, now) {
            SaveDecision::Start(trigger) => self.perform(trigger, now),
            SaveDecision::Queued => Vec::new(),
        }
    }

    fn perform(&mut self, first: SaveTrigger, now: Instant) -> Vec<SaveRecord> {
        let mut records = Vec::new();
        let mut next = Some(first);
        while let Some(trigger) = next {
            let payload = SavePayload {
                session_key: self.key.clone(),
                type_slug: self.context.checklist.type_slug.clone(),
                timestamp: now_ms(),
                state: self.context.checklist.collect(),
            };
            let succeeded = match self.transport.save(&payload) {
                Ok(()) => {
                    if trigger != SaveTrigger::Auto {
                        self.set_message(MessageKind::Success, "Saved", now);
                    }
                    true
                }
                Err(err) => {
                    self.set_message(MessageKind::Error, &format!("Save failed: {}", err), now);
                    false
                }
            };
            records.push(SaveRecord { trigger, succeeded });
            next = self.context.autosave.complete(succeeded, now);
        }
        records
    }

    fn set_message(&mut self, kind: MessageKind, text: &str, now: Instant) {
        self.message = Some(StatusMessage {
            kind,
            text: text.to_string(),
            expires_at: now + MESSAGE_TTL,
        });
    }

    pub fn status_message(&self, now: Instant) -> Option<&StatusMessage> {
        self.message
            .as_ref()
            .filter(|message| message.expires_at > now)
    }

    /// True when leaving now would lose unsaved changes.
    pub fn confirm_leave(&self) -> bool {
        self.context.autosave.is_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ActionTag;
    use crate::status::{StatusFlag, TaskStatus};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemoryTransport {
        stored: BTreeMap<String, SessionDocument>,
        saves: Vec<SavePayload>,
        fail: bool,
    }

    impl SaveTransport for MemoryTransport {
        fn restore(&mut self, key: &str) -> Result<Option<SessionDocument>, TransportError> {
            Ok(self.stored.get(key).cloned())
        }

        fn save(&mut self, payload: &SavePayload) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Failed("offline".to_string()));
            }
            self.saves.push(payload.clone());
            Ok(())
        }
    }

    #[test]
    fn missing_session_triggers_initial_save() {
        let now = Instant::now();
        let (session, outcome) =
            ChecklistSession::open("ABC", "word", MemoryTransport::default(), now).expect("open");
        assert_eq!(outcome, OpenOutcome::Initialized);
        assert_eq!(session.transport().saves.len(), 1);
        assert!(session.context().autosave.auto_save_enabled());
        assert!(!session.confirm_leave());
    }

    #[test]
    fn failing_initial_save_is_an_error() {
        let transport = MemoryTransport {
            fail: true,
            ..MemoryTransport::default()
        };
        let result = ChecklistSession::open("ABC", "word", transport, Instant::now());
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[test]
    fn debounced_edit_is_saved_on_tick() {
        let t0 = Instant::now();
        let (mut session, _) =
            ChecklistSession::open("ABC", "word", MemoryTransport::default(), t0).expect("open");
        session
            .handle(&Action::new(ActionTag::Notes, "1.1").with_value("looks good"), t0)
            .expect("type");
        assert!(session.confirm_leave());
        assert!(session.tick(t0 + Duration::from_secs(1)).is_empty());

        let records = session.tick(t0 + Duration::from_secs(3));
        assert_eq!(
            records,
            vec![SaveRecord {
                trigger: SaveTrigger::Auto,
                succeeded: true
            }]
        );
        let last = session.transport().saves.last().expect("saved");
        assert_eq!(last.state.notes["textarea-1.1"], "looks good");
        assert_eq!(
            last.state.status_buttons["status-1.1"],
            crate::status::RowStatus::new(TaskStatus::Active, StatusFlag::ActiveAuto)
        );
        assert!(!session.confirm_leave());
    }

    #[test]
    fn restores_existing_document_and_follows_its_type() {
        let now = Instant::now();
        let mut source = ChecklistState::for_type("excel").expect("excel");
        source.input_notes("2.1", "header row ok").expect("notes");
        let mut transport = MemoryTransport::default();
        transport.stored.insert(
            "XLS1".to_string(),
            SessionDocument {
                session_key: "XLS1".to_string(),
                type_slug: "excel".to_string(),
                metadata: crate::store::SessionMetadata::new(1),
                state: source.collect(),
            },
        );
        let (session, outcome) =
            ChecklistSession::open("XLS1", "word", transport, now).expect("open");
        assert!(matches!(outcome, OpenOutcome::Restored(_)));
        assert_eq!(session.checklist().type_slug, "excel");
        assert_eq!(session.checklist().row("2.1").expect("row").notes, "header row ok");
        assert!(session.transport().saves.is_empty());
    }

    #[test]
    fn failed_save_shows_error_message_that_expires() {
        let now = Instant::now();
        let (mut session, _) =
            ChecklistSession::open("ABC", "word", MemoryTransport::default(), now).expect("open");
        session.transport.fail = true;
        session
            .handle(&Action::new(ActionTag::Status, "1.1"), now)
            .expect("click");
        let records = session.save_now(now);
        assert_eq!(records.len(), 1);
        assert!(!records[0].succeeded);
        let message = session.status_message(now).expect("message");
        assert_eq!(message.kind, MessageKind::Error);
        assert!(session.status_message(now + MESSAGE_TTL).is_none());
        assert!(session.confirm_leave());
    }
}
