//! Core domain types for AccessiList checklist sessions.

pub mod autosave;
pub mod checklist;
pub mod checklist_state;
pub mod client;
pub mod config;
pub mod csrf;
pub mod events;
pub mod rate_limit;
pub mod report;
pub mod session_key;
pub mod state;
pub mod status;
pub mod store;

#[cfg(test)]
mod test_env;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
