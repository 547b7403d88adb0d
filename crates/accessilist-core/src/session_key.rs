use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use thiserror::Error;

use crate::checklist::is_reserved_key;
use crate::store::SessionStore;

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GENERATED_KEY_LEN: usize = 3;
const MAX_ATTEMPTS: usize = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionKeyError {
    #[error("No free session key after {0} attempts")]
    Exhausted(usize),
}

fn api_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-]{3,20}$").expect("valid key regex"))
}

fn share_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{3}$").expect("valid share regex"))
}

pub fn validate_session_key(key: &str) -> bool {
    api_key_pattern().is_match(key)
}

/// Extracts the key from a minimal share URL query (`?=ABC` or `=ABC`).
pub fn parse_share_query(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let key = query.strip_prefix('=')?;
    if share_key_pattern().is_match(key) {
        Some(key.to_string())
    } else {
        None
    }
}

pub fn share_query(key: &str) -> String {
    format!("?={}", key)
}

pub fn random_session_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..GENERATED_KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Picks a random key that is neither reserved nor already on disk.
pub fn generate_session_key(store: &SessionStore) -> Result<String, SessionKeyError> {
    let mut rng = rand::thread_rng();
    generate_with(&mut rng, |key| store.exists(key))
}

fn generate_with<R, F>(rng: &mut R, mut taken: F) -> Result<String, SessionKeyError>
where
    R: Rng + ?Sized,
    F: FnMut(&str) -> bool,
{
    for _ in 0..MAX_ATTEMPTS {
        let key = random_session_key(rng);
        if is_reserved_key(&key) || taken(&key) {
            continue;
        }
        return Ok(key);
    }
    Err(SessionKeyError::Exhausted(MAX_ATTEMPTS))
}
