use hmac::{Hmac, Mac};
use sha2::Sha256;
use ulid::Ulid;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const SESSION_COOKIE: &str = "accessilist_sid";

/// Mints and checks double-submit tokens bound to a browser session id.
#[derive(Clone)]
pub struct CsrfGuard {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard").finish_non_exhaustive()
    }
}

impl CsrfGuard {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// A guard with a process-local secret; tokens do not survive restarts.
    pub fn ephemeral() -> Self {
        let secret: [u8; 32] = rand::random();
        Self::new(secret)
    }

    pub fn new_session_id() -> String {
        Ulid::new().to_string()
    }

    fn mac(&self, session_id: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(session_id.as_bytes());
        mac
    }

    pub fn token_for(&self, session_id: &str) -> String {
        hex::encode(self.mac(session_id).finalize().into_bytes())
    }

    /// Constant-time comparison of a presented token against the session's token.
    pub fn verify(&self, session_id: &str, token: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        let Ok(presented) = hex::decode(token.trim()) else {
            return false;
        };
        self.mac(session_id).verify_slice(&presented).is_ok()
    }
}
