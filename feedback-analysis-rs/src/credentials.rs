// feedback-analysis-rs/src/credentials.rs
// Round-robin pool of interchangeable API credentials

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use error_handling_rs::{redact, Failover};
use tracing::{debug, info};

use crate::error::ConfigurationError;

/// Highest numbered `GEMINI_API_KEY_N` variable read by [`CredentialPool::from_env`]
pub const MAX_NUMBERED_KEYS: usize = 10;

/// An opaque API credential. `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// The raw secret, for request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Fixed, non-empty list of credentials with an atomic rotation cursor
///
/// The pool tracks no health. A rate-limited credential is simply rotated
/// away from. Share it between pipelines as `Arc<CredentialPool>`.
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("len", &self.credentials.len())
            .field("cursor", &self.cursor())
            .finish()
    }
}

impl CredentialPool {
    /// Build a pool; blank entries are dropped
    ///
    /// # Errors
    /// `ConfigurationError::NoCredentials` when nothing usable remains
    pub fn new<I, S>(credentials: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = credentials
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .map(Credential::new)
            .collect();

        if credentials.is_empty() {
            return Err(ConfigurationError::NoCredentials);
        }

        debug!(count = credentials.len(), "Credential pool created");
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Load `GEMINI_API_KEY_1..N`, falling back to `GEMINI_API_KEY` then
    /// `GOOGLE_AI_API_KEY` when no numbered key is set
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut keys = config_rs::get_numbered_env_vars("GEMINI_API_KEY", MAX_NUMBERED_KEYS);
        if keys.is_empty() {
            keys.extend(config_rs::get_first_env_var(&["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]));
        }

        let pool = Self::new(keys)?;
        info!(count = pool.len(), "Loaded API credentials from environment");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false; an empty pool cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Current cursor position, in `0..len()`
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Credential at `index`, wrapping around the pool
    pub fn get(&self, index: usize) -> &Credential {
        &self.credentials[index % self.credentials.len()]
    }

    /// Return the credential at the cursor and advance the cursor
    pub fn next(&self) -> Credential {
        let index = self.advance();
        self.credentials[index].clone()
    }

    /// Advance the cursor; returns the position before the move
    fn advance(&self) -> usize {
        let len = self.credentials.len();
        match self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Scrub every credential value from `message`
    pub fn redact(&self, message: &str) -> String {
        let secrets: Vec<&str> = self.credentials.iter().map(Credential::expose).collect();
        redact(message, &secrets)
    }
}

impl Failover for CredentialPool {
    fn current(&self) -> usize {
        self.cursor()
    }

    fn failover(&self) -> usize {
        let from = self.advance();
        let to = self.cursor();
        debug!(from, to, pool_size = self.len(), "Rotated credential");
        to
    }
}
