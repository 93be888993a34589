pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::GeneratorIndex;
use std::sync::OnceLock;

/// Keychain service under which Triptych stores its API key
pub const KEYCHAIN_SERVICE: &str = "triptych";

/// Keychain entry holding the shared API key
pub const KEYCHAIN_KEY: &str = "openai_api_key";

/// Environment variables consulted for every agent, in order
const SHARED_ENV_KEYS: [&str; 2] = ["DEEPSEEK_API_KEY", "OPENAI_API_KEY"];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// SecretResolver finds the API key each agent should use.
///
/// Lookup order for generator `N`:
/// 1. `DEEPSEEK_API_KEY_{N}`
/// 2. `DEEPSEEK_API_KEY_GENERATOR_{N}`
/// 3. `DEEPSEEK_API_KEY`
/// 4. `OPENAI_API_KEY`
/// 5. OS keychain (service `triptych`, key `openai_api_key`)
///
/// Shared agents (critic, editor, prompter) start at step 3. Keys are never
/// prompted for interactively, so a run can execute unattended.
pub struct SecretResolver {
    service_name: String,
    env: EnvLookup,
    use_keychain: bool,
}

/// Regex patterns for detecting common secret formats.
/// These are compiled once and reused for performance.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI/DeepSeek API keys: sk-[a-zA-Z0-9]{20,}
/// - Bearer tokens: Bearer\s+[^\s]{20,}
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [r"sk-[a-zA-Z0-9\-_]{20,}", r"Bearer\s+[^\s]{20,}"]
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Scrubs secrets from text by replacing them with [REDACTED].
///
/// Provider error bodies are passed through this before they reach logs or
/// error messages.
///
/// # Examples
/// ```
/// use triptych_engine::secrets::scrub;
///
/// let scrubbed = scrub("My API key is sk-1234567890abcdefghij");
/// assert_eq!(scrubbed, "My API key is [REDACTED]");
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretResolver {
    /// Resolver reading the process environment, then the OS keychain
    pub fn new() -> Self {
        Self {
            service_name: KEYCHAIN_SERVICE.to_string(),
            env: Box::new(|name| std::env::var(name).ok()),
            use_keychain: true,
        }
    }

    /// Resolver reading only the given lookup function, never the keychain
    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            service_name: KEYCHAIN_SERVICE.to_string(),
            env: Box::new(lookup),
            use_keychain: false,
        }
    }

    /// Environment variable names consulted for an agent, in lookup order
    pub fn env_candidates(generator: Option<GeneratorIndex>) -> Vec<String> {
        let mut names = Vec::with_capacity(4);
        if let Some(index) = generator {
            names.push(format!("DEEPSEEK_API_KEY_{}", index));
            names.push(format!("DEEPSEEK_API_KEY_GENERATOR_{}", index));
        }
        names.extend(SHARED_ENV_KEYS.iter().map(|name| name.to_string()));
        names
    }

    /// Resolve the API key for a generator (`Some`) or a shared agent (`None`)
    ///
    /// # Errors
    /// Returns `EngineError::MissingCredential` when no source has a key and
    /// `EngineError::KeyringError` when the keychain cannot be read.
    pub fn resolve(&self, generator: Option<GeneratorIndex>) -> Result<SecretString, EngineError> {
        for name in Self::env_candidates(generator) {
            if let Some(value) = (self.env)(&name).filter(|v| !v.trim().is_empty()) {
                tracing::debug!("Using API key from {}", name);
                return Ok(SecretString::new(value.trim()));
            }
        }

        if let Some(secret) = self.keychain_secret()? {
            tracing::debug!("Using API key from keychain");
            return Ok(secret);
        }

        let scope = match generator {
            Some(index) => format!("generator {}", index),
            None => "shared agents".to_string(),
        };
        Err(EngineError::MissingCredential(format!(
            "no API key for {} (checked {} and the system keychain)",
            scope,
            Self::env_candidates(generator).join(", ")
        )))
    }

    /// Read the shared key from the OS keychain, if present
    fn keychain_secret(&self) -> Result<Option<SecretString>, EngineError> {
        if !self.use_keychain {
            return Ok(None);
        }

        let entry = Entry::new(&self.service_name, KEYCHAIN_KEY).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => Ok(Some(SecretString::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            // Headless systems without a secret service behave like an empty keychain
            Err(keyring::Error::PlatformFailure(e)) | Err(keyring::Error::NoStorageAccess(e)) => {
                tracing::debug!("Keychain unavailable: {}", e);
                Ok(None)
            }
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                KEYCHAIN_KEY, e
            ))),
        }
    }

    /// Checks whether any source can supply a key, without failing
    pub fn has_credential(&self, generator: Option<GeneratorIndex>) -> bool {
        self.resolve(generator).is_ok()
    }
}
