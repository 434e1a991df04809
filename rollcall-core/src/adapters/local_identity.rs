//! Local identity provider - administrator accounts stored in the data directory
//!
//! Passwords are never stored. Each credential keeps a random salt and the
//! Argon2id output for that salt; sign-in re-derives and compares. The
//! signed-in user is kept in session.json so it survives between CLI runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context};
use base64::Engine;
use rand::Rng;
use regex::Regex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Argon2Params, AuthError, AuthState, CredentialFile, StoredCredential, User};
use crate::ports::IdentityProvider;

const CREDENTIALS_FILE: &str = "credentials.json";
const SESSION_FILE: &str = "session.json";
const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

/// Lowercase and trim an email; `None` if it is not a plausible address
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    email_regex().is_match(&email).then_some(email)
}

/// Byte comparison whose timing does not depend on where the inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Identity provider backed by credentials.json and session.json
pub struct LocalIdentityProvider {
    data_dir: PathBuf,
    params: Argon2Params,
    state: watch::Sender<AuthState>,
}

impl LocalIdentityProvider {
    /// Open the provider and restore any saved session
    pub fn new(data_dir: &Path) -> Self {
        Self::with_params(data_dir, Argon2Params::default())
    }

    /// Like `new`, with explicit hashing parameters for new credentials
    pub fn with_params(data_dir: &Path, params: Argon2Params) -> Self {
        let (state, _) = watch::channel(AuthState::Initializing);
        let provider = Self {
            data_dir: data_dir.to_path_buf(),
            params,
            state,
        };
        provider.state.send_replace(provider.restore_session());
        provider
    }

    fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    /// Saved session, if it still points at an existing credential
    fn restore_session(&self) -> AuthState {
        let session = match fs::read_to_string(self.session_path()) {
            Ok(content) => content,
            Err(_) => return AuthState::SignedOut,
        };
        let user: User = match serde_json::from_str(&session) {
            Ok(user) => user,
            Err(_) => return AuthState::SignedOut,
        };

        match self.load_credentials() {
            Ok(file) if file.users.iter().any(|c| c.id == user.id) => AuthState::SignedIn(user),
            _ => AuthState::SignedOut,
        }
    }

    fn load_credentials(&self) -> anyhow::Result<CredentialFile> {
        let path = self.credentials_path();
        if !path.exists() {
            return Ok(CredentialFile::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file = serde_json::from_str(&content)
            .with_context(|| format!("Invalid {}", CREDENTIALS_FILE))?;
        Ok(file)
    }

    fn save_credentials(&self, file: &CredentialFile) -> anyhow::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let content = serde_json::to_string_pretty(file)?;
        fs::write(self.credentials_path(), content)?;
        Ok(())
    }

    /// Derive the password hash using Argon2id
    fn derive_key(password: &str, salt: &[u8], params: &Argon2Params) -> anyhow::Result<Vec<u8>> {
        let argon2_params = argon2::Params::new(
            params.memory_cost,
            params.time_cost,
            params.parallelism,
            Some(params.hash_len as usize),
        )
        .map_err(|e| anyhow!("Failed to create argon2 params: {:?}", e))?;

        let argon2 = argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2_params,
        );

        let mut key = vec![0u8; params.hash_len as usize];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|e| anyhow!("Failed to derive key: {:?}", e))?;

        Ok(key)
    }

    fn verify(credential: &StoredCredential, password: &str) -> anyhow::Result<bool> {
        let salt = base64::engine::general_purpose::STANDARD
            .decode(&credential.salt)
            .context("Invalid salt in credentials")?;
        let expected = hex::decode(&credential.hash).context("Invalid hash in credentials")?;
        let key = Self::derive_key(password, &salt, &credential.argon2_params)?;
        Ok(constant_time_eq(&key, &expected))
    }

    /// Create an administrator account
    pub fn register(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email)
            .ok_or_else(|| Error::validation("Please enter a valid email address."))?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "Password must be at least {} characters.",
                MIN_PASSWORD_LEN
            )));
        }

        let mut file = self
            .load_credentials()
            .map_err(|e| Error::config(format!("{:#}", e)))?;
        if file.find(&email).is_some() {
            return Err(Error::validation(format!("An account already exists for {}", email)));
        }

        let salt: [u8; 16] = rand::thread_rng().gen();
        let key = Self::derive_key(password, &salt, &self.params)
            .map_err(|e| Error::Other(format!("{:#}", e)))?;

        let credential = StoredCredential {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            salt: base64::engine::general_purpose::STANDARD.encode(salt),
            hash: hex::encode(key),
            algorithm: "argon2id".to_string(),
            argon2_params: self.params.clone(),
        };
        let user = User::new(credential.id.clone(), email);

        file.users.push(credential);
        self.save_credentials(&file)
            .map_err(|e| Error::config(format!("{:#}", e)))?;

        Ok(user)
    }

    /// Number of stored administrator accounts
    pub fn account_count(&self) -> usize {
        self.load_credentials().map(|f| f.users.len()).unwrap_or(0)
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_in(&self, email: &str, password: &str) -> std::result::Result<User, AuthError> {
        let email = normalize_email(email).ok_or_else(|| AuthError::InvalidEmail(email.to_string()))?;

        let file = self
            .load_credentials()
            .map_err(|e| AuthError::Unexpected(format!("{:#}", e)))?;
        let credential = file
            .find(&email)
            .ok_or_else(|| AuthError::UserNotFound(email.clone()))?;

        let matches = Self::verify(credential, password)
            .map_err(|e| AuthError::Unexpected(format!("{:#}", e)))?;
        if !matches {
            return Err(AuthError::WrongPassword);
        }

        let user = User::new(credential.id.clone(), credential.email.clone());
        let session = serde_json::to_string_pretty(&user)
            .map_err(|e| AuthError::Unexpected(e.to_string()))?;
        fs::write(self.session_path(), session).map_err(|e| AuthError::Unexpected(e.to_string()))?;

        self.state.send_replace(AuthState::SignedIn(user.clone()));
        Ok(user)
    }

    fn sign_out(&self) -> std::result::Result<(), AuthError> {
        let path = self.session_path();
        if path.exists() {
            fs::remove_file(&path).map_err(|e| AuthError::Unexpected(e.to_string()))?;
        }
        self.state.send_replace(AuthState::SignedOut);
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    fn on_auth_change(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cheap_params() -> Argon2Params {
        Argon2Params {
            time_cost: 1,
            memory_cost: 64,
            parallelism: 1,
            hash_len: 32,
        }
    }

    fn create_test_provider() -> (TempDir, LocalIdentityProvider) {
        let dir = TempDir::new().unwrap();
        let provider = LocalIdentityProvider::with_params(dir.path(), cheap_params());
        (dir, provider)
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Admin@Example.COM "), Some("admin@example.com".to_string()));
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email("a@b"), None);
    }

    #[test]
    fn test_register_and_sign_in() {
        let (_dir, provider) = create_test_provider();
        assert_eq!(*provider.on_auth_change().borrow(), AuthState::SignedOut);

        let user = provider.register("admin@example.com", "secret1").unwrap();
        let signed_in = provider.sign_in("ADMIN@example.com", "secret1").unwrap();

        assert_eq!(signed_in, user);
        assert_eq!(provider.current_user(), Some(user));
    }

    #[test]
    fn test_sign_in_errors_are_classified() {
        let (_dir, provider) = create_test_provider();
        provider.register("admin@example.com", "secret1").unwrap();

        assert_eq!(
            provider.sign_in("nobody@example.com", "secret1"),
            Err(AuthError::UserNotFound("nobody@example.com".to_string()))
        );
        assert_eq!(
            provider.sign_in("admin@example.com", "wrong!!"),
            Err(AuthError::WrongPassword)
        );
        assert!(matches!(
            provider.sign_in("admin", "secret1"),
            Err(AuthError::InvalidEmail(_))
        ));
        assert!(provider.current_user().is_none());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_verify_compares_decoded_hash() {
        let (dir, provider) = create_test_provider();
        provider.register("a@b.co", "secret1").unwrap();

        let path = dir.path().join(CREDENTIALS_FILE);
        let content = fs::read_to_string(&path).unwrap();
        let mut file: CredentialFile = serde_json::from_str(&content).unwrap();
        let credential = &file.users[0];
        assert!(LocalIdentityProvider::verify(credential, "secret1").unwrap());
        assert!(!LocalIdentityProvider::verify(credential, "secret2").unwrap());

        // Uppercase hex decodes to the same bytes
        file.users[0].hash = file.users[0].hash.to_uppercase();
        assert!(LocalIdentityProvider::verify(&file.users[0], "secret1").unwrap());

        file.users[0].hash = "not hex".to_string();
        assert!(LocalIdentityProvider::verify(&file.users[0], "secret1").is_err());
    }

    #[test]
    fn test_register_validation() {
        let (_dir, provider) = create_test_provider();

        assert!(provider.register("bad", "secret1").unwrap_err().is_validation());
        assert!(provider.register("a@b.co", "short").unwrap_err().is_validation());

        provider.register("a@b.co", "secret1").unwrap();
        assert!(provider.register("A@B.co", "secret2").unwrap_err().is_validation());
        assert_eq!(provider.account_count(), 1);
    }

    #[test]
    fn test_password_is_not_stored() {
        let (dir, provider) = create_test_provider();
        provider.register("a@b.co", "hunter22").unwrap();

        let content = fs::read_to_string(dir.path().join(CREDENTIALS_FILE)).unwrap();
        assert!(!content.contains("hunter22"));
        assert!(content.contains("argon2id"));
    }

    #[test]
    fn test_session_survives_restart() {
        let dir = TempDir::new().unwrap();
        let provider = LocalIdentityProvider::with_params(dir.path(), cheap_params());
        let user = provider.register("a@b.co", "secret1").unwrap();
        provider.sign_in("a@b.co", "secret1").unwrap();

        let reopened = LocalIdentityProvider::with_params(dir.path(), cheap_params());
        assert_eq!(reopened.current_user(), Some(user));

        reopened.sign_out().unwrap();
        let again = LocalIdentityProvider::with_params(dir.path(), cheap_params());
        assert!(again.current_user().is_none());
    }

    #[tokio::test]
    async fn test_auth_change_notifies() {
        let (_dir, provider) = create_test_provider();
        provider.register("a@b.co", "secret1").unwrap();
        let mut rx = provider.on_auth_change();

        provider.sign_in("a@b.co", "secret1").unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().user().is_some());

        provider.sign_out().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AuthState::SignedOut);
    }
}
