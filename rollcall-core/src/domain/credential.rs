//! Stored credential models

use serde::{Deserialize, Serialize};

/// Default Argon2id parameters
pub const DEFAULT_TIME_COST: u32 = 3;
pub const DEFAULT_MEMORY_COST: u32 = 65536; // 64 MiB
pub const DEFAULT_PARALLELISM: u32 = 4;
pub const DEFAULT_HASH_LEN: u32 = 32;

/// Argon2id parameters for password hashing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
    pub hash_len: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost: DEFAULT_MEMORY_COST,
            parallelism: DEFAULT_PARALLELISM,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

/// One administrator credential as stored in credentials.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub id: String,
    /// Lowercased email, used as the sign-in identifier
    pub email: String,
    /// Base64-encoded random salt
    pub salt: String,
    /// Hex-encoded Argon2id output
    pub hash: String,
    pub algorithm: String,
    pub argon2_params: Argon2Params,
}

/// Contents of credentials.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(default)]
    pub users: Vec<StoredCredential>,
}

impl CredentialFile {
    pub fn find(&self, email: &str) -> Option<&StoredCredential> {
        self.users.iter().find(|c| c.email == email)
    }
}
