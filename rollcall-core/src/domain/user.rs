//! User and authentication domain models

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an authenticated administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Authentication state as reported by an identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum AuthState {
    /// The provider has not resolved the current user yet
    Initializing,
    SignedOut,
    SignedIn(User),
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, AuthState::Initializing)
    }
}

/// Classified sign-in failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No account exists for {0}")]
    UserNotFound(String),

    #[error("Wrong password")]
    WrongPassword,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Unexpected authentication error: {0}")]
    Unexpected(String),
}

impl AuthError {
    /// Text shown to the person signing in.
    /// Unknown account and wrong password share one message.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::UserNotFound(_) | AuthError::WrongPassword => {
                "Invalid username or password."
            }
            AuthError::InvalidEmail(_) => "Please enter a valid email address.",
            AuthError::Unexpected(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation() {
        let user = User::new("user-123", "admin@example.com");
        assert_eq!(user.id, "user-123");
        assert_eq!(user.email, "admin@example.com");
    }

    #[test]
    fn test_auth_state() {
        assert!(!AuthState::Initializing.is_resolved());
        assert!(AuthState::SignedOut.is_resolved());
        assert!(AuthState::SignedOut.user().is_none());

        let state = AuthState::SignedIn(User::new("u1", "a@b.co"));
        assert_eq!(state.user().unwrap().id, "u1");
    }

    #[test]
    fn test_auth_error_messages() {
        assert_eq!(
            AuthError::UserNotFound("x@y.z".to_string()).user_message(),
            "Invalid username or password."
        );
        assert_eq!(AuthError::WrongPassword.user_message(), "Invalid username or password.");
        assert_eq!(
            AuthError::InvalidEmail("nope".to_string()).user_message(),
            "Please enter a valid email address."
        );
        assert_eq!(
            AuthError::Unexpected("disk".to_string()).user_message(),
            "An unexpected error occurred. Please try again."
        );
    }
}
