//! Identity port - administrator sign-in

use tokio::sync::watch;

use crate::domain::{AuthError, AuthState, User};

/// Authentication provider abstraction
pub trait IdentityProvider: Send + Sync {
    /// Verify credentials and make the user current
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    fn sign_out(&self) -> Result<(), AuthError>;

    fn current_user(&self) -> Option<User>;

    /// Receiver holding the current state; it changes on every transition
    fn on_auth_change(&self) -> watch::Receiver<AuthState>;
}
