pub mod jwt;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::ws::Identity;

/// Identity claim carried by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl VerifiedUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn into_identity(self) -> Identity {
        let display_name = self.display_name();
        Identity {
            id: self.id,
            display_name,
        }
    }
}

/// Validates the credential carried by an `auth` frame.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Fails with `RelayError::AuthInvalid` for any bad, expired or malformed token.
    async fn verify(&self, token: &str) -> Result<VerifiedUser, RelayError>;
}
