//! Shared bearer credential.

use std::sync::{Arc, RwLock};

/// A bearer token shared by every request of a session.
///
/// Clones share the same slot, so invalidating one clone (after a 401)
/// signs out every holder. Debug output never shows the token.
#[derive(Clone, Default)]
pub struct Credential {
    token: Arc<RwLock<Option<String>>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: Arc::new(RwLock::new((!token.is_empty()).then_some(token))),
        }
    }

    /// A credential that sends no `Authorization` header.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_valid(&self) -> bool {
        self.token().is_some()
    }

    pub fn replace(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    /// Forget the token; later requests go out unauthenticated.
    pub fn invalidate(&self) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            tracing::warn!("credential rejected by the server, signed out");
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = if self.is_valid() { "***" } else { "<none>" };
        f.debug_struct("Credential").field("token", &token).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_is_shared_between_clones() {
        let credential = Credential::new("secret");
        let clone = credential.clone();
        assert_eq!(clone.token().as_deref(), Some("secret"));

        clone.invalidate();
        assert!(!credential.is_valid());

        credential.replace("fresh");
        assert_eq!(clone.token().as_deref(), Some("fresh"));
    }

    #[test]
    fn debug_masks_token() {
        let shown = format!("{:?}", Credential::new("secret"));
        assert!(!shown.contains("secret"));
        assert!(shown.contains("***"));
        assert!(!Credential::new("").is_valid());
    }
}
