//! Authorization hook for commands that require a permission.
//!
//! Greenroom does not issue credentials; the login tier writes the user id
//! into the client's session-store record and maintains permission sets.
//! Handlers that need a permission ask an [`Authorizer`], and a denial is a
//! normal protocol outcome (the handler sends its "denied" answer), not an
//! error.

use std::future::Future;

use crate::store::keys;
use crate::{SessionError, SessionStore};

/// Decides whether a user holds a permission.
///
/// `Send + Sync + 'static` because one authorizer is shared by every
/// handler task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use greenroom_session::{Authorizer, SessionError};
///
/// /// Grants everything. Development only.
/// struct AllowAll;
///
/// impl Authorizer for AllowAll {
///     async fn has_permission(
///         &self,
///         _user_id: &str,
///         _permission: &str,
///     ) -> Result<bool, SessionError> {
///         Ok(true)
///     }
/// }
/// ```
pub trait Authorizer: Send + Sync + 'static {
    /// Returns `Ok(true)` if `user_id` holds `permission`.
    ///
    /// # Errors
    /// Backend failures. Callers treat them as a denial after logging.
    fn has_permission(
        &self,
        user_id: &str,
        permission: &str,
    ) -> impl Future<Output = Result<bool, SessionError>> + Send;
}

/// Reads permissions from the session store.
///
/// A user's permissions live in the record `permissions:<uID>`, one field
/// per permission name. A permission is held when its field is `"1"` or
/// `"true"`; anything else (including absence) is a denial.
#[derive(Debug, Clone)]
pub struct StoreAuthorizer<S> {
    store: S,
}

impl<S: SessionStore> StoreAuthorizer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Grants a permission by writing it to the store.
    pub async fn grant(&self, user_id: &str, permission: &str) -> Result<(), SessionError> {
        self.store
            .set(&keys::permissions(user_id), permission, "1")
            .await?;
        Ok(())
    }

    /// Revokes a permission.
    pub async fn revoke(&self, user_id: &str, permission: &str) -> Result<(), SessionError> {
        self.store
            .set(&keys::permissions(user_id), permission, "0")
            .await?;
        Ok(())
    }
}

impl<S: SessionStore> Authorizer for StoreAuthorizer<S> {
    async fn has_permission(&self, user_id: &str, permission: &str) -> Result<bool, SessionError> {
        let value = self
            .store
            .get(&keys::permissions(user_id), permission)
            .await?;
        Ok(matches!(value.as_deref(), Some("1" | "true")))
    }
}
