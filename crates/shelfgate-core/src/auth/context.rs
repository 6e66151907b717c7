use crate::auth::api_key::ApiKeyCredential;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role. Only `Admin` is privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Librarian,
    #[default]
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Librarian => write!(f, "librarian"),
            Self::User => write!(f, "user"),
        }
    }
}

/// The acting user of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    pub email: Option<String>,
    pub role: Role,
}

impl UserRef {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Request-scoped authorization state, stored as a request extension.
///
/// At most one of `api_key` and `user` is authoritative. An API-key request may also carry
/// `user` when the key is bound to an account; a JWT request carries only `user`. Both are
/// absent for anonymous requests that passed optional authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationContext {
    pub api_key: Option<ApiKeyCredential>,
    pub api_key_auth: bool,
    pub user: Option<UserRef>,
}

impl AuthorizationContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for a request authenticated by API key. The key's owner becomes the user.
    #[must_use]
    pub fn from_api_key(credential: ApiKeyCredential) -> Self {
        let user = credential.user.clone();
        Self { api_key: Some(credential), api_key_auth: true, user }
    }

    /// Context for a request authenticated upstream by a user token.
    #[must_use]
    pub fn from_user(user: UserRef) -> Self {
        Self { api_key: None, api_key_auth: false, user: Some(user) }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(UserRef::is_admin)
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.api_key.is_none() && self.user.is_none()
    }
}
