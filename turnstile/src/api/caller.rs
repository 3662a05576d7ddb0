//! Caller identity extraction.
//!
//! Identity is asserted by an upstream gateway through two headers:
//!
//! - `x-user-id`: UUID of the authenticated user (absent for guests)
//! - `x-user-role`: `admin` grants admin rights; any other value is ignored

use super::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use turnstile_core::{Actor, UserId};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's role
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Who is calling, as asserted by request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Authenticated user, if any
    pub user_id: Option<UserId>,
    /// Whether the caller holds the admin role
    pub admin: bool,
}

impl Caller {
    /// The caller as an authenticated actor.
    ///
    /// # Errors
    ///
    /// Returns 401 if no user id was supplied.
    pub fn actor(&self) -> Result<Actor, AppError> {
        match (self.user_id, self.admin) {
            (Some(user_id), true) => Ok(Actor::Admin(user_id)),
            (Some(user_id), false) => Ok(Actor::User(user_id)),
            (None, _) => Err(AppError::unauthorized(format!(
                "Missing {USER_ID_HEADER} header"
            ))),
        }
    }

    /// The caller as an actor, falling back to a guest identified by `email`.
    ///
    /// # Errors
    ///
    /// Returns 401 if there is neither a user id nor an email.
    pub fn actor_or_guest(&self, email: Option<String>) -> Result<Actor, AppError> {
        match (self.user_id, email) {
            (Some(_), _) => self.actor(),
            (None, Some(email)) => Ok(Actor::Guest { email }),
            (None, None) => Err(AppError::unauthorized(
                "Sign in or provide the email the registration was made with",
            )),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = match parts.headers.get(USER_ID_HEADER) {
            None => None,
            Some(value) => {
                let raw = value
                    .to_str()
                    .map_err(|_| AppError::bad_request(format!("Invalid {USER_ID_HEADER} header")))?;
                Some(raw.trim().parse::<UserId>().map_err(|_| {
                    AppError::bad_request(format!("{USER_ID_HEADER} must be a UUID"))
                })?)
            }
        };

        let admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        Ok(Self { user_id, admin })
    }
}
