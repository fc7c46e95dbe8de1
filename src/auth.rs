// src/auth.rs
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{Filter, Rejection};

use crate::db::HoldingStore;
use crate::error::AppError;
use crate::models::User;

pub const AUTH_COOKIE: &str = "Authorization";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// The verified caller. Handlers receive this instead of digging the user out
/// of request-scoped state.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }
}

/// Tokens are issued by the login service; this signs the same claims.
#[cfg(test)]
pub fn create_token(
    user_id: &str,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Returns the subject of a valid HS256 token.
pub fn verify_token(token: &str, secret: &str) -> Result<String, AppError> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    ) {
        Ok(data) => Ok(data.claims.sub),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(AppError::Unauthorized("Token expired")),
            _ => {
                debug!("Rejected token: {}", e);
                Err(AppError::Unauthorized("Invalid token"))
            }
        },
    }
}

fn bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn with_auth(
    secret: Arc<String>,
    store: Arc<dyn HoldingStore>,
) -> impl Filter<Extract = (AuthenticatedUser,), Error = Rejection> + Clone {
    warp::cookie::optional(AUTH_COOKIE)
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::any().map(move || secret.clone()))
        .and(warp::any().map(move || store.clone()))
        .and_then(authorize)
}

async fn authorize(
    cookie: Option<String>,
    header: Option<String>,
    secret: Arc<String>,
    store: Arc<dyn HoldingStore>,
) -> Result<AuthenticatedUser, Rejection> {
    let token = cookie
        .filter(|c| !c.is_empty())
        .or_else(|| header.as_deref().and_then(bearer).map(str::to_string))
        .ok_or_else(|| warp::reject::custom(AppError::Unauthorized("No token")))?;

    let user_id = verify_token(&token, &secret).map_err(warp::reject::custom)?;

    match store.find_user(&user_id).await {
        Ok(Some(user)) => Ok(AuthenticatedUser { user }),
        Ok(None) => {
            warn!("Token for unknown user {}", user_id);
            Err(warp::reject::custom(AppError::Unauthorized("User not found")))
        }
        Err(e) => Err(warp::reject::custom(AppError::Storage(e))),
    }
}
