use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, RegisterRequest, TokenResponse},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::CredentialStore,
    repo_types::{NewUser, User},
};
use crate::error::{AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 1024;
const MAX_NAME_LEN: usize = 100;
const MAX_USERNAME_LEN: usize = 64;
const USER_EXISTS: &str = "User already exists with given username.";

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^\S{1,64}$").unwrap();
    // Checked against when the username is unknown so both failure paths cost one argon2 run.
    static ref DUMMY_HASH: Option<String> = hash_password("dummy-password-for-timing").ok();
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub async fn register(users: &dyn CredentialStore, req: RegisterRequest) -> AppResult<User> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        warn!("invalid name");
        return Err(AppError::Validation(format!(
            "name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }

    if !is_valid_username(&req.username) {
        warn!(username = %req.username, "invalid username");
        return Err(AppError::Validation(format!(
            "username must be 1-{MAX_USERNAME_LEN} characters without whitespace"
        )));
    }

    let password_len = req.password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password_len) {
        warn!("password length out of range");
        return Err(AppError::Validation(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }

    if users.find_active_by_username(&req.username).await?.is_some() {
        warn!(username = %req.username, "username already registered");
        return Err(AppError::Conflict(USER_EXISTS.into()));
    }

    let password_hash = hash_password(&req.password)?;

    let user = users
        .create(NewUser {
            id: Uuid::new_v4(),
            name: name.to_string(),
            username: req.username,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            // lost a race against a concurrent sign-up
            AppError::Conflict(_) => AppError::Conflict(USER_EXISTS.into()),
            other => other,
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Unknown, inactive or malformed usernames and wrong passwords all produce
/// the same `Unauthorized` error.
pub async fn login(
    users: &dyn CredentialStore,
    keys: &JwtKeys,
    req: LoginRequest,
) -> AppResult<TokenResponse> {
    let found = if is_valid_username(&req.username) {
        users.find_active_by_username(&req.username).await?
    } else {
        None
    };

    let Some(user) = found else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = verify_password(&req.password, dummy);
        }
        warn!(username = %req.username, "login unknown username");
        return Err(AppError::invalid_credentials());
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::invalid_credentials());
    }

    let access_token = keys.sign(user.id, &user.username)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(TokenResponse { access_token })
}

/// Resolve the profile behind a verified token.
pub async fn current_user(users: &dyn CredentialStore, user_id: Uuid) -> AppResult<User> {
    match users.find_by_id(user_id).await? {
        Some(user) if user.is_active => Ok(user),
        _ => {
            warn!(%user_id, "token user missing or inactive");
            Err(AppError::Unauthorized("User not found".into()))
        }
    }
}
