use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use solace_db::NewUser;
use solace_types::api::{
    AuthResponse, Claims, LoginRequest, ProfileUpdate, RefreshRequest, RefreshResponse,
    RegisterRequest, TokenPair, UserResponse,
};

use crate::error::{ApiError, FieldError};
use crate::tokens::hash_refresh_token;
use crate::{AppState, load_active_user};

/// Consecutive failures before the account is locked.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const LOCK_HOURS: i64 = 2;

const MIN_PASSWORD_CHARS: usize = 6;
const MAX_PASSWORD_CHARS: usize = 128;
const MAX_NAME_CHARS: usize = 100;
const MAX_GENDER_CHARS: usize = 50;

fn check_name(name: &str, errors: &mut Vec<FieldError>) {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        errors.push(FieldError::new(
            "name",
            format!("Name must be between 1 and {} characters", MAX_NAME_CHARS),
        ));
    }
}

fn check_age(age: Option<u8>, errors: &mut Vec<FieldError>) {
    if let Some(age) = age {
        if !(13..=120).contains(&age) {
            errors.push(FieldError::new("age", "Age must be between 13 and 120"));
        }
    }
}

fn check_gender(gender: Option<&str>, errors: &mut Vec<FieldError>) {
    if gender.is_some_and(|g| g.chars().count() > MAX_GENDER_CHARS) {
        errors.push(FieldError::new(
            "gender",
            format!("Gender cannot exceed {} characters", MAX_GENDER_CHARS),
        ));
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && email.len() <= 254
}

fn reject(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation {
            message: "Validation failed".into(),
            details: errors,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {}", raw, e)))
}

/// Sign an access token and persist the hash of a new refresh token.
fn issue_tokens(state: &AppState, user_id: Uuid, email: &str) -> Result<TokenPair, ApiError> {
    let (pair, refresh_hash) = state.tokens.issue_pair(user_id, email)?;
    state
        .db
        .store_refresh_token(&refresh_hash, user_id, Utc::now() + state.tokens.refresh_ttl)?;
    Ok(pair)
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    let gender = req.gender.as_deref().map(str::trim).filter(|g| !g.is_empty());

    let mut errors = Vec::new();
    check_name(name, &mut errors);
    if !is_plausible_email(&email) {
        errors.push(FieldError::new("email", "A valid email is required"));
    }
    let password_len = req.password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&password_len) {
        errors.push(FieldError::new(
            "password",
            format!(
                "Password must be between {} and {} characters",
                MIN_PASSWORD_CHARS, MAX_PASSWORD_CHARS
            ),
        ));
    }
    check_age(req.age, &mut errors);
    check_gender(gender, &mut errors);
    reject(errors)?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let created = state.db.create_user(&NewUser {
        id: user_id,
        name,
        email: &email,
        password_hash: &password_hash,
        age: req.age,
        gender,
        language: req.language.unwrap_or_default(),
    })?;
    if !created {
        return Err(ApiError::invalid("email", "Email is already registered"));
    }

    let row = load_active_user(&state, user_id)?;
    let tokens = issue_tokens(&state, user_id, &row.email)?;

    info!(user_id = %user_id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: row.to_user(),
            tokens,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    const INVALID: ApiError = ApiError::Unauthorized("Invalid email or password");

    let email = req.email.trim().to_lowercase();
    let row = state
        .db
        .get_user_by_email(&email)?
        .filter(|row| row.is_active)
        .ok_or(INVALID)?;

    let now = Utc::now();
    if let Some(until) = row.lock_until().filter(|until| *until > now) {
        return Err(ApiError::Locked(until));
    }

    let user_id = parse_id(&row.id)?;
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| anyhow::anyhow!("stored password hash for {} is invalid: {}", user_id, e))?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        let locked = state.db.record_failed_login(
            user_id,
            MAX_LOGIN_ATTEMPTS,
            Duration::hours(LOCK_HOURS),
        )?;
        if let Some(until) = locked {
            warn!(user_id = %user_id, until = %until, "Account locked after repeated failed logins");
        }
        return Err(INVALID);
    }

    state.db.record_successful_login(user_id, now)?;
    let row = load_active_user(&state, user_id)?;
    let tokens = issue_tokens(&state, user_id, &row.email)?;

    info!(user_id = %user_id, "User logged in");
    Ok(Json(AuthResponse {
        user: row.to_user(),
        tokens,
    }))
}

/// Rotate a refresh token: the presented token is revoked and a new pair issued.
pub async fn refresh(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RefreshRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    const INVALID: ApiError = ApiError::Unauthorized("Invalid or expired refresh token");

    let hash = hash_refresh_token(req.refresh_token.trim());
    let user_id = state
        .db
        .consume_refresh_token(&hash, Utc::now())?
        .ok_or(INVALID)?;

    let row = state
        .db
        .get_user_by_id(user_id)?
        .filter(|row| row.is_active)
        .ok_or(INVALID)?;

    let tokens = issue_tokens(&state, user_id, &row.email)?;
    Ok(Json(RefreshResponse { tokens }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_active_user(&state, claims.sub)?;
    Ok(Json(UserResponse {
        user: row.to_user(),
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(mut update), _): WithRejection<Json<ProfileUpdate>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    update.name = update.name.map(|n| n.trim().to_string());
    update.gender = update.gender.map(|g| g.trim().to_string());

    let mut errors = Vec::new();
    if let Some(name) = &update.name {
        check_name(name, &mut errors);
    }
    check_age(update.age, &mut errors);
    check_gender(update.gender.as_deref(), &mut errors);
    reject(errors)?;

    load_active_user(&state, claims.sub)?;
    state.db.update_profile(claims.sub, &update)?;
    let row = load_active_user(&state, claims.sub)?;

    Ok(Json(UserResponse {
        user: row.to_user(),
    }))
}

/// Soft delete: the row stays, the account stops working.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    load_active_user(&state, claims.sub)?;
    state.db.deactivate_user(claims.sub, Utc::now())?;

    info!(user_id = %claims.sub, "Account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("ana@example.com"));
        assert!(!is_plausible_email("ana.example.com"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ana@example"));
        assert!(!is_plausible_email("ana@@example.com"));
        assert!(!is_plausible_email("ana maria@example.com"));
    }

    #[test]
    fn field_checks_collect_errors() {
        let mut errors = Vec::new();
        check_name("", &mut errors);
        check_age(Some(9), &mut errors);
        check_gender(Some("x".repeat(51).as_str()), &mut errors);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["name", "age", "gender"]);

        let mut errors = Vec::new();
        check_name("Ana", &mut errors);
        check_age(None, &mut errors);
        check_gender(None, &mut errors);
        assert!(errors.is_empty());
    }
}
