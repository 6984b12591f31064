use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};

use mercado_db::Database;
use mercado_gateway::auth::AuthGate;
use mercado_gateway::bridge::NotificationBridge;
use mercado_types::api::{Claims, LoginRequest, LoginResponse, Principal, RegisterRequest, RegisterResponse};

use crate::blocking;

/// Role every self-registered account starts with.
const DEFAULT_ROLE: &str = "student";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    /// Verifies bearer tokens on protected routes; same rules as the relay.
    pub gate: AuthGate,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub bridge: NotificationBridge,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        jwt_secret: String,
        token_ttl: Duration,
        bridge: NotificationBridge,
    ) -> AppState {
        Arc::new(Self {
            db,
            gate: AuthGate::new(&jwt_secret),
            jwt_secret,
            token_ttl,
            bridge,
        })
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || req.name.trim().is_empty() || req.lastname.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if email is taken
    let lookup = email.clone();
    if blocking(&state, move |db| db.get_user_by_email(&lookup))
        .await?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let (name, lastname) = (req.name.trim().to_string(), req.lastname.trim().to_string());
    let new_email = email.clone();
    let user_id = blocking(&state, move |db| {
        let id = db.create_user(&new_email, &name, &lastname, &password_hash)?;
        db.assign_role(id, DEFAULT_ROLE)?;
        Ok(id)
    })
    .await?;

    let principal = Principal {
        id: user_id,
        email,
        roles: vec![DEFAULT_ROLE.to_string()],
    };
    let token = create_token(&state.jwt_secret, &principal, state.token_ttl)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    info!("Registered user {} ({})", principal.email, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();
    let (user, roles) = blocking(&state, move |db| {
        let Some(user) = db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        let roles = db.get_user_roles(user.id)?;
        Ok(Some((user, roles)))
    })
    .await?
    .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for {}", user.email);
            StatusCode::UNAUTHORIZED
        })?;

    let principal = Principal {
        id: user.id,
        email: user.email,
        roles,
    };
    let token = create_token(&state.jwt_secret, &principal, state.token_ttl)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse { token }))
}

/// Issue an HS256 token carrying `{id, email, roles, iat, exp}`.
pub fn create_token(secret: &str, principal: &Principal, ttl: Duration) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        id: principal.id,
        email: principal.email.clone(),
        roles: principal.roles.clone(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
