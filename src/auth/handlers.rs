use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, OtpVerifyResponse, SendOtpRequest,
            SignupRequest, VerifyOtpRequest,
        },
        jwt::JwtKeys,
        otp::{OtpOutcome, OtpRecord},
        password::{hash_password, verify_password},
    },
    error::{ApiError, Json},
    state::AppState,
    users::repo::{is_unique_violation, User, UserRole},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/otp/send", post(send_otp))
        .route("/auth/otp/verify", post(verify_otp))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!("signup invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("signup password too short");
        return Err(ApiError::Validation("Password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = match User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.phone,
        &hash,
        UserRole::Standard,
    )
    .await
    {
        Ok(u) => u,
        // Lost the race against a concurrent signup for the same email
        Err(e) if is_unique_violation(&e) => return Err(ApiError::DuplicateEmail),
        Err(e) => return Err(e.into()),
    };

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully".into(),
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_string();

    // Unknown email and wrong password are indistinguishable to the caller
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!("login unknown email");
            ApiError::InvalidCredentials
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        message: "Logged in successfully".into(),
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_string();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }

    let ttl = state.config.otp_ttl_minutes;
    let code = OtpRecord::issue(&state.db, &email, ttl).await?;

    // The record stays committed if delivery fails; a retry issues a
    // superseding code rather than waiting out the TTL.
    let body = format!(
        "<h2>Your OTP is: {}</h2><p>It will expire in {} minutes.</p>",
        code, ttl
    );
    if let Err(e) = state.mailer.send(&email, "Your Ride Evee OTP", &body).await {
        error!(error = %e, "otp email send failed");
        return Err(ApiError::Notifier);
    }

    info!(email = %email, "otp sent");
    Ok(Json(MessageResponse {
        message: "OTP sent successfully".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<OtpVerifyResponse>, ApiError> {
    let email = payload.email.trim().to_string();

    match OtpRecord::verify(&state.db, &email, &payload.otp).await? {
        OtpOutcome::Valid => {}
        OtpOutcome::NotFound | OtpOutcome::Expired => {
            // Do not leak which of the two it was
            warn!(email = %email, "otp rejected");
            return Err(ApiError::InvalidOtp);
        }
    }

    match User::find_by_email(&state.db, &email).await? {
        Some(user) => {
            let token = JwtKeys::from_ref(&state).sign(user.id)?;
            info!(user_id = %user.id, "otp login");
            Ok(Json(OtpVerifyResponse {
                message: "OTP verified".into(),
                token: Some(token),
            }))
        }
        None => Ok(Json(OtpVerifyResponse {
            message: "OTP verified. Please complete signup.".into(),
            token: None,
        })),
    }
}
