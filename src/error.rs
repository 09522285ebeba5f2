use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Client-facing error taxonomy. Everything a handler can fail with maps to
/// one of these; store and transport errors never reach the client raw.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User already exists")]
    DuplicateEmail,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Failed to send email")]
    Notifier,
    #[error("{0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DuplicateEmail
            | ApiError::InvalidCredentials
            | ApiError::InvalidOtp
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Notifier | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            // Detail goes to the log only; the client sees a generic message.
            error!(error = %e, "internal error");
        }
        let body = axum::Json(json!({ "message": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// `axum::Json` with the rejection folded into the taxonomy, so a malformed
/// body (a `password` key in an update payload included) answers with the
/// same `{"message"}` shape as every other failure.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rej| ApiError::Validation(rej.body_text()))?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(ApiError::DuplicateEmail.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidOtp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Unauthorized("Missing Authorization header").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::NotFound("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Notifier.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::Validation("Invalid email".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused to db-host:5432"));
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn not_found_names_the_resource() {
        assert_eq!(ApiError::NotFound("User").to_string(), "User not found");
    }

    #[tokio::test]
    async fn json_rejection_maps_to_validation() {
        let req = Request::builder()
            .method("PUT")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"password":"sneaky"}"#))
            .expect("request");
        let err = Json::<crate::users::dto::UpdateUserRequest>::from_request(req, &())
            .await
            .err()
            .expect("rejection");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("password"));
    }

    #[tokio::test]
    async fn json_rejection_covers_malformed_bodies() {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .expect("request");
        let err = Json::<crate::auth::dto::LoginRequest>::from_request(req, &())
            .await
            .err()
            .expect("rejection");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
