use serde::{Deserialize, Serialize};

use crate::users::dto::PublicUser;

/// Request body for signup.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Response returned after signup or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

/// OTP verification ack; `token` is present only when the email already
/// belongs to a user (an OTP alone does not authenticate a new identity).
#[derive(Debug, Serialize)]
pub struct OtpVerifyResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_verify_response_omits_absent_token() {
        let json = serde_json::to_string(&OtpVerifyResponse {
            message: "OTP verified. Please complete signup.".into(),
            token: None,
        })
        .unwrap();
        assert!(!json.contains("token"));

        let json = serde_json::to_string(&OtpVerifyResponse {
            message: "OTP verified".into(),
            token: Some("abc".into()),
        })
        .unwrap();
        assert!(json.contains("\"token\":\"abc\""));
    }
}
