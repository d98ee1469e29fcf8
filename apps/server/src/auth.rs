use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::{db, error::AppError, settings, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Hex SHA-256 of a password; the only form in which passwords are stored.
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn sign(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn verify(secret: &str, message: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    mac.verify_slice(&signature).is_ok()
}

// ── Admin tokens ──
//
// `{issued_at}.{hmac(secret, "admin:{issued_at}:{password_digest}")}`.
// Nothing is stored server-side; a password change invalidates every token.

pub fn issue_token(secret: &str, password_digest: &str, issued_at: i64) -> String {
    let sig = sign(secret, &format!("admin:{}:{}", issued_at, password_digest));
    format!("{}.{}", issued_at, sig)
}

pub fn verify_token(secret: &str, password_digest: &str, token: &str, now: i64, ttl_secs: i64) -> bool {
    let Some((issued_str, sig)) = token.split_once('.') else {
        return false;
    };
    let Ok(issued_at) = issued_str.parse::<i64>() else {
        return false;
    };
    if issued_at > now || now - issued_at > ttl_secs {
        return false;
    }
    verify(secret, &format!("admin:{}:{}", issued_at, password_digest), sig)
}

// ── Confirm links ──

pub fn confirm_secret(secret: &str, lead_id: i64) -> String {
    sign(secret, &format!("confirm:{}", lead_id))
}

pub fn verify_confirm_secret(secret: &str, lead_id: i64, candidate: &str) -> bool {
    verify(secret, &format!("confirm:{}", lead_id), candidate)
}

/// Digest of the password currently in force: the saved one, or the
/// bootstrap password from the environment.
pub async fn current_password_digest(state: &AppState) -> Result<String, AppError> {
    let stored = db::get_setting(&state.db, settings::ADMIN_PASSWORD_KEY).await?;
    Ok(match stored.and_then(|s| serde_json::from_str::<String>(&s.value).ok()) {
        Some(digest) => digest,
        None => password_digest(&state.config.admin_password),
    })
}

/// Axum middleware guarding admin routes with `Authorization: Bearer <token>`.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("로그인이 필요합니다".into()))?;

    let digest = current_password_digest(&state).await?;
    let now = chrono::Utc::now().timestamp();
    if !verify_token(&state.config.auth_secret, &digest, token.trim(), now, state.config.token_ttl_secs) {
        tracing::warn!("Rejected admin token for {}", req.uri().path());
        return Err(AppError::Unauthorized(
            "인증이 만료되었습니다. 다시 로그인해주세요".into(),
        ));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_roundtrip() {
        let digest = password_digest("hunter2");
        let token = issue_token(SECRET, &digest, 1_000);
        assert!(verify_token(SECRET, &digest, &token, 1_500, 3600));
    }

    #[test]
    fn test_token_expires() {
        let digest = password_digest("hunter2");
        let token = issue_token(SECRET, &digest, 1_000);
        assert!(!verify_token(SECRET, &digest, &token, 1_000 + 3601, 3600));
    }

    #[test]
    fn test_token_from_future_rejected() {
        let digest = password_digest("hunter2");
        let token = issue_token(SECRET, &digest, 5_000);
        assert!(!verify_token(SECRET, &digest, &token, 1_000, 3600));
    }

    #[test]
    fn test_password_change_invalidates_token() {
        let token = issue_token(SECRET, &password_digest("old"), 1_000);
        assert!(!verify_token(SECRET, &password_digest("new"), &token, 1_001, 3600));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let digest = password_digest("hunter2");
        let token = issue_token(SECRET, &digest, 1_000);
        let forged = token.replacen("1000", "1200", 1);
        assert!(!verify_token(SECRET, &digest, &forged, 1_300, 3600));
        assert!(!verify_token(SECRET, &digest, "garbage", 1_300, 3600));
        assert!(!verify_token(SECRET, &digest, "1000.zz", 1_300, 3600));
        assert!(!verify_token("other-secret", &digest, &token, 1_300, 3600));
    }

    #[test]
    fn test_confirm_secret_bound_to_lead() {
        let secret = confirm_secret(SECRET, 42);
        assert!(verify_confirm_secret(SECRET, 42, &secret));
        assert!(!verify_confirm_secret(SECRET, 43, &secret));
        assert!(!verify_confirm_secret(SECRET, 42, "deadbeef"));
    }

    #[test]
    fn test_password_digest_is_hex_sha256() {
        let digest = password_digest("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
