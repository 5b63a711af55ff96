use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ─── AuthMode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum AuthMode {
    None,
    Jwt(JwtConfig),
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub algorithm: Algorithm,
    pub secret: Option<String>,
    pub public_key: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

// ─── AuthContext ─────────────────────────────────────────────────────────────

/// The operator control plane has exactly one role: `ADMIN`. There is no
/// per-endpoint or per-delivery scoping — a principal can see and act on
/// the whole fleet or not at all.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub sub: Option<String>,
    pub is_admin: bool,
}

impl AuthContext {
    pub fn open() -> Self {
        Self {
            sub: None,
            is_admin: true,
        }
    }
}

pub fn check_admin(auth: &AuthContext) -> bool {
    auth.is_admin
}

// ─── JWT Claims ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<serde_json::Value>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
}

// ─── Auth Middleware ─────────────────────────────────────────────────────────

/// Gates the operator control plane. The ingest gateway is mounted outside
/// this middleware — its authenticity comes from per-endpoint HMAC
/// verification, not a bearer token.
pub async fn auth_middleware(
    State(auth_mode): State<Arc<AuthMode>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match auth_mode.as_ref() {
        AuthMode::None => {
            req.extensions_mut().insert(AuthContext::open());
            next.run(req).await
        }
        AuthMode::Jwt(config) => {
            let auth_header = req
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok());

            let token = match auth_header {
                Some(header) if header.starts_with("Bearer ") => &header[7..],
                _ => {
                    return (
                        axum::http::StatusCode::UNAUTHORIZED,
                        axum::Json(json!({ "error": "Missing Bearer token" })),
                    )
                        .into_response();
                }
            };

            match decode_jwt(token, config) {
                Ok(ctx) => {
                    req.extensions_mut().insert(ctx);
                    next.run(req).await
                }
                Err(_) => (
                    axum::http::StatusCode::UNAUTHORIZED,
                    axum::Json(json!({ "error": "Invalid or expired token" })),
                )
                    .into_response(),
            }
        }
    }
}

/// Builds the runtime [`AuthMode`] from a resolved config's `auth` section.
/// A `jwt` mode with neither `secret` nor `publicKey` set falls back to
/// `None` — there is nothing to verify against.
pub fn auth_mode_from_config(config: &hookrelay_core::config::ResolvedConfig) -> AuthMode {
    use hookrelay_core::config::AuthMode as ConfigAuthMode;

    let Some(auth) = &config.auth else {
        return AuthMode::None;
    };
    if auth.mode == ConfigAuthMode::None {
        return AuthMode::None;
    }
    let Some(jwt) = &auth.jwt else {
        return AuthMode::None;
    };
    let algorithm = jwt
        .algorithm
        .as_deref()
        .and_then(parse_algorithm)
        .unwrap_or(Algorithm::HS256);
    let public_key = jwt.public_key.clone().or_else(|| {
        jwt.public_key_file
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
    });
    if jwt.secret.is_none() && public_key.is_none() {
        return AuthMode::None;
    }
    AuthMode::Jwt(JwtConfig {
        algorithm,
        secret: jwt.secret.clone(),
        public_key,
        issuer: jwt.issuer.clone(),
        audience: jwt.audience.clone(),
    })
}

fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name.to_uppercase().as_str() {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "ES256" => Some(Algorithm::ES256),
        "ES384" => Some(Algorithm::ES384),
        _ => None,
    }
}

fn decode_jwt(token: &str, config: &JwtConfig) -> Result<AuthContext, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(config.algorithm);

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    let key = if let Some(ref secret) = config.secret {
        DecodingKey::from_secret(secret.as_bytes())
    } else if let Some(ref public_key) = config.public_key {
        DecodingKey::from_rsa_pem(public_key.as_bytes())?
    } else {
        return Err(jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::InvalidKeyFormat,
        ));
    };

    let token_data = decode::<JwtClaims>(token, &key, &validation)?;
    let claims = token_data.claims;

    Ok(AuthContext {
        sub: claims.sub,
        is_admin: claims.role.as_deref() == Some("admin"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_context_is_admin() {
        assert!(check_admin(&AuthContext::open()));
    }

    #[test]
    fn non_admin_role_is_rejected() {
        let ctx = AuthContext {
            sub: Some("user1".to_string()),
            is_admin: false,
        };
        assert!(!check_admin(&ctx));
    }
}
