use tracing::{debug, error};
use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation, TokenData};
use crate::auth::{AuthError, USER_TOKEN_TYPE};

/// Get the auth token from request headers, falling back to a query parameter
/// (browsers cannot set headers on a websocket upgrade).
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, AuthError> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidToken("Invalid Authorization header".to_string()))?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(http::header::COOKIE) {
        let cookie_str = cookie_header
            .to_str()
            .map_err(|_| AuthError::InvalidToken("Invalid Cookie header".to_string()))?;
        for cookie in cookie::Cookie::split_parse(cookie_str).flatten() {
            if cookie.name() == "auth_token" {
                return Ok(cookie.value().to_string());
            }
        }
    }

    // 3. Query parameter
    match query_token {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AuthError::MissingToken),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Resolve the user behind a token: the `sub` claim of a valid user token.
pub fn authenticated_user_id(token: &str, secret: Option<&str>) -> Result<String, AuthError> {
    let secret = secret.ok_or_else(|| {
        error!("Cloud auth JWT secret not configured");
        AuthError::MissingSecret
    })?;

    let token_data = validate_jwt(token, secret).map_err(|e| {
        error!("JWT validation failed: {}", e);
        AuthError::InvalidToken(e.to_string())
    })?;

    let token_type = token_data
        .claims
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AuthError::InvalidToken("JWT token does not contain 'type' claim".to_string()))?;
    if token_type != USER_TOKEN_TYPE {
        return Err(AuthError::UnsupportedTokenType(token_type.to_string()));
    }

    let uid = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("JWT token does not contain 'sub' claim".to_string()))?;

    debug!("JWT token validated successfully for user: {}", uid);
    Ok(uid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn exp() -> i64 {
        chrono::Utc::now().timestamp() + 600
    }

    #[test]
    fn test_user_token_resolves_subject() {
        let t = token(json!({"sub": "alice", "type": "user", "exp": exp()}));
        assert_eq!(authenticated_user_id(&t, Some(SECRET)).unwrap(), "alice");
    }

    #[test]
    fn test_service_token_rejected() {
        let t = token(json!({"sub": "colabri-app", "type": "service", "exp": exp()}));
        assert!(matches!(
            authenticated_user_id(&t, Some(SECRET)),
            Err(AuthError::UnsupportedTokenType(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let t = token(json!({"sub": "alice", "type": "user", "exp": exp()}));
        let err = authenticated_user_id(&t, Some("other")).unwrap_err();
        assert_eq!(err.status(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_missing_secret_is_server_error() {
        let err = authenticated_user_id("whatever", None).unwrap_err();
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_token_sources_in_order() {
        let mut headers = HeaderMap::new();
        assert!(matches!(get_auth_token(&headers, None), Err(AuthError::MissingToken)));
        assert_eq!(get_auth_token(&headers, Some("q")).unwrap(), "q");

        headers.insert(http::header::COOKIE, "theme=dark; auth_token=c".parse().unwrap());
        assert_eq!(get_auth_token(&headers, Some("q")).unwrap(), "c");

        headers.insert(http::header::AUTHORIZATION, "Bearer h".parse().unwrap());
        assert_eq!(get_auth_token(&headers, Some("q")).unwrap(), "h");
    }
}
