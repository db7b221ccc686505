//! Payload decoding for compact JWTs.
//!
//! Only the claims segment is read. Signatures are checked by the identity
//! provider and the API gateway in front of the proxy, never here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("token must have three dot-separated segments, found {0}")]
    Malformed(usize),
    #[error("payload is not valid base64url: {0}")]
    Base64(String),
    #[error("payload is not valid json: {0}")]
    Json(String),
    #[error("payload is not a json object")]
    NotAnObject,
}

/// Decodes the payload segment of `token` into its claim map.
pub fn decode_payload(token: &str) -> Result<Map<String, Value>, JwtError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 || segments[1].is_empty() {
        return Err(JwtError::Malformed(segments.len()));
    }
    // Some issuers pad; the engine does not accept it.
    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| JwtError::Base64(err.to_string()))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|err| JwtError::Json(err.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(JwtError::NotAnObject),
    }
}

/// User claims carried by an identity token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "cognito:username",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
}

impl UserProfile {
    pub fn from_identity_token(token: &str) -> Result<Self, JwtError> {
        let claims = decode_payload(token)?;
        let claim = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);
        Ok(Self {
            email: claim("email"),
            sub: claim("sub"),
            name: claim("name"),
            username: claim("cognito:username"),
        })
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn email_only_payload_yields_email_only_profile() {
        let token = encode_test_token(&json!({ "email": "a@b.com" }));
        let profile = UserProfile::from_identity_token(&token).unwrap();
        assert_eq!(
            profile,
            UserProfile {
                email: Some("a@b.com".to_string()),
                ..Default::default()
            }
        );
        assert_eq!(
            serde_json::to_value(&profile).unwrap(),
            json!({ "email": "a@b.com" })
        );
    }

    #[test]
    fn cognito_claims_are_mapped() {
        let token = encode_test_token(&json!({
            "sub": "1234",
            "email": "burner@example.com",
            "cognito:username": "burner",
            "exp": 1700000000,
        }));
        let profile = UserProfile::from_identity_token(&token).unwrap();
        assert_eq!(profile.sub.as_deref(), Some("1234"));
        assert_eq!(profile.username.as_deref(), Some("burner"));
        assert_eq!(profile.name, None);
    }

    #[test]
    fn padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"sub":"x"}"#);
        assert!(payload.ends_with('='));
        let claims = decode_payload(&format!("h.{payload}.s")).unwrap();
        assert_eq!(claims.get("sub"), Some(&json!("x")));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(decode_payload("abc"), Err(JwtError::Malformed(1)));
        assert_eq!(decode_payload("a.b.c.d"), Err(JwtError::Malformed(4)));
        assert_eq!(decode_payload("a..c"), Err(JwtError::Malformed(3)));
        assert!(matches!(decode_payload("a.!!!.c"), Err(JwtError::Base64(_))));

        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(matches!(
            decode_payload(&format!("a.{not_json}.c")),
            Err(JwtError::Json(_))
        ));

        let array = URL_SAFE_NO_PAD.encode("[1,2]");
        assert_eq!(
            decode_payload(&format!("a.{array}.c")),
            Err(JwtError::NotAnObject)
        );
    }
}
