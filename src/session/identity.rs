// Tolerant decoding of token payloads
// Every function here is total: bad input yields None, never a panic

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Claims checked for the session identity, in precedence order
const IDENTITY_CLAIMS: [&str; 3] = ["user_id", "sub", "email"];

/// Decode the JSON payload (second segment) of a JWT without verifying it
pub fn parse_token_payload(token: &str) -> Option<Value> {
    let segment = token.split('.').nth(1)?;
    if segment.is_empty() {
        return None;
    }

    // Accept both padded and unpadded base64url
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Identity claim of an access token, as the raw JSON value
///
/// The first truthy claim wins. Array or object claims are unresolvable.
/// Compare these values (not their string forms) to tell sessions apart:
/// `7` and `"7"` are different identities.
pub fn session_identity_claim(token: Option<&str>) -> Option<Value> {
    let payload = parse_token_payload(token?)?;

    let claim = IDENTITY_CLAIMS
        .iter()
        .filter_map(|name| payload.get(*name))
        .find(|value| is_truthy(value))?;

    match claim {
        Value::Array(_) | Value::Object(_) => None,
        scalar => Some(scalar.clone()),
    }
}

/// Resolve the session identity of an access token, for display and key
/// scoping
///
/// Only used to compare sessions locally, never for authorization.
pub fn session_identity(token: Option<&str>) -> Option<String> {
    match session_identity_claim(token)? {
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Expiry (`exp` claim) of a token, if present
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let exp = parse_token_payload(token)?.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Falsy claim values (null, "", 0, false) don't count as an identity
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Build an unsigned token with the given payload, for tests
#[cfg(test)]
pub fn encode_test_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_identity_precedence() {
        let token = encode_test_token(&json!({"user_id": 42, "sub": "s", "email": "a@b.c"}));
        assert_eq!(session_identity(Some(&token)).as_deref(), Some("42"));

        let token = encode_test_token(&json!({"sub": "user-7", "email": "a@b.c"}));
        assert_eq!(session_identity(Some(&token)).as_deref(), Some("user-7"));

        let token = encode_test_token(&json!({"email": "a@b.c"}));
        assert_eq!(session_identity(Some(&token)).as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_falsy_claims_are_skipped() {
        let token = encode_test_token(&json!({"user_id": 0, "sub": "", "email": "x@y.z"}));
        assert_eq!(session_identity(Some(&token)).as_deref(), Some("x@y.z"));

        let token = encode_test_token(&json!({"user_id": null}));
        assert_eq!(session_identity(Some(&token)), None);
    }

    #[test]
    fn test_claim_keeps_json_type() {
        let number = encode_test_token(&json!({"user_id": 7}));
        let string = encode_test_token(&json!({"user_id": "7"}));
        assert_eq!(session_identity_claim(Some(&number)), Some(json!(7)));
        assert_eq!(session_identity_claim(Some(&string)), Some(json!("7")));
        assert_ne!(
            session_identity_claim(Some(&number)),
            session_identity_claim(Some(&string))
        );

        // Display form is the same for both
        assert_eq!(session_identity(Some(&number)).as_deref(), Some("7"));
        assert_eq!(session_identity(Some(&string)).as_deref(), Some("7"));

        let flag = encode_test_token(&json!({"sub": true}));
        assert_eq!(session_identity_claim(Some(&flag)), Some(json!(true)));
    }

    #[test]
    fn test_structured_claims_are_unresolvable() {
        // A truthy object claim is picked and then rejected, not skipped
        let object = encode_test_token(&json!({"user_id": {"id": 1}, "sub": "s"}));
        assert_eq!(session_identity_claim(Some(&object)), None);
        assert_eq!(session_identity(Some(&object)), None);

        let array = encode_test_token(&json!({"sub": [1, 2]}));
        assert_eq!(session_identity_claim(Some(&array)), None);
    }

    #[test]
    fn test_malformed_tokens_resolve_to_none() {
        assert_eq!(session_identity(None), None);
        assert_eq!(session_identity(Some("")), None);
        assert_eq!(session_identity(Some("no-dots-here")), None);
        assert_eq!(session_identity(Some("header..sig")), None);
        assert_eq!(session_identity(Some("a.!!!not-base64!!!.c")), None);

        // Valid base64, not JSON
        let not_json = URL_SAFE_NO_PAD.encode("hello world");
        assert_eq!(session_identity(Some(&format!("h.{}.s", not_json))), None);

        // JSON, but not an object with claims
        let array = URL_SAFE_NO_PAD.encode("[1,2,3]");
        assert_eq!(session_identity(Some(&format!("h.{}.s", array))), None);
    }

    #[test]
    fn test_padded_segment_is_accepted() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"abc"}"#);
        assert!(padded.ends_with('='));
        assert_eq!(
            session_identity(Some(&format!("h.{}.s", padded))).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_url_safe_alphabet() {
        let token = encode_test_token(&json!({"sub": "??>>??"}));
        let payload = token.split('.').nth(1).unwrap();
        assert!(payload.contains('-') && payload.contains('_'));
        assert_eq!(session_identity(Some(&token)).as_deref(), Some("??>>??"));
    }

    #[test]
    fn test_token_expiry() {
        let token = encode_test_token(&json!({"sub": "a", "exp": 1_700_000_000}));
        let exp = token_expiry(&token).unwrap();
        assert_eq!(exp.timestamp(), 1_700_000_000);

        let token = encode_test_token(&json!({"sub": "a"}));
        assert!(token_expiry(&token).is_none());
        assert!(token_expiry("garbage").is_none());
    }

    proptest! {
        #[test]
        fn prop_identity_never_panics(token in ".*") {
            let _ = session_identity(Some(&token));
            let _ = token_expiry(&token);
        }

        #[test]
        fn prop_dotted_garbage_never_panics(a in "[A-Za-z0-9_=-]{0,40}", b in "[A-Za-z0-9_=+/-]{0,80}") {
            let token = format!("{}.{}.sig", a, b);
            let _ = session_identity(Some(&token));
        }
    }
}
