//! Token payload shapes and token extraction.
//!
//! The token endpoint is undocumented, so authentication is a fixed-priority
//! trial of the payload shapes it might accept. The whole guessing game lives
//! here so it can be replaced with a single shape once the real contract is
//! known, without touching the client or the pipeline.

use serde_json::{Value, json};

use crate::config::Credentials;

/// Response-body keys checked before falling back to the JWT-shape scan.
const KNOWN_TOKEN_KEYS: [&str; 4] = ["access_token", "token", "accessToken", "jwt"];

/// One candidate request body for the token endpoint.
#[derive(Debug, Clone)]
pub enum TokenPayload {
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(&'static str, String)>),
    /// Sent as `application/json`.
    Json(Value),
}

/// A labelled payload shape. The label shows up in AuthError diagnostics.
#[derive(Debug, Clone)]
pub struct TokenShape {
    pub name: &'static str,
    pub payload: TokenPayload,
}

/// Build the candidate shapes in trial order: three form encodings (OAuth2
/// password grant first, then progressively barer), then flat JSON, then the
/// same JSON wrapped under the usual suspect keys.
pub fn candidate_shapes(creds: &Credentials) -> Vec<TokenShape> {
    let flat_json = json!({
        "username": creds.username,
        "password": creds.password,
        "client_id": creds.client_id,
    });

    let mut shapes = vec![
        TokenShape {
            name: "form:oauth-password",
            payload: TokenPayload::Form(vec![
                ("grant_type", "password".to_string()),
                ("username", creds.username.clone()),
                ("password", creds.password.clone()),
                ("client_id", creds.client_id.clone()),
            ]),
        },
        TokenShape {
            name: "form:no-grant-type",
            payload: TokenPayload::Form(vec![
                ("username", creds.username.clone()),
                ("password", creds.password.clone()),
                ("client_id", creds.client_id.clone()),
            ]),
        },
        TokenShape {
            name: "form:bare",
            payload: TokenPayload::Form(vec![
                ("username", creds.username.clone()),
                ("password", creds.password.clone()),
            ]),
        },
        TokenShape {
            name: "json:flat",
            payload: TokenPayload::Json(flat_json.clone()),
        },
    ];

    for (name, wrapper) in [
        ("json:data", "data"),
        ("json:user", "user"),
        ("json:auth", "auth"),
        ("json:credentials", "credentials"),
    ] {
        shapes.push(TokenShape {
            name,
            payload: TokenPayload::Json(json!({ wrapper: flat_json.clone() })),
        });
    }

    shapes
}

/// Pull a token out of a token-endpoint response body.
///
/// Known keys are checked on the top-level object in priority order; only
/// non-blank string values count. If none match, fall back to a depth-first
/// scan for the first JWT-shaped string anywhere in the structure.
pub fn extract_token(body: &Value) -> Option<String> {
    if let Some(obj) = body.as_object() {
        for key in KNOWN_TOKEN_KEYS {
            if let Some(value) = obj.get(key).and_then(Value::as_str)
                && !value.trim().is_empty()
            {
                return Some(value.to_string());
            }
        }
    }

    find_jwt_like(body)
}

/// First string with exactly two `.` delimiters, depth-first.
///
/// Heuristic: any dotted three-part string matches, so "1.2.3" would be
/// misread as a token. Kept as a fallback only, behind the key checks.
fn find_jwt_like(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.matches('.').count() == 2 => Some(s.clone()),
        Value::Object(map) => map.values().find_map(find_jwt_like),
        Value::Array(items) => items.iter().find_map(find_jwt_like),
        _ => None,
    }
}
