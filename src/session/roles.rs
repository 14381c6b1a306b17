use serde_json::{Map, Value};

use crate::models::{Role, RoleSet};

/// Claims every provider may use to carry role names.
pub const STANDARD_ROLE_CLAIMS: [&str; 3] = ["role", "roles", "groups"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoleResolutionError {
    #[error("role claim '{claim}' holds a {found}, expected a string, list or object")]
    UnsupportedShape { claim: String, found: &'static str },
}

/// Derive the recognized roles from an identity record's claims.
///
/// Reads the singular and plural role claims, `groups`, and the
/// provider-specific claims in `extra_claims`. A claim may be a string, a list
/// of strings, or an object whose keys are role names. Unrecognized names are
/// dropped.
pub fn resolve_roles(
    claims: &Map<String, Value>,
    extra_claims: &[String],
) -> Result<RoleSet, RoleResolutionError> {
    let mut names = Vec::new();
    let claim_names = STANDARD_ROLE_CLAIMS
        .iter()
        .copied()
        .chain(extra_claims.iter().map(String::as_str));

    for claim in claim_names {
        if let Some(value) = claims.get(claim) {
            collect_names(claim, value, &mut names)?;
        }
    }

    Ok(names
        .iter()
        // Group paths look like "/karyakarta".
        .filter_map(|name| name.trim_start_matches('/').parse::<Role>().ok())
        .collect())
}

fn collect_names(
    claim: &str,
    value: &Value,
    out: &mut Vec<String>,
) -> Result<(), RoleResolutionError> {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Object(map) => out.extend(map.keys().cloned()),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    other => return Err(shape_error(claim, other)),
                }
            }
        }
        other => return Err(shape_error(claim, other)),
    }
    Ok(())
}

fn shape_error(claim: &str, value: &Value) -> RoleResolutionError {
    let found = match value {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Array(_) => "nested list",
        Value::Object(_) => "nested object",
        Value::Null => "null",
        Value::String(_) => "string",
    };
    RoleResolutionError::UnsupportedShape {
        claim: claim.to_string(),
        found,
    }
}
