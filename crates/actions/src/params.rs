//! Parameter extraction helpers shared by the executors.

use clinicdesk_core::action::Params;
use clinicdesk_core::error::ActionError;
use clinicdesk_core::record::ResourceKind;
use serde_json::Value;

/// A non-blank string parameter, trimmed.
pub fn required_str<'a>(params: &'a Params, field: &str) -> Result<&'a str, ActionError> {
    optional_str(params, field).ok_or_else(|| ActionError::MissingParameter(field.into()))
}

/// A string parameter if present and non-blank. Numbers are not coerced.
pub fn optional_str<'a>(params: &'a Params, field: &str) -> Option<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A non-negative integer parameter; accepts `5` or `"5"`.
pub fn optional_count(params: &Params, field: &str) -> Result<Option<usize>, ActionError> {
    let Some(value) = params.get(field) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(|n| Some(n as usize))
        .ok_or_else(|| ActionError::InvalidParameter {
            field: field.into(),
            reason: "must be a non-negative integer".into(),
        })
}

/// A record-kind parameter given as a collection name.
pub fn required_kind(params: &Params, field: &str) -> Result<ResourceKind, ActionError> {
    Ok(required_str(params, field)?.parse::<ResourceKind>()?)
}

/// An object parameter, if present.
pub fn optional_object<'a>(params: &'a Params, field: &str) -> Option<&'a Params> {
    params.get(field).and_then(Value::as_object)
}

/// A numeric parameter; accepts `72` or `"72"`.
pub fn optional_number(params: &Params, field: &str) -> Option<f64> {
    match params.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
