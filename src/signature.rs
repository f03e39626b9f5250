//! Dependency-name inference from declared factory signatures.
//!
//! A signature is the textual header of a creation function, e.g. `fn(logger, config)`.
//! Parameter names are taken as the names of the objects the factory depends on, in order.
//! Only bare identifiers are accepted: anything that would rename, destructure or default
//! a parameter is rejected instead of being guessed.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?:function|fn)\b(?:\s+[A-Za-z_$][\w$]*)?\s*)?\((?P<paren>[^()]*)\)|^\s*\|(?P<pipe>[^|]*)\|")
        .expect("signature header pattern")
});

static PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").expect("parameter pattern"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unrecognised signature \"{0}\"")]
    Malformed(String),
    #[error("unsupported parameter \"{param}\": {reason}")]
    Unsupported { param: String, reason: &'static str },
}

/// Extract the ordered parameter names of a signature.
///
/// ```
/// # use lazy_registry::signature::parse_params;
/// assert_eq!(parse_params("function (logger, config)").unwrap(), ["logger", "config"]);
/// assert_eq!(parse_params("|a, b|").unwrap(), ["a", "b"]);
/// assert!(parse_params("fn(a = 1)").is_err());
/// ```
pub fn parse_params(signature: &str) -> Result<Vec<String>, SignatureError> {
    let caps = HEADER
        .captures(signature)
        .ok_or_else(|| SignatureError::Malformed(signature.to_string()))?;
    let list = caps
        .name("paren")
        .or_else(|| caps.name("pipe"))
        .map(|m| m.as_str())
        .unwrap_or_default();

    if list.trim().is_empty() {
        return Ok(Vec::new());
    }

    list.split(',').map(check_param).collect()
}

fn check_param(raw: &str) -> Result<String, SignatureError> {
    let param = raw.trim();
    let unsupported = |reason| SignatureError::Unsupported {
        param: param.to_string(),
        reason,
    };

    if param.is_empty() {
        return Err(unsupported("empty parameter"));
    }
    if param.starts_with("...") {
        return Err(unsupported("rest parameters are not supported"));
    }
    if param.starts_with('{') || param.starts_with('[') {
        return Err(unsupported("destructured parameters are not supported"));
    }
    if param.contains('=') {
        return Err(unsupported("default values are not supported"));
    }
    if param.contains(':') {
        return Err(unsupported("annotated parameters are not supported"));
    }
    if !PARAM.is_match(param) {
        return Err(unsupported("not an identifier"));
    }
    Ok(param.to_string())
}
