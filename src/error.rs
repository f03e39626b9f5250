//! Error types shared by the registry, the loaders and the instantiation engine.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::signature::SignatureError;

/// Boxed error returned by a creation function
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Malformed arguments given to `define`.
///
/// These errors are reported to the caller of `define` and logged,
/// they never affect the resolution of other names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("name should be a non-empty string")]
    InvalidName,
    #[error("dependencies should be a list of non-empty names (got {0:?})")]
    InvalidDependencies(String),
    #[error("factory function should be callable: {0}")]
    NotCallable(String),
    #[error("can't guess name: no object is currently being loaded")]
    CannotInferName,
    #[error("can't infer dependencies of \"{0}\": factory has no declared parameter names")]
    MissingSignature(String),
    #[error("factory of \"{name}\" takes {arity} arguments but {declared} dependencies were declared")]
    ArityMismatch {
        name: String,
        arity: usize,
        declared: usize,
    },
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Failure of the remote loader for a single locator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server answered {code} {reason}")]
    Status { code: u16, reason: String },
    #[error("timeout after {after:?}")]
    Timeout { after: Duration },
    #[error("failed to execute loaded source: {0}")]
    Execution(String),
}

impl LoadError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LoadError::Timeout { .. })
    }
}

/// Rejection of a declaration slot or of an instance future.
///
/// Cloneable so that a single rejection can be observed by every dependent.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("can't load \"{locator}\" for object \"{name}\": {source}")]
    Load {
        name: String,
        locator: String,
        source: LoadError,
    },
    #[error("no object \"{name}\" defined in \"{locator}\"")]
    DefinitionMissing { name: String, locator: String },
    #[error("cyclic dependencies: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("dependency \"{dependency}\" of \"{name}\" is not a {expected}")]
    TypeMismatch {
        name: String,
        dependency: String,
        expected: &'static str,
    },
    #[error("object \"{name}\" is not a {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("\"{name}\" has no dependency at position {index}")]
    MissingArgument { name: String, index: usize },
    #[error("factory of \"{name}\" failed: {source}")]
    Factory {
        name: String,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    #[error("declaration of \"{name}\" was abandoned before being resolved")]
    Abandoned { name: String },
}

impl ResolveError {
    /// The load failure behind this rejection, if any
    pub fn load_error(&self) -> Option<&LoadError> {
        match self {
            ResolveError::Load { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Invalid or unreadable configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
    #[error("invalid log level \"{0}\", use trace, debug, info, warn or error")]
    LogLevel(String),
    #[error("failed to install the log subscriber: {0}")]
    Subscriber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display_joins_path() {
        let err = ResolveError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependencies: a -> b -> a");
    }

    #[test]
    fn load_error_is_reachable_from_rejection() {
        let err = ResolveError::Load {
            name: "Foo".into(),
            locator: "Foo.mod".into(),
            source: LoadError::Timeout {
                after: Duration::from_millis(5000),
            },
        };
        assert!(err.load_error().is_some_and(LoadError::is_timeout));
        assert_eq!(
            err.to_string(),
            "can't load \"Foo.mod\" for object \"Foo\": timeout after 5s"
        );
    }

    #[test]
    fn declaration_error_messages() {
        assert_eq!(
            DeclarationError::CannotInferName.to_string(),
            "can't guess name: no object is currently being loaded"
        );
        assert_eq!(
            DeclarationError::ArityMismatch {
                name: "n".into(),
                arity: 2,
                declared: 1
            }
            .to_string(),
            "factory of \"n\" takes 2 arguments but 1 dependencies were declared"
        );
    }
}
