//! Execution of loaded sources.
//!
//! A loaded source is executed against a [LoadScope], which exposes `define`, `put` and `get`
//! and knows which object the source is expected to declare.
//!
//! The default executor, [ModuleScript], interprets a small line-oriented module language.
//! Creation functions cannot be written in a source: they are looked up by symbol in a
//! [NativeCatalog] of Rust factories.
//!
//! ```text
//! # comments start with '#' or '//'
//! define Greeter(Logger, Config) = greeter   -- explicit dependencies
//! define Greeter = greeter                   -- dependencies from the parameters of `greeter`
//! define = greeter                           -- name of the object being loaded
//! put Config = "text" | 42 | 4.5 | true
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::inject::Factory;
use crate::registry::{Declare, LoadScope};

static DEFINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^define(?:\s+(?P<name>[^\s()=]+))?\s*(?:\((?P<deps>[^()]*)\))?\s*=\s*(?P<symbol>\S+)$")
        .expect("define directive pattern")
});

static PUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^put\s+(?P<name>[^\s=]+)\s*=\s*(?P<value>.+)$").expect("put directive pattern")
});

/// Fatal error while executing a source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

impl ScriptError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Execute source text in the scope of a single load
pub trait SourceExecutor: Send + Sync {
    fn execute(&self, source: &str, scope: &LoadScope) -> Result<(), ScriptError>;
}

impl<F> SourceExecutor for F
where
    F: Fn(&str, &LoadScope) -> Result<(), ScriptError> + Send + Sync,
{
    fn execute(&self, source: &str, scope: &LoadScope) -> Result<(), ScriptError> {
        self(source, scope)
    }
}

/// Named Rust factories that sources can refer to
#[derive(Debug, Clone, Default)]
pub struct NativeCatalog {
    factories: HashMap<String, Factory>,
}

impl NativeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, symbol: impl Into<String>, factory: Factory) -> Self {
        self.factories.insert(symbol.into(), factory);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&Factory> {
        self.factories.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Interpreter of the module language
#[derive(Debug, Clone, Default)]
pub struct ModuleScript {
    catalog: Arc<NativeCatalog>,
}

impl ModuleScript {
    pub fn new(catalog: NativeCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &NativeCatalog {
        &self.catalog
    }

    fn define(&self, line: usize, directive: &str, scope: &LoadScope) -> Result<(), ScriptError> {
        let caps = DEFINE
            .captures(directive)
            .ok_or_else(|| ScriptError::new(line, format!("malformed define \"{directive}\"")))?;

        let symbol = &caps["symbol"];
        let declare = Declare {
            name: caps.name("name").map(|m| m.as_str().to_string()),
            deps: caps.name("deps").map(|m| split_deps(m.as_str())),
            factory: self.catalog.get(symbol).cloned(),
            origin: Some(symbol.to_string()),
        };

        // a rejected declaration is reported by the registry, the rest of the source still runs
        let _ = scope.declare(declare);
        Ok(())
    }

    fn put(&self, line: usize, directive: &str, scope: &LoadScope) -> Result<(), ScriptError> {
        let caps = PUT
            .captures(directive)
            .ok_or_else(|| ScriptError::new(line, format!("malformed put \"{directive}\"")))?;
        let name = &caps["name"];
        match parse_literal(caps["value"].trim()) {
            Some(Literal::Text(v)) => scope.put(name, v),
            Some(Literal::Integer(v)) => scope.put(name, v),
            Some(Literal::Float(v)) => scope.put(name, v),
            Some(Literal::Bool(v)) => scope.put(name, v),
            None => {
                return Err(ScriptError::new(
                    line,
                    format!("invalid literal \"{}\"", &caps["value"]),
                ))
            }
        }
        Ok(())
    }
}

impl SourceExecutor for ModuleScript {
    fn execute(&self, source: &str, scope: &LoadScope) -> Result<(), ScriptError> {
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let directive = raw.trim();
            if directive.is_empty() || directive.starts_with('#') || directive.starts_with("//") {
                continue;
            }

            match directive.split_whitespace().next().unwrap_or_default() {
                "define" => self.define(line, directive, scope)?,
                "put" => self.put(line, directive, scope)?,
                other if other.starts_with("define") => self.define(line, directive, scope)?,
                other => {
                    return Err(ScriptError::new(line, format!("unknown directive \"{other}\"")))
                }
            }
        }
        Ok(())
    }
}

fn split_deps(list: &str) -> Vec<String> {
    if list.trim().is_empty() {
        return Vec::new();
    }
    list.split(',').map(|dep| dep.trim().to_string()).collect()
}

#[derive(Debug, PartialEq)]
enum Literal {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

fn parse_literal(value: &str) -> Option<Literal> {
    if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        return unescape(inner).map(Literal::Text);
    }
    match value {
        "true" => return Some(Literal::Bool(true)),
        "false" => return Some(Literal::Bool(false)),
        _ => {}
    }
    if let Ok(v) = value.parse::<i64>() {
        return Some(Literal::Integer(v));
    }
    value.parse::<f64>().ok().map(Literal::Float)
}

fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                c @ ('"' | '\\') => out.push(c),
                _ => return None,
            },
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(parse_literal("42"), Some(Literal::Integer(42)));
        assert_eq!(parse_literal("-4.5"), Some(Literal::Float(-4.5)));
        assert_eq!(parse_literal("true"), Some(Literal::Bool(true)));
        assert_eq!(
            parse_literal(r#""say \"hi\"\n""#),
            Some(Literal::Text("say \"hi\"\n".into()))
        );
        assert_eq!(parse_literal(r#""bad"quote""#), None);
        assert_eq!(parse_literal("nope"), None);
    }

    #[test]
    fn define_directive_forms() {
        let caps = DEFINE.captures("define Greeter(Logger, Config) = greeter").unwrap();
        assert_eq!(&caps["name"], "Greeter");
        assert_eq!(split_deps(&caps["deps"]), ["Logger", "Config"]);
        assert_eq!(&caps["symbol"], "greeter");

        let caps = DEFINE.captures("define Greeter = greeter").unwrap();
        assert_eq!(&caps["name"], "Greeter");
        assert!(caps.name("deps").is_none());

        let caps = DEFINE.captures("define = greeter").unwrap();
        assert!(caps.name("name").is_none());

        let caps = DEFINE.captures("define Empty() = unit").unwrap();
        assert!(split_deps(&caps["deps"]).is_empty());

        assert!(DEFINE.captures("define Greeter greeter").is_none());
    }

    #[test]
    fn catalog_lookup() {
        let catalog = NativeCatalog::new().register("unit", Factory::from_fn(|| ()));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("unit").is_some());
        assert!(catalog.get("other").is_none());
    }
}
