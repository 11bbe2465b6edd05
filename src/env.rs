//! Environment variable abstraction for testability.
//!
//! Production code uses [`Env::real()`] which delegates to [`std::env::var`].
//! [`Env::from_vars()`] is backed by a `HashMap`, so tests (and embedders)
//! never touch the process environment.

use std::collections::HashMap;
use std::str::FromStr;

/// Environment variable reader.
#[derive(Clone, Debug)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

/// Outcome of reading and parsing a typed variable.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed<T> {
    /// The variable is not set.
    Absent,
    /// The variable is set and parsed.
    Value(T),
    /// The variable is set but could not be parsed; holds the raw text.
    Invalid(String),
}

impl Env {
    /// Create an `Env` that reads from the real process environment.
    pub fn real() -> Self {
        Self { overrides: None }
    }

    /// Create an `Env` backed by explicit key-value pairs; the process
    /// environment is never consulted.
    pub fn from_vars(
        vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            overrides: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    #[cfg(test)]
    pub fn mock(vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self::from_vars(vars)
    }

    /// Look up an environment variable by name.
    ///
    /// Empty values are treated as unset.
    pub fn var(&self, name: &str) -> Option<String> {
        let value = match &self.overrides {
            Some(map) => map.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Look up a variable and parse it into `T`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Parsed<T> {
        match self.var(name) {
            None => Parsed::Absent,
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => Parsed::Value(value),
                Err(_) => Parsed::Invalid(raw),
            },
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::real()
    }
}
