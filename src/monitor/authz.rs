//! # Namespace Authorization
//!
//! Regex allow-list gating which namespaces may be read.

use super::errors::MonitorError;
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct NamespaceFilter {
    patterns: Vec<Regex>,
}

impl NamespaceFilter {
    /// Compile an allow-list; every pattern is anchored to the whole namespace
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Admit every namespace
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, namespace: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(namespace))
    }

    pub fn authorize(&self, namespace: &str) -> Result<(), MonitorError> {
        if self.is_allowed(namespace) {
            Ok(())
        } else {
            Err(MonitorError::Unauthorized {
                namespace: namespace.to_string(),
            })
        }
    }
}
