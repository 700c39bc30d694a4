//! Limits and constraints for schema compilation and validation
//!
//! Recursion and expansion in the resolver, the content model automaton and
//! the validator are bounded by these numbers. Exceeding one is reported as
//! [`Error::LimitExceeded`] instead of running into an uncontrolled stack or
//! memory blow-up.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum nesting depth of instance elements and of model groups
    pub max_depth: usize,

    /// Maximum number of automaton positions produced by expanding occurrence ranges
    pub max_occurs_expansion: usize,

    /// Maximum number of states in a compiled content model automaton
    pub max_automaton_states: usize,

    /// Maximum number of follow-set entries visited while building one automaton
    pub max_automaton_work: usize,

    /// Maximum depth of include/import/redefine chains
    pub max_include_depth: usize,

    /// Maximum number of schema components in one table
    pub max_components: usize,

    /// Maximum schema source size in bytes
    pub max_source_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_occurs_expansion: 10_000,
            max_automaton_states: 20_000,
            max_automaton_work: 5_000_000,
            max_include_depth: 100,
            max_components: 100_000,
            max_source_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_depth: 100,
            max_occurs_expansion: 1_000,
            max_automaton_states: 2_000,
            max_automaton_work: 500_000,
            max_include_depth: 20,
            max_components: 10_000,
            max_source_size: 10 * 1024 * 1024, // 10 MB
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_depth: 10_000,
            max_occurs_expansion: 1_000_000,
            max_automaton_states: 1_000_000,
            max_automaton_work: 500_000_000,
            max_include_depth: 1000,
            max_components: 1_000_000,
            max_source_size: 1024 * 1024 * 1024, // 1 GB
        }
    }

    /// Check if a nesting depth is within limits
    pub fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            Err(Error::LimitExceeded(format!(
                "depth {} exceeds maximum {}",
                depth, self.max_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the number of expanded automaton positions is within limits
    pub fn check_occurs_expansion(&self, positions: usize) -> Result<()> {
        if positions > self.max_occurs_expansion {
            Err(Error::LimitExceeded(format!(
                "occurrence expansion {} exceeds maximum {}",
                positions, self.max_occurs_expansion
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the number of automaton states is within limits
    pub fn check_automaton_states(&self, states: usize) -> Result<()> {
        if states > self.max_automaton_states {
            Err(Error::LimitExceeded(format!(
                "content model automaton has {} states, maximum is {}",
                states, self.max_automaton_states
            )))
        } else {
            Ok(())
        }
    }

    /// Check the work spent determinizing a content model
    pub fn check_automaton_work(&self, work: usize) -> Result<()> {
        if work > self.max_automaton_work {
            Err(Error::LimitExceeded(format!(
                "content model construction visited {} positions, maximum is {}",
                work, self.max_automaton_work
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an include chain depth is within limits
    pub fn check_include_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_include_depth {
            Err(Error::LimitExceeded(format!(
                "include depth {} exceeds maximum {}",
                depth, self.max_include_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if number of schema components is within limits
    pub fn check_components(&self, count: usize) -> Result<()> {
        if count > self.max_components {
            Err(Error::LimitExceeded(format!(
                "schema component count {} exceeds maximum {}",
                count, self.max_components
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a source size is within limits
    pub fn check_source_size(&self, size: usize) -> Result<()> {
        if size > self.max_source_size {
            Err(Error::LimitExceeded(format!(
                "source size {} bytes exceeds maximum {} bytes",
                size, self.max_source_size
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_depth, 1000);
        assert!(limits.check_depth(500).is_ok());
        assert!(limits.check_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_depth < Limits::default().max_depth);
        assert!(limits.check_occurs_expansion(5_000).is_err());
    }

    #[test]
    fn test_permissive_limits() {
        let limits = Limits::permissive();
        assert!(limits.max_depth > Limits::default().max_depth);
        assert!(limits.check_depth(5000).is_ok());
    }

    #[test]
    fn test_limit_error_kind() {
        let err = Limits::default().check_source_size(200 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
    }

    #[test]
    fn test_deserialize_partial() {
        let limits: Limits = serde_json::from_str(r#"{"max_depth": 7}"#).unwrap();
        assert_eq!(limits.max_depth, 7);
        assert_eq!(limits.max_include_depth, Limits::default().max_include_depth);
    }
}
