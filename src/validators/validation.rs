//! Validation context and reports
//!
//! [`ValidationContext`] carries the per-call state of one document
//! validation: the mode, collected errors, the element path and the depth
//! guard. Nothing in it is shared between validations.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result, ValidationError, ValidationErrorKind};
use crate::namespaces::QName;

use super::base::ValidationMode;

/// Per-call validation state
#[derive(Debug, Clone)]
pub(crate) struct ValidationContext {
    /// Current validation mode
    pub mode: ValidationMode,
    /// Collected validation errors, in document order
    pub errors: Vec<ValidationError>,
    /// Current nesting level
    pub level: usize,
    /// Maximum element nesting
    pub max_depth: usize,
    path: Vec<String>,
}

impl ValidationContext {
    pub(crate) fn new(mode: ValidationMode, max_depth: usize) -> Self {
        Self {
            mode,
            errors: Vec::new(),
            level: 0,
            max_depth,
            path: Vec::new(),
        }
    }

    /// Enter an element; fails once the nesting passes `max_depth`
    pub(crate) fn enter(&mut self, name: &QName) -> Result<()> {
        self.level += 1;
        self.path.push(name.local_name.clone());
        if self.level > self.max_depth {
            return Err(Error::LimitExceeded(format!(
                "element nesting exceeds the maximum depth of {} at {}",
                self.max_depth,
                self.current_path()
            )));
        }
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.level = self.level.saturating_sub(1);
        self.path.pop();
    }

    /// Slash-separated path of the current element
    pub(crate) fn current_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    /// Raise or collect an error based on validation mode
    pub(crate) fn raise_or_collect(&mut self, error: ValidationError) -> Result<()> {
        let error = match error.path {
            Some(_) => error,
            None => {
                let path = self.current_path();
                error.with_path(path)
            }
        };
        match self.mode {
            ValidationMode::Strict => Err(Error::Validation(error)),
            ValidationMode::Lax => {
                debug!(kind = %error.kind, path = ?error.path, "validation error recorded");
                self.errors.push(error);
                Ok(())
            }
            ValidationMode::Skip => Ok(()),
        }
    }

    /// Create a validation error and handle it according to mode
    pub(crate) fn validation_error(
        &mut self,
        kind: ValidationErrorKind,
        message: impl Into<String>,
        reason: Option<String>,
    ) -> Result<()> {
        let mut error = ValidationError::new(kind, message);
        if let Some(r) = reason {
            error = error.with_reason(r);
        }
        self.raise_or_collect(error)
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Whether the document is valid
    pub valid: bool,
    /// Errors in document order; at most one in strict mode
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// A report without errors
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A report with errors
    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Errors of one kind
    pub fn errors_of(&self, kind: ValidationErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error() -> ValidationError {
        ValidationError::new(ValidationErrorKind::UnexpectedElement, "unexpected")
    }

    #[test]
    fn test_raise_or_collect_strict() {
        let mut context = ValidationContext::new(ValidationMode::Strict, 10);
        let result = context.raise_or_collect(error());
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(!context.has_errors());
    }

    #[test]
    fn test_raise_or_collect_lax() {
        let mut context = ValidationContext::new(ValidationMode::Lax, 10);
        context.enter(&QName::local("root")).unwrap();
        context.enter(&QName::namespaced("urn:x", "item")).unwrap();
        context.raise_or_collect(error()).unwrap();
        assert_eq!(context.errors.len(), 1);
        assert_eq!(context.errors[0].path.as_deref(), Some("/root/item"));
    }

    #[test]
    fn test_raise_or_collect_skip() {
        let mut context = ValidationContext::new(ValidationMode::Skip, 10);
        context.raise_or_collect(error()).unwrap();
        assert!(!context.has_errors());
    }

    #[test]
    fn test_depth_limit() {
        let mut context = ValidationContext::new(ValidationMode::Lax, 2);
        let name = QName::local("a");
        context.enter(&name).unwrap();
        context.enter(&name).unwrap();
        assert!(matches!(context.enter(&name), Err(Error::LimitExceeded(_))));
        context.exit();
        context.exit();
        assert_eq!(context.level, 1);
        assert_eq!(context.current_path(), "/a");
    }

    #[test]
    fn test_report() {
        let report = ValidationReport::failure(vec![error()]);
        assert!(!report.valid);
        assert_eq!(report.errors_of(ValidationErrorKind::UnexpectedElement).count(), 1);
        assert!(ValidationReport::failure(Vec::new()).valid);
        assert!(ValidationReport::success().valid);
    }
}
