//! Error types for xsdgraph
//!
//! Two families of errors exist: [`SchemaError`] is raised while compiling
//! schema sources into a component table, [`ValidationError`] is raised while
//! checking an instance document against a compiled schema. Everything else
//! (resource loading, malformed XML, exceeded limits) is wrapped by [`Error`].

use std::fmt;
use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsdgraph operations
#[derive(Error, Debug)]
pub enum Error {
    /// Compile-time schema error
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Instance validation error
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Resource loading error (always wraps the loader failure)
    #[error("resource error: {0}")]
    Resource(String),

    /// Malformed XML handed over by the node source
    #[error("XML error: {0}")]
    Xml(String),

    /// A configured processing limit was exceeded
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Value error (invalid value for a setting or literal)
    #[error("value error: {0}")]
    Value(String),

    /// Namespace error (unbound prefix)
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Return the schema error, if this is one
    pub fn as_schema_error(&self) -> Option<&SchemaError> {
        match self {
            Error::Schema(e) => Some(e),
            _ => None,
        }
    }

    /// Return the validation error, if this is one
    pub fn as_validation_error(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// Schema errors
// =============================================================================

/// Classification of compile-time schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaErrorKind {
    /// Two top-level components share a name in the same namespace and category
    DuplicateComponent,
    /// A redefinition chain revisits a source that is still being loaded
    CircularInclusion,
    /// A derivation or definition cycle (type restricts itself, group contains itself)
    UnresolvableDerivation,
    /// A complex type restriction does not narrow its base
    InvalidRestriction,
    /// A facet contradicts or loosens an inherited facet
    InvalidFacetDerivation,
    /// A reference names no known component
    UnresolvedReference,
    /// An extension redeclares or appends content illegally
    InvalidExtension,
    /// A content model cannot be compiled
    InvalidContentModel,
    /// A declaration is malformed
    InvalidComponent,
    /// A schema source could not be fetched or parsed
    Resource,
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateComponent => "DuplicateComponent",
            Self::CircularInclusion => "CircularInclusion",
            Self::UnresolvableDerivation => "UnresolvableDerivation",
            Self::InvalidRestriction => "InvalidRestriction",
            Self::InvalidFacetDerivation => "InvalidFacetDerivation",
            Self::UnresolvedReference => "UnresolvedReference",
            Self::InvalidExtension => "InvalidExtension",
            Self::InvalidContentModel => "InvalidContentModel",
            Self::InvalidComponent => "InvalidComponent",
            Self::Resource => "Resource",
        };
        f.write_str(s)
    }
}

/// Compile-time error raised while building the component table
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// Error classification
    pub kind: SchemaErrorKind,
    /// Error message
    pub message: String,
    /// Schema source location
    pub location: Option<String>,
    /// Component that caused the error, as `{namespace}local`
    pub component: Option<String>,
}

impl SchemaError {
    /// Create a new schema error
    pub fn new(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            component: None,
        }
    }

    /// Set the source location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the offending component
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;

        if let Some(ref component) = self.component {
            write!(f, "\n\nComponent: {}", component)?;
        }

        if let Some(ref loc) = self.location {
            write!(f, "\n\nLocation: {}", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for SchemaError {}

// =============================================================================
// Validation errors
// =============================================================================

/// Classification of instance validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ValidationErrorKind {
    /// Required content (element or particle) is missing
    MissingRequiredContent,
    /// An element appears where the content model does not allow it
    UnexpectedElement,
    /// A simple value violates its type or facets
    FacetViolation,
    /// A missing, undeclared, prohibited or invalid attribute
    AttributeError,
    /// A unique/key/keyref violation
    IdentityConstraintViolation,
    /// An `xsi:type` that is unknown, blocked or not validly derived
    XsiTypeError,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingRequiredContent => "MissingRequiredContent",
            Self::UnexpectedElement => "UnexpectedElement",
            Self::FacetViolation => "FacetViolation",
            Self::AttributeError => "AttributeError",
            Self::IdentityConstraintViolation => "IdentityConstraintViolation",
            Self::XsiTypeError => "XsiTypeError",
        };
        f.write_str(s)
    }
}

/// Instance validation error with context
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationError {
    /// Error classification
    pub kind: ValidationErrorKind,
    /// Error message
    pub message: String,
    /// Path to the element that failed validation
    pub path: Option<String>,
    /// Underlying reason
    pub reason: Option<String>,
    /// What the schema expected at this point
    pub expected: Vec<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            reason: None,
            expected: Vec::new(),
        }
    }

    /// Shorthand for a facet violation
    pub fn facet(message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::FacetViolation, message)
    }

    /// Set the path where validation failed
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the expected items
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;

        if let Some(ref reason) = self.reason {
            write!(f, "\n\nReason: {}", reason)?;
        }

        if !self.expected.is_empty() {
            write!(f, "\n\nExpected: {}", self.expected.join(", "))?;
        }

        if let Some(ref path) = self.path {
            write!(f, "\n\nPath: {}", path)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(ValidationErrorKind::UnexpectedElement, "Unexpected 'foo'")
            .with_reason("content model already complete")
            .with_path("/root/foo")
            .with_expected(vec!["bar".to_string()]);

        let msg = format!("{}", err);
        assert!(msg.contains("UnexpectedElement"));
        assert!(msg.contains("Unexpected 'foo'"));
        assert!(msg.contains("Reason:"));
        assert!(msg.contains("Expected: bar"));
        assert!(msg.contains("Path: /root/foo"));
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::new(SchemaErrorKind::DuplicateComponent, "duplicate type")
            .with_location("a.xsd")
            .with_component("{urn:x}T");

        let msg = format!("{}", err);
        assert!(msg.contains("[DuplicateComponent] duplicate type"));
        assert!(msg.contains("Location: a.xsd"));
        assert!(msg.contains("Component: {urn:x}T"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ValidationError::facet("bad").into();
        assert!(err.as_validation_error().is_some());
        assert!(err.as_schema_error().is_none());

        let err: Error = SchemaError::new(SchemaErrorKind::Resource, "missing").into();
        assert_eq!(
            err.as_schema_error().map(|e| e.kind),
            Some(SchemaErrorKind::Resource)
        );
    }
}
