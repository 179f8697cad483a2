use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::expressions::CodeRange;

/// Result type alias for evaluation steps that can fail or signal control flow.
pub(crate) type RenderResult<T> = Result<T, RenderError>;

/// Error categories raised during template evaluation.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A value had the wrong shape for the operation (e.g., slicing an int).
    TypeError,
    /// A value had the right shape but unusable contents (e.g., slice step 0).
    ValueError,
    /// A name was not bound and the strict undefined policy is active.
    UndefinedError,
    /// A filter name did not resolve in the filter registry.
    FilterNotFoundError,
    /// A test name did not resolve in the test registry.
    TestNotFoundError,
    /// A macro call failed: missing parameter, unknown parameter, or body failure.
    MacroError,
    /// The loader has no template under the requested name.
    TemplateNotFoundError,
    /// The extends graph is malformed (most commonly a cycle).
    InheritanceError,
    /// An extension node had no evaluator, or its evaluator failed.
    ExtensionError,
    /// Tuple unpacking failed: arity mismatch or non-iterable item.
    UnpackError,
    /// Malformed template structure, e.g. `break` outside of a loop.
    SyntaxError,
}

/// An evaluation error carrying its category, message, and origin.
///
/// This is the public error type returned from every render entry point.
/// The position is filled in by the evaluator at the node where the error
/// was first raised; outer frames never overwrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateError {
    kind: ErrorKind,
    message: String,
    position: Option<CodeRange>,
    template: Option<String>,
}

impl TemplateError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            template: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn position(&self) -> Option<CodeRange> {
        self.position
    }

    /// Name of the template the error surfaced in, when known.
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Attaches a source position unless one was already recorded.
    ///
    /// The innermost raise site wins so the reported line:column points at
    /// the actual failing expression, not an enclosing statement.
    #[must_use]
    pub(crate) fn at(mut self, position: CodeRange) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }

    /// Attaches the template name unless one was already recorded.
    #[must_use]
    pub(crate) fn in_template(mut self, name: &str) -> Self {
        if self.template.is_none() {
            self.template = Some(name.to_owned());
        }
        self
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub(crate) fn undefined(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedError, format!("'{name}' is undefined"))
    }

    pub(crate) fn filter_not_found(name: &str) -> Self {
        Self::new(ErrorKind::FilterNotFoundError, format!("unknown filter '{name}'"))
    }

    pub(crate) fn test_not_found(name: &str) -> Self {
        Self::new(ErrorKind::TestNotFoundError, format!("unknown test '{name}'"))
    }

    pub(crate) fn macro_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MacroError, message)
    }

    pub(crate) fn template_not_found(name: &str) -> Self {
        Self::new(ErrorKind::TemplateNotFoundError, format!("template '{name}' not found"))
    }

    pub(crate) fn inheritance_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InheritanceError, message)
    }

    pub(crate) fn extension_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExtensionError, message)
    }

    pub(crate) fn unpack_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnpackError, message)
    }

    /// Standard message for unpacking a sequence of the wrong length.
    pub(crate) fn unpack_arity(got: usize, wanted: usize) -> Self {
        Self::unpack_error(format!("cannot unpack {got} values into {wanted} variables"))
    }
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(template) = &self.template {
            write!(f, " in '{template}'")?;
        }
        if let Some(position) = self.position {
            write!(f, " at {position}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TemplateError {}

/// Internal error channel for the evaluator.
///
/// Two flavors travel here:
/// - `Exc`: a genuine evaluation failure that propagates to the caller
/// - `Break`/`Continue`: control signals intercepted by the nearest enclosing
///   loop; they are not failures and must never leak past one
///
/// A signal that reaches the top of a render had no enclosing loop, which is
/// a structural defect in the template; `into_template_error` converts it to
/// a `SyntaxError` so callers see a diagnosable failure instead of a panic.
#[derive(Debug)]
pub(crate) enum RenderError {
    /// An evaluation failure. Boxed to keep the Err lane a single pointer wide.
    Exc(Box<TemplateError>),
    /// `{% break %}` executed at this position.
    Break(CodeRange),
    /// `{% continue %}` executed at this position.
    Continue(CodeRange),
}

impl RenderError {
    /// Converts the internal error into the public error type.
    ///
    /// Loose control signals become `SyntaxError`s naming the offending
    /// statement and its position.
    #[must_use]
    pub(crate) fn into_template_error(self) -> TemplateError {
        match self {
            Self::Exc(err) => *err,
            Self::Break(position) => {
                TemplateError::new(ErrorKind::SyntaxError, "'break' outside loop").at(position)
            }
            Self::Continue(position) => {
                TemplateError::new(ErrorKind::SyntaxError, "'continue' outside loop").at(position)
            }
        }
    }
}

impl From<TemplateError> for RenderError {
    fn from(err: TemplateError) -> Self {
        Self::Exc(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_variant_name() {
        assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
        assert_eq!(ErrorKind::FilterNotFoundError.to_string(), "FilterNotFoundError");
    }

    #[test]
    fn position_is_sticky() {
        let err = TemplateError::type_error("bad operand")
            .at(CodeRange::new(3, 7))
            .at(CodeRange::new(9, 1));
        assert_eq!(err.position(), Some(CodeRange::new(3, 7)));
    }

    #[test]
    fn loose_break_becomes_syntax_error() {
        let err = RenderError::Break(CodeRange::new(2, 4)).into_template_error();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        assert!(err.message().contains("outside loop"), "got: {}", err.message());
    }
}
