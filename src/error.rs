//! Error types shared by the compiler bridge, the interpreter loop and the embedding API.

use std::fmt;

use span::Span;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way a call into this crate can fail.
///
/// `Display` renders exactly the wording required of runtime errors (see the
/// glossary in SPEC_FULL.md §6); callers that want source-annotated output
/// should route `Runtime`/`Compile` through [`crate::error::Report`] instead.
#[derive(Debug)]
pub enum Error {
  /// Failed during `ember_syntax::parser::parse` or during `emit`.
  Compile(Vec<CompileError>),
  /// Raised by the interpreter loop, a primitive, or a failed fiber.
  Runtime(RuntimeError),
  /// Bubbled up from a foreign (native) method.
  Native(Box<dyn std::error::Error + 'static>),
}

#[derive(Debug, Clone)]
pub struct CompileError {
  pub message: String,
  pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RuntimeError {
  pub message: String,
  /// Innermost-frame-first call stack, `(function name, source line)`.
  pub trace: Vec<(String, u32)>,
}

impl RuntimeError {
  pub fn new(message: impl Into<String>) -> Self {
    RuntimeError {
      message: message.into(),
      trace: Vec::new(),
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::Compile(errors) => {
        for (i, e) in errors.iter().enumerate() {
          if i > 0 {
            writeln!(f)?;
          }
          write!(f, "{e}")?;
        }
        Ok(())
      }
      Error::Runtime(e) => write!(f, "{e}"),
      Error::Native(e) => write!(f, "{e}"),
    }
  }
}

impl fmt::Display for CompileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "error at {}: {}", self.span, self.message)
  }
}

impl fmt::Display for RuntimeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message)?;
    for (name, line) in &self.trace {
      write!(f, "\n  at {name} (line {line})")?;
    }
    Ok(())
  }
}

impl std::error::Error for Error {}

impl From<Vec<syntax::Error>> for Error {
  fn from(errors: Vec<syntax::Error>) -> Self {
    Error::Compile(
      errors
        .into_iter()
        .map(|e| CompileError {
          message: e.message.to_string(),
          span: e.span,
        })
        .collect(),
    )
  }
}

impl From<RuntimeError> for Error {
  fn from(e: RuntimeError) -> Self {
    Error::Runtime(e)
  }
}

impl From<Box<dyn std::error::Error + 'static>> for Error {
  fn from(e: Box<dyn std::error::Error + 'static>) -> Self {
    Error::Native(e)
  }
}

/// Shorthand for constructing a [`RuntimeError`] and wrapping it, mirroring the exact
/// message wordings the embedding API contract requires (SPEC_FULL.md §6).
pub fn runtime(message: impl Into<String>) -> Error {
  Error::Runtime(RuntimeError::new(message))
}

pub fn does_not_implement(class: &str, signature: &str) -> Error {
  runtime(format!("{class} does not implement '{signature}'."))
}

pub fn must_inherit_from_class() -> Error {
  runtime("Must inherit from a class.")
}

pub fn cannot_inherit(class: &str, superclass: &str) -> Error {
  runtime(format!("{class} cannot inherit from {superclass}."))
}

pub fn module_not_found(name: &str) -> Error {
  runtime(format!("Could not find module '{name}'."))
}

pub fn variable_not_found(var: &str, module: &str) -> Error {
  runtime(format!(
    "Could not find a variable named '{var}' in module '{module}'."
  ))
}

pub fn right_operand_must_be_class() -> Error {
  runtime("Right operand must be a class.")
}

pub fn must_be_number(arg: &str) -> Error {
  runtime(format!("{arg} must be a number."))
}

pub fn must_be_integer(arg: &str) -> Error {
  runtime(format!("{arg} must be an integer."))
}

pub fn must_be_string(arg: &str) -> Error {
  runtime(format!("{arg} must be a string."))
}

pub fn out_of_bounds(arg: &str) -> Error {
  runtime(format!("{arg} out of bounds."))
}

pub fn key_must_be_value_type() -> Error {
  runtime("Key must be a value type.")
}

pub fn subscript_must_be_number_or_range() -> Error {
  runtime("Subscript must be a number or a range.")
}

/// Renders an [`Error`] as source-annotated [`diag::Report`]s, one per compile error
/// (a `Runtime`/`Native` error has no span to annotate and becomes a single plain-text
/// report pointing at the whole source).
///
/// `path`/`source` identify the unit the error came from, the way the CLI already has
/// both in hand when it calls `interpret`.
pub fn reports<'a>(error: &Error, path: &'a str, source: &'a str) -> Vec<diag::Report<'a>> {
  match error {
    Error::Compile(errors) => errors
      .iter()
      .map(|e| {
        diag::Report::error()
          .source(diag::Source::file(path, source))
          .message(e.message.clone())
          .span(e.span)
          .build()
      })
      .collect(),
    Error::Runtime(e) => vec![diag::Report::error()
      .source(diag::Source::file(path, source))
      .message(e.to_string())
      .span(span::Span::from(0..0))
      .build()],
    Error::Native(e) => vec![diag::Report::error()
      .source(diag::Source::file(path, source))
      .message(e.to_string())
      .span(span::Span::from(0..0))
      .build()],
  }
}
