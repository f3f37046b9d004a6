use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;

use crate::{Error, Errors, MessageKind};

#[derive(Clone, PartialEq, Serialize)]
pub struct ErrorMessage {
    /// Error or warning. Warnings never abort a compilation.
    pub kind: MessageKind,
    /// Machine-readable identifier of the error
    pub code: Option<String>,
    /// Plain text of the error
    pub reason: String,
    /// A list of suggestions of how to fix the error
    pub hints: Vec<String>,
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let code = (self.code.as_ref())
            .map(|c| format!("[{c}] "))
            .unwrap_or_default();
        let kind = match self.kind {
            MessageKind::Error => "Error",
            MessageKind::Warning => "Warning",
            MessageKind::Lint => "Lint",
        };

        writeln!(f, "{code}{kind}: {}", &self.reason)?;
        for hint in &self.hints {
            writeln!(f, "↳ Hint: {hint}")?;
        }
        Ok(())
    }
}

impl Debug for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self, f)
    }
}

impl From<Error> for ErrorMessage {
    fn from(e: Error) -> Self {
        log::debug!("{:#?}", e);
        ErrorMessage {
            code: e.code.map(str::to_string),
            kind: e.kind,
            reason: e.reason.to_string(),
            hints: e.hints,
        }
    }
}

impl From<Vec<ErrorMessage>> for ErrorMessages {
    fn from(errors: Vec<ErrorMessage>) -> Self {
        ErrorMessages { inner: errors }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}
impl StdError for ErrorMessages {}

impl From<ErrorMessage> for ErrorMessages {
    fn from(e: ErrorMessage) -> Self {
        ErrorMessages { inner: vec![e] }
    }
}

impl From<Error> for ErrorMessages {
    fn from(e: Error) -> Self {
        ErrorMessages {
            inner: vec![ErrorMessage::from(e)],
        }
    }
}

impl From<Errors> for ErrorMessages {
    fn from(errs: Errors) -> Self {
        ErrorMessages {
            inner: errs.0.into_iter().map(ErrorMessage::from).collect(),
        }
    }
}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for e in &self.inner {
            Display::fmt(&e, f)?;
        }
        Ok(())
    }
}

impl ErrorMessages {
    pub fn to_json(&self) -> String {
        // plain strings and enums, which always serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// True when compilation failed on a defect of the compiler rather than
    /// on its input.
    pub fn is_bug(&self) -> bool {
        self.inner
            .iter()
            .any(|e| e.reason.starts_with("internal compiler error"))
    }
}
