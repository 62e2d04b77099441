use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn timeout(limit: Duration) -> Error {
        Error(ErrorKind::Timeout { limit }.into())
    }

    pub fn cancelled(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::Cancelled {
                context: context.into(),
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("parallel run did not produce all results within {limit:?}")]
    Timeout { limit: Duration },

    #[error("unit of work was discarded before completion: {context}")]
    Cancelled { context: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
