pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failures surfaced by the model core.
///
/// Defects in model-specific code (a structure builder that does not
/// populate its own body, a working-copy callback that never marks itself
/// created) are not represented here; they panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{element} does not exist")]
    DoesNotExist { element: String },

    #[error("snapshot of {element} is stale")]
    StaleSnapshot { element: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{element} is not a working copy")]
    NotWorkingCopy { element: String },

    #[error("working copy initialization failed for {element}: {message}")]
    WorkingCopyInit { element: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Model { message: String },
}

impl Error {
    pub fn does_not_exist(element: impl ToString) -> Self {
        Error::DoesNotExist {
            element: element.to_string(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Error::Model {
            message: message.into(),
        }
    }

    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, Error::DoesNotExist { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
