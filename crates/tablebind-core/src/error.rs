//! Error taxonomy shared by every tablebind operation.
//!
//! Errors fall into distinct categories that callers are expected to tell
//! apart:
//!
//! | Category | Variants | Raised |
//! |----------|----------|--------|
//! | Configuration | [`Error::Config`] | when configuration is consumed |
//! | Resolution | [`Error::MissingChoices`], [`Error::DuplicateChoice`], [`Error::DuplicateFieldName`], [`Error::ReservedFieldName`], [`Error::UnexpectedChoices`] | schema declaration / translation |
//! | Validation | [`Error::Validation`] | before any remote call |
//! | Not found | [`Error::RecordNotFound`], [`Error::TableNotFound`] | only when the remote side reports absence |
//! | Remote API | [`Error::Api`] | well-formed error response |
//! | Transport | [`Error::Transport`] | the request never got a response |
//! | Partial batch | [`Error::PartialBatch`] | a batch stopped part-way |

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All errors produced by tablebind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Missing or malformed credentials, identifiers or settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local data does not satisfy the declared schema.
    #[error("validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// A selection-typed field has no choices.
    #[error("field '{field}' resolves to a selection type but has no choices")]
    MissingChoices { field: String },

    /// A choice list repeats a value (case-sensitive).
    #[error("field '{field}' declares choice '{choice}' more than once")]
    DuplicateChoice { field: String, choice: String },

    /// Two fields of one schema share a local or remote name.
    #[error("fields '{first}' and '{second}' both map to name '{name}'")]
    DuplicateFieldName {
        first: String,
        second: String,
        name: String,
    },

    /// A field uses a name reserved for the implicit identifier/timestamp.
    #[error("field name '{0}' is reserved for the remote-assigned record metadata")]
    ReservedFieldName(String),

    /// Choices were given for a field that does not resolve to a selection type.
    #[error("field '{field}' has choices but resolves to non-selection type '{remote_type}'")]
    UnexpectedChoices { field: String, remote_type: String },

    /// The remote side reported that the record does not exist.
    #[error("record '{id}' not found in table '{table}'")]
    RecordNotFound { table: String, id: String },

    /// The remote side has no table with this name or id.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// The remote API answered with an error status.
    #[error("remote API error {status}{}: {message}", .kind.as_deref().map(|k| format!(" ({k})")).unwrap_or_default())]
    Api {
        status: u16,
        kind: Option<String>,
        message: String,
    },

    /// The request failed before a response was received (DNS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation was called on a record in the wrong state.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A remote payload could not be decoded into the local shape.
    #[error("could not decode record{}: {message}", .id.as_deref().map(|i| format!(" '{i}'")).unwrap_or_default())]
    Decode { id: Option<String>, message: String },

    /// A batch write stopped part-way.
    #[error("batch stopped after {created} record(s); {} not created: {source}", .not_created.len())]
    PartialBatch {
        created: usize,
        not_created: Vec<usize>,
        source: Box<Error>,
    },
}

impl Error {
    /// Shorthand for a [`Error::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for failures where no response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// True when the remote side explicitly reported absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RecordNotFound { .. } | Error::TableNotFound(_))
    }

    /// True for errors that are static properties of a schema declaration.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::MissingChoices { .. }
                | Error::DuplicateChoice { .. }
                | Error::DuplicateFieldName { .. }
                | Error::ReservedFieldName(_)
                | Error::UnexpectedChoices { .. }
        )
    }
}
