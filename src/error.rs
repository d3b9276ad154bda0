/*!
 * defines the [Error] and [Result] types.
*/

use thiserror::Error;

/// Error type for all table, scan and catalog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A named entity (field, snapshot, ref, ...) could not be resolved.
    #[error("{0} {1} not found")]
    NotFound(String, String),
    /// An entity with the same name already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// Malformed input, for example a duplicate update kind in a commit.
    #[error("invalid: {0}")]
    Invalid(String),
    /// A schema change that is not allowed without opting into
    /// incompatible changes.
    #[error("incompatible change: {0}")]
    Incompatible(String),
    /// A table feature this crate does not support, such as equality deletes.
    #[error("feature not supported: {0}")]
    UnsupportedFeature(String),
    /// A format invariant did not hold in data read from the table.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A planning deadline was exceeded.
    #[error("deadline exceeded while {0}")]
    Timeout(String),
    /// An object store operation failed; carries the URI it failed on.
    #[error("io error on {uri}")]
    IO {
        /// URI of the object the operation failed on.
        uri: String,
        /// The underlying object store failure.
        #[source]
        source: object_store::Error,
    },
    /// The catalog rejected a commit because a requirement failed.
    #[error("commit conflict: {0}")]
    Conflict(String),
    /// The request signer was misconfigured or failed.
    #[error("signature error: {0}")]
    SignatureError(String),
    /// Avro error
    #[error("avro error")]
    Avro(#[from] apache_avro::Error),
    /// Serde json error
    #[error("serde json error")]
    JsonSerde(#[from] serde_json::Error),
    /// Object store error without an attached URI.
    #[error("object store error")]
    ObjectStore(#[from] object_store::Error),
    /// Chrono parse error
    #[error("chrono parse error")]
    Chrono(#[from] chrono::ParseError),
    /// Utf8 error
    #[error("utf8 error")]
    FromUtf8(#[from] std::string::FromUtf8Error),
    /// Try from slice error
    #[error("try from slice error")]
    TryFromSlice(#[from] std::array::TryFromSliceError),
}

impl Error {
    /// Attach a URI to a bare object store failure.
    pub fn io(uri: impl Into<String>, source: object_store::Error) -> Self {
        Error::IO {
            uri: uri.into(),
            source,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
