//! Crate-wide error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range configuration values.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// An external binary could not be spawned at all.
    #[error("cannot spawn '{binary}': {source}")]
    BinaryMissing {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit or unparseable response from a BMC command.
    #[error("BMC protocol error: {0}")]
    BmcProtocol(String),

    /// Unexpected output format from a sensor tool.
    #[error("parse error: {0}")]
    Parse(String),

    /// Disk enumeration on a platform we do not know how to query.
    #[error("unsupported OS for disk enumeration: {0}")]
    UnsupportedOs(&'static str),
}
