//! Turning class bytes into runtime types.
//!
//! A [`registry::ClassRegistry`] owns the bytes of the classes compiled in
//! one session. Materializing a class decodes the bytes, checks the format
//! version, verifies the code and links its method references.

pub mod linker;
pub mod registry;
pub mod resolver;
pub mod verifier;

use thiserror::Error;

use graderlib::code::class_file::ClassFormatError;

pub use linker::LinkError;
pub use verifier::VerifyError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("class `{0}` not found")]
pub struct ClassNotFound(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    NotFound(#[from] ClassNotFound),
    #[error("malformed class `{name}`: {source}")]
    Format {
        name: String,
        source: ClassFormatError,
    },
    #[error("class `{name}` has version {version}, the highest supported version is {max}")]
    UnsupportedVersion { name: String, version: u16, max: u16 },
    #[error("bytes registered as `{name}` define class `{defined}`")]
    NameMismatch { name: String, defined: String },
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound(_))
    }
}
