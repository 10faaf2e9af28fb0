//! Error handling for this crate
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A Result containing a CompileError with its accompanying source
pub type TypedResult<T> = Result<T, TypedError>;

/// The kind of violation detected while transforming or emitting a design
///
/// Every violation is fatal; there is no partial-success mode for code
/// generation.
#[derive(Error, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CompileError {
    #[error("Structural error in the design graph")]
    Structural,
    #[error("Type disagreement detected during code generation")]
    Type,
    #[error("Configuration error")]
    Config,
    #[error("Unsupported configuration requested")]
    UnsupportedConfig,
    #[error("Schedule error")]
    Schedule,
    #[error("I/O error while writing generated files")]
    Io,
}

/// Combination of a CompileError with an anyhow error
#[derive(Error, Debug)]
#[error("{err:?}: {source:?}")]
pub struct TypedError {
    err: CompileError,
    source: anyhow::Error,
}

impl TypedError {
    /// Creates a new TypedError
    pub fn new(err: CompileError, source: anyhow::Error) -> Self {
        Self { err, source }
    }
    /// Returns the CompileError of this TypedError
    pub fn err(&self) -> CompileError {
        self.err
    }
    /// Returns the anyhow error of this TypedError
    pub fn source(&self) -> &anyhow::Error {
        &self.source
    }
}

/// Converts a Result into one of our own Result types
pub trait ResultExt<T> {
    /// Converts a Result to a TypedResult
    fn typ(self, err: CompileError) -> TypedResult<T>;
}

impl<T, E: Into<anyhow::Error>> ResultExt<T> for Result<T, E> {
    fn typ(self, err: CompileError) -> TypedResult<T> {
        self.map_err(|e| TypedError {
            err,
            source: e.into(),
        })
    }
}
