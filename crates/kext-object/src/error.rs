//! Handle-layer error taxonomy
//!
//! Every fallible operation surfaces a typed error to its immediate caller;
//! nothing in this layer retries or swallows failures.

use crate::encoding::Encoding;
use crate::kind::Kind;
use crate::number::NumberType;
use thiserror::Error;

/// Errors reported by the handle layer and the object runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// The foreign runtime could not construct an object
    #[error("foreign allocation failed")]
    AllocationFailed,

    /// A handle's kind tag does not match the requested operation
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind required by the operation
        expected: Kind,
        /// Kind the object actually has
        found: Kind,
    },

    /// An index range falls outside the container's bounds
    #[error("range [{start}, {start}+{len}) out of bounds for count {count}")]
    RangeOutOfBounds {
        /// First requested index
        start: usize,
        /// Number of requested elements
        len: usize,
        /// Number of elements actually present
        count: usize,
    },

    /// A byte sequence is invalid for its declared encoding
    #[error("byte sequence is not valid {encoding}")]
    InvalidEncoding {
        /// The declared encoding
        encoding: Encoding,
    },

    /// A numeric value cannot be represented losslessly in the requested form
    #[error("{stored} value cannot be represented losslessly as {requested}")]
    NumericLoss {
        /// Representation the value is stored in
        stored: NumberType,
        /// Representation that was requested
        requested: NumberType,
    },

    /// A token refers to an object that has already been destroyed
    #[error("stale reference: object already released")]
    StaleReference,

    /// A release was attempted beyond the single owned reference.
    ///
    /// This is a programming defect: once observed, the foreign reference
    /// count is no longer trustworthy. Safe handles make it unreachable by
    /// consuming ownership on release; only the raw runtime surface can
    /// report it.
    #[error("release beyond the single owned reference")]
    DoubleRelease,
}

/// Result alias for handle-layer operations
pub type ObjectResult<T> = Result<T, ObjectError>;
