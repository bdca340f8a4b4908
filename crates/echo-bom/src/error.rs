// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy shared by every BOM operation.
//!
//! Failures are values, never panics. A failure deep inside a nested record
//! aborts only that subtree and surfaces as the first error to the caller, who
//! decides whether to give up on the whole document or (for
//! [`BomError::UnknownType`]) skip the section and keep going.

use std::io;

use thiserror::Error;

use crate::id::ContentId;

/// Errors produced by the BOM writer, reader, marshalers and node accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BomError {
    /// A payload does not fit the byte size its type declares, or a read asked
    /// for more bytes than the payload holds.
    #[error("[BOM_SIZE_MISMATCH] {type_name}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        /// Name of the type whose bound was violated.
        type_name: String,
        /// Byte count the type (or the read) required.
        expected: usize,
        /// Byte count actually present.
        actual: usize,
    },

    /// A value's type neither is nor extends the type the caller expected.
    #[error("[BOM_TYPE_MISMATCH] expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected type name.
        expected: String,
        /// Type name actually found.
        found: String,
    },

    /// A REF record names an id that no earlier VALUE record defined.
    #[error("[BOM_UNRESOLVED_REF] no record defines {0}")]
    UnresolvedReference(ContentId),

    /// No marshaler is registered for the type, nor for any type it extends.
    #[error("[BOM_UNKNOWN_TYPE] no marshaler for {0}")]
    UnknownType(String),

    /// The byte stream is structurally invalid (bad tag, truncated, over a
    /// configured limit, ...).
    #[error("[BOM_MALFORMED] {0}")]
    MalformedStream(String),

    /// A marshaler's own precondition failed while building a native object.
    #[error("[BOM_INVALID_NATIVE] {0}")]
    InvalidNativeState(String),

    /// The underlying byte stream failed for a reason other than truncation.
    #[error("[BOM_IO] {kind:?}: {message}")]
    Io {
        /// Kind reported by the stream.
        kind: io::ErrorKind,
        /// Rendered error message.
        message: String,
    },
}

/// Coarse classification of a [`BomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`BomError::SizeMismatch`].
    SizeMismatch,
    /// See [`BomError::TypeMismatch`].
    TypeMismatch,
    /// See [`BomError::UnresolvedReference`].
    UnresolvedReference,
    /// See [`BomError::UnknownType`].
    UnknownType,
    /// See [`BomError::MalformedStream`].
    MalformedStream,
    /// See [`BomError::InvalidNativeState`].
    InvalidNativeState,
    /// See [`BomError::Io`].
    Io,
}

impl BomError {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::UnresolvedReference(_) => ErrorKind::UnresolvedReference,
            Self::UnknownType(_) => ErrorKind::UnknownType,
            Self::MalformedStream(_) => ErrorKind::MalformedStream,
            Self::InvalidNativeState(_) => ErrorKind::InvalidNativeState,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Returns `true` when the caller may skip the offending section and
    /// continue with the rest of the document.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedStream(reason.into())
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<io::Error> for BomError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Self::MalformedStream("unexpected end of stream".into());
        }
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BomError> = std::result::Result<T, E>;

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn truncation_maps_to_malformed_stream() {
        let err = BomError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(err.kind(), ErrorKind::MalformedStream);
    }

    #[test]
    fn other_io_failures_keep_their_kind() {
        let err = BomError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        match err {
            BomError::Io { kind, .. } => assert_eq!(kind, io::ErrorKind::PermissionDenied),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn only_unknown_type_is_recoverable() {
        assert!(BomError::UnknownType("Foo".into()).is_recoverable());
        assert!(!BomError::malformed("bad").is_recoverable());
        assert!(!BomError::UnresolvedReference(ContentId([0; 16])).is_recoverable());
    }
}
