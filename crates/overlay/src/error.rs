//! Error types for overlay operations.

use tessel_primitives::BufferError;
use thiserror::Error;

/// Errors raised by annotation store, view, and document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
	/// The annotation type is not a valid qualified name.
	#[error("invalid annotation type: {0:?}")]
	InvalidType(String),

	/// An attribute name is not a valid qualified name.
	#[error("invalid attribute name: {0:?}")]
	InvalidAttributeName(String),

	/// A requested span does not fit the current buffer or parent.
	#[error("invalid span: start={start} size={size} len={len}")]
	InvalidSpan {
		/// Requested start.
		start: usize,
		/// Requested size.
		size: usize,
		/// Length of the enclosing sequence.
		len: usize,
	},

	/// A token index lies outside the addressed annotation or buffer.
	#[error("index {index} out of bounds (len {len})")]
	OutOfBounds {
		/// Offending index (or range end).
		index: usize,
		/// Length of the addressed sequence.
		len: usize,
	},

	/// The handle refers to an annotation that has been removed.
	#[error("annotation no longer exists")]
	Gone,

	/// Another annotation already owns this id.
	#[error("duplicate annotation id: {0}")]
	DuplicateId(String),

	/// A structural edit was requested through a read-only view.
	#[error("view is read-only")]
	ReadOnly,

	/// A structural edit was issued while another edit's notifications were in flight.
	#[error("structural edit rejected: another edit is still delivering notifications")]
	ReentrantEdit,

	/// The underlying token buffer rejected the edit.
	#[error(transparent)]
	Buffer(#[from] BufferError),
}

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;
