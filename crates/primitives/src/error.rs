//! Error types for token buffer operations.

use thiserror::Error;

use crate::span::{TokenIdx, TokenLen};

/// Errors raised by [`TokenBuffer`](crate::TokenBuffer) edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
	/// A token index or token range falls outside the buffer.
	#[error("token index {index} out of bounds (len {len})")]
	OutOfBounds {
		/// Offending index (or range end).
		index: TokenIdx,
		/// Buffer length at the time of the call.
		len: TokenLen,
	},

	/// A character offset falls outside the addressed token.
	#[error("char offset {offset} out of bounds for token {token} (len {len})")]
	CharOutOfBounds {
		/// Token being edited.
		token: TokenIdx,
		/// Offending character offset (or range end).
		offset: usize,
		/// Character length of the token value.
		len: usize,
	},
}

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;
