use crate::span::{Span, TokenIdx, TokenLen};
use crate::token::Token;

/// A single token-sequence mutation, as emitted by the buffer.
///
/// Describes replacing the `removed` tokens at `index` with `inserted`. A pure
/// insertion has no removed tokens; a pure removal has no inserted tokens.
/// Positions are in the pre-mutation coordinate system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMutation {
	/// First affected token position.
	pub index: TokenIdx,
	/// Tokens that now occupy `[index, index + inserted.len())`.
	pub inserted: Vec<Token>,
	/// Tokens that occupied `[index, index + removed.len())` before the edit.
	pub removed: Vec<Token>,
}

/// Classification of a [`TokenMutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
	/// Only tokens were inserted.
	Insert,
	/// Only tokens were removed.
	Remove,
	/// Tokens were removed and others inserted in their place.
	Replace,
	/// Nothing changed.
	Identity,
}

impl TokenMutation {
	/// Creates an insertion event.
	pub fn insert(index: TokenIdx, inserted: Vec<Token>) -> Self {
		Self {
			index,
			inserted,
			removed: Vec::new(),
		}
	}

	/// Creates a removal event.
	pub fn remove(index: TokenIdx, removed: Vec<Token>) -> Self {
		Self {
			index,
			inserted: Vec::new(),
			removed,
		}
	}

	/// Number of inserted tokens.
	#[inline]
	pub fn inserted_len(&self) -> TokenLen {
		self.inserted.len()
	}

	/// Number of removed tokens.
	#[inline]
	pub fn removed_len(&self) -> TokenLen {
		self.removed.len()
	}

	/// Pre-mutation span of the removed tokens.
	pub fn removed_span(&self) -> Span {
		Span::new(self.index, self.removed.len())
	}

	/// Net change in buffer length.
	pub fn delta(&self) -> isize {
		self.inserted.len() as isize - self.removed.len() as isize
	}

	/// Classifies the mutation.
	pub fn kind(&self) -> MutationKind {
		match (self.inserted.is_empty(), self.removed.is_empty()) {
			(false, true) => MutationKind::Insert,
			(true, false) => MutationKind::Remove,
			(false, false) => MutationKind::Replace,
			(true, true) => MutationKind::Identity,
		}
	}

	/// Returns true if the event changes nothing.
	pub fn is_identity(&self) -> bool {
		self.kind() == MutationKind::Identity
	}
}

/// A character-level edit inside one token.
///
/// Character edits never change the number of tokens, so they do not move
/// annotation boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharEdit {
	/// Edited token position.
	pub token: TokenIdx,
	/// Character offset inside the token value.
	pub offset: usize,
	/// Inserted text.
	pub inserted: String,
	/// Removed text.
	pub removed: String,
}

impl CharEdit {
	/// Returns the same edit addressed relative to a token window starting at `origin`.
	pub fn relative_to(&self, origin: TokenIdx) -> Self {
		Self {
			token: self.token - origin,
			..self.clone()
		}
	}
}
