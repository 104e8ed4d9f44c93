//! Token buffer - the editable sequence annotations are laid over.
//!
//! The buffer owns an ordered list of [`Token`]s. Every token-level edit
//! returns the [`TokenMutation`] it produced and also hands it to any
//! subscribed [`MutationObserver`]s. Character edits return a [`CharEdit`]
//! and never change the token count.

use std::sync::Arc;

use crate::error::{BufferError, Result};
use crate::mutation::{CharEdit, TokenMutation};
use crate::observer::{MutationObserver, ObserverId, Observers};
use crate::span::{Span, TokenIdx, TokenLen};
use crate::token::{Token, tokenize_whitespace};


/// An ordered, mutable sequence of tokens.
#[derive(Debug, Default)]
pub struct TokenBuffer {
	tokens: Vec<Token>,
	observers: Observers,
}

impl TokenBuffer {
	/// Creates a buffer holding `tokens`.
	pub fn new(tokens: Vec<Token>) -> Self {
		Self {
			tokens,
			observers: Observers::default(),
		}
	}

	/// Creates a buffer by splitting `text` on whitespace.
	pub fn from_text(text: &str) -> Self {
		Self::new(tokenize_whitespace(text))
	}

	/// Number of tokens.
	#[inline]
	pub fn len(&self) -> TokenLen {
		self.tokens.len()
	}

	/// Returns true if the buffer holds no tokens.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	/// Token at `index`, if any.
	pub fn token_at(&self, index: TokenIdx) -> Option<&Token> {
		self.tokens.get(index)
	}

	/// Whitespace following the token at `index`, if any.
	pub fn whitespace_after(&self, index: TokenIdx) -> Option<&str> {
		self.tokens.get(index).map(Token::whitespace_after)
	}

	/// All tokens in order.
	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	/// Tokens covered by `span`.
	pub fn slice(&self, span: Span) -> Result<&[Token]> {
		self.check_range(span.start, span.size)?;
		Ok(&self.tokens[span.start..span.end()])
	}

	/// Character offset at which the token at `index` starts.
	///
	/// `index == len()` yields the total character length.
	pub fn char_offset(&self, index: TokenIdx) -> Result<usize> {
		if index > self.tokens.len() {
			return Err(BufferError::OutOfBounds {
				index,
				len: self.tokens.len(),
			});
		}
		Ok(self.tokens[..index].iter().map(Token::extent).sum())
	}

	/// Total character length including whitespace.
	pub fn char_len(&self) -> usize {
		self.tokens.iter().map(Token::extent).sum()
	}

	/// Full text of the buffer, whitespace included.
	pub fn text(&self) -> String {
		let mut out = String::with_capacity(self.char_len());
		for token in &self.tokens {
			out.push_str(token.value());
			out.push_str(token.whitespace_after());
		}
		out
	}

	/// Text covered by `span`: values joined by their inner whitespace, with the
	/// trailing whitespace of the last token left off.
	pub fn text_of(&self, span: Span) -> Result<String> {
		let tokens = self.slice(span)?;
		let mut out = String::new();
		for (i, token) in tokens.iter().enumerate() {
			out.push_str(token.value());
			if i + 1 < tokens.len() {
				out.push_str(token.whitespace_after());
			}
		}
		Ok(out)
	}

	/// Inserts `tokens` before position `index`.
	pub fn insert_tokens(&mut self, index: TokenIdx, tokens: Vec<Token>) -> Result<TokenMutation> {
		self.replace_tokens(index, 0, tokens)
	}

	/// Removes `count` tokens starting at `index`.
	pub fn remove_tokens(&mut self, index: TokenIdx, count: TokenLen) -> Result<TokenMutation> {
		self.replace_tokens(index, count, Vec::new())
	}

	/// Replaces `count` tokens starting at `index` with `tokens`.
	///
	/// The range is validated before the buffer is touched.
	pub fn replace_tokens(
		&mut self,
		index: TokenIdx,
		count: TokenLen,
		tokens: Vec<Token>,
	) -> Result<TokenMutation> {
		self.check_range(index, count)?;
		let removed: Vec<Token> = self
			.tokens
			.splice(index..index + count, tokens.iter().cloned())
			.collect();
		let event = TokenMutation {
			index,
			inserted: tokens,
			removed,
		};
		if !event.is_identity() {
			self.observers.tokens_changed(&event);
		}
		Ok(event)
	}

	/// Inserts `text` into the value of token `token` at character `offset`.
	pub fn insert_chars(&mut self, token: TokenIdx, offset: usize, text: &str) -> Result<CharEdit> {
		self.edit_chars(token, offset, 0, text)
	}

	/// Removes `count` characters from the value of token `token` at `offset`.
	pub fn remove_chars(&mut self, token: TokenIdx, offset: usize, count: usize) -> Result<CharEdit> {
		self.edit_chars(token, offset, count, "")
	}

	fn edit_chars(&mut self, token: TokenIdx, offset: usize, count: usize, text: &str) -> Result<CharEdit> {
		let len = self.tokens.len();
		let current = self
			.tokens
			.get(token)
			.ok_or(BufferError::OutOfBounds { index: token, len })?;

		let char_len = current.char_len();
		if offset.checked_add(count).is_none_or(|end| end > char_len) {
			return Err(BufferError::CharOutOfBounds {
				token,
				offset: offset.saturating_add(count),
				len: char_len,
			});
		}

		let value = current.value();
		let byte_at = |chars: usize| {
			value
				.char_indices()
				.nth(chars)
				.map_or(value.len(), |(byte, _)| byte)
		};
		let (from, to) = (byte_at(offset), byte_at(offset + count));

		let removed = value[from..to].to_string();
		let mut next = String::with_capacity(value.len() - removed.len() + text.len());
		next.push_str(&value[..from]);
		next.push_str(text);
		next.push_str(&value[to..]);

		let replacement = current.with_value(next);
		self.tokens[token] = replacement;
		let edit = CharEdit {
			token,
			offset,
			inserted: text.to_string(),
			removed,
		};
		self.observers.chars_changed(&edit);
		Ok(edit)
	}

	/// Registers an external observer for mutation events.
	pub fn subscribe(&mut self, observer: Arc<dyn MutationObserver>) -> ObserverId {
		self.observers.subscribe(observer)
	}

	/// Removes an observer. Returns false if it was not registered.
	pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
		self.observers.unsubscribe(id)
	}

	/// Number of registered observers.
	pub fn observer_count(&self) -> usize {
		self.observers.len()
	}

	fn check_range(&self, index: TokenIdx, count: TokenLen) -> Result<()> {
		let len = self.tokens.len();
		if index > len || count > len - index {
			return Err(BufferError::OutOfBounds {
				index: index.saturating_add(count),
				len,
			});
		}
		Ok(())
	}
}

impl From<Vec<Token>> for TokenBuffer {
	fn from(tokens: Vec<Token>) -> Self {
		Self::new(tokens)
	}
}
