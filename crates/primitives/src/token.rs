use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single value token with the whitespace that follows it.
///
/// Tokens are immutable values. Character edits replace the token at a
/// position with a new one rather than mutating it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	value: String,
	whitespace_after: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	attributes: BTreeMap<String, String>,
}

impl Token {
	/// Creates a token followed by a single space.
	pub fn new(value: impl Into<String>) -> Self {
		Self::with_whitespace(value, " ")
	}

	/// Creates a token with explicit trailing whitespace.
	pub fn with_whitespace(value: impl Into<String>, whitespace_after: impl Into<String>) -> Self {
		Self {
			value: value.into(),
			whitespace_after: whitespace_after.into(),
			attributes: BTreeMap::new(),
		}
	}

	/// Returns a copy of this token carrying an extra attribute.
	pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	/// The token text.
	pub fn value(&self) -> &str {
		&self.value
	}

	/// Whitespace emitted after the token.
	pub fn whitespace_after(&self) -> &str {
		&self.whitespace_after
	}

	/// Per-token attribute lookup.
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(String::as_str)
	}

	/// All per-token attributes.
	pub fn attributes(&self) -> &BTreeMap<String, String> {
		&self.attributes
	}

	/// Character count of the value.
	pub fn char_len(&self) -> usize {
		self.value.chars().count()
	}

	/// Character count of the value plus trailing whitespace.
	pub fn extent(&self) -> usize {
		self.char_len() + self.whitespace_after.chars().count()
	}

	/// Returns a copy with `value` replaced, keeping whitespace and attributes.
	pub(crate) fn with_value(&self, value: String) -> Self {
		Self {
			value,
			whitespace_after: self.whitespace_after.clone(),
			attributes: self.attributes.clone(),
		}
	}
}

/// Splits `text` on whitespace into tokens, preserving the separators.
///
/// Leading whitespace is dropped. The final token keeps whatever trailing
/// whitespace the text had.
pub fn tokenize_whitespace(text: &str) -> Vec<Token> {
	let mut tokens = Vec::new();
	let mut rest = text.trim_start();
	while !rest.is_empty() {
		let value_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
		let (value, tail) = rest.split_at(value_end);
		let ws_len = tail.len() - tail.trim_start().len();
		let (ws, next) = tail.split_at(ws_len);
		tokens.push(Token::with_whitespace(value, ws));
		rest = next;
	}
	tokens
}
