//! Attribute values and the derived-attribute key space.
//!
//! A handful of attribute names are not stored in the attribute map at all:
//! they are computed from the annotation itself. [`AttrKey::parse`] sorts a
//! name into one of those derived keys or a plain [`AttrKey::Named`] entry,
//! once, at the API boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A stored attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
	/// Boolean flag.
	Bool(bool),
	/// Signed integer.
	Int(i64),
	/// Floating point number.
	Float(f64),
	/// Free text.
	Str(String),
}

impl AttrValue {
	/// Returns the text payload, if this is a string value.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the integer payload, if this is an integer value.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None,
		}
	}
}

impl fmt::Display for AttrValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(i) => write!(f, "{i}"),
			Self::Float(x) => write!(f, "{x}"),
			Self::Str(s) => f.write_str(s),
		}
	}
}

impl From<bool> for AttrValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for AttrValue {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<i32> for AttrValue {
	fn from(value: i32) -> Self {
		Self::Int(value.into())
	}
}

impl From<f64> for AttrValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<&str> for AttrValue {
	fn from(value: &str) -> Self {
		Self::Str(value.to_string())
	}
}

impl From<String> for AttrValue {
	fn from(value: String) -> Self {
		Self::Str(value)
	}
}

/// An attribute name, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKey<'a> {
	/// `size`: number of covered tokens. Read-only.
	Size,
	/// `value`: covered text. Read-only.
	Value,
	/// `startIndex`: start relative to the viewing base. Read-only.
	StartIndex,
	/// `endIndex`: end relative to the viewing base. Read-only.
	EndIndex,
	/// `id`: the annotation's identity. Writable under a length constraint.
	Id,
	/// Any other name, stored in the attribute map.
	Named(&'a str),
}

impl<'a> AttrKey<'a> {
	/// Classifies an attribute name.
	pub fn parse(name: &'a str) -> Self {
		match name {
			"size" => Self::Size,
			"value" => Self::Value,
			"startIndex" => Self::StartIndex,
			"endIndex" => Self::EndIndex,
			"id" => Self::Id,
			other => Self::Named(other),
		}
	}

	/// Returns true for keys computed from the annotation rather than stored.
	pub fn is_derived(&self) -> bool {
		!matches!(self, Self::Named(_))
	}

	/// The attribute name this key was parsed from.
	pub fn name(&self) -> &'a str {
		match self {
			Self::Size => "size",
			Self::Value => "value",
			Self::StartIndex => "startIndex",
			Self::EndIndex => "endIndex",
			Self::Id => "id",
			Self::Named(name) => name,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_derived_keys() {
		assert_eq!(AttrKey::parse("size"), AttrKey::Size);
		assert_eq!(AttrKey::parse("startIndex"), AttrKey::StartIndex);
		assert_eq!(AttrKey::parse("id"), AttrKey::Id);
		assert_eq!(AttrKey::parse("lemma"), AttrKey::Named("lemma"));
		assert!(AttrKey::parse("value").is_derived());
		assert!(!AttrKey::parse("Size").is_derived());
	}

	#[test]
	fn test_key_name_round_trips() {
		for name in ["size", "value", "startIndex", "endIndex", "id", "pos"] {
			assert_eq!(AttrKey::parse(name).name(), name);
		}
	}

	#[test]
	fn test_value_display_and_accessors() {
		assert_eq!(AttrValue::from("NN").to_string(), "NN");
		assert_eq!(AttrValue::from(3).as_int(), Some(3));
		assert_eq!(AttrValue::from(true).as_str(), None);
	}
}
