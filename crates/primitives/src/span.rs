use serde::{Deserialize, Serialize};

/// A position in the token sequence, measured in whole tokens.
///
/// This is the canonical coordinate space for annotations.
pub type TokenIdx = usize;

/// A length or count of tokens.
///
/// Kept distinct from [`TokenIdx`] so that an index is not accidentally
/// passed where a length is expected.
pub type TokenLen = usize;

/// A half-open token interval `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
	/// First covered token.
	pub start: TokenIdx,
	/// Number of covered tokens.
	pub size: TokenLen,
}

impl Span {
	/// Creates a span from its start and size.
	pub fn new(start: TokenIdx, size: TokenLen) -> Self {
		Self { start, size }
	}

	/// Creates a span from its start and exclusive end.
	///
	/// An `end` before `start` yields an empty span at `start`.
	pub fn between(start: TokenIdx, end: TokenIdx) -> Self {
		Self {
			start,
			size: end.saturating_sub(start),
		}
	}

	/// Exclusive end of the span.
	#[inline]
	pub fn end(&self) -> TokenIdx {
		self.start + self.size
	}

	/// Returns true if the span covers no tokens.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.size == 0
	}

	/// Returns true if the token at `pos` lies inside the span.
	pub fn contains(&self, pos: TokenIdx) -> bool {
		pos >= self.start && pos < self.end()
	}

	/// Returns true if this span covers the whole window `[start, end)`.
	///
	/// Matches the spanning query: `self.start <= start && self.end >= end`.
	pub fn spans(&self, start: TokenIdx, end: TokenIdx) -> bool {
		self.start <= start && self.end() >= end
	}

	/// Returns true if this span intersects the window `[start, end)`.
	///
	/// Touching spans do not overlap.
	pub fn overlaps(&self, start: TokenIdx, end: TokenIdx) -> bool {
		self.start < end && self.end() > start
	}

	/// Returns true if `other` lies entirely within this span.
	pub fn encloses(&self, other: &Span) -> bool {
		self.start <= other.start && other.end() <= self.end()
	}

	/// Clamps the span so it fits in a sequence of `len` tokens.
	pub fn clamp(&self, len: TokenLen) -> Self {
		let start = self.start.min(len);
		Self {
			start,
			size: self.size.min(len - start),
		}
	}
}

impl std::fmt::Display for Span {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "[{}, {})", self.start, self.end())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_span_contains() {
		let s = Span::new(5, 5);
		assert!(!s.contains(4));
		assert!(s.contains(5));
		assert!(s.contains(9));
		assert!(!s.contains(10));
	}

	#[test]
	fn test_span_overlaps_excludes_touching() {
		let s = Span::between(2, 5);
		assert!(s.overlaps(4, 7));
		assert!(!s.overlaps(5, 7));
		assert!(!s.overlaps(0, 2));
	}

	#[test]
	fn test_span_spans_window() {
		let s = Span::between(2, 5);
		assert!(s.spans(3, 4));
		assert!(s.spans(2, 5));
		assert!(!s.spans(1, 4));
		assert!(!s.spans(3, 6));
	}

	#[test]
	fn test_span_clamp() {
		let s = Span::new(3, 10);
		assert_eq!(s.clamp(5), Span::new(3, 2));
		assert_eq!(s.clamp(2), Span::new(2, 0));
	}

	#[test]
	fn test_span_display() {
		assert_eq!(Span::new(1, 2).to_string(), "[1, 3)");
	}
}
