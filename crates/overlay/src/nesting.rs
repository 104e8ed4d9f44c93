//! Configured type precedence.
//!
//! A [`NestingOrder`] lists annotation types from outermost to innermost. It
//! breaks ties between records that share a span and decides which record
//! owns an insertion made exactly at a shared boundary.

use std::cmp::{Ordering, Reverse};

use rustc_hash::FxHashMap;
use tessel_primitives::Span;

use crate::record::{Annotation, Record};

/// Rank of the root type. Always outermost.
pub const ROOT_RANK: usize = 0;

/// Rank of types missing from the configured order.
pub const DETAIL_RANK: usize = usize::MAX;

/// Ordered outer-to-inner list of annotation types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestingOrder {
	root_type: String,
	order: Vec<String>,
	ranks: FxHashMap<String, usize>,
}

/// The parts of an annotation that ordering looks at.
pub(crate) trait Nestable {
	fn span(&self) -> Span;
	fn kind(&self) -> &str;
	fn create_order(&self) -> u64;
}

impl Nestable for Record {
	fn span(&self) -> Span {
		Record::span(self)
	}

	fn kind(&self) -> &str {
		&self.kind
	}

	fn create_order(&self) -> u64 {
		self.create_order
	}
}

impl Nestable for Annotation {
	fn span(&self) -> Span {
		Annotation::span(self)
	}

	fn kind(&self) -> &str {
		Annotation::kind(self)
	}

	fn create_order(&self) -> u64 {
		Annotation::create_order(self)
	}
}

/// Total sort key: start ascending, size descending, rank, creation order.
pub(crate) type SortKey = (usize, Reverse<usize>, usize, u64);

impl NestingOrder {
	/// Creates an order with the given root type and outer-to-inner type list.
	///
	/// Duplicate entries keep their first position. The root type is outermost
	/// even if it also appears in the list.
	pub fn new<I, S>(root_type: impl Into<String>, order: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let order: Vec<String> = order.into_iter().map(Into::into).collect();
		let mut ranks = FxHashMap::default();
		for (i, kind) in order.iter().enumerate() {
			ranks.entry(kind.clone()).or_insert(i + 1);
		}
		Self {
			root_type: root_type.into(),
			order,
			ranks,
		}
	}

	/// The document/root type name.
	pub fn root_type(&self) -> &str {
		&self.root_type
	}

	/// The configured outer-to-inner list.
	pub fn order(&self) -> &[String] {
		&self.order
	}

	/// Rank of `kind`: lower is outer.
	pub fn rank(&self, kind: &str) -> usize {
		if kind == self.root_type {
			return ROOT_RANK;
		}
		self.ranks.get(kind).copied().unwrap_or(DETAIL_RANK)
	}

	/// Compares two types by rank.
	pub fn cmp_types(&self, a: &str, b: &str) -> Ordering {
		self.rank(a).cmp(&self.rank(b))
	}

	/// Full annotation comparison: position, size descending, type rank, creation order.
	pub fn cmp_annotations(&self, a: &Annotation, b: &Annotation) -> Ordering {
		self.sort_key(a).cmp(&self.sort_key(b))
	}

	/// Returns true if `candidate` nests inside `container`.
	///
	/// Spans must enclose. Coincident spans fall back to type rank, then to
	/// the container having been created first.
	pub fn annotation_nested_in(&self, candidate: &Annotation, container: &Annotation) -> bool {
		self.is_nested_in(candidate, container)
	}

	pub(crate) fn sort_key(&self, item: &impl Nestable) -> SortKey {
		let span = item.span();
		(
			span.start,
			Reverse(span.size),
			self.rank(item.kind()),
			item.create_order(),
		)
	}

	pub(crate) fn is_nested_in(&self, candidate: &impl Nestable, container: &impl Nestable) -> bool {
		let (inner, outer) = (candidate.span(), container.span());
		if !outer.encloses(&inner) {
			return false;
		}
		if inner != outer {
			return true;
		}
		match self.cmp_types(container.kind(), candidate.kind()) {
			Ordering::Less => true,
			Ordering::Greater => false,
			Ordering::Equal => container.create_order() < candidate.create_order(),
		}
	}
}

impl Default for NestingOrder {
	fn default() -> Self {
		Self::new("document", std::iter::empty::<String>())
	}
}
