use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tessel_primitives::Span;

use crate::arena::{RecordKey, ViewKey};
use crate::attr::AttrValue;
use crate::propagate::Change;

/// A live annotation record, owned by the store's arena.
pub(crate) struct Record {
	pub(crate) kind: String,
	pub(crate) start: usize,
	/// Zero after a commit means the record is dead and awaits cleanup.
	pub(crate) size: usize,
	pub(crate) id: String,
	pub(crate) create_order: u64,
	pub(crate) attributes: BTreeMap<String, AttrValue>,
	/// Prepare-phase delta, present only between prepare and commit of one edit.
	pub(crate) pending: Option<Change>,
	/// Mutable views currently wrapping this record.
	pub(crate) views: SmallVec<[ViewKey; 2]>,
	pub(crate) child_cache: ChildCache,
}

impl Record {
	pub(crate) fn new(kind: String, start: usize, size: usize, id: String, create_order: u64) -> Self {
		Self {
			kind,
			start,
			size,
			id,
			create_order,
			attributes: BTreeMap::new(),
			pending: None,
			views: SmallVec::new(),
			child_cache: ChildCache::default(),
		}
	}

	#[inline]
	pub(crate) fn span(&self) -> Span {
		Span::new(self.start, self.size)
	}

	#[inline]
	pub(crate) fn end(&self) -> usize {
		self.start + self.size
	}

	#[inline]
	pub(crate) fn is_dead(&self) -> bool {
		self.size == 0
	}

	/// Applies a committed change. Sizes never go below zero.
	pub(crate) fn apply(&mut self, change: &Change) {
		self.start = self.start.saturating_add_signed(change.start_delta);
		self.size = self.size.saturating_add_signed(change.size_delta);
	}

	pub(crate) fn snapshot(&self, key: RecordKey) -> Annotation {
		Annotation {
			key,
			kind: self.kind.clone(),
			span: self.span(),
			id: self.id.clone(),
			create_order: self.create_order,
			attributes: self.attributes.clone(),
		}
	}
}

/// An owned copy of an annotation's state at one point in time.
///
/// Positions are absolute token indices in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
	key: RecordKey,
	kind: String,
	span: Span,
	id: String,
	create_order: u64,
	attributes: BTreeMap<String, AttrValue>,
}

impl Annotation {
	/// Handle of the record this snapshot was taken from.
	pub fn key(&self) -> RecordKey {
		self.key
	}

	/// Annotation type.
	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// Covered tokens.
	pub fn span(&self) -> Span {
		self.span
	}

	/// First covered token.
	pub fn start(&self) -> usize {
		self.span.start
	}

	/// One past the last covered token.
	pub fn end(&self) -> usize {
		self.span.end()
	}

	/// Number of covered tokens.
	pub fn size(&self) -> usize {
		self.span.size
	}

	/// Unique identifier within the document.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Creation sequence number, used only as an ordering tie-break.
	pub fn create_order(&self) -> u64 {
		self.create_order
	}

	/// A stored attribute (derived attributes are not included).
	pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
		self.attributes.get(name)
	}

	/// All stored attributes.
	pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
		&self.attributes
	}
}

struct CachedChildren {
	stamp: (u64, u64),
	children: Vec<RecordKey>,
}

/// Per-record memo of "direct children of type T" results.
///
/// Holds keys only, so it never keeps another record alive, and is cleared
/// outright once it holds more than the configured number of types.
#[derive(Default)]
pub(crate) struct ChildCache {
	entries: FxHashMap<String, CachedChildren>,
}

impl ChildCache {
	pub(crate) fn get(&self, kind: &str, stamp: (u64, u64)) -> Option<&[RecordKey]> {
		self.entries
			.get(kind)
			.filter(|cached| cached.stamp == stamp)
			.map(|cached| cached.children.as_slice())
	}

	pub(crate) fn put(&mut self, kind: &str, stamp: (u64, u64), children: Vec<RecordKey>, width: usize) {
		if !self.entries.contains_key(kind) && self.entries.len() >= width {
			self.entries.clear();
		}
		self.entries.insert(kind.to_string(), CachedChildren { stamp, children });
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}
