//! Ordered, lazily maintained collection of records for one type (or all).
//!
//! # Mental Model
//!
//! The index is a plain `Vec` of [`RecordKey`]s that is only put in order when
//! someone asks a question. Writers never pay for sorting:
//!
//! - Removals are buffered in a pending set and compacted on the next query.
//! - Inserts bump a counter; any non-zero count forces a resort.
//! - The store hands every query a [`SortStamp`] built from its order
//!   generation (nesting order or type changes) and layout generation
//!   (committed token edits). A stamp different from the one recorded at the
//!   last sort forces a resort.
//!
//! A separate [`generation`](AnnotationIndex::generation) counter moves on
//! every change that can alter query results. Per-parent child caches compare
//! against it.
//!
//! # Range Queries
//!
//! Entries are sorted by start, so every query binary-searches for the first
//! candidate start and scans forward while the start bound holds. The largest
//! span in the index bounds how far before the window a spanning or
//! overlapping candidate can start.

use rustc_hash::FxHashSet;

use crate::arena::{Arena, RecordKey};
use crate::nesting::NestingOrder;


/// Store-wide counters an index compares against its last sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortStamp {
	pub(crate) order: u64,
	pub(crate) layout: u64,
}

#[derive(Default)]
pub(crate) struct AnnotationIndex {
	entries: Vec<RecordKey>,
	removed: FxHashSet<RecordKey>,
	inserts_since_sort: usize,
	sorted_at: Option<SortStamp>,
	max_size: usize,
	generation: u64,
}

impl AnnotationIndex {
	/// Adds a record. Re-adding a key whose removal is still pending cancels
	/// the removal instead of creating a duplicate entry.
	pub(crate) fn insert(&mut self, key: RecordKey, size: usize) {
		if !self.removed.remove(&key) {
			self.entries.push(key);
		}
		self.inserts_since_sort += 1;
		self.max_size = self.max_size.max(size);
		self.generation += 1;
	}

	pub(crate) fn remove(&mut self, key: RecordKey) {
		if self.removed.insert(key) {
			self.generation += 1;
		}
	}

	/// Marks results as changed without touching membership.
	pub(crate) fn touch(&mut self) {
		self.generation += 1;
	}

	pub(crate) fn generation(&self) -> u64 {
		self.generation
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len() - self.removed.len()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[cfg(test)]
	pub(crate) fn max_size(&self) -> usize {
		self.max_size
	}

	/// Compacts pending removals and resorts if anything made the order stale.
	pub(crate) fn prepare(&mut self, arena: &Arena, nesting: &NestingOrder, stamp: SortStamp) {
		if !self.removed.is_empty() {
			let removed = std::mem::take(&mut self.removed);
			self.entries.retain(|key| !removed.contains(key));
		}

		if self.inserts_since_sort == 0 && self.sorted_at == Some(stamp) {
			return;
		}

		self.entries.retain(|key| arena.contains(*key));
		self.entries
			.sort_by_cached_key(|key| arena.get(*key).map(|record| nesting.sort_key(record)));
		self.max_size = self
			.entries
			.iter()
			.filter_map(|key| arena.get(*key))
			.map(|record| record.size)
			.max()
			.unwrap_or(0);

		tracing::trace!(
			entries = self.entries.len(),
			inserts = self.inserts_since_sort,
			max_size = self.max_size,
			"annotation index resorted"
		);
		self.inserts_since_sort = 0;
		self.sorted_at = Some(stamp);
	}

	/// All keys in document order. Requires [`prepare`](Self::prepare).
	pub(crate) fn keys(&self) -> &[RecordKey] {
		debug_assert!(self.removed.is_empty());
		&self.entries
	}

	/// Records with `start <= s` and `end >= e`.
	pub(crate) fn spanning(&self, arena: &Arena, s: usize, e: usize) -> Vec<RecordKey> {
		if self.max_size == 0 {
			return Vec::new();
		}
		let lowest = e.saturating_sub(self.max_size);
		self.scan(arena, lowest, |start| start <= s, |_, end| end >= e)
	}

	/// Records with `start < e` and `end > s`.
	pub(crate) fn overlapping(&self, arena: &Arena, s: usize, e: usize) -> Vec<RecordKey> {
		if self.max_size == 0 || e == 0 {
			return Vec::new();
		}
		let lowest = (s + 1).saturating_sub(self.max_size);
		self.scan(arena, lowest, |start| start < e, |_, end| end > s)
	}

	/// Records with `start >= s` and `end <= e`.
	pub(crate) fn contained(&self, arena: &Arena, s: usize, e: usize) -> Vec<RecordKey> {
		self.scan(arena, s, |start| start < e, |_, end| end <= e)
	}

	/// Binary-searches the first entry starting at or after `lowest`, then
	/// walks forward while `keep_going(start)` and collects entries passing
	/// `accept(start, end)`.
	fn scan(
		&self,
		arena: &Arena,
		lowest: usize,
		keep_going: impl Fn(usize) -> bool,
		accept: impl Fn(usize, usize) -> bool,
	) -> Vec<RecordKey> {
		debug_assert!(self.removed.is_empty());
		let first = self
			.entries
			.partition_point(|key| arena.get(*key).is_some_and(|record| record.start < lowest));

		let mut out = Vec::new();
		for key in &self.entries[first..] {
			let Some(record) = arena.get(*key) else {
				continue;
			};
			if !keep_going(record.start) {
				break;
			}
			if accept(record.start, record.end()) {
				out.push(*key);
			}
		}
		out
	}
}
