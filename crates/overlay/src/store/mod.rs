//! Annotation store - the single source of truth for one document's annotations.
//!
//! The store owns the record arena, the "all types" index, one index per
//! observed type, and the id map. It never talks to listeners; callers turn
//! its return values into notifications.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tessel_primitives::TokenMutation;
use uuid::Uuid;

use crate::arena::{Arena, RecordKey, ViewKey};
use crate::attr::AttrValue;
use crate::error::{OverlayError, Result};
use crate::index::{AnnotationIndex, SortStamp};
use crate::name::{check_attribute, check_type};
use crate::nesting::NestingOrder;
use crate::propagate::{EditSource, TokenEdit, compute_change};
use crate::record::{Annotation, Record};


/// A relative edit to hand to the mutable views of one record.
pub(crate) struct RelativeDelivery {
	pub(crate) views: SmallVec<[ViewKey; 2]>,
	pub(crate) edit: TokenEdit,
}

pub(crate) struct AnnotationStore {
	arena: Arena,
	all: AnnotationIndex,
	by_type: FxHashMap<String, AnnotationIndex>,
	ids: FxHashMap<String, RecordKey>,
	nesting: NestingOrder,
	/// Bumped by nesting order changes and type changes.
	order_generation: u64,
	/// Bumped by every committed token mutation.
	layout_generation: u64,
	next_create_order: u64,
	child_cache_width: usize,
}

impl AnnotationStore {
	pub(crate) fn new(nesting: NestingOrder, child_cache_width: usize) -> Self {
		Self {
			arena: Arena::default(),
			all: AnnotationIndex::default(),
			by_type: FxHashMap::default(),
			ids: FxHashMap::default(),
			nesting,
			order_generation: 0,
			layout_generation: 0,
			next_create_order: 0,
			child_cache_width,
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.arena.len()
	}

	#[cfg(test)]
	pub(crate) fn is_empty(&self) -> bool {
		self.arena.is_empty()
	}

	pub(crate) fn get(&self, key: RecordKey) -> Result<&Record> {
		self.arena.get(key).ok_or(OverlayError::Gone)
	}

	pub(crate) fn snapshot(&self, key: RecordKey) -> Result<Annotation> {
		self.get(key).map(|record| record.snapshot(key))
	}

	pub(crate) fn snapshots(&self, keys: &[RecordKey]) -> Vec<Annotation> {
		keys.iter()
			.filter_map(|key| self.arena.get(*key).map(|record| record.snapshot(*key)))
			.collect()
	}

	pub(crate) fn find_by_id(&self, id: &str) -> Option<RecordKey> {
		self.ids.get(id).copied()
	}

	pub(crate) fn nesting(&self) -> &NestingOrder {
		&self.nesting
	}

	/// Replaces the nesting order. Indices resort lazily on their next query.
	pub(crate) fn set_nesting(&mut self, nesting: NestingOrder) {
		self.nesting = nesting;
		self.order_generation += 1;
	}

	/// Observed type names, sorted.
	pub(crate) fn types(&self) -> Vec<String> {
		let mut types: Vec<String> = self
			.by_type
			.iter()
			.filter(|(_, index)| !index.is_empty())
			.map(|(kind, _)| kind.clone())
			.collect();
		types.sort();
		types
	}

	/// Validates and creates a record over `[start, start + size)`.
	pub(crate) fn add(&mut self, kind: &str, start: usize, size: usize, buffer_len: usize) -> Result<RecordKey> {
		check_type(kind)?;
		if size < 1 || start.checked_add(size).is_none_or(|end| end > buffer_len) {
			return Err(OverlayError::InvalidSpan {
				start,
				size,
				len: buffer_len,
			});
		}

		let id = Uuid::new_v4().to_string();
		let record = Record::new(kind.to_string(), start, size, id.clone(), self.next_create_order);
		self.insert_record(record)
			.ok_or(OverlayError::DuplicateId(id))
	}

	/// Inserts a fully formed record.
	///
	/// A record whose id is already taken is dropped without error and `None`
	/// is returned; no duplicate is ever added.
	pub(crate) fn insert_record(&mut self, mut record: Record) -> Option<RecordKey> {
		if self.ids.contains_key(&record.id) {
			tracing::debug!(id = %record.id, kind = %record.kind, "dropping annotation with duplicate id");
			return None;
		}

		record.create_order = self.next_create_order;
		self.next_create_order += 1;

		let (kind, id, size) = (record.kind.clone(), record.id.clone(), record.size);
		let key = self.arena.insert(record);
		self.all.insert(key, size);
		self.by_type.entry(kind).or_default().insert(key, size);
		self.ids.insert(id, key);
		Some(key)
	}

	/// Removes a record from every index and the id map.
	pub(crate) fn remove(&mut self, key: RecordKey) -> Result<(Annotation, SmallVec<[ViewKey; 2]>)> {
		let record = self.arena.remove(key).ok_or(OverlayError::Gone)?;
		self.all.remove(key);
		if let Some(index) = self.by_type.get_mut(&record.kind) {
			index.remove(key);
		}
		self.ids.remove(&record.id);
		Ok((record.snapshot(key), record.views))
	}

	/// Moves a record to another type. Returns the old type, or `None` if
	/// the type did not change.
	pub(crate) fn change_type(&mut self, key: RecordKey, kind: &str) -> Result<Option<String>> {
		check_type(kind)?;
		let record = self.arena.get_mut(key).ok_or(OverlayError::Gone)?;
		if record.kind == kind {
			return Ok(None);
		}
		let old = std::mem::replace(&mut record.kind, kind.to_string());
		let size = record.size;

		if let Some(index) = self.by_type.get_mut(&old) {
			index.remove(key);
		}
		self.by_type.entry(kind.to_string()).or_default().insert(key, size);
		self.all.touch();
		self.order_generation += 1;
		Ok(Some(old))
	}

	/// Rewrites a record's id.
	///
	/// Only an id of the same character length as the current one is
	/// accepted; any other length is ignored. Returns the old id if the
	/// rewrite happened.
	pub(crate) fn set_id(&mut self, key: RecordKey, id: &str) -> Result<Option<String>> {
		let current = &self.get(key)?.id;
		if current == id {
			return Ok(None);
		}
		if current.chars().count() != id.chars().count() {
			tracing::debug!(old = %current, new = %id, "ignoring id rewrite with a different length");
			return Ok(None);
		}
		if self.ids.contains_key(id) {
			return Err(OverlayError::DuplicateId(id.to_string()));
		}

		let record = self.arena.get_mut(key).ok_or(OverlayError::Gone)?;
		let old = std::mem::replace(&mut record.id, id.to_string());
		self.ids.remove(&old);
		self.ids.insert(id.to_string(), key);
		Ok(Some(old))
	}

	/// Sets a stored attribute, returning the previous value.
	pub(crate) fn set_attribute(&mut self, key: RecordKey, name: &str, value: AttrValue) -> Result<Option<AttrValue>> {
		check_attribute(name)?;
		let record = self.arena.get_mut(key).ok_or(OverlayError::Gone)?;
		Ok(record.attributes.insert(name.to_string(), value))
	}

	/// Removes a stored attribute, returning its value.
	pub(crate) fn remove_attribute(&mut self, key: RecordKey, name: &str) -> Result<Option<AttrValue>> {
		let record = self.arena.get_mut(key).ok_or(OverlayError::Gone)?;
		Ok(record.attributes.remove(name))
	}

	pub(crate) fn attach_view(&mut self, key: RecordKey, view: ViewKey) -> Result<()> {
		let record = self.arena.get_mut(key).ok_or(OverlayError::Gone)?;
		record.views.push(view);
		Ok(())
	}

	pub(crate) fn detach_view(&mut self, key: RecordKey, view: ViewKey) {
		if let Some(record) = self.arena.get_mut(key) {
			record.views.retain(|v| *v != view);
		}
	}

	fn stamp(&self) -> SortStamp {
		SortStamp {
			order: self.order_generation,
			layout: self.layout_generation,
		}
	}

	/// Runs `f` over the prepared index for `kind` (or all types).
	fn query<R>(&mut self, kind: Option<&str>, f: impl FnOnce(&AnnotationIndex, &Arena) -> R) -> Option<R> {
		let stamp = self.stamp();
		let index = match kind {
			Some(kind) => self.by_type.get_mut(kind)?,
			None => &mut self.all,
		};
		index.prepare(&self.arena, &self.nesting, stamp);
		Some(f(index, &self.arena))
	}

	/// Every record of `kind` (or every record) in document order.
	pub(crate) fn keys(&mut self, kind: Option<&str>) -> Vec<RecordKey> {
		self.query(kind, |index, _| index.keys().to_vec())
			.unwrap_or_default()
	}

	pub(crate) fn spanning(&mut self, kind: Option<&str>, s: usize, e: usize) -> Vec<RecordKey> {
		self.query(kind, |index, arena| index.spanning(arena, s, e))
			.unwrap_or_default()
	}

	pub(crate) fn overlapping(&mut self, kind: Option<&str>, s: usize, e: usize) -> Vec<RecordKey> {
		self.query(kind, |index, arena| index.overlapping(arena, s, e))
			.unwrap_or_default()
	}

	pub(crate) fn contained(&mut self, kind: Option<&str>, s: usize, e: usize) -> Vec<RecordKey> {
		self.query(kind, |index, arena| index.contained(arena, s, e))
			.unwrap_or_default()
	}

	/// Records of `kind` directly under `parent`.
	///
	/// A record is a direct child when it nests inside `parent` and is not
	/// itself enclosed by an earlier direct child of the same type. Results
	/// are memoized on the parent and reused while the type's index
	/// generation and the order generation stay put.
	pub(crate) fn children(&mut self, parent: RecordKey, kind: &str) -> Result<Vec<RecordKey>> {
		let span = self.get(parent)?.span();
		let order_generation = self.order_generation;
		let stamp = self.stamp();
		let Some(index) = self.by_type.get_mut(kind) else {
			return Ok(Vec::new());
		};
		index.prepare(&self.arena, &self.nesting, stamp);
		let cache_stamp = (index.generation(), order_generation);

		let parent_record = self.arena.get(parent).ok_or(OverlayError::Gone)?;
		if let Some(hit) = parent_record.child_cache.get(kind, cache_stamp) {
			tracing::trace!(kind, children = hit.len(), "child cache hit");
			return Ok(hit.to_vec());
		}

		let mut children: Vec<RecordKey> = Vec::new();
		let mut last_end = None;
		for key in index.contained(&self.arena, span.start, span.end()) {
			if key == parent {
				continue;
			}
			let Some(child) = self.arena.get(key) else {
				continue;
			};
			if !self.nesting.is_nested_in(child, parent_record) {
				continue;
			}
			// Sorted by start then size descending: an entry ending inside the
			// previous direct child is nested in it.
			if last_end.is_some_and(|end| child.end() <= end) {
				continue;
			}
			last_end = Some(child.end());
			children.push(key);
		}

		let width = self.child_cache_width;
		if let Some(record) = self.arena.get_mut(parent) {
			record.child_cache.put(kind, cache_stamp, children.clone(), width);
		}
		Ok(children)
	}

	/// Applies one token mutation to every live record.
	///
	/// Prepare computes every record's change from pre-mutation coordinates;
	/// commit then applies them in document order. Returns the relative edits
	/// owed to mutable views. Dead records are left for [`cleanup`](Self::cleanup).
	pub(crate) fn token_sequence_changed(&mut self, event: &TokenMutation, source: EditSource) -> Vec<RelativeDelivery> {
		if event.is_identity() {
			return Vec::new();
		}
		let order = self.keys(None);

		let source_record = match source {
			EditSource::Annotation(key) => self.arena.get(key).map(|record| (key, record)),
			EditSource::Document => None,
		};

		let mut changes = Vec::new();
		for key in &order {
			let Some(record) = self.arena.get(*key) else {
				continue;
			};
			let owns_boundary = || {
				source_record.is_some_and(|(source_key, source)| {
					source_key == *key || self.nesting.is_nested_in(source, record)
				})
			};
			if let Some(change) = compute_change(record.span(), event, owns_boundary) {
				changes.push((*key, change));
			}
		}
		let affected = changes.len();
		for (key, change) in changes {
			if let Some(record) = self.arena.get_mut(key) {
				record.pending = Some(change);
			}
		}

		let mut deliveries = Vec::new();
		for key in &order {
			let Some(record) = self.arena.get_mut(*key) else {
				continue;
			};
			let Some(change) = record.pending.take() else {
				continue;
			};
			record.apply(&change);
			if let Some(edit) = change.relative
				&& !record.views.is_empty()
			{
				deliveries.push(RelativeDelivery {
					views: record.views.clone(),
					edit,
				});
			}
		}

		self.layout_generation += 1;
		self.all.touch();
		for index in self.by_type.values_mut() {
			index.touch();
		}

		tracing::trace!(
			index = event.index,
			inserted = event.inserted_len(),
			removed = event.removed_len(),
			?source,
			affected,
			"propagated token mutation"
		);
		deliveries
	}

	/// Purges records whose size fell to zero, returning their final state
	/// and the views that still wrapped them.
	pub(crate) fn cleanup(&mut self) -> Vec<(Annotation, SmallVec<[ViewKey; 2]>)> {
		let dead: Vec<RecordKey> = self
			.arena
			.iter()
			.filter(|(_, record)| record.is_dead())
			.map(|(key, _)| key)
			.collect();
		if dead.is_empty() {
			return Vec::new();
		}
		tracing::debug!(purged = dead.len(), "purging collapsed annotations");
		dead.into_iter()
			.filter_map(|key| self.remove(key).ok())
			.collect()
	}

	#[cfg(test)]
	/// Checks the post-commit bounds invariant against a buffer length.
	pub(crate) fn all_within(&self, buffer_len: usize) -> bool {
		self.arena
			.iter()
			.all(|(_, record)| record.size >= 1 && record.end() <= buffer_len)
	}
}
