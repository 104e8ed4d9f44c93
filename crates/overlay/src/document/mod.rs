//! Document - the owning handle for a token buffer and its annotations.
//!
//! A [`Document`] is a cheap, cloneable handle. Every clone shares one
//! buffer, one annotation store, one root listener hub, and one table of
//! mutable views, all behind a single lock.
//!
//! # Write Path
//!
//! Every write follows the same shape:
//!
//! 1. Lock the document and reject structural edits while notifications are
//!    being delivered.
//! 2. Apply the change. Token edits go to the buffer first; the resulting
//!    [`TokenMutation`] is fed to the store, which moves every annotation.
//! 3. Queue notifications for the affected listeners in an [`Outbox`].
//! 4. Unlock, then deliver.
//!
//! Listeners therefore always see a consistent document and may query it.
//! A structural edit issued from inside a listener fails with
//! [`OverlayError::ReentrantEdit`]. Only the delivering thread is refused;
//! edits from other threads wait for the lock as usual.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;
use slab::Slab;
use smallvec::SmallVec;
use tessel_primitives::{
	CharEdit, MutationObserver, ObserverId, Token, TokenBuffer, TokenMutation, tokenize_whitespace,
};

use crate::arena::{RecordKey, ViewKey};
use crate::attr::AttrValue;
use crate::config::OverlayConfig;
use crate::error::{OverlayError, Result};
use crate::listener::{
	AnnotationEvent, AnnotationListener, CharListener, Hub, Outbox, SubscriptionId, TokenListener,
};
use crate::nesting::NestingOrder;
use crate::propagate::{EditSource, TokenEdit};
use crate::record::{Annotation, Record};
use crate::store::AnnotationStore;
use crate::view::{AnnotationView, AnnotationViewMut};

#[cfg(test)]
mod tests;

/// Counter for generating unique document IDs.
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
	/// Generates a new unique document ID.
	pub fn next() -> Self {
		Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Where the notifications of a non-token write go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
	Root,
	View(ViewKey),
}

pub(crate) struct ViewEntry {
	pub(crate) record: RecordKey,
	pub(crate) listeners: Hub,
}

pub(crate) struct DocumentInner {
	pub(crate) buffer: TokenBuffer,
	pub(crate) store: AnnotationStore,
	pub(crate) listeners: Hub,
	pub(crate) views: Slab<ViewEntry>,
}

impl DocumentInner {
	/// The hub a route resolves to. A view that has gone away falls back to the root.
	pub(crate) fn hub(&mut self, route: Route) -> &mut Hub {
		match route {
			Route::View(key) => match self.views.get_mut(key.0) {
				Some(entry) => &mut entry.listeners,
				None => &mut self.listeners,
			},
			Route::Root => &mut self.listeners,
		}
	}

	/// Moves annotations for one buffer mutation and queues its notifications.
	fn propagate(&mut self, event: &TokenMutation, source: EditSource, outbox: &mut Outbox) {
		if event.is_identity() {
			return;
		}
		let deliveries = self.store.token_sequence_changed(event, source);
		outbox.tokens(&mut self.listeners, TokenEdit::from(event));
		for delivery in deliveries {
			for view in delivery.views {
				if let Some(entry) = self.views.get_mut(view.0) {
					outbox.tokens(&mut entry.listeners, delivery.edit.clone());
				}
			}
		}
		for (annotation, _) in self.store.cleanup() {
			outbox.annotation(&mut self.listeners, AnnotationEvent::Removed(annotation));
		}
	}
}

struct Shared {
	inner: Mutex<DocumentInner>,
	/// Threads currently delivering an outbox, one entry per nested delivery.
	delivering: Mutex<SmallVec<[ThreadId; 2]>>,
}

/// A token buffer with its annotation overlay.
#[derive(Clone)]
pub struct Document {
	id: DocumentId,
	shared: Arc<Shared>,
}

impl std::fmt::Debug for Document {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Document").field("id", &self.id).finish_non_exhaustive()
	}
}

impl Document {
	/// Creates a document over `tokens` with the default configuration.
	pub fn new(tokens: Vec<Token>) -> Self {
		Self::with_config(tokens, &OverlayConfig::default())
	}

	/// Creates a document over `tokens`.
	pub fn with_config(tokens: Vec<Token>, config: &OverlayConfig) -> Self {
		let id = DocumentId::next();
		tracing::debug!(doc_id = id.0, tokens = tokens.len(), root = %config.root_type, "creating document");
		Self {
			id,
			shared: Arc::new(Shared {
				inner: Mutex::new(DocumentInner {
					buffer: TokenBuffer::new(tokens),
					store: AnnotationStore::new(config.nesting(), config.child_cache_width),
					listeners: Hub::default(),
					views: Slab::new(),
				}),
				delivering: Mutex::new(SmallVec::new()),
			}),
		}
	}

	/// Creates a document by splitting `text` on whitespace.
	pub fn from_text(text: &str) -> Self {
		Self::new(tokenize_whitespace(text))
	}

	pub fn id(&self) -> DocumentId {
		self.id
	}

	/// Returns true if both handles refer to the same document.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	/// Runs `f` with the document locked.
	///
	/// Queries need mutable access because indices sort lazily.
	pub(crate) fn with<R>(&self, f: impl FnOnce(&mut DocumentInner) -> R) -> R {
		let mut guard = self.shared.inner.lock();
		f(&mut guard)
	}

	fn check_not_delivering(&self) -> Result<()> {
		let current = std::thread::current().id();
		if self.shared.delivering.lock().contains(&current) {
			tracing::warn!(doc_id = self.id.0, "rejecting structural edit during notification delivery");
			return Err(OverlayError::ReentrantEdit);
		}
		Ok(())
	}

	fn deliver(&self, outbox: Outbox) {
		if outbox.is_empty() {
			return;
		}
		let current = std::thread::current().id();
		self.shared.delivering.lock().push(current);
		outbox.deliver(self);
		let mut delivering = self.shared.delivering.lock();
		if let Some(position) = delivering.iter().rposition(|thread| *thread == current) {
			delivering.remove(position);
		}
	}

	/// Runs a token-level write and propagates its mutation.
	pub(crate) fn edit_tokens(
		&self,
		source: EditSource,
		op: impl FnOnce(&mut DocumentInner) -> Result<TokenMutation>,
	) -> Result<TokenMutation> {
		let mut outbox = Outbox::default();
		let event = {
			let mut inner = self.shared.inner.lock();
			self.check_not_delivering()?;
			let event = op(&mut inner)?;
			inner.propagate(&event, source, &mut outbox);
			event
		};
		tracing::trace!(
			doc_id = self.id.0,
			index = event.index,
			inserted = event.inserted_len(),
			removed = event.removed_len(),
			"token edit committed"
		);
		self.deliver(outbox);
		Ok(event)
	}

	/// Runs a character-level write.
	///
	/// The root hears the absolute edit; every mutable view whose annotation
	/// covers the edited token hears it relative to the annotation's start.
	pub(crate) fn edit_chars(&self, op: impl FnOnce(&mut DocumentInner) -> Result<CharEdit>) -> Result<CharEdit> {
		let mut outbox = Outbox::default();
		let edit = {
			let mut guard = self.shared.inner.lock();
			self.check_not_delivering()?;
			let inner = &mut *guard;
			let edit = op(inner)?;
			outbox.chars(&mut inner.listeners, edit.clone());
			for (_, entry) in inner.views.iter_mut() {
				if let Ok(record) = inner.store.get(entry.record)
					&& record.span().contains(edit.token)
				{
					outbox.chars(&mut entry.listeners, edit.relative_to(record.start));
				}
			}
			edit
		};
		self.deliver(outbox);
		Ok(edit)
	}

	/// Runs a write that does not touch the buffer and notifies `route`.
	pub(crate) fn update<R>(
		&self,
		route: Route,
		structural: bool,
		op: impl FnOnce(&mut DocumentInner, &mut Vec<AnnotationEvent>) -> Result<R>,
	) -> Result<R> {
		let mut outbox = Outbox::default();
		let result = {
			let mut inner = self.shared.inner.lock();
			if structural {
				self.check_not_delivering()?;
			}
			let mut events = Vec::new();
			let result = op(&mut inner, &mut events)?;
			let hub = inner.hub(route);
			for event in events {
				outbox.annotation(hub, event);
			}
			result
		};
		self.deliver(outbox);
		Ok(result)
	}

	/// Number of tokens.
	pub fn len(&self) -> usize {
		self.with(|inner| inner.buffer.len())
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn token_at(&self, index: usize) -> Option<Token> {
		self.with(|inner| inner.buffer.token_at(index).cloned())
	}

	pub fn whitespace_after(&self, index: usize) -> Option<String> {
		self.with(|inner| inner.buffer.whitespace_after(index).map(str::to_string))
	}

	/// A copy of every token.
	pub fn tokens(&self) -> Vec<Token> {
		self.with(|inner| inner.buffer.tokens().to_vec())
	}

	/// Full text, whitespace included.
	pub fn text(&self) -> String {
		self.with(|inner| inner.buffer.text())
	}

	/// Character offset of the token at `index`.
	pub fn char_offset(&self, index: usize) -> Result<usize> {
		self.with(|inner| Ok(inner.buffer.char_offset(index)?))
	}

	/// Creates an annotation of `kind` over `[start, start + size)`.
	///
	/// Fails without touching anything if the type is invalid, `size` is zero,
	/// or the span runs past the end of the buffer.
	pub fn add_annotation(&self, kind: &str, start: usize, size: usize) -> Result<Annotation> {
		self.update(Route::Root, true, |inner, events| {
			let key = inner.store.add(kind, start, size, inner.buffer.len())?;
			let annotation = inner.store.snapshot(key)?;
			events.push(AnnotationEvent::Added(annotation.clone()));
			Ok(annotation)
		})
	}

	/// Restores an annotation with a known id and attributes, e.g. from a
	/// serialized document.
	///
	/// Returns `Ok(None)` if another annotation already owns `id`; nothing is
	/// added in that case.
	pub fn import_annotation(
		&self,
		kind: &str,
		start: usize,
		size: usize,
		id: &str,
		attributes: impl IntoIterator<Item = (String, AttrValue)>,
	) -> Result<Option<Annotation>> {
		crate::name::check_type(kind)?;
		let mut record = Record::new(kind.to_string(), start, size, id.to_string(), 0);
		for (name, value) in attributes {
			crate::name::check_attribute(&name)?;
			record.attributes.insert(name, value);
		}

		self.update(Route::Root, true, |inner, events| {
			let len = inner.buffer.len();
			if size < 1 || start.checked_add(size).is_none_or(|end| end > len) {
				return Err(OverlayError::InvalidSpan { start, size, len });
			}
			let Some(key) = inner.store.insert_record(record) else {
				return Ok(None);
			};
			let annotation = inner.store.snapshot(key)?;
			events.push(AnnotationEvent::Added(annotation.clone()));
			Ok(Some(annotation))
		})
	}

	/// Removes an annotation, returning its final state.
	pub fn remove_annotation(&self, key: RecordKey) -> Result<Annotation> {
		self.update(Route::Root, true, |inner, events| {
			let (annotation, _) = inner.store.remove(key)?;
			events.push(AnnotationEvent::Removed(annotation.clone()));
			Ok(annotation)
		})
	}

	/// Current state of one annotation.
	pub fn annotation(&self, key: RecordKey) -> Result<Annotation> {
		self.with(|inner| inner.store.snapshot(key))
	}

	/// Number of live annotations.
	pub fn annotation_count(&self) -> usize {
		self.with(|inner| inner.store.len())
	}

	/// Every annotation in document order.
	pub fn annotations(&self) -> Vec<Annotation> {
		self.with(|inner| {
			let keys = inner.store.keys(None);
			inner.store.snapshots(&keys)
		})
	}

	/// Every annotation of `kind` in document order.
	pub fn annotations_of(&self, kind: &str) -> Vec<Annotation> {
		self.with(|inner| {
			let keys = inner.store.keys(Some(kind));
			inner.store.snapshots(&keys)
		})
	}

	/// Annotations (of `kind`, or any type) covering all of `[start, end)`.
	pub fn spanning(&self, kind: Option<&str>, start: usize, end: usize) -> Vec<Annotation> {
		self.with(|inner| {
			let keys = inner.store.spanning(kind, start, end);
			inner.store.snapshots(&keys)
		})
	}

	/// Annotations (of `kind`, or any type) sharing at least one token with `[start, end)`.
	pub fn overlapping(&self, kind: Option<&str>, start: usize, end: usize) -> Vec<Annotation> {
		self.with(|inner| {
			let keys = inner.store.overlapping(kind, start, end);
			inner.store.snapshots(&keys)
		})
	}

	pub fn find_by_id(&self, id: &str) -> Option<Annotation> {
		self.with(|inner| {
			let key = inner.store.find_by_id(id)?;
			inner.store.snapshot(key).ok()
		})
	}

	/// Direct children of `parent` with type `kind`, in document order.
	pub fn children(&self, parent: RecordKey, kind: &str) -> Result<Vec<Annotation>> {
		self.with(|inner| {
			let keys = inner.store.children(parent, kind)?;
			Ok(inner.store.snapshots(&keys))
		})
	}

	/// Every type that currently has at least one annotation, sorted.
	pub fn types(&self) -> Vec<String> {
		self.with(|inner| inner.store.types())
	}

	/// Moves an annotation to another type.
	pub fn change_type(&self, key: RecordKey, kind: &str) -> Result<()> {
		self.view(key)?.change_type(kind)
	}

	/// Reads an attribute, derived ones included.
	pub fn attribute(&self, key: RecordKey, name: &str) -> Result<Option<AttrValue>> {
		self.view(key)?.attribute(name)
	}

	/// Writes an attribute. Writes to read-only derived attributes are ignored.
	pub fn set_attribute(&self, key: RecordKey, name: &str, value: impl Into<AttrValue>) -> Result<()> {
		self.view(key)?.set_attribute(name, value)
	}

	pub fn remove_attribute(&self, key: RecordKey, name: &str) -> Result<Option<AttrValue>> {
		self.view(key)?.remove_attribute(name)
	}

	/// Replaces the outer-to-inner type order. Indices resort on their next query.
	///
	/// Fails with [`OverlayError::InvalidType`] on the first bad name and
	/// leaves the current order in place.
	pub fn set_nesting_order<I, S>(&self, order: I) -> Result<()>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let order: Vec<String> = order.into_iter().map(Into::into).collect();
		for kind in &order {
			crate::name::check_type(kind)?;
		}
		self.with(|inner| {
			let root = inner.store.nesting().root_type().to_string();
			inner.store.set_nesting(NestingOrder::new(root, order));
		});
		Ok(())
	}

	pub fn nesting_order(&self) -> NestingOrder {
		self.with(|inner| inner.store.nesting().clone())
	}

	/// Inserts `tokens` before position `index`.
	pub fn insert_tokens(&self, index: usize, tokens: Vec<Token>) -> Result<TokenMutation> {
		self.edit_tokens(EditSource::Document, |inner| Ok(inner.buffer.insert_tokens(index, tokens)?))
	}

	/// Removes `count` tokens starting at `index`.
	pub fn remove_tokens(&self, index: usize, count: usize) -> Result<TokenMutation> {
		self.edit_tokens(EditSource::Document, |inner| Ok(inner.buffer.remove_tokens(index, count)?))
	}

	/// Replaces `count` tokens starting at `index` with `tokens`.
	pub fn replace_tokens(&self, index: usize, count: usize, tokens: Vec<Token>) -> Result<TokenMutation> {
		self.edit_tokens(EditSource::Document, |inner| {
			Ok(inner.buffer.replace_tokens(index, count, tokens)?)
		})
	}

	/// Inserts `text` into token `token` at character `offset`.
	pub fn insert_chars(&self, token: usize, offset: usize, text: &str) -> Result<CharEdit> {
		self.edit_chars(|inner| Ok(inner.buffer.insert_chars(token, offset, text)?))
	}

	/// Removes `count` characters from token `token` at character `offset`.
	pub fn remove_chars(&self, token: usize, offset: usize, count: usize) -> Result<CharEdit> {
		self.edit_chars(|inner| Ok(inner.buffer.remove_chars(token, offset, count)?))
	}

	/// A read-only view of one annotation, positioned in absolute coordinates.
	pub fn view(&self, key: RecordKey) -> Result<AnnotationView> {
		AnnotationView::root(self.clone(), key)
	}

	/// A mutable view of one annotation, positioned in absolute coordinates.
	pub fn view_mut(&self, key: RecordKey) -> Result<AnnotationViewMut> {
		AnnotationViewMut::root(self.clone(), key)
	}

	pub fn subscribe_annotations(&self, listener: Arc<dyn AnnotationListener>) -> SubscriptionId {
		self.with(|inner| inner.listeners.subscribe(listener))
	}

	/// Like [`subscribe_annotations`](Self::subscribe_annotations), without
	/// keeping the listener alive.
	pub fn subscribe_annotations_weak(&self, listener: Weak<dyn AnnotationListener>) -> SubscriptionId {
		self.with(|inner| inner.listeners.subscribe_weak(listener))
	}

	pub fn subscribe_tokens(&self, listener: Arc<dyn TokenListener>) -> SubscriptionId {
		self.with(|inner| inner.listeners.subscribe(listener))
	}

	pub fn subscribe_tokens_weak(&self, listener: Weak<dyn TokenListener>) -> SubscriptionId {
		self.with(|inner| inner.listeners.subscribe_weak(listener))
	}

	pub fn subscribe_chars(&self, listener: Arc<dyn CharListener>) -> SubscriptionId {
		self.with(|inner| inner.listeners.subscribe(listener))
	}

	pub fn subscribe_chars_weak(&self, listener: Weak<dyn CharListener>) -> SubscriptionId {
		self.with(|inner| inner.listeners.subscribe_weak(listener))
	}

	/// Removes a root subscription. Returns false if `id` was not registered here.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		// The listener is dropped after the lock is released.
		let removed = self.with(|inner| inner.listeners.unsubscribe(id));
		removed.is_some()
	}

	/// Registers a raw buffer observer.
	///
	/// Buffer observers run while the document is locked and must not call
	/// back into it.
	pub fn observe_buffer(&self, observer: Arc<dyn MutationObserver>) -> ObserverId {
		self.with(|inner| inner.buffer.subscribe(observer))
	}

	pub fn unobserve_buffer(&self, id: ObserverId) -> bool {
		self.with(|inner| inner.buffer.unsubscribe(id))
	}
}
