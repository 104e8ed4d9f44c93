//! Views - handles onto one annotation, positioned relative to a base.
//!
//! A view created from the [`Document`] reports absolute positions. A view
//! created from another view reports positions relative to that view's
//! annotation start, and so on down the chain.
//!
//! [`AnnotationView`] reads, retypes, and edits attributes. Its
//! notifications go to the nearest mutable view in its chain, or to the
//! document root. [`AnnotationViewMut`] additionally edits tokens and child
//! annotations in its own coordinates, and owns a set of listeners that hear
//! about edits inside its annotation. Views are never cached: every call
//! returns a fresh handle.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use tessel_primitives::{CharEdit, Span, Token};

use crate::arena::{RecordKey, ViewKey};
use crate::attr::{AttrKey, AttrValue};
use crate::document::{Document, DocumentInner, Route, ViewEntry};
use crate::error::{OverlayError, Result};
use crate::listener::{
	AnnotationEvent, AnnotationListener, CharListener, Hub, SubscriptionId, TokenListener,
};
use crate::propagate::{EditSource, TokenEdit};
use crate::record::Annotation;
use crate::store::AnnotationStore;


/// A mutable view's registration in the document's view table.
///
/// Dropping the last handle removes the table entry and clears the record's
/// back-reference.
pub(crate) struct ViewSlot {
	doc: Document,
	key: ViewKey,
	record: RecordKey,
}

impl Drop for ViewSlot {
	fn drop(&mut self) {
		// The entry owns the view's listeners; drop it after unlocking.
		let entry = self.doc.with(|inner| {
			inner.store.detach_view(self.record, self.key);
			inner.views.try_remove(self.key.0)
		});
		drop(entry);
		tracing::trace!(doc_id = self.doc.id().0, view = self.key.0, "mutable view released");
	}
}

enum Base {
	Root,
	Annotation {
		record: RecordKey,
		slot: Option<Arc<ViewSlot>>,
		parent: Arc<Base>,
	},
}

impl Base {
	/// Absolute position that relative coordinates count from.
	fn origin(&self, inner: &DocumentInner) -> Result<usize> {
		match self {
			Self::Root => Ok(0),
			Self::Annotation { record, .. } => Ok(inner.store.get(*record)?.start),
		}
	}

	fn route(&self) -> Route {
		let mut base = self;
		loop {
			match base {
				Self::Root => return Route::Root,
				Self::Annotation { slot: Some(slot), .. } => return Route::View(slot.key),
				Self::Annotation { parent, .. } => base = &**parent,
			}
		}
	}
}

fn index_value(n: usize) -> AttrValue {
	AttrValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// A handle onto one annotation.
#[derive(Clone)]
pub struct AnnotationView {
	doc: Document,
	record: RecordKey,
	base: Arc<Base>,
	slot: Option<Arc<ViewSlot>>,
}

impl fmt::Debug for AnnotationView {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnnotationView")
			.field("doc", &self.doc.id())
			.field("record", &self.record)
			.field("mutable", &self.slot.is_some())
			.finish()
	}
}

impl AnnotationView {
	pub(crate) fn root(doc: Document, record: RecordKey) -> Result<Self> {
		doc.with(|inner| inner.store.get(record).map(|_| ()))?;
		Ok(Self {
			doc,
			record,
			base: Arc::new(Base::Root),
			slot: None,
		})
	}

	/// Handle of the wrapped annotation.
	pub fn key(&self) -> RecordKey {
		self.record
	}

	pub fn document(&self) -> &Document {
		&self.doc
	}

	/// Returns true if this view can edit tokens and child annotations.
	pub fn is_mutable(&self) -> bool {
		self.slot.is_some()
	}

	/// Returns false once the annotation has been removed or collapsed.
	pub fn is_alive(&self) -> bool {
		self.doc.with(|inner| inner.store.get(self.record).is_ok())
	}

	fn route(&self) -> Route {
		match &self.slot {
			Some(slot) => Route::View(slot.key),
			None => self.base.route(),
		}
	}

	/// Absolute span of the annotation and the origin of this view's coordinates.
	fn locate(&self, inner: &DocumentInner) -> Result<(Span, usize)> {
		let span = inner.store.get(self.record)?.span();
		Ok((span, self.base.origin(inner)?))
	}

	fn child_base(&self) -> Arc<Base> {
		Arc::new(Base::Annotation {
			record: self.record,
			slot: self.slot.clone(),
			parent: Arc::clone(&self.base),
		})
	}

	fn child_views(&self, keys: Vec<RecordKey>) -> Vec<AnnotationView> {
		let base = self.child_base();
		keys.into_iter()
			.map(|record| AnnotationView {
				doc: self.doc.clone(),
				record,
				base: Arc::clone(&base),
				slot: None,
			})
			.collect()
	}

	/// Runs an absolute-window query and keeps the results nested in this annotation.
	fn nested_keys(
		&self,
		inner: &mut DocumentInner,
		query: impl FnOnce(&mut AnnotationStore, Span) -> Result<Vec<RecordKey>>,
	) -> Result<Vec<RecordKey>> {
		let span = inner.store.get(self.record)?.span();
		let keys = query(&mut inner.store, span)?;
		let store = &inner.store;
		let own = store.get(self.record)?;
		Ok(keys
			.into_iter()
			.filter(|key| *key != self.record)
			.filter(|key| {
				store
					.get(*key)
					.is_ok_and(|candidate| store.nesting().is_nested_in(candidate, own))
			})
			.collect())
	}

	/// Current state in absolute coordinates.
	pub fn annotation(&self) -> Result<Annotation> {
		self.doc.with(|inner| inner.store.snapshot(self.record))
	}

	pub fn kind(&self) -> Result<String> {
		self.doc.with(|inner| Ok(inner.store.get(self.record)?.kind.clone()))
	}

	pub fn id(&self) -> Result<String> {
		self.doc.with(|inner| Ok(inner.store.get(self.record)?.id.clone()))
	}

	/// Start relative to this view's base.
	pub fn start(&self) -> Result<usize> {
		self.doc.with(|inner| {
			let (span, origin) = self.locate(inner)?;
			Ok(span.start.saturating_sub(origin))
		})
	}

	/// End relative to this view's base.
	pub fn end(&self) -> Result<usize> {
		self.doc.with(|inner| {
			let (span, origin) = self.locate(inner)?;
			Ok(span.end().saturating_sub(origin))
		})
	}

	pub fn size(&self) -> Result<usize> {
		self.doc.with(|inner| Ok(inner.store.get(self.record)?.size))
	}

	/// Reads an attribute.
	///
	/// `size`, `value`, `startIndex`, `endIndex`, and `id` are computed from
	/// the annotation; everything else comes from the attribute map.
	pub fn attribute(&self, name: &str) -> Result<Option<AttrValue>> {
		self.doc.with(|inner| {
			let (span, origin) = self.locate(inner)?;
			let record = inner.store.get(self.record)?;
			let value = match AttrKey::parse(name) {
				AttrKey::Size => Some(index_value(span.size)),
				AttrKey::Value => Some(AttrValue::Str(inner.buffer.text_of(span)?)),
				AttrKey::StartIndex => Some(index_value(span.start.saturating_sub(origin))),
				AttrKey::EndIndex => Some(index_value(span.end().saturating_sub(origin))),
				AttrKey::Id => Some(AttrValue::Str(record.id.clone())),
				AttrKey::Named(name) => record.attributes.get(name).cloned(),
			};
			Ok(value)
		})
	}

	/// A copy of the stored attributes.
	pub fn attributes(&self) -> Result<BTreeMap<String, AttrValue>> {
		self.doc.with(|inner| Ok(inner.store.get(self.record)?.attributes.clone()))
	}

	/// Writes an attribute.
	///
	/// Writes to `size`, `value`, `startIndex`, and `endIndex` are ignored.
	/// An `id` write only takes effect when the new id has the same character
	/// length as the current one.
	pub fn set_attribute(&self, name: &str, value: impl Into<AttrValue>) -> Result<()> {
		let value = value.into();
		let record = self.record;
		self.doc.update(self.route(), false, |inner, events| {
			match AttrKey::parse(name) {
				AttrKey::Named(name) => {
					let old = inner.store.set_attribute(record, name, value)?;
					events.push(AnnotationEvent::AttributeChanged {
						annotation: inner.store.snapshot(record)?,
						name: name.to_string(),
						old,
					});
				}
				AttrKey::Id => {
					if let Some(old) = inner.store.set_id(record, &value.to_string())? {
						events.push(AnnotationEvent::AttributeChanged {
							annotation: inner.store.snapshot(record)?,
							name: "id".to_string(),
							old: Some(AttrValue::Str(old)),
						});
					}
				}
				derived => {
					inner.store.get(record)?;
					tracing::debug!(attribute = derived.name(), "ignoring write to derived attribute");
				}
			}
			Ok(())
		})
	}

	/// Removes a stored attribute, returning its value.
	pub fn remove_attribute(&self, name: &str) -> Result<Option<AttrValue>> {
		let record = self.record;
		self.doc.update(self.route(), false, |inner, events| {
			let key = AttrKey::parse(name);
			if key.is_derived() {
				inner.store.get(record)?;
				return Ok(None);
			}
			let old = inner.store.remove_attribute(record, name)?;
			if old.is_some() {
				events.push(AnnotationEvent::AttributeChanged {
					annotation: inner.store.snapshot(record)?,
					name: name.to_string(),
					old: old.clone(),
				});
			}
			Ok(old)
		})
	}

	/// Moves the annotation to another type.
	pub fn change_type(&self, kind: &str) -> Result<()> {
		let record = self.record;
		self.doc.update(self.route(), false, |inner, events| {
			if let Some(old) = inner.store.change_type(record, kind)? {
				events.push(AnnotationEvent::TypeChanged {
					annotation: inner.store.snapshot(record)?,
					old,
				});
			}
			Ok(())
		})
	}

	/// Covered tokens.
	pub fn tokens(&self) -> Result<Vec<Token>> {
		self.doc.with(|inner| {
			let span = inner.store.get(self.record)?.span();
			Ok(inner.buffer.slice(span)?.to_vec())
		})
	}

	/// Covered token at `index`, counted from the annotation start.
	pub fn token_at(&self, index: usize) -> Result<Token> {
		self.doc.with(|inner| {
			let span = inner.store.get(self.record)?.span();
			let out_of_bounds = OverlayError::OutOfBounds {
				index,
				len: span.size,
			};
			if index >= span.size {
				return Err(out_of_bounds);
			}
			inner.buffer.token_at(span.start + index).cloned().ok_or(out_of_bounds)
		})
	}

	/// Covered text, inner whitespace included.
	pub fn text(&self) -> Result<String> {
		self.doc.with(|inner| {
			let span = inner.store.get(self.record)?.span();
			Ok(inner.buffer.text_of(span)?)
		})
	}

	/// Direct children of type `kind`, positioned relative to this annotation.
	pub fn children(&self, kind: &str) -> Result<Vec<AnnotationView>> {
		let keys = self.doc.with(|inner| inner.store.children(self.record, kind))?;
		Ok(self.child_views(keys))
	}

	/// Every annotation nested in this one, of any type, in document order.
	pub fn annotations(&self) -> Result<Vec<AnnotationView>> {
		let keys = self.doc.with(|inner| {
			self.nested_keys(inner, |store, span| Ok(store.contained(None, span.start, span.end())))
		})?;
		Ok(self.child_views(keys))
	}

	/// Nested annotations covering all of the relative window `[start, end)`.
	pub fn spanning(&self, kind: Option<&str>, start: usize, end: usize) -> Result<Vec<AnnotationView>> {
		let keys = self.doc.with(|inner| {
			self.nested_keys(inner, |store, span| {
				Ok(store.spanning(kind, absolute(span, start)?, absolute(span, end)?))
			})
		})?;
		Ok(self.child_views(keys))
	}

	/// Nested annotations sharing a token with the relative window `[start, end)`.
	pub fn overlapping(&self, kind: Option<&str>, start: usize, end: usize) -> Result<Vec<AnnotationView>> {
		let keys = self.doc.with(|inner| {
			self.nested_keys(inner, |store, span| {
				Ok(store.overlapping(kind, absolute(span, start)?, absolute(span, end)?))
			})
		})?;
		Ok(self.child_views(keys))
	}

	/// A read-only view of another annotation, relative to this one.
	pub fn view(&self, key: RecordKey) -> Result<AnnotationView> {
		self.doc.with(|inner| inner.store.get(key).map(|_| ()))?;
		Ok(AnnotationView {
			doc: self.doc.clone(),
			record: key,
			base: self.child_base(),
			slot: None,
		})
	}

	/// A mutable view of another annotation, relative to this one.
	///
	/// Only a mutable view can hand out mutable views.
	pub fn view_mut(&self, key: RecordKey) -> Result<AnnotationViewMut> {
		if self.slot.is_none() {
			return Err(OverlayError::ReadOnly);
		}
		AnnotationViewMut::attach(self.doc.clone(), key, self.child_base())
	}
}

/// A view that can also edit tokens and child annotations.
///
/// Token positions passed to its methods are relative to the annotation's
/// start. Edits are attributed to the annotation, so an insertion exactly at
/// either boundary grows it.
pub struct AnnotationViewMut {
	view: AnnotationView,
	slot: Arc<ViewSlot>,
}

impl Deref for AnnotationViewMut {
	type Target = AnnotationView;

	fn deref(&self) -> &AnnotationView {
		&self.view
	}
}

impl fmt::Debug for AnnotationViewMut {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnnotationViewMut")
			.field("doc", &self.view.doc.id())
			.field("record", &self.view.record)
			.field("slot", &self.slot.key.0)
			.finish()
	}
}

impl AnnotationViewMut {
	pub(crate) fn root(doc: Document, record: RecordKey) -> Result<Self> {
		Self::attach(doc, record, Arc::new(Base::Root))
	}

	fn attach(doc: Document, record: RecordKey, base: Arc<Base>) -> Result<Self> {
		let key = doc.with(|inner| -> Result<ViewKey> {
			inner.store.get(record)?;
			let key = ViewKey(inner.views.insert(ViewEntry {
				record,
				listeners: Hub::default(),
			}));
			inner.store.attach_view(record, key)?;
			Ok(key)
		})?;
		tracing::trace!(doc_id = doc.id().0, view = key.0, "mutable view attached");

		let slot = Arc::new(ViewSlot {
			doc: doc.clone(),
			key,
			record,
		});
		Ok(Self {
			view: AnnotationView {
				doc,
				record,
				base,
				slot: Some(Arc::clone(&slot)),
			},
			slot,
		})
	}

	fn route(&self) -> Route {
		Route::View(self.slot.key)
	}

	/// Creates a child annotation over the relative span `[start, start + size)`.
	pub fn add_annotation(&self, kind: &str, start: usize, size: usize) -> Result<Annotation> {
		let record = self.view.record;
		self.view.doc.update(self.route(), true, |inner, events| {
			let own = inner.store.get(record)?.span();
			if size < 1 || start.checked_add(size).is_none_or(|end| end > own.size) {
				return Err(OverlayError::InvalidSpan {
					start,
					size,
					len: own.size,
				});
			}
			let key = inner.store.add(kind, own.start + start, size, inner.buffer.len())?;
			let annotation = inner.store.snapshot(key)?;
			events.push(AnnotationEvent::Added(annotation.clone()));
			Ok(annotation)
		})
	}

	/// Removes an annotation nested in this one.
	pub fn remove_annotation(&self, key: RecordKey) -> Result<Annotation> {
		let record = self.view.record;
		self.view.doc.update(self.route(), true, |inner, events| {
			let own = inner.store.get(record)?;
			let target = inner.store.get(key)?;
			if key == record || !inner.store.nesting().is_nested_in(target, own) {
				return Err(OverlayError::InvalidSpan {
					start: target.start.saturating_sub(own.start),
					size: target.size,
					len: own.size,
				});
			}
			let (annotation, _) = inner.store.remove(key)?;
			events.push(AnnotationEvent::Removed(annotation.clone()));
			Ok(annotation)
		})
	}

	/// Inserts `tokens` at relative position `offset` (`0..=size`).
	pub fn insert_tokens(&self, offset: usize, tokens: Vec<Token>) -> Result<TokenEdit> {
		self.replace_tokens(offset, 0, tokens)
	}

	/// Removes `count` tokens at relative position `offset`.
	pub fn remove_tokens(&self, offset: usize, count: usize) -> Result<TokenEdit> {
		self.replace_tokens(offset, count, Vec::new())
	}

	/// Replaces `count` tokens at relative position `offset` with `tokens`.
	pub fn replace_tokens(&self, offset: usize, count: usize, tokens: Vec<Token>) -> Result<TokenEdit> {
		let record = self.view.record;
		let event = self
			.view
			.doc
			.edit_tokens(EditSource::Annotation(record), |inner| {
				let span = inner.store.get(record)?.span();
				if offset > span.size || count > span.size - offset {
					return Err(OverlayError::OutOfBounds {
						index: offset.saturating_add(count),
						len: span.size,
					});
				}
				Ok(inner.buffer.replace_tokens(span.start + offset, count, tokens)?)
			})?;
		Ok(TokenEdit {
			offset,
			removed: event.removed,
			inserted: event.inserted,
		})
	}

	/// Inserts `text` into covered token `token` at character `offset`.
	pub fn insert_chars(&self, token: usize, offset: usize, text: &str) -> Result<CharEdit> {
		self.edit_chars(token, |inner, absolute| {
			Ok(inner.buffer.insert_chars(absolute, offset, text)?)
		})
	}

	/// Removes `count` characters from covered token `token` at character `offset`.
	pub fn remove_chars(&self, token: usize, offset: usize, count: usize) -> Result<CharEdit> {
		self.edit_chars(token, |inner, absolute| {
			Ok(inner.buffer.remove_chars(absolute, offset, count)?)
		})
	}

	fn edit_chars(
		&self,
		token: usize,
		op: impl FnOnce(&mut DocumentInner, usize) -> Result<CharEdit>,
	) -> Result<CharEdit> {
		let record = self.view.record;
		let edit = self.view.doc.edit_chars(|inner| {
			let span = inner.store.get(record)?.span();
			if token >= span.size {
				return Err(OverlayError::OutOfBounds {
					index: token,
					len: span.size,
				});
			}
			op(inner, span.start + token)
		})?;
		Ok(CharEdit { token, ..edit })
	}

	fn with_hub<R>(&self, f: impl FnOnce(&mut Hub) -> R) -> R {
		let route = self.route();
		self.view.doc.with(|inner| f(inner.hub(route)))
	}

	/// Listens for annotations added, removed, or changed through this view
	/// or its read-only descendants.
	pub fn subscribe_annotations(&self, listener: Arc<dyn AnnotationListener>) -> SubscriptionId {
		self.with_hub(|hub| hub.subscribe(listener))
	}

	pub fn subscribe_annotations_weak(&self, listener: Weak<dyn AnnotationListener>) -> SubscriptionId {
		self.with_hub(|hub| hub.subscribe_weak(listener))
	}

	/// Listens for token edits inside this annotation, in relative coordinates.
	pub fn subscribe_tokens(&self, listener: Arc<dyn TokenListener>) -> SubscriptionId {
		self.with_hub(|hub| hub.subscribe(listener))
	}

	pub fn subscribe_tokens_weak(&self, listener: Weak<dyn TokenListener>) -> SubscriptionId {
		self.with_hub(|hub| hub.subscribe_weak(listener))
	}

	/// Listens for character edits inside covered tokens, in relative coordinates.
	pub fn subscribe_chars(&self, listener: Arc<dyn CharListener>) -> SubscriptionId {
		self.with_hub(|hub| hub.subscribe(listener))
	}

	pub fn subscribe_chars_weak(&self, listener: Weak<dyn CharListener>) -> SubscriptionId {
		self.with_hub(|hub| hub.subscribe_weak(listener))
	}

	/// Removes a subscription made on this view.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let removed = self.with_hub(|hub| hub.unsubscribe(id));
		removed.is_some()
	}

	/// Gives up mutability. The view stays registered while any descendant
	/// created from it is alive.
	pub fn into_view(self) -> AnnotationView {
		let mut view = self.view;
		view.slot = None;
		view
	}
}

/// Converts an offset relative to `span` into an absolute token index.
fn absolute(span: Span, offset: usize) -> Result<usize> {
	span.start.checked_add(offset).ok_or(OverlayError::OutOfBounds {
		index: offset,
		len: span.size,
	})
}
