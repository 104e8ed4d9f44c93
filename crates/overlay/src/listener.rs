//! Listener hub and deferred notification delivery.
//!
//! Listeners register with the document root or with a mutable view. Every
//! write collects its notifications into an [`Outbox`] while the document is
//! locked; the outbox is delivered once the lock is released, so listeners can
//! freely query the document they are handed.
//!
//! Registries own strong listeners. A strong listener that owns a view of
//! the document it listens to forms a reference cycle: the document keeps
//! the listener alive and the view keeps the document alive. Such listeners
//! must be unsubscribed explicitly, or registered through a `*_weak` call
//! with the owner holding the `Arc`.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use tessel_primitives::CharEdit;

use crate::attr::AttrValue;
use crate::document::Document;
use crate::propagate::TokenEdit;
use crate::record::Annotation;

/// Receives structural annotation events.
///
/// All methods default to no-ops so implementors only override what they need.
pub trait AnnotationListener: Send + Sync {
	/// An annotation was created.
	fn added(&self, _doc: &Document, _annotation: &Annotation) {}

	/// An annotation was removed, explicitly or because an edit collapsed it.
	fn removed(&self, _doc: &Document, _annotation: &Annotation) {}

	/// An annotation moved to another type.
	fn type_changed(&self, _doc: &Document, _annotation: &Annotation, _old: &str) {}

	/// A stored attribute (or the id) changed. `old` is `None` for new attributes.
	fn attribute_changed(&self, _doc: &Document, _annotation: &Annotation, _name: &str, _old: Option<&AttrValue>) {}
}

/// Receives token edits.
///
/// At the document root the edit is absolute. On a view it is relative to the
/// wrapped annotation's start before the edit.
pub trait TokenListener: Send + Sync {
	fn tokens_changed(&self, doc: &Document, edit: &TokenEdit);
}

/// Receives character edits inside single tokens.
pub trait CharListener: Send + Sync {
	fn chars_changed(&self, doc: &Document, edit: &CharEdit);
}

/// Handle returned by every `subscribe_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub(crate) enum Slot<L: ?Sized> {
	Strong(Arc<L>),
	Weak(Weak<L>),
}

pub(crate) struct Registry<L: ?Sized> {
	entries: Vec<(SubscriptionId, Slot<L>)>,
}

impl<L: ?Sized> Default for Registry<L> {
	fn default() -> Self {
		Self { entries: Vec::new() }
	}
}

impl<L: ?Sized> Registry<L> {
	fn remove(&mut self, id: SubscriptionId) -> Option<Slot<L>> {
		let position = self.entries.iter().position(|(entry, _)| *entry == id)?;
		Some(self.entries.remove(position).1)
	}

	/// Resolves every registered listener, pruning weak entries whose
	/// referent is gone.
	pub(crate) fn live(&mut self) -> Vec<Arc<L>> {
		let mut live = Vec::with_capacity(self.entries.len());
		self.entries.retain(|(_, slot)| match slot {
			Slot::Strong(listener) => {
				live.push(Arc::clone(listener));
				true
			}
			Slot::Weak(weak) => match weak.upgrade() {
				Some(listener) => {
					live.push(listener);
					true
				}
				None => false,
			},
		});
		live
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}

/// Selects the registry for one listener kind.
pub(crate) trait Channel<L: ?Sized> {
	fn registry(&mut self) -> &mut Registry<L>;
}

/// The three listener registries of one notification target, sharing one id space.
#[derive(Default)]
pub(crate) struct Hub {
	next_id: u64,
	annotations: Registry<dyn AnnotationListener>,
	tokens: Registry<dyn TokenListener>,
	chars: Registry<dyn CharListener>,
}

impl Channel<dyn AnnotationListener> for Hub {
	fn registry(&mut self) -> &mut Registry<dyn AnnotationListener> {
		&mut self.annotations
	}
}

impl Channel<dyn TokenListener> for Hub {
	fn registry(&mut self) -> &mut Registry<dyn TokenListener> {
		&mut self.tokens
	}
}

impl Channel<dyn CharListener> for Hub {
	fn registry(&mut self) -> &mut Registry<dyn CharListener> {
		&mut self.chars
	}
}

impl Hub {
	fn next_id(&mut self) -> SubscriptionId {
		let id = SubscriptionId(self.next_id);
		self.next_id += 1;
		id
	}

	pub(crate) fn subscribe<L: ?Sized>(&mut self, listener: Arc<L>) -> SubscriptionId
	where
		Self: Channel<L>,
	{
		let id = self.next_id();
		self.registry().entries.push((id, Slot::Strong(listener)));
		id
	}

	pub(crate) fn subscribe_weak<L: ?Sized>(&mut self, listener: Weak<L>) -> SubscriptionId
	where
		Self: Channel<L>,
	{
		let id = self.next_id();
		self.registry().entries.push((id, Slot::Weak(listener)));
		id
	}

	/// Takes a subscription out of the hub.
	///
	/// The returned value owns the listener. Callers holding the document
	/// lock must drop it only after releasing the lock, since the listener
	/// may own views whose teardown locks the document.
	pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> Option<Unsubscribed> {
		if let Some(slot) = self.annotations.remove(id) {
			return Some(Unsubscribed::Annotation(slot));
		}
		if let Some(slot) = self.tokens.remove(id) {
			return Some(Unsubscribed::Tokens(slot));
		}
		self.chars.remove(id).map(Unsubscribed::Chars)
	}

	/// Registered entries of every kind, dead weak entries included.
	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.annotations.len() + self.tokens.len() + self.chars.len()
	}
}

/// A listener taken out of a [`Hub`], kept alive until the caller drops it.
#[allow(dead_code)]
pub(crate) enum Unsubscribed {
	Annotation(Slot<dyn AnnotationListener>),
	Tokens(Slot<dyn TokenListener>),
	Chars(Slot<dyn CharListener>),
}

/// A structural notification, in absolute document coordinates.
#[derive(Debug, Clone)]
pub(crate) enum AnnotationEvent {
	Added(Annotation),
	Removed(Annotation),
	TypeChanged {
		annotation: Annotation,
		old: String,
	},
	AttributeChanged {
		annotation: Annotation,
		name: String,
		old: Option<AttrValue>,
	},
}

impl AnnotationEvent {
	fn name(&self) -> &'static str {
		match self {
			Self::Added(_) => "added",
			Self::Removed(_) => "removed",
			Self::TypeChanged { .. } => "type_changed",
			Self::AttributeChanged { .. } => "attribute_changed",
		}
	}
}

enum Delivery {
	Annotation(Vec<Arc<dyn AnnotationListener>>, AnnotationEvent),
	Tokens(Vec<Arc<dyn TokenListener>>, TokenEdit),
	Chars(Vec<Arc<dyn CharListener>>, CharEdit),
}

/// Notifications collected under the document lock, delivered after it.
///
/// Listener lists are resolved when a notification is queued, so a listener
/// registered by another listener only hears about later edits.
#[derive(Default)]
pub(crate) struct Outbox {
	deliveries: Vec<Delivery>,
}

impl Outbox {
	pub(crate) fn annotation(&mut self, hub: &mut Hub, event: AnnotationEvent) {
		let listeners = hub.annotations.live();
		if !listeners.is_empty() {
			self.deliveries.push(Delivery::Annotation(listeners, event));
		}
	}

	pub(crate) fn tokens(&mut self, hub: &mut Hub, edit: TokenEdit) {
		let listeners = hub.tokens.live();
		if !listeners.is_empty() {
			self.deliveries.push(Delivery::Tokens(listeners, edit));
		}
	}

	pub(crate) fn chars(&mut self, hub: &mut Hub, edit: CharEdit) {
		let listeners = hub.chars.live();
		if !listeners.is_empty() {
			self.deliveries.push(Delivery::Chars(listeners, edit));
		}
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.deliveries.is_empty()
	}

	/// Calls every queued listener in order.
	///
	/// Must run without the document lock held. A panicking listener is
	/// logged and skipped.
	pub(crate) fn deliver(self, doc: &Document) {
		for delivery in self.deliveries {
			match delivery {
				Delivery::Annotation(listeners, event) => {
					let name = event.name();
					for listener in listeners {
						guarded(doc, name, || match &event {
							AnnotationEvent::Added(annotation) => listener.added(doc, annotation),
							AnnotationEvent::Removed(annotation) => listener.removed(doc, annotation),
							AnnotationEvent::TypeChanged { annotation, old } => {
								listener.type_changed(doc, annotation, old)
							}
							AnnotationEvent::AttributeChanged { annotation, name, old } => {
								listener.attribute_changed(doc, annotation, name, old.as_ref())
							}
						});
					}
				}
				Delivery::Tokens(listeners, edit) => {
					for listener in listeners {
						guarded(doc, "tokens_changed", || listener.tokens_changed(doc, &edit));
					}
				}
				Delivery::Chars(listeners, edit) => {
					for listener in listeners {
						guarded(doc, "chars_changed", || listener.chars_changed(doc, &edit));
					}
				}
			}
		}
	}
}

fn guarded(doc: &Document, event: &'static str, f: impl FnOnce()) {
	if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
		let message = payload
			.downcast_ref::<&str>()
			.map(|s| s.to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_default();
		tracing::error!(doc_id = doc.id().0, event, panic = %message, "listener panicked");
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[derive(Default)]
	struct Counter(AtomicUsize);

	impl TokenListener for Counter {
		fn tokens_changed(&self, _doc: &Document, _edit: &TokenEdit) {
			self.0.fetch_add(1, Ordering::Relaxed);
		}
	}

	impl AnnotationListener for Counter {}

	#[test]
	fn test_ids_are_shared_across_kinds() {
		let mut hub = Hub::default();
		let counter = Arc::new(Counter::default());
		let a = hub.subscribe::<dyn TokenListener>(counter.clone());
		let b = hub.subscribe::<dyn AnnotationListener>(counter);
		assert_ne!(a, b);
		assert!(hub.unsubscribe(b).is_some());
		assert!(hub.unsubscribe(b).is_none());
		assert_eq!(hub.len(), 1);
	}

	#[test]
	fn test_weak_entries_are_pruned_once_dropped() {
		let mut hub = Hub::default();
		let counter: Arc<dyn TokenListener> = Arc::new(Counter::default());
		hub.subscribe_weak(Arc::downgrade(&counter));
		assert_eq!(hub.tokens.live().len(), 1);

		drop(counter);
		assert!(hub.tokens.live().is_empty());
		assert_eq!(hub.len(), 0);
	}

	#[test]
	fn test_outbox_skips_targets_without_listeners() {
		let mut hub = Hub::default();
		let mut outbox = Outbox::default();
		outbox.tokens(
			&mut hub,
			TokenEdit {
				offset: 0,
				removed: Vec::new(),
				inserted: Vec::new(),
			},
		);
		assert!(outbox.is_empty());
	}
}
