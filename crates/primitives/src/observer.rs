//! External observers of buffer mutations.
//!
//! Observers run synchronously inside the edit that produced the event. A
//! panicking observer is logged and skipped; the edit itself always
//! completes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::mutation::{CharEdit, TokenMutation};

/// Receives mutation events from a [`TokenBuffer`](crate::TokenBuffer).
pub trait MutationObserver: Send + Sync {
	/// Called after tokens were inserted, removed, or replaced.
	fn tokens_changed(&self, event: &TokenMutation);

	/// Called after characters inside a token changed.
	fn chars_changed(&self, _edit: &CharEdit) {}
}

/// Handle returned by [`TokenBuffer::subscribe`](crate::TokenBuffer::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

#[derive(Default)]
pub(crate) struct Observers {
	next_id: u64,
	entries: Vec<(ObserverId, Arc<dyn MutationObserver>)>,
}

impl Observers {
	pub(crate) fn subscribe(&mut self, observer: Arc<dyn MutationObserver>) -> ObserverId {
		let id = ObserverId(self.next_id);
		self.next_id += 1;
		self.entries.push((id, observer));
		id
	}

	pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
		let before = self.entries.len();
		self.entries.retain(|(entry, _)| *entry != id);
		self.entries.len() != before
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	pub(crate) fn tokens_changed(&self, event: &TokenMutation) {
		for (id, observer) in &self.entries {
			guarded(*id, "tokens_changed", || observer.tokens_changed(event));
		}
	}

	pub(crate) fn chars_changed(&self, edit: &CharEdit) {
		for (id, observer) in &self.entries {
			guarded(*id, "chars_changed", || observer.chars_changed(edit));
		}
	}
}

fn guarded(id: ObserverId, event: &'static str, f: impl FnOnce()) {
	if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
		let message = payload
			.downcast_ref::<&str>()
			.map(|s| s.to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_default();
		tracing::error!(observer = id.0, event, panic = %message, "buffer observer panicked");
	}
}

impl std::fmt::Debug for Observers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Observers")
			.field("count", &self.entries.len())
			.finish()
	}
}
