//! Annotation overlay over an editable token sequence.
//!
//! # Purpose
//!
//! * Marks typed, attributed, possibly nested spans ("annotations") over a
//!   [`TokenBuffer`](tessel_primitives::TokenBuffer).
//! * Answers positional queries (all, by type, spanning, overlapping, direct
//!   children) without rescanning every annotation.
//! * Keeps every annotation's boundaries correct while tokens are inserted,
//!   removed, or replaced anywhere in the buffer.
//!
//! # Mental model
//!
//! * A [`Document`] owns the buffer and an annotation store. Annotations are
//!   addressed by generation-checked [`RecordKey`]s; queries hand out owned
//!   [`Annotation`] snapshots.
//! * Indices sort lazily. Writes only mark them stale; the next query compacts
//!   and resorts once.
//! * Each token edit runs two phases: every annotation's change is computed
//!   against the pre-edit coordinates, then all changes are committed in
//!   document order. Annotations that shrink to nothing are purged afterwards.
//! * [`AnnotationView`]s position an annotation relative to a base.
//!   [`AnnotationViewMut`]s also edit tokens in those coordinates, and an
//!   insertion made through one exactly at a boundary belongs to its
//!   annotation (and to every annotation it nests in).
//! * Listeners hear about changes after the document lock is released.
//!
//! # Invariants
//!
//! * After every committed edit, every live annotation has `size >= 1` and
//!   ends within the buffer.
//!   - Enforced in: `AnnotationStore::token_sequence_changed`, `AnnotationStore::cleanup`
//!   - Tested by: `invariants::test_annotations_stay_in_bounds`
//! * Ids are unique per document; a record with a taken id is never added.
//!   - Enforced in: `AnnotationStore::insert_record`, `AnnotationStore::set_id`
//!   - Tested by: `invariants::test_ids_stay_unique`
//! * Query results are in document order: start, then larger first, then
//!   nesting rank, then creation order.
//!   - Enforced in: `AnnotationIndex::prepare`
//!   - Tested by: `invariants::test_query_order_is_deterministic`
//! * A removed annotation's key never resolves again.
//!   - Enforced in: `Arena::get`
//!   - Tested by: `invariants::test_stale_keys_report_gone`
//! * Structural edits from a thread that is delivering notifications are
//!   rejected; other threads are not.
//!   - Enforced in: `Document::edit_tokens`, `Document::update`
//!   - Tested by: `invariants::test_reentrant_edit_rejected`

mod arena;
mod attr;
mod config;
mod document;
mod error;
mod index;
#[cfg(test)]
mod invariants;
mod listener;
mod name;
mod nesting;
mod propagate;
mod record;
mod store;
mod view;

pub use arena::RecordKey;
pub use attr::{AttrKey, AttrValue};
pub use config::{ConfigError, OverlayConfig};
pub use document::{Document, DocumentId};
pub use error::{OverlayError, Result};
pub use listener::{AnnotationListener, CharListener, SubscriptionId, TokenListener};
pub use name::is_qualified_name;
pub use nesting::{DETAIL_RANK, NestingOrder, ROOT_RANK};
pub use propagate::TokenEdit;
pub use record::Annotation;
pub use tessel_primitives::{CharEdit, Span, Token, TokenMutation};
pub use view::{AnnotationView, AnnotationViewMut};
