//! Change propagation: how one token mutation moves every annotation.
//!
//! Propagation runs in two phases. Prepare computes a [`Change`] for every
//! live record against the pre-mutation coordinates; commit applies them in
//! document order. Ownership of an insertion that lands exactly on a
//! boundary depends on comparing the edit source with the record, so no
//! record may move until every change is known.

use tessel_primitives::{MutationKind, Span, Token, TokenMutation};

use crate::arena::RecordKey;

#[cfg(test)]
mod tests;

/// Who initiated an edit.
///
/// Threaded explicitly through the write path and consulted only for
/// insertions at an annotation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditSource {
	/// The document root.
	Document,
	/// A view wrapping this record.
	Annotation(RecordKey),
}

/// A token edit in the coordinates of whoever receives it.
///
/// At the document root `offset` is an absolute token index. For an
/// annotation view it is relative to the annotation's start before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEdit {
	/// First affected position.
	pub offset: usize,
	/// Tokens removed at `offset`.
	pub removed: Vec<Token>,
	/// Tokens inserted at `offset`.
	pub inserted: Vec<Token>,
}

impl From<&TokenMutation> for TokenEdit {
	fn from(event: &TokenMutation) -> Self {
		Self {
			offset: event.index,
			removed: event.removed.clone(),
			inserted: event.inserted.clone(),
		}
	}
}

/// Per-record delta computed in the prepare phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Change {
	pub(crate) start_delta: isize,
	pub(crate) size_delta: isize,
	pub(crate) relative: Option<TokenEdit>,
}

impl Change {
	fn shift(delta: isize) -> Self {
		Self {
			start_delta: delta,
			..Self::default()
		}
	}

	fn resize(start_delta: isize, size_delta: isize, relative: Option<TokenEdit>) -> Self {
		Self {
			start_delta,
			size_delta,
			relative,
		}
	}
}

fn edit(offset: usize, removed: &[Token], inserted: &[Token]) -> Option<TokenEdit> {
	Some(TokenEdit {
		offset,
		removed: removed.to_vec(),
		inserted: inserted.to_vec(),
	})
}

/// Computes how `event` affects a record covering `span`.
///
/// `owns_boundary` is asked only when tokens are inserted exactly at the
/// record's start or end, and answers whether the insertion belongs to the
/// record. Returns `None` when the record is unaffected.
pub(crate) fn compute_change(
	span: Span,
	event: &TokenMutation,
	owns_boundary: impl FnOnce() -> bool,
) -> Option<Change> {
	let (p, k, m) = (event.index, event.inserted_len(), event.removed_len());
	let (rs, re, size) = (span.start, span.end(), span.size);
	let removal_end = p + m;

	match event.kind() {
		MutationKind::Identity => None,

		MutationKind::Insert => {
			if p < rs {
				Some(Change::shift(k as isize))
			} else if p > re {
				None
			} else if p == rs {
				if owns_boundary() {
					Some(Change::resize(0, k as isize, edit(0, &[], &event.inserted)))
				} else {
					Some(Change::shift(k as isize))
				}
			} else if p == re {
				owns_boundary()
					.then(|| Change::resize(0, k as isize, edit(size, &[], &event.inserted)))
			} else {
				Some(Change::resize(0, k as isize, edit(p - rs, &[], &event.inserted)))
			}
		}

		MutationKind::Remove => {
			if p >= re {
				None
			} else if removal_end <= rs {
				Some(Change::shift(-(m as isize)))
			} else if p <= rs {
				// Leading tokens go; a surviving record hears them at offset 0.
				let before = rs - p;
				let inside = removal_end.min(re) - rs;
				let relative = (inside < size)
					.then(|| edit(0, &event.removed[before..before + inside], &[]))
					.flatten();
				Some(Change::resize(-(before as isize), -(inside as isize), relative))
			} else {
				let inside = removal_end.min(re) - p;
				Some(Change::resize(
					0,
					-(inside as isize),
					edit(p - rs, &event.removed[..inside], &[]),
				))
			}
		}

		MutationKind::Replace => {
			if removal_end <= rs {
				Some(Change::shift(k as isize - m as isize))
			} else if p >= re {
				None
			} else if p >= rs && removal_end <= re {
				Some(Change::resize(
					0,
					k as isize - m as isize,
					edit(p - rs, &event.removed, &event.inserted),
				))
			} else if p <= rs && removal_end >= re {
				// Removal straddles both boundaries: nothing of the record survives.
				Some(Change::resize(
					p as isize - rs as isize,
					-(size as isize),
					None,
				))
			} else if p < rs {
				Some(replace_over_start(event, rs))
			} else {
				Some(replace_over_end(event, rs, re))
			}
		}
	}
}

/// Replacement covering the start boundary only: `p < rs < p + m < re`.
fn replace_over_start(event: &TokenMutation, rs: usize) -> Change {
	let (p, k, m) = (event.index, event.inserted_len(), event.removed_len());
	let before = rs - p;
	let inside = p + m - rs;
	let removed_inside = &event.removed[before..];

	if k <= before {
		// Tokens cut at start: the replacement stays in front of the record.
		Change::resize(
			k as isize - before as isize,
			-(inside as isize),
			edit(0, removed_inside, &[]),
		)
	} else {
		// Tokens changed over start: the overflow lands inside the record.
		let inserted_inside = &event.inserted[before..];
		Change::resize(
			0,
			inserted_inside.len() as isize - inside as isize,
			edit(0, removed_inside, inserted_inside),
		)
	}
}

/// Replacement covering the end boundary only: `rs < p < re < p + m`.
fn replace_over_end(event: &TokenMutation, rs: usize, re: usize) -> Change {
	let (p, k, m) = (event.index, event.inserted_len(), event.removed_len());
	let inside = re - p;
	let after = p + m - re;
	let removed_inside = &event.removed[..inside];

	if k <= after {
		// Tokens inserted at end: the replacement stays behind the record.
		Change::resize(0, -(inside as isize), edit(p - rs, removed_inside, &[]))
	} else {
		// Tokens changed over end: the leading part lands inside the record.
		let inserted_inside = &event.inserted[..k - after];
		Change::resize(
			0,
			inserted_inside.len() as isize - inside as isize,
			edit(p - rs, removed_inside, inserted_inside),
		)
	}
}
