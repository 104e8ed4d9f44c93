//! Machine-checkable invariant proofs for the annotation overlay.
//!
//! Each invariant is expressed as a `pub(crate) fn test_*()` that is both a
//! runnable test and a link target for the crate-level docs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Document, OverlayError, Token, TokenEdit, TokenListener};

fn doc(words: &str) -> Document {
	Document::from_text(words)
}

/// Invariant: every live annotation has `size >= 1` and ends within the buffer after each edit.
#[cfg_attr(test, test)]
pub(crate) fn test_annotations_stay_in_bounds() {
	let doc = doc("a b c d e f g h");
	for (start, size) in [(0, 8), (1, 3), (2, 2), (5, 1), (6, 2)] {
		doc.add_annotation("np", start, size).unwrap();
	}

	doc.remove_tokens(1, 3).unwrap();
	doc.replace_tokens(3, 2, vec![Token::new("x")]).unwrap();
	doc.insert_tokens(0, vec![Token::new("y"), Token::new("z")]).unwrap();
	doc.remove_tokens(0, 4).unwrap();

	let len = doc.len();
	for annotation in doc.annotations() {
		assert!(annotation.size() >= 1, "{annotation:?} collapsed but survived");
		assert!(annotation.end() <= len, "{annotation:?} runs past {len}");
	}
	assert!(doc.with(|inner| inner.store.all_within(len)));
}

/// Invariant: ids are unique per document.
#[cfg_attr(test, test)]
pub(crate) fn test_ids_stay_unique() {
	let doc = doc("a b c");
	let first = doc.import_annotation("np", 0, 1, "n1", []).unwrap();
	assert!(first.is_some());
	assert_eq!(doc.import_annotation("np", 1, 1, "n1", []).unwrap(), None);

	let second = doc.import_annotation("np", 1, 1, "n2", []).unwrap().unwrap();
	assert_eq!(
		doc.set_attribute(second.key(), "id", "n1"),
		Err(OverlayError::DuplicateId("n1".into()))
	);
	assert_eq!(doc.annotation_count(), 2);
}

/// Invariant: document order is start, then larger span, then nesting rank, then creation order.
#[cfg_attr(test, test)]
pub(crate) fn test_query_order_is_deterministic() {
	let doc = doc("a b c d e");
	doc.set_nesting_order(["s", "np"]).unwrap();
	let np = doc.add_annotation("np", 0, 2).unwrap();
	let w = doc.add_annotation("w", 0, 2).unwrap();
	let s = doc.add_annotation("s", 0, 2).unwrap();
	let wide = doc.add_annotation("np", 0, 4).unwrap();
	let later = doc.add_annotation("np", 0, 2).unwrap();

	let keys: Vec<_> = doc.annotations().iter().map(|a| a.key()).collect();
	assert_eq!(keys, [wide.key(), s.key(), np.key(), later.key(), w.key()]);

	let nesting = doc.nesting_order();
	let mut shuffled = doc.annotations();
	shuffled.reverse();
	shuffled.sort_by(|a, b| nesting.cmp_annotations(a, b));
	assert_eq!(shuffled, doc.annotations());
}

/// Invariant: a removed annotation's key never resolves again, even after its slot is reused.
#[cfg_attr(test, test)]
pub(crate) fn test_stale_keys_report_gone() {
	let doc = doc("a b c");
	let removed = doc.add_annotation("np", 0, 1).unwrap();
	doc.remove_annotation(removed.key()).unwrap();
	let reused = doc.add_annotation("vp", 1, 1).unwrap();

	assert_eq!(doc.annotation(removed.key()), Err(OverlayError::Gone));
	assert_eq!(doc.remove_annotation(removed.key()), Err(OverlayError::Gone));
	assert!(doc.view(removed.key()).is_err());
	assert_eq!(doc.annotation(reused.key()).unwrap().kind(), "vp");
}

struct Reenter {
	result: Mutex<Option<Result<(), OverlayError>>>,
}

impl TokenListener for Reenter {
	fn tokens_changed(&self, doc: &Document, _edit: &TokenEdit) {
		let attempt = doc.insert_tokens(0, vec![Token::new("again")]).map(|_| ());
		assert!(!doc.is_empty());
		*self.result.lock() = Some(attempt);
	}
}

/// Invariant: structural edits issued while notifications are delivered MUST fail.
#[cfg_attr(test, test)]
pub(crate) fn test_reentrant_edit_rejected() {
	let doc = doc("a b");
	let listener = Arc::new(Reenter {
		result: Mutex::new(None),
	});
	doc.subscribe_tokens(listener.clone());

	doc.insert_tokens(1, vec![Token::new("x")]).unwrap();
	assert_eq!(*listener.result.lock(), Some(Err(OverlayError::ReentrantEdit)));
	assert_eq!(doc.len(), 3);

	// Once delivery is over, edits go through again.
	doc.remove_tokens(0, 1).unwrap();
	assert_eq!(doc.len(), 2);
}
