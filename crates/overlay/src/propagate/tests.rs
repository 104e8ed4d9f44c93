use tessel_primitives::{Span, Token, TokenMutation};

use super::*;

fn toks(values: &[&str]) -> Vec<Token> {
	values.iter().copied().map(Token::new).collect()
}

fn insert(index: usize, n: usize) -> TokenMutation {
	TokenMutation::insert(index, toks(&vec!["i"; n]))
}

fn remove(index: usize, n: usize) -> TokenMutation {
	TokenMutation::remove(index, toks(&vec!["r"; n]))
}

fn replace(index: usize, removed: usize, inserted: usize) -> TokenMutation {
	TokenMutation {
		index,
		inserted: toks(&vec!["i"; inserted]),
		removed: toks(&vec!["r"; removed]),
	}
}

fn deltas(span: Span, event: &TokenMutation, owns: bool) -> Option<(isize, isize)> {
	compute_change(span, event, || owns).map(|c| (c.start_delta, c.size_delta))
}

fn owns_must_not_be_asked() -> bool {
	panic!("boundary ownership asked for a non-boundary edit")
}

const R: Span = Span { start: 2, size: 3 };

#[test]
fn test_insert_before_shifts() {
	assert_eq!(deltas(R, &insert(0, 2), false), Some((2, 0)));
}

#[test]
fn test_insert_after_is_noop() {
	assert_eq!(deltas(R, &insert(6, 2), false), None);
}

#[test]
fn test_insert_inside_always_grows() {
	let change = compute_change(R, &insert(3, 2), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, 2));
	let rel = change.relative.unwrap();
	assert_eq!(rel.offset, 1);
	assert_eq!(rel.inserted.len(), 2);
	assert!(rel.removed.is_empty());
}

#[test]
fn test_insert_at_start_depends_on_owner() {
	assert_eq!(deltas(R, &insert(2, 1), true), Some((0, 1)));
	assert_eq!(deltas(R, &insert(2, 1), false), Some((1, 0)));
}

#[test]
fn test_insert_at_end_depends_on_owner() {
	let owned = compute_change(R, &insert(5, 1), || true).unwrap();
	assert_eq!((owned.start_delta, owned.size_delta), (0, 1));
	assert_eq!(owned.relative.unwrap().offset, 3);
	assert_eq!(deltas(R, &insert(5, 1), false), None);
}

#[test]
fn test_remove_before_shifts_back() {
	assert_eq!(deltas(R, &remove(0, 2), false), Some((-2, 0)));
}

#[test]
fn test_remove_across_start_shrinks_front() {
	let event = TokenMutation::remove(1, toks(&["before", "inside"]));
	let change = compute_change(R, &event, owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (-1, -1));
	let rel = change.relative.unwrap();
	assert_eq!(rel.offset, 0);
	assert_eq!(rel.removed, toks(&["inside"]));
	assert!(rel.inserted.is_empty());
}

#[test]
fn test_remove_at_start() {
	let change = compute_change(R, &remove(2, 1), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, -1));
	let rel = change.relative.unwrap();
	assert_eq!((rel.offset, rel.removed.len()), (0, 1));

	// Nothing survives, so there is nobody left to tell.
	let collapsed = compute_change(R, &remove(2, 5), owns_must_not_be_asked).unwrap();
	assert_eq!((collapsed.start_delta, collapsed.size_delta), (0, -3));
	assert!(collapsed.relative.is_none());
}

#[test]
fn test_remove_inside_reports_relative_removal() {
	let change = compute_change(R, &remove(3, 4), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, -2));
	let rel = change.relative.unwrap();
	assert_eq!(rel.offset, 1);
	assert_eq!(rel.removed.len(), 2);
}

#[test]
fn test_remove_at_end_is_ignored() {
	assert_eq!(deltas(R, &remove(5, 1), false), None);
}

#[test]
fn test_remove_covering_kills_record() {
	assert_eq!(deltas(R, &remove(1, 5), false), Some((-1, -3)));
}

#[test]
fn test_replace_ending_at_start_shifts() {
	assert_eq!(deltas(R, &replace(0, 2, 3), false), Some((1, 0)));
}

#[test]
fn test_replace_starting_at_end_is_ignored() {
	assert_eq!(deltas(R, &replace(5, 1, 4), false), None);
}

#[test]
fn test_replace_inside() {
	let change = compute_change(R, &replace(2, 3, 1), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, -2));
	let rel = change.relative.unwrap();
	assert_eq!((rel.offset, rel.removed.len(), rel.inserted.len()), (0, 3, 1));
}

#[test]
fn test_replace_covering_truncates() {
	assert_eq!(deltas(R, &replace(1, 5, 2), false), Some((-1, -3)));
	assert_eq!(deltas(R, &replace(2, 4, 9), false), Some((0, -3)));
}

#[test]
fn test_replace_cut_at_start() {
	// [0, 3) -> 1 token; record [2, 5) keeps [3, 5), now at [1, 3).
	let change = compute_change(R, &replace(0, 3, 1), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (-1, -1));
	let rel = change.relative.unwrap();
	assert_eq!((rel.offset, rel.removed.len(), rel.inserted.len()), (0, 1, 0));
}

#[test]
fn test_replace_changed_over_start() {
	// [1, 3) -> 4 tokens; one lands before the old start, three inside.
	let change = compute_change(R, &replace(1, 2, 4), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, 2));
	let rel = change.relative.unwrap();
	assert_eq!((rel.offset, rel.removed.len(), rel.inserted.len()), (0, 1, 3));
}

#[test]
fn test_replace_inserted_at_end() {
	// [4, 7) -> 2 tokens; the record loses its last token.
	let change = compute_change(R, &replace(4, 3, 2), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, -1));
	let rel = change.relative.unwrap();
	assert_eq!((rel.offset, rel.removed.len(), rel.inserted.len()), (2, 1, 0));
}

#[test]
fn test_replace_changed_over_end() {
	// [3, 6) -> 4 tokens; one removed token lies after the end, so three land inside.
	let change = compute_change(R, &replace(3, 3, 4), owns_must_not_be_asked).unwrap();
	assert_eq!((change.start_delta, change.size_delta), (0, 1));
	let rel = change.relative.unwrap();
	assert_eq!((rel.offset, rel.removed.len(), rel.inserted.len()), (1, 2, 3));
}

#[test]
fn test_identity_is_noop() {
	assert_eq!(deltas(R, &TokenMutation::insert(3, Vec::new()), true), None);
}

#[test]
fn test_token_edit_from_mutation() {
	let event = replace(4, 1, 2);
	let edit = TokenEdit::from(&event);
	assert_eq!(edit.offset, 4);
	assert_eq!(edit.removed.len(), 1);
	assert_eq!(edit.inserted.len(), 2);
}
