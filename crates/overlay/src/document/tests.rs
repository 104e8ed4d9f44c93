use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tessel_primitives::{MutationObserver, Span};

use super::*;
use crate::listener::{AnnotationListener, CharListener, TokenListener};

#[derive(Default)]
struct Recorder {
	events: Mutex<Vec<String>>,
}

impl Recorder {
	fn push(&self, event: String) {
		self.events.lock().push(event);
	}

	fn take(&self) -> Vec<String> {
		std::mem::take(&mut *self.events.lock())
	}
}

impl AnnotationListener for Recorder {
	fn added(&self, _doc: &Document, annotation: &Annotation) {
		self.push(format!("added {} {}", annotation.kind(), annotation.span()));
	}

	fn removed(&self, _doc: &Document, annotation: &Annotation) {
		self.push(format!("removed {} {}", annotation.kind(), annotation.span()));
	}

	fn type_changed(&self, _doc: &Document, annotation: &Annotation, old: &str) {
		self.push(format!("type {old} -> {}", annotation.kind()));
	}

	fn attribute_changed(&self, _doc: &Document, annotation: &Annotation, name: &str, old: Option<&AttrValue>) {
		let new = annotation.attribute(name).map(ToString::to_string);
		self.push(format!("attr {name} {old:?} -> {new:?}"));
	}
}

impl TokenListener for Recorder {
	fn tokens_changed(&self, _doc: &Document, edit: &TokenEdit) {
		self.push(format!(
			"tokens @{} -{} +{}",
			edit.offset,
			edit.removed.len(),
			edit.inserted.len()
		));
	}
}

impl CharListener for Recorder {
	fn chars_changed(&self, _doc: &Document, edit: &CharEdit) {
		self.push(format!("chars {}:{} +{:?} -{:?}", edit.token, edit.offset, edit.inserted, edit.removed));
	}
}

fn the_cat_sat() -> (Document, Annotation) {
	let doc = Document::new(vec![Token::new("The"), Token::new("cat"), Token::new("sat")]);
	let np = doc.add_annotation("np", 0, 2).unwrap();
	(doc, np)
}

fn span(doc: &Document, annotation: &Annotation) -> Span {
	doc.annotation(annotation.key()).unwrap().span()
}

#[test]
fn test_insert_inside_grows_annotation() {
	let (doc, np) = the_cat_sat();
	doc.insert_tokens(1, vec![Token::new("big")]).unwrap();
	assert_eq!(span(&doc, &np), Span::new(0, 3));
	assert_eq!(doc.text(), "The big cat sat ");
	assert_eq!(doc.attribute(np.key(), "value").unwrap(), Some(AttrValue::from("The big cat")));
}

#[test]
fn test_remove_at_start_shrinks_annotation() {
	let (doc, np) = the_cat_sat();
	doc.remove_tokens(0, 1).unwrap();
	assert_eq!(span(&doc, &np), Span::new(0, 1));
}

#[test]
fn test_overlap_excludes_touching_and_spanning_includes_inner_window() {
	let doc = Document::from_text("a b c d e f g");
	let r = doc.add_annotation("np", 2, 3).unwrap();
	assert!(doc.overlapping(None, 5, 7).is_empty());
	assert_eq!(doc.spanning(None, 3, 4), [r.clone()]);
	assert_eq!(doc.overlapping(Some("np"), 4, 6), [r]);
	assert!(doc.spanning(Some("vp"), 3, 4).is_empty());
}

#[test]
fn test_add_rejects_invalid_spans_and_types() {
	let doc = Document::from_text("a b c");
	assert!(matches!(doc.add_annotation("np", 2, 2), Err(OverlayError::InvalidSpan { .. })));
	assert!(matches!(doc.add_annotation("np", 0, 0), Err(OverlayError::InvalidSpan { .. })));
	assert_eq!(doc.add_annotation("n p", 0, 1), Err(OverlayError::InvalidType("n p".into())));
	assert_eq!(doc.annotation_count(), 0);
}

#[test]
fn test_listeners_hear_structural_events() {
	let (doc, np) = the_cat_sat();
	let recorder = Arc::new(Recorder::default());
	doc.subscribe_annotations(recorder.clone());

	doc.add_annotation("vp", 2, 1).unwrap();
	doc.change_type(np.key(), "dp").unwrap();
	doc.change_type(np.key(), "dp").unwrap();
	doc.set_attribute(np.key(), "head", "cat").unwrap();
	doc.set_attribute(np.key(), "size", 9).unwrap();
	doc.remove_attribute(np.key(), "head").unwrap();
	doc.remove_annotation(np.key()).unwrap();

	assert_eq!(
		recorder.take(),
		[
			"added vp [2, 3)",
			"type np -> dp",
			"attr head None -> Some(\"cat\")",
			"attr head Some(Str(\"cat\")) -> None",
			"removed dp [0, 2)",
		]
	);
}

#[test]
fn test_collapsed_annotation_is_reported_removed() {
	let (doc, np) = the_cat_sat();
	let recorder = Arc::new(Recorder::default());
	doc.subscribe_annotations(recorder.clone());
	doc.subscribe_tokens(recorder.clone());

	doc.remove_tokens(0, 2).unwrap();
	assert_eq!(recorder.take(), ["tokens @0 -2 +0", "removed np [0, 0)"]);
	assert_eq!(doc.annotation(np.key()), Err(OverlayError::Gone));
	assert!(doc.annotations().is_empty());
}

#[test]
fn test_unsubscribe_and_weak_listeners() {
	let doc = Document::from_text("a b");
	let strong = Arc::new(Recorder::default());
	let id = doc.subscribe_tokens(strong.clone());

	let weak: Arc<dyn TokenListener> = Arc::new(Recorder::default());
	doc.subscribe_tokens_weak(Arc::downgrade(&weak));
	drop(weak);

	doc.insert_tokens(0, vec![Token::new("x")]).unwrap();
	assert_eq!(strong.take().len(), 1);
	assert_eq!(doc.with(|inner| inner.listeners.len()), 1);

	assert!(doc.unsubscribe(id));
	assert!(!doc.unsubscribe(id));
	doc.insert_tokens(0, vec![Token::new("y")]).unwrap();
	assert!(strong.take().is_empty());
}

struct Panics;

impl TokenListener for Panics {
	fn tokens_changed(&self, _doc: &Document, _edit: &TokenEdit) {
		panic!("listener failure");
	}
}

#[test]
fn test_panicking_listener_does_not_block_others() {
	let doc = Document::from_text("a b");
	let recorder = Arc::new(Recorder::default());
	doc.subscribe_tokens(Arc::new(Panics));
	doc.subscribe_tokens(recorder.clone());

	doc.insert_tokens(2, vec![Token::new("c")]).unwrap();
	assert_eq!(recorder.take(), ["tokens @2 -0 +1"]);

	// The delivery counter unwound; edits still go through.
	doc.remove_tokens(0, 1).unwrap();
	assert_eq!(recorder.take(), ["tokens @0 -1 +0"]);
}

#[test]
fn test_char_edits_reach_root_and_covering_views() {
	let doc = Document::from_text("the cat sat");
	let np = doc.add_annotation("np", 1, 2).unwrap();
	let root = Arc::new(Recorder::default());
	doc.subscribe_chars(root.clone());

	let view = doc.view_mut(np.key()).unwrap();
	let local = Arc::new(Recorder::default());
	view.subscribe_chars(local.clone());

	doc.insert_chars(2, 1, "xx").unwrap();
	doc.remove_chars(0, 0, 1).unwrap();

	assert_eq!(doc.token_at(2).unwrap().value(), "sxxat");
	assert_eq!(root.take(), ["chars 2:1 +\"xx\" -\"\"", "chars 0:0 +\"\" -\"t\""]);
	assert_eq!(local.take(), ["chars 1:1 +\"xx\" -\"\""]);
	assert_eq!(span(&doc, &np), Span::new(1, 2));
}

#[test]
fn test_children_see_edits_and_new_records() {
	let doc = Document::from_text("a b c d e f");
	doc.set_nesting_order(["s", "np"]).unwrap();
	let s = doc.add_annotation("s", 0, 6).unwrap();
	let first = doc.add_annotation("np", 0, 2).unwrap();
	assert_eq!(doc.children(s.key(), "np").unwrap(), [first.clone()]);

	let second = doc.add_annotation("np", 3, 2).unwrap();
	let children = doc.children(s.key(), "np").unwrap();
	assert_eq!(children.len(), 2);
	assert_eq!(children[1].key(), second.key());

	doc.insert_tokens(0, vec![Token::new("z")]).unwrap();
	let children = doc.children(s.key(), "np").unwrap();
	assert_eq!(children[0].span(), Span::new(1, 2));
	assert_eq!(children[1].span(), Span::new(4, 2));
}

#[test]
fn test_id_rewrite_respects_length() {
	let doc = Document::from_text("a b");
	let np = doc.add_annotation("np", 0, 1).unwrap();
	assert_eq!(np.id().len(), 36);

	doc.set_attribute(np.key(), "id", "short").unwrap();
	assert_eq!(doc.annotation(np.key()).unwrap().id(), np.id());

	let replacement = "x".repeat(36);
	doc.set_attribute(np.key(), "id", replacement.as_str()).unwrap();
	assert_eq!(doc.find_by_id(&replacement).map(|a| a.key()), Some(np.key()));
	assert!(doc.find_by_id(np.id()).is_none());
}

#[test]
fn test_import_restores_attributes() {
	let doc = Document::from_text("a b c");
	let imported = doc
		.import_annotation("np", 1, 2, "np-1", [("head".to_string(), AttrValue::from("c"))])
		.unwrap()
		.unwrap();
	assert_eq!(imported.attribute("head"), Some(&AttrValue::from("c")));
	assert!(matches!(
		doc.import_annotation("np", 2, 2, "np-2", []),
		Err(OverlayError::InvalidSpan { .. })
	));
	assert_eq!(
		doc.import_annotation("np", 0, 1, "np-3", [("bad name".to_string(), AttrValue::from(1))]),
		Err(OverlayError::InvalidAttributeName("bad name".into()))
	);
}

#[test]
fn test_config_drives_nesting() {
	let config = OverlayConfig::from_toml_str(r#"nesting_order = ["np", "s"]"#).unwrap();
	let doc = Document::with_config(tokenize_whitespace("a b"), &config);
	let s = doc.add_annotation("s", 0, 2).unwrap();
	let np = doc.add_annotation("np", 0, 2).unwrap();
	let keys: Vec<_> = doc.annotations().iter().map(Annotation::key).collect();
	assert_eq!(keys, [np.key(), s.key()]);
	assert_eq!(doc.nesting_order().root_type(), "document");
	assert_eq!(doc.types(), ["np", "s"]);
}

#[derive(Default)]
struct CountingObserver(Mutex<usize>);

impl MutationObserver for CountingObserver {
	fn tokens_changed(&self, _event: &TokenMutation) {
		*self.0.lock() += 1;
	}
}

#[test]
fn test_buffer_observers_see_raw_mutations() {
	let doc = Document::from_text("a b");
	let observer = Arc::new(CountingObserver::default());
	let id = doc.observe_buffer(observer.clone());
	doc.insert_tokens(0, vec![Token::new("x")]).unwrap();
	doc.replace_tokens(0, 0, Vec::new()).unwrap();
	assert_eq!(*observer.0.lock(), 1);
	assert!(doc.unobserve_buffer(id));
}

#[test]
fn test_out_of_bounds_edits_change_nothing() {
	let (doc, np) = the_cat_sat();
	assert!(matches!(doc.remove_tokens(2, 2), Err(OverlayError::Buffer(_))));
	assert!(matches!(doc.insert_tokens(4, vec![Token::new("x")]), Err(OverlayError::Buffer(_))));
	assert_eq!(doc.len(), 3);
	assert_eq!(span(&doc, &np), Span::new(0, 2));
}

struct FailingObserver;

impl MutationObserver for FailingObserver {
	fn tokens_changed(&self, _event: &TokenMutation) {
		panic!("observer failure");
	}
}

#[test]
fn test_failing_buffer_observer_still_moves_annotations() {
	let doc = Document::new(vec![Token::new("The"), Token::new("cat"), Token::new("sat")]);
	let det = doc.add_annotation("det", 0, 1).unwrap();
	let np = doc.add_annotation("np", 1, 2).unwrap();
	doc.observe_buffer(Arc::new(FailingObserver));

	doc.remove_tokens(1, 2).unwrap();
	assert_eq!(doc.len(), 1);
	assert_eq!(doc.annotation(np.key()), Err(OverlayError::Gone));
	assert_eq!(span(&doc, &det), Span::new(0, 1));

	doc.insert_tokens(1, vec![Token::new("ran")]).unwrap();
	assert_eq!(doc.len(), 2);
	assert!(doc.annotations().iter().all(|a| a.span().end() <= doc.len()));
}

struct CrossThread {
	fired: std::sync::atomic::AtomicBool,
	result: Mutex<Option<Result<()>>>,
}

impl TokenListener for CrossThread {
	fn tokens_changed(&self, doc: &Document, _edit: &TokenEdit) {
		if self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
			return;
		}
		let attempt = std::thread::scope(|scope| {
			scope
				.spawn(|| doc.insert_tokens(0, vec![Token::new("other")]).map(|_| ()))
				.join()
				.unwrap()
		});
		*self.result.lock() = Some(attempt);
	}
}

#[test]
fn test_edits_from_other_threads_are_not_reentrant() {
	let doc = Document::from_text("a b");
	let listener = Arc::new(CrossThread {
		fired: Default::default(),
		result: Mutex::new(None),
	});
	doc.subscribe_tokens(listener.clone());

	doc.insert_tokens(2, vec![Token::new("c")]).unwrap();
	assert_eq!(*listener.result.lock(), Some(Ok(())));
	let values: Vec<_> = doc.tokens().iter().map(|t| t.value().to_string()).collect();
	assert_eq!(values, ["other", "a", "b", "c"]);
}

#[test]
fn test_nesting_order_rejects_invalid_types() {
	let doc = Document::from_text("a b");
	doc.set_nesting_order(["s", "np"]).unwrap();
	assert_eq!(
		doc.set_nesting_order(["s", "n p"]),
		Err(OverlayError::InvalidType("n p".into()))
	);
	assert_eq!(doc.nesting_order().order(), ["s", "np"]);
}
