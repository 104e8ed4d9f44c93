//! Token buffer primitives: tokens, spans, and mutation events.
//!
//! This crate is the editable substrate the annotation overlay sits on. It
//! knows nothing about annotations; it only reports what changed.

/// Linear token buffer with mutation events.
pub mod buffer;
/// Buffer error types.
pub mod error;
/// Token and character mutation events.
pub mod mutation;
/// External mutation observers.
pub mod observer;
/// Token interval type and index aliases.
pub mod span;
/// The token value type and a whitespace tokenizer.
pub mod token;

pub use buffer::TokenBuffer;
pub use error::{BufferError, Result};
pub use mutation::{CharEdit, MutationKind, TokenMutation};
pub use observer::{MutationObserver, ObserverId};
pub use span::{Span, TokenIdx, TokenLen};
pub use token::{Token, tokenize_whitespace};
