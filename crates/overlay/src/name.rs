//! Qualified-name validation for annotation types and attribute names.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{OverlayError, Result};

static QNAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(?:[\p{L}_][\w.\-]*:)?[\p{L}_][\w.\-]*$").expect("qualified name pattern is valid")
});

/// Returns true if `name` looks like `prefix:local` or `local`.
pub fn is_qualified_name(name: &str) -> bool {
	QNAME.is_match(name)
}

pub(crate) fn check_type(kind: &str) -> Result<()> {
	if is_qualified_name(kind) {
		Ok(())
	} else {
		Err(OverlayError::InvalidType(kind.to_string()))
	}
}

pub(crate) fn check_attribute(name: &str) -> Result<()> {
	if is_qualified_name(name) {
		Ok(())
	} else {
		Err(OverlayError::InvalidAttributeName(name.to_string()))
	}
}
