//! Overlay configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::name::is_qualified_name;
use crate::nesting::NestingOrder;

/// Errors raised while loading an [`OverlayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The TOML source did not parse.
	#[error("failed to parse overlay config: {0}")]
	Toml(#[from] toml::de::Error),

	/// The root type or a nesting entry is not a valid type name.
	#[error("invalid annotation type in config: {0:?}")]
	InvalidType(String),
}

/// Settings for a [`Document`](crate::Document).
///
/// ```toml
/// root_type = "text"
/// nesting_order = ["div", "s", "np"]
/// child_cache_width = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayConfig {
	/// Type name of the document root. Always outermost.
	#[serde(default = "default_root_type")]
	pub root_type: String,
	/// Annotation types from outermost to innermost.
	#[serde(default)]
	pub nesting_order: Vec<String>,
	/// How many child types each annotation memoizes before its cache is cleared.
	#[serde(default = "default_child_cache_width")]
	pub child_cache_width: usize,
}

fn default_root_type() -> String {
	"document".to_string()
}

fn default_child_cache_width() -> usize {
	16
}

impl Default for OverlayConfig {
	fn default() -> Self {
		Self {
			root_type: default_root_type(),
			nesting_order: Vec::new(),
			child_cache_width: default_child_cache_width(),
		}
	}
}

impl OverlayConfig {
	/// Parses and validates a TOML config.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks that every configured type name is a valid qualified name.
	pub fn validate(&self) -> Result<(), ConfigError> {
		std::iter::once(&self.root_type)
			.chain(&self.nesting_order)
			.find(|kind| !is_qualified_name(kind))
			.map_or(Ok(()), |kind| Err(ConfigError::InvalidType(kind.clone())))
	}

	/// The nesting order this config describes.
	pub fn nesting(&self) -> NestingOrder {
		NestingOrder::new(self.root_type.clone(), self.nesting_order.iter().cloned())
	}
}
