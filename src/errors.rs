//! Error types for configuration and data integrity failures.

use thiserror::Error;

/// Raised while building gene kinds, representations and policies, before any generation runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
	#[error("{section} is missing required parameters: {}", .keys.join(", "))]
	MissingKeys { section: String, keys: Vec<String> },

	#[error("invalid parameter `{key}`: {reason}")]
	Invalid { key: String, reason: String },

	#[error("unknown gene kind `{0}` (expected circle, polygon, letter or mesh)")]
	UnknownKind(String),

	#[error("unknown evolution policy `{0}` (expected tournament or halving)")]
	UnknownPolicy(String),

	#[error("could not parse configuration: {0}")]
	Parse(String),
}

impl ConfigError {
	pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
		ConfigError::Invalid {
			key: key.into(),
			reason: reason.into(),
		}
	}
}

/// A checkpoint or genome that cannot be trusted. Never recovered from locally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
	#[error("gene #{index} is corrupt: {reason}")]
	InvalidGene { index: usize, reason: String },

	#[error("genome is corrupt: {0}")]
	InvalidGenome(String),

	#[error("target is {actual:?} but the genome was evolved at {expected:?}")]
	DimensionMismatch {
		expected: (u32, u32),
		actual: (u32, u32),
	},

	#[error("cannot allocate a {width}x{height} canvas")]
	Canvas { width: u32, height: u32 },
}
