//! Broker configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::id::FIRST_BROKER_ID;
use crate::{Error, Result};

/// Tunables for a [`Broker`](crate::Broker).
///
/// ```toml
/// id_offset = 131072
/// settled_history = 128
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
	/// Lowest correlation id the broker may hand out. Raises the process-wide
	/// allocator's counter when a broker is built; never lowers it.
	#[serde(default = "default_id_offset")]
	pub id_offset: u32,
	/// How many settled ids each owner remembers to tell a duplicate
	/// completion apart from an unknown one in logs.
	#[serde(default = "default_settled_history")]
	pub settled_history: usize,
}

fn default_id_offset() -> u32 {
	FIRST_BROKER_ID
}

fn default_settled_history() -> usize {
	64
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			id_offset: default_id_offset(),
			settled_history: default_settled_history(),
		}
	}
}

impl BrokerConfig {
	/// Parses a TOML document. Missing keys take their defaults.
	pub fn from_toml_str(src: &str) -> Result<Self> {
		Ok(toml::from_str(src)?)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let src = std::fs::read_to_string(path).map_err(|source| Error::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&src)?;
		tracing::debug!(path = %path.display(), ?config, "broker.config.loaded");
		Ok(config)
	}
}
