//! Broker error types.

use std::path::PathBuf;

use crate::id::CorrelationId;
use crate::registry::{ScopeId, SurvivableTag};

/// Result alias for broker operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised inside the broker.
///
/// Correlation misses are absorbed and only ever logged; callers observe
/// request failures through the status code of the delivered outcome.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A result arrived for an id no pending table knows about.
	#[error("no pending request for {0}")]
	UnknownCorrelation(CorrelationId),
	/// A second result arrived for an id that was already matched.
	#[error("{0} was already settled")]
	DuplicateCompletion(CorrelationId),
	/// The observer registration count was asked to drop below zero.
	#[error("observer registration count would drop below zero")]
	RegistrationImbalance,
	/// The owner was retired and accepts no new requests.
	#[error("owner `{0}` has been retired")]
	OwnerRetired(SurvivableTag),
	/// The session scope ended; nothing more can be retained in it.
	#[error("session scope {0} has ended")]
	SessionEnded(ScopeId),
	/// The tag is already bound to a component of a different type.
	#[error("tag `{0}` already holds a component of another type")]
	TagTypeMismatch(SurvivableTag),
	/// Reading a config file failed.
	#[error("failed to read {path}: {source}")]
	Io {
		/// File that could not be read.
		path: PathBuf,
		/// Underlying IO error.
		#[source]
		source: std::io::Error,
	},
	/// A config document failed to parse.
	#[error("invalid broker config: {0}")]
	Config(#[from] toml::de::Error),
}
