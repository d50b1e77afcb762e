//! Status codes and the outcome delivered to callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque result payload carried across the boundary.
pub type Payload = serde_json::Value;

/// Integer status reported alongside every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i32);

impl StatusCode {
	/// The operation finished successfully.
	pub const OK: Self = Self(-1);
	/// The operation was cancelled, by the boundary or by a cancellation token.
	pub const CANCELLED: Self = Self(0);
	/// The boundary could not run the operation.
	pub const FAILED: Self = Self(-2);
	/// The owner was retired before the result could be delivered.
	pub const ABANDONED: Self = Self(-3);
	/// First code available for caller-defined results.
	pub const FIRST_USER: Self = Self(1);

	/// Returns the well-known name for reserved codes.
	#[must_use]
	pub const fn name(self) -> Option<&'static str> {
		match self {
			Self::OK => Some("ok"),
			Self::CANCELLED => Some("cancelled"),
			Self::FAILED => Some("failed"),
			Self::ABANDONED => Some("abandoned"),
			_ => None,
		}
	}

	#[must_use]
	pub const fn is_ok(self) -> bool {
		self.0 == Self::OK.0
	}
}

impl fmt::Display for StatusCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.name() {
			Some(name) => f.write_str(name),
			None => write!(f, "{}", self.0),
		}
	}
}

/// Status plus payload, as handed to the caller's continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
	pub status: StatusCode,
	pub payload: Payload,
}

impl Outcome {
	pub fn new(status: StatusCode, payload: impl Into<Payload>) -> Self {
		Self {
			status,
			payload: payload.into(),
		}
	}

	pub fn ok(payload: impl Into<Payload>) -> Self {
		Self::new(StatusCode::OK, payload)
	}

	pub fn cancelled() -> Self {
		Self::new(StatusCode::CANCELLED, Payload::Null)
	}

	/// Failure outcome carrying a human readable reason as its payload.
	pub fn failed(reason: impl Into<String>) -> Self {
		Self::new(StatusCode::FAILED, Payload::String(reason.into()))
	}

	pub fn abandoned() -> Self {
		Self::new(StatusCode::ABANDONED, Payload::Null)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reserved_codes_display_by_name() {
		assert_eq!(StatusCode::OK.to_string(), "ok");
		assert_eq!(StatusCode::CANCELLED.to_string(), "cancelled");
		assert_eq!(StatusCode(17).to_string(), "17");
		assert!(StatusCode::FIRST_USER.name().is_none());
	}

	#[test]
	fn failed_outcome_keeps_reason() {
		let outcome = Outcome::failed("no handler");
		assert_eq!(outcome.status, StatusCode::FAILED);
		assert_eq!(outcome.payload, Payload::from("no handler"));
	}
}
