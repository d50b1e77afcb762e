//! Contract with the runtime that actually runs boundary operations.

use crate::id::CorrelationId;
use crate::intake::IntakeHandle;
use crate::outcome::Payload;

/// Caller description of the operation to launch. Opaque to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
	/// Operation name understood by the boundary.
	pub action: String,
	pub payload: Payload,
}

impl LaunchRequest {
	pub fn new(action: impl Into<String>, payload: impl Into<Payload>) -> Self {
		Self {
			action: action.into(),
			payload: payload.into(),
		}
	}
}

/// Everything the boundary needs to run one operation and report back.
#[derive(Debug)]
pub struct LaunchContext {
	/// Id to echo back through [`IntakeHandle::complete`], and to embed in the
	/// creation parameters of any container the operation creates.
	pub id: CorrelationId,
	pub request: LaunchRequest,
	/// Where the single completion for `id` must be delivered.
	pub intake: IntakeHandle,
}

/// Failure to start a boundary operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
	/// The boundary refused the request.
	#[error("launch rejected: {0}")]
	Rejected(String),
	/// The container that would run the operation is gone.
	#[error("no live container to launch from")]
	Unavailable,
}

/// The runtime side of the broker.
///
/// Implementations must deliver exactly one completion per accepted launch
/// through the [`IntakeHandle`] they were given, from any thread.
pub trait Boundary: Send + Sync + 'static {
	/// Starts the operation tagged with `launch.id`.
	fn launch(&self, launch: LaunchContext) -> Result<(), BoundaryError>;

	/// Best-effort termination of a running operation. Unknown or finished
	/// ids must be ignored.
	fn terminate(&self, id: CorrelationId);
}
