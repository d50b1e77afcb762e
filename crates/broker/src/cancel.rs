//! Cancellation bridge: turns a fired token into a `CANCELLED` completion.

use std::fmt;
use std::sync::Arc;

use handoff_worker::TaskClass;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::boundary::Boundary;
use crate::id::CorrelationId;
use crate::intake::{Completion, IntakeHandle};
use crate::observer::ObserverLifecycleManager;
use crate::outcome::Outcome;

/// Keeps a cancellation watcher alive. Dropping it stops the watcher, which
/// happens as soon as the request settles.
#[derive(Debug)]
pub struct CancelGuard {
	_settled: DropGuard,
}

/// Binds external cancellation tokens to in-flight requests.
#[derive(Clone)]
pub struct CancellationBridge {
	boundary: Arc<dyn Boundary>,
	observers: ObserverLifecycleManager,
}

impl fmt::Debug for CancellationBridge {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CancellationBridge").finish_non_exhaustive()
	}
}

impl CancellationBridge {
	pub fn new(boundary: Arc<dyn Boundary>, observers: ObserverLifecycleManager) -> Self {
		Self { boundary, observers }
	}

	/// Watches `token` on behalf of request `id`.
	///
	/// When the token fires first, the boundary is asked to terminate the
	/// operation and a `CANCELLED` completion is posted through `intake`, the
	/// same path a boundary result takes. Whichever of the two reaches the
	/// owner first wins; the other is discarded as already settled.
	pub fn bind(&self, id: CorrelationId, token: CancellationToken, intake: IntakeHandle) -> CancelGuard {
		let settled = CancellationToken::new();
		let guard = CancelGuard {
			_settled: settled.clone().drop_guard(),
		};
		let bridge = self.clone();
		tracing::trace!(%id, fallback_runtime = !handoff_worker::in_runtime(), "broker.cancel.bind");
		handoff_worker::spawn(TaskClass::Watcher, async move {
			tokio::select! {
				biased;
				() = settled.cancelled() => {
					tracing::trace!(%id, "broker.cancel.watch_ended");
				}
				() = token.cancelled() => bridge.fire(id, &intake),
			}
		});
		guard
	}

	fn fire(&self, id: CorrelationId, intake: &IntakeHandle) {
		tracing::debug!(%id, "broker.cancel.fired");
		self.boundary.terminate(id);
		intake.post(Completion {
			id,
			outcome: Outcome::cancelled(),
		});
		self.observers.release(id);
	}
}
