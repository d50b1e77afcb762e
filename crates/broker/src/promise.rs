//! Single-resolution promise handed out for every request.
//!
//! [`Promise`] is the broker-side half. It moves from `Pending` to `Resolved`
//! exactly once; later resolutions are refused. [`Continuation`] is the
//! caller-side future. A promise dropped while still pending resolves its
//! continuation with [`Outcome::abandoned`] so no caller waits forever.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::sync::oneshot;

use crate::id::CorrelationId;
use crate::outcome::Outcome;

/// Creates a linked promise/continuation pair for `id`.
pub(crate) fn promise(id: CorrelationId) -> (Promise, Continuation) {
	let (tx, rx) = oneshot::channel();
	(
		Promise {
			id,
			state: PromiseState::Pending(tx),
		},
		Continuation { id, rx, taken: false },
	)
}

#[derive(Debug)]
enum PromiseState {
	Pending(oneshot::Sender<Outcome>),
	Resolved,
}

/// Broker-side handle that resolves one continuation.
#[derive(Debug)]
pub struct Promise {
	id: CorrelationId,
	state: PromiseState,
}

impl Promise {
	pub fn id(&self) -> CorrelationId {
		self.id
	}

	pub fn is_resolved(&self) -> bool {
		matches!(self.state, PromiseState::Resolved)
	}

	/// Resolves the continuation. Returns false if this promise was already
	/// resolved, in which case `outcome` is discarded.
	pub fn resolve(&mut self, outcome: Outcome) -> bool {
		match std::mem::replace(&mut self.state, PromiseState::Resolved) {
			PromiseState::Pending(tx) => {
				if tx.send(outcome).is_err() {
					tracing::trace!(id = %self.id, "broker.promise.receiver_dropped");
				}
				true
			}
			PromiseState::Resolved => false,
		}
	}
}

impl Drop for Promise {
	fn drop(&mut self) {
		if !self.is_resolved() {
			tracing::debug!(id = %self.id, "broker.promise.dropped_pending");
			self.resolve(Outcome::abandoned());
		}
	}
}

/// Caller-side handle; resolves once with the request's outcome.
#[derive(Debug)]
pub struct Continuation {
	id: CorrelationId,
	rx: oneshot::Receiver<Outcome>,
	taken: bool,
}

impl Continuation {
	pub fn id(&self) -> CorrelationId {
		self.id
	}

	/// Takes the outcome if it has been delivered. Yields `Some` at most once.
	pub fn try_outcome(&mut self) -> Option<Outcome> {
		if self.taken {
			return None;
		}
		let outcome = match self.rx.try_recv() {
			Ok(outcome) => outcome,
			Err(oneshot::error::TryRecvError::Empty) => return None,
			Err(oneshot::error::TryRecvError::Closed) => Outcome::abandoned(),
		};
		self.taken = true;
		Some(outcome)
	}
}

impl Future for Continuation {
	type Output = Outcome;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		let res = ready!(Pin::new(&mut this.rx).poll(cx));
		this.taken = true;
		Poll::Ready(res.unwrap_or_else(|_| Outcome::abandoned()))
	}
}
