//! Result intake: the single entry point for boundary completions.
//!
//! Completions may arrive on any thread. [`IntakeHandle`] only enqueues them on
//! the owner's inbox; matching and staging happen later on the owner's home
//! sequence, inside [`Owner::pump`](crate::Owner::pump).

use tokio::sync::mpsc;

use crate::Error;
use crate::gate::{DeliveryGate, StagedResult};
use crate::id::CorrelationId;
use crate::outcome::{Outcome, Payload, StatusCode};
use crate::pending::{PendingRequest, PendingRequestTable};
use crate::registry::SurvivableTag;

/// One boundary completion, as posted to an owner's inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
	pub id: CorrelationId,
	pub outcome: Outcome,
}

/// Cloneable, thread-safe sender into one owner's inbox.
#[derive(Debug, Clone)]
pub struct IntakeHandle {
	owner: SurvivableTag,
	tx: mpsc::UnboundedSender<Completion>,
}

impl IntakeHandle {
	/// Reports the result of the operation tagged `id`.
	///
	/// Returns false if the owner no longer exists; the completion is dropped.
	pub fn complete(&self, id: CorrelationId, status: StatusCode, payload: impl Into<Payload>) -> bool {
		self.post(Completion {
			id,
			outcome: Outcome::new(status, payload),
		})
	}

	pub(crate) fn post(&self, completion: Completion) -> bool {
		let id = completion.id;
		if self.tx.send(completion).is_err() {
			tracing::debug!(owner = %self.owner, %id, "broker.intake.owner_gone");
			return false;
		}
		tracing::trace!(owner = %self.owner, %id, "broker.intake.posted");
		true
	}
}

/// Receiving side of an owner's inbox.
#[derive(Debug)]
pub(crate) struct Inbox {
	rx: mpsc::UnboundedReceiver<Completion>,
}

impl Inbox {
	/// Takes everything posted so far without waiting.
	pub fn drain(&mut self) -> Vec<Completion> {
		let mut out = Vec::new();
		while let Ok(completion) = self.rx.try_recv() {
			out.push(completion);
		}
		out
	}
}

pub(crate) fn channel(owner: SurvivableTag) -> (IntakeHandle, Inbox) {
	let (tx, rx) = mpsc::unbounded_channel();
	(IntakeHandle { owner, tx }, Inbox { rx })
}

/// What happened to one completion.
#[derive(Debug)]
pub(crate) enum Accepted {
	/// Matched and staged for the next flush.
	Staged { id: CorrelationId, wants_component: bool },
	/// No pending request; absorbed.
	Ignored(Error),
}

/// Matches a completion against the table and stages it. Never resolves.
pub(crate) fn accept(table: &mut PendingRequestTable, gate: &mut DeliveryGate, completion: Completion) -> Accepted {
	let Some(pending) = table.match_and_remove(completion.id) else {
		return Accepted::Ignored(table.classify_miss(completion.id));
	};
	let PendingRequest {
		id,
		promise,
		wants_component,
		cancel_guard,
	} = pending;
	drop(cancel_guard);
	gate.stage(StagedResult {
		id,
		outcome: completion.outcome,
		promise,
	});
	Accepted::Staged { id, wants_component }
}
