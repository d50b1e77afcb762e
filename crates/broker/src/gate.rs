//! Delivery gate: holds matched results until the owner is active.

use std::collections::VecDeque;

use crate::id::CorrelationId;
use crate::outcome::Outcome;
use crate::promise::Promise;

/// Lifecycle phase of an owner as seen by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerPhase {
	/// Results are staged but not delivered.
	Inactive,
	/// The owner is in a safe state; entering this phase flushes.
	Active,
	/// The owner was permanently destroyed.
	Retired,
}

/// A matched outcome waiting for the next flush.
#[derive(Debug)]
pub(crate) struct StagedResult {
	pub(crate) id: CorrelationId,
	pub(crate) outcome: Outcome,
	pub(crate) promise: Promise,
}

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Ids whose continuations were resolved, in delivery order.
	pub delivered: Vec<CorrelationId>,
	/// Results staged while the flush ran; they wait for the next one.
	pub still_staged: usize,
}

/// Snapshot of staged results taken when the owner became active.
#[derive(Debug)]
#[must_use = "a flush batch resolves nothing until delivered"]
pub(crate) struct FlushBatch(VecDeque<StagedResult>);

impl FlushBatch {
	/// Resolves every continuation in FIFO order and returns the ids.
	pub fn deliver(self) -> Vec<CorrelationId> {
		let mut delivered = Vec::with_capacity(self.0.len());
		for mut staged in self.0 {
			if staged.promise.resolve(staged.outcome) {
				delivered.push(staged.id);
			}
		}
		delivered
	}
}

#[derive(Debug)]
pub(crate) struct DeliveryGate {
	phase: OwnerPhase,
	staged: VecDeque<StagedResult>,
}

impl DeliveryGate {
	pub fn new() -> Self {
		Self {
			phase: OwnerPhase::Inactive,
			staged: VecDeque::new(),
		}
	}

	pub fn phase(&self) -> OwnerPhase {
		self.phase
	}

	pub fn staged_len(&self) -> usize {
		self.staged.len()
	}

	pub fn stage(&mut self, result: StagedResult) {
		self.staged.push_back(result);
	}

	/// Moves Inactive -> Active and takes everything staged so far.
	///
	/// Returns `None` when no transition happened (already active, or retired).
	pub fn enter_active(&mut self) -> Option<FlushBatch> {
		if self.phase != OwnerPhase::Inactive {
			return None;
		}
		self.phase = OwnerPhase::Active;
		Some(FlushBatch(std::mem::take(&mut self.staged)))
	}

	pub fn leave_active(&mut self) {
		if self.phase == OwnerPhase::Active {
			self.phase = OwnerPhase::Inactive;
		}
	}

	/// Moves to Retired and hands back whatever was never flushed.
	pub fn retire(&mut self) -> Vec<StagedResult> {
		self.phase = OwnerPhase::Retired;
		self.staged.drain(..).collect()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::promise::{Continuation, promise};

	fn staged(raw: u32, value: i64) -> (StagedResult, Continuation) {
		let id = CorrelationId::from_raw(raw);
		let (promise, cont) = promise(id);
		(
			StagedResult {
				id,
				outcome: Outcome::ok(json!(value)),
				promise,
			},
			cont,
		)
	}

	#[test]
	fn staging_while_inactive_resolves_nothing() {
		let mut gate = DeliveryGate::new();
		let (result, mut cont) = staged(0x1_0000, 1);
		gate.stage(result);
		assert_eq!(gate.staged_len(), 1);
		assert!(cont.try_outcome().is_none());
	}

	#[test]
	fn flush_is_fifo() {
		let mut gate = DeliveryGate::new();
		let (a, mut ca) = staged(0x1_0005, 1);
		let (b, mut cb) = staged(0x1_0001, 2);
		gate.stage(a);
		gate.stage(b);

		let delivered = gate.enter_active().unwrap().deliver();
		assert_eq!(delivered, vec![CorrelationId::from_raw(0x1_0005), CorrelationId::from_raw(0x1_0001)]);
		assert_eq!(ca.try_outcome().unwrap().payload, json!(1));
		assert_eq!(cb.try_outcome().unwrap().payload, json!(2));
	}

	#[test]
	fn staging_after_snapshot_waits_for_next_entry() {
		let mut gate = DeliveryGate::new();
		let (a, _ca) = staged(0x1_0000, 1);
		gate.stage(a);
		let batch = gate.enter_active().unwrap();

		let (late, mut late_cont) = staged(0x1_0001, 2);
		gate.stage(late);
		assert_eq!(batch.deliver().len(), 1);
		assert!(late_cont.try_outcome().is_none());

		// Already active: no transition, no flush.
		assert!(gate.enter_active().is_none());
		gate.leave_active();
		assert_eq!(gate.enter_active().unwrap().deliver(), vec![CorrelationId::from_raw(0x1_0001)]);
		assert!(late_cont.try_outcome().is_some());
	}

	#[test]
	fn retired_gate_never_flushes() {
		let mut gate = DeliveryGate::new();
		let (a, _ca) = staged(0x1_0000, 1);
		gate.stage(a);
		assert_eq!(gate.retire().len(), 1);
		assert_eq!(gate.phase(), OwnerPhase::Retired);
		assert!(gate.enter_active().is_none());
		gate.leave_active();
		assert_eq!(gate.phase(), OwnerPhase::Retired);
	}
}
