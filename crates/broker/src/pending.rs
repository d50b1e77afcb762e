//! Per-owner table of in-flight requests.

use std::collections::{HashMap, VecDeque};

use crate::Error;
use crate::cancel::CancelGuard;
use crate::id::CorrelationId;
use crate::promise::Promise;

/// One request awaiting its boundary result.
#[derive(Debug)]
pub(crate) struct PendingRequest {
	pub(crate) id: CorrelationId,
	pub(crate) promise: Promise,
	/// Set when the request also tracks a component initializer.
	pub(crate) wants_component: bool,
	/// Stops the cancellation watcher when the request settles.
	pub(crate) cancel_guard: Option<CancelGuard>,
}

/// Map from id to pending request, plus a short memory of settled ids.
///
/// The table is the single source of truth for "already handled": an id is
/// matched at most once, every later lookup misses.
#[derive(Debug)]
pub(crate) struct PendingRequestTable {
	entries: HashMap<CorrelationId, PendingRequest>,
	settled: VecDeque<CorrelationId>,
	settled_cap: usize,
}

impl PendingRequestTable {
	pub fn new(settled_cap: usize) -> Self {
		Self {
			entries: HashMap::new(),
			settled: VecDeque::with_capacity(settled_cap),
			settled_cap,
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn contains(&self, id: CorrelationId) -> bool {
		self.entries.contains_key(&id)
	}

	/// Inserts a request. An occupied id hands the request back untouched.
	pub fn insert(&mut self, request: PendingRequest) -> Result<(), PendingRequest> {
		if self.entries.contains_key(&request.id) {
			return Err(request);
		}
		self.entries.insert(request.id, request);
		Ok(())
	}

	/// Removes and returns the request for `id`, remembering it as settled.
	pub fn match_and_remove(&mut self, id: CorrelationId) -> Option<PendingRequest> {
		let request = self.entries.remove(&id)?;
		if self.settled_cap > 0 {
			if self.settled.len() == self.settled_cap {
				self.settled.pop_front();
			}
			self.settled.push_back(id);
		}
		Some(request)
	}

	/// Explains a miss from [`Self::match_and_remove`] for logging.
	pub fn classify_miss(&self, id: CorrelationId) -> Error {
		if self.settled.contains(&id) {
			Error::DuplicateCompletion(id)
		} else {
			Error::UnknownCorrelation(id)
		}
	}

	/// Empties the table, for owner retirement.
	pub fn drain(&mut self) -> Vec<PendingRequest> {
		let mut drained: Vec<_> = self.entries.drain().map(|(_, req)| req).collect();
		drained.sort_by_key(|req| req.id);
		drained
	}
}
