//! Owners: the survivable unit holding request bookkeeping.
//!
//! An [`Owner`] is created once per logical session and tag and outlives any
//! number of container instances. All of its table, staging and flushing work
//! happens inside its own methods, which are meant to be driven from the
//! owner's home sequence; completions from other threads arrive through its
//! [`IntakeHandle`] and wait in the inbox until [`Owner::pump`].

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::boundary::{LaunchContext, LaunchRequest};
use crate::broker::Broker;
use crate::gate::{DeliveryGate, FlushReport, OwnerPhase, StagedResult};
use crate::id::CorrelationId;
use crate::intake::{self, Accepted, Inbox, IntakeHandle};
use crate::observer::ComponentInitializer;
use crate::outcome::Outcome;
use crate::pending::{PendingRequest, PendingRequestTable};
use crate::promise::{Continuation, promise};
use crate::registry::{Survivable, SurvivableTag};
use crate::{Error, Result};

/// Attempts at finding a free id before giving up on a wrapped allocator.
const MAX_ID_PROBES: usize = 1024;

/// Process-unique identity of an owner instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerKey(u64);

impl OwnerKey {
	pub(crate) fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Optional extras for [`Owner::register`].
#[derive(Debug, Default)]
pub struct RequestOptions {
	initializer: Option<ComponentInitializer>,
	cancel: Option<CancellationToken>,
}

impl RequestOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Hands the survivable component of type `C`, created in the container
	/// this request launches, to `f` once it has loaded.
	pub fn with_component<C, F>(self, f: F) -> Self
	where
		C: std::any::Any + Send + Sync,
		F: FnOnce(std::sync::Arc<C>) + Send + 'static,
	{
		self.with_initializer(ComponentInitializer::new(f))
	}

	pub fn with_initializer(mut self, initializer: ComponentInitializer) -> Self {
		self.initializer = Some(initializer);
		self
	}

	/// Cancels the request when `token` fires.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);
		self
	}
}

/// Point-in-time view of an owner's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSnapshot {
	pub tag: SurvivableTag,
	pub phase: OwnerPhase,
	pub pending: usize,
	pub staged: usize,
}

struct OwnerState {
	table: PendingRequestTable,
	gate: DeliveryGate,
	inbox: Inbox,
}

/// Holds the pending table and staged results for one logical session.
pub struct Owner {
	key: OwnerKey,
	tag: SurvivableTag,
	broker: Broker,
	intake: IntakeHandle,
	state: Mutex<OwnerState>,
}

impl std::fmt::Debug for Owner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Owner").field("key", &self.key).field("snapshot", &self.snapshot()).finish()
	}
}

impl Owner {
	pub fn new(broker: &Broker, tag: impl Into<SurvivableTag>) -> Self {
		let tag = tag.into();
		let (intake, inbox) = intake::channel(tag.clone());
		Self {
			key: OwnerKey::next(),
			tag,
			broker: broker.clone(),
			intake,
			state: Mutex::new(OwnerState {
				table: PendingRequestTable::new(broker.config().settled_history),
				gate: DeliveryGate::new(),
				inbox,
			}),
		}
	}

	pub fn key(&self) -> OwnerKey {
		self.key
	}

	pub fn tag(&self) -> &SurvivableTag {
		&self.tag
	}

	pub fn phase(&self) -> OwnerPhase {
		self.state.lock().gate.phase()
	}

	/// Handle the boundary uses to report results to this owner.
	pub fn intake(&self) -> IntakeHandle {
		self.intake.clone()
	}

	pub fn snapshot(&self) -> OwnerSnapshot {
		let state = self.state.lock();
		OwnerSnapshot {
			tag: self.tag.clone(),
			phase: state.gate.phase(),
			pending: state.table.len(),
			staged: state.gate.staged_len(),
		}
	}

	/// Issues a request and returns its id and continuation immediately.
	///
	/// The continuation resolves on the first flush after the result is
	/// staged. A boundary that refuses the launch yields a `FAILED` outcome
	/// through the same path rather than an error here.
	pub fn register(&self, request: LaunchRequest, options: RequestOptions) -> Result<(CorrelationId, Continuation)> {
		let RequestOptions { initializer, cancel } = options;
		let mut state = self.state.lock();
		if state.gate.phase() == OwnerPhase::Retired {
			return Err(Error::OwnerRetired(self.tag.clone()));
		}

		// After the allocator wraps, skip ids still pending here or still used
		// as a container marker by any owner of this broker.
		let allocator = self.broker.allocator();
		let observers = self.broker.observers();
		let mut id = allocator.next();
		for _ in 1..MAX_ID_PROBES {
			if !state.table.contains(id) && !observers.is_awaiting(id) {
				break;
			}
			id = allocator.next();
		}
		let (promise, continuation) = promise(id);

		// Tracked before launch: the boundary may create the target container
		// synchronously from inside `launch`.
		let wants_component = match initializer {
			Some(initializer) => {
				let tracked = observers.track(id, self.key, initializer);
				if !tracked {
					warn!(owner = %self.tag, %id, "broker.register.initializer_dropped");
				}
				tracked
			}
			None => false,
		};
		let cancel_guard = cancel.map(|token| self.broker.cancellation().bind(id, token, self.intake.clone()));

		if let Err(rejected) = state.table.insert(PendingRequest {
			id,
			promise,
			wants_component,
			cancel_guard,
		}) {
			warn!(owner = %self.tag, %id, "broker.register.id_exhausted");
			drop(state);
			if wants_component {
				self.broker.observers().release(id);
			}
			// The returned request's promise resolves ABANDONED when dropped.
			drop(rejected);
			return Ok((id, continuation));
		}
		drop(state);

		debug!(owner = %self.tag, %id, action = %request.action, wants_component, "broker.register");
		let launch = LaunchContext {
			id,
			request,
			intake: self.intake.clone(),
		};
		if let Err(err) = self.broker.boundary().launch(launch) {
			warn!(owner = %self.tag, %id, error = %err, "broker.register.launch_failed");
			let mut state = self.state.lock();
			if let Some(pending) = state.table.match_and_remove(id) {
				state.gate.stage(StagedResult {
					id,
					outcome: Outcome::failed(err.to_string()),
					promise: pending.promise,
				});
			}
			drop(state);
			if wants_component {
				self.broker.observers().release(id);
			}
		}
		Ok((id, continuation))
	}

	/// Matches and stages everything in the inbox. Resolves nothing.
	///
	/// Returns how many completions were staged.
	pub fn pump(&self) -> usize {
		let mut staged = 0;
		let mut settled_components = Vec::new();
		{
			let mut state = self.state.lock();
			let OwnerState { table, gate, inbox } = &mut *state;
			for completion in inbox.drain() {
				match intake::accept(table, gate, completion) {
					Accepted::Staged { id, wants_component } => {
						staged += 1;
						if wants_component {
							settled_components.push(id);
						}
					}
					Accepted::Ignored(err) => debug!(owner = %self.tag, error = %err, "broker.intake.ignored"),
				}
			}
		}
		for id in settled_components {
			if self.broker.observers().release(id) {
				debug!(owner = %self.tag, %id, "broker.intake.abandoned_initializer");
			}
		}
		staged
	}

	/// Owner entered its active state: pump, then flush what was staged.
	pub fn on_active(&self) -> FlushReport {
		self.pump();
		let batch = self.state.lock().gate.enter_active();
		let delivered = match batch {
			Some(batch) => batch.deliver(),
			None => Vec::new(),
		};
		let still_staged = self.state.lock().gate.staged_len();
		if !delivered.is_empty() {
			debug!(owner = %self.tag, delivered = delivered.len(), still_staged, "broker.gate.flush");
		}
		FlushReport { delivered, still_staged }
	}

	/// Owner left its active state; results stage until the next entry.
	pub fn on_inactive(&self) {
		self.state.lock().gate.leave_active();
	}

	/// Permanently destroys the owner. Also runs when the owner is dropped.
	///
	/// Every pending or staged continuation resolves with `ABANDONED`, running
	/// boundary operations are asked to terminate, and component tracking for
	/// this owner is released. Returns how many continuations were abandoned.
	pub fn retire(&self) -> usize {
		let (pending, staged) = {
			let mut state = self.state.lock();
			if state.gate.phase() == OwnerPhase::Retired {
				return 0;
			}
			let staged = state.gate.retire();
			(state.table.drain(), staged)
		};

		let boundary = self.broker.boundary();
		let mut abandoned = 0;
		for mut request in pending {
			boundary.terminate(request.id);
			if request.promise.resolve(Outcome::abandoned()) {
				abandoned += 1;
			}
		}
		for mut result in staged {
			if result.promise.resolve(Outcome::abandoned()) {
				abandoned += 1;
			}
		}
		self.broker.observers().release_requester(self.key);
		info!(owner = %self.tag, abandoned, "broker.owner.retired");
		abandoned
	}
}

impl Survivable for Owner {
	fn on_session_end(&self) {
		self.retire();
	}
}

/// Dropping the last handle destroys the owner as surely as ending its session.
impl Drop for Owner {
	fn drop(&mut self) {
		self.retire();
	}
}
