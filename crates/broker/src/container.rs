//! Ephemeral containers and their "owner loaded" signal.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::id::CorrelationId;
use crate::registry::SessionScope;

/// Type-erased handle to a survivable component.
pub type ComponentHandle = Arc<dyn Any + Send + Sync>;

type LoadedCallback = Box<dyn FnOnce(ComponentHandle) + Send>;

/// Identity of one container instance. Recreations get a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl fmt::Display for ContainerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "container-{}", self.0)
	}
}

/// Parameters a container was created with. Preserved across recreation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationParams {
	/// Correlation id of the request that caused this container to exist.
	pub marker: Option<CorrelationId>,
	pub label: String,
}

impl CreationParams {
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			marker: None,
			label: label.into(),
		}
	}

	pub fn with_marker(mut self, marker: CorrelationId) -> Self {
		self.marker = Some(marker);
		self
	}
}

enum LoadState {
	Loading(Vec<LoadedCallback>),
	Loaded(ComponentHandle),
	Destroyed,
}

/// One live instance of a container, as created by the runtime.
pub struct Container {
	id: ContainerId,
	params: CreationParams,
	scope: Arc<SessionScope>,
	load: Mutex<LoadState>,
}

impl fmt::Debug for Container {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Container")
			.field("id", &self.id)
			.field("params", &self.params)
			.field("scope", &self.scope.id())
			.field("loaded", &self.is_loaded())
			.field("destroyed", &self.is_destroyed())
			.finish()
	}
}

impl Container {
	/// Creates a container inside `scope`. Announcing it on a
	/// [`LifecycleHub`](crate::LifecycleHub) is the caller's job.
	pub fn new(scope: Arc<SessionScope>, params: CreationParams) -> Arc<Self> {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Arc::new(Self {
			id: ContainerId(NEXT.fetch_add(1, Ordering::Relaxed)),
			params,
			scope,
			load: Mutex::new(LoadState::Loading(Vec::new())),
		})
	}

	/// Creates the next instance of this container with the same parameters
	/// and parent scope.
	pub fn recreate(&self) -> Arc<Self> {
		Self::new(Arc::clone(&self.scope), self.params.clone())
	}

	pub fn id(&self) -> ContainerId {
		self.id
	}

	pub fn params(&self) -> &CreationParams {
		&self.params
	}

	pub fn marker(&self) -> Option<CorrelationId> {
		self.params.marker
	}

	/// Session scope that outlives this instance.
	pub fn scope(&self) -> &Arc<SessionScope> {
		&self.scope
	}

	pub fn is_loaded(&self) -> bool {
		matches!(*self.load.lock(), LoadState::Loaded(_))
	}

	pub fn is_destroyed(&self) -> bool {
		matches!(*self.load.lock(), LoadState::Destroyed)
	}

	/// Runs `f` once this container's owner has loaded.
	///
	/// Runs immediately if it already has. Returns false, dropping `f`, if the
	/// container was destroyed.
	pub fn on_owner_loaded(&self, f: impl FnOnce(ComponentHandle) + Send + 'static) -> bool {
		let mut load = self.load.lock();
		match &mut *load {
			LoadState::Loading(waiters) => {
				waiters.push(Box::new(f));
				true
			}
			LoadState::Loaded(component) => {
				let component = Arc::clone(component);
				drop(load);
				f(component);
				true
			}
			LoadState::Destroyed => false,
		}
	}

	/// Signals that the owner finished loading. Fires waiting callbacks once;
	/// later calls and calls on a destroyed container do nothing.
	pub fn notify_owner_loaded(&self, component: ComponentHandle) -> usize {
		let waiters = {
			let mut load = self.load.lock();
			match std::mem::replace(&mut *load, LoadState::Destroyed) {
				LoadState::Loading(waiters) => {
					*load = LoadState::Loaded(Arc::clone(&component));
					waiters
				}
				other => {
					*load = other;
					return 0;
				}
			}
		};
		tracing::debug!(container = %self.id, waiters = waiters.len(), "broker.container.loaded");
		let fired = waiters.len();
		for waiter in waiters {
			waiter(Arc::clone(&component));
		}
		fired
	}

	/// Tears this instance down. Pending loaded callbacks are dropped unrun.
	pub fn destroy(&self) {
		let previous = std::mem::replace(&mut *self.load.lock(), LoadState::Destroyed);
		let dropped = match previous {
			LoadState::Loading(waiters) => waiters.len(),
			_ => 0,
		};
		tracing::debug!(container = %self.id, dropped, "broker.container.destroyed");
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	fn container() -> Arc<Container> {
		Container::new(SessionScope::new(), CreationParams::new("child").with_marker(CorrelationId::from_raw(0x1_0000)))
	}

	#[test]
	fn loaded_fires_waiters_once() {
		let c = container();
		let hits = Arc::new(AtomicUsize::new(0));
		let h = hits.clone();
		assert!(c.on_owner_loaded(move |_| {
			h.fetch_add(1, Ordering::SeqCst);
		}));
		assert_eq!(c.notify_owner_loaded(Arc::new(1u8)), 1);
		assert_eq!(c.notify_owner_loaded(Arc::new(2u8)), 0);
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn subscribing_after_load_runs_immediately() {
		let c = container();
		c.notify_owner_loaded(Arc::new(9u32));
		let seen = Arc::new(Mutex::new(None));
		let s = seen.clone();
		c.on_owner_loaded(move |handle| {
			*s.lock() = handle.downcast::<u32>().ok().map(|v| *v);
		});
		assert_eq!(*seen.lock(), Some(9));
	}

	#[test]
	fn destroyed_container_never_fires() {
		let c = container();
		let hits = Arc::new(AtomicUsize::new(0));
		let h = hits.clone();
		c.on_owner_loaded(move |_| {
			h.fetch_add(1, Ordering::SeqCst);
		});
		c.destroy();
		assert_eq!(c.notify_owner_loaded(Arc::new(())), 0);
		assert!(!c.on_owner_loaded(|_| {}));
		assert_eq!(hits.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn recreate_keeps_params_and_scope() {
		let c = container();
		let next = c.recreate();
		assert_ne!(c.id(), next.id());
		assert_eq!(c.params(), next.params());
		assert!(Arc::ptr_eq(c.scope(), next.scope()));
	}
}
