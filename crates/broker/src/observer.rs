//! Observer lifecycle manager.
//!
//! Some requests need a handle to a survivable component living in a container
//! that the request itself causes to be created, possibly several times over.
//! The manager watches container creation on the [`LifecycleHub`] for as long
//! as at least one such request is outstanding, and only then.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::container::{ComponentHandle, Container};
use crate::hub::{ContainerObserver, LifecycleHub, ObserverKey};
use crate::id::CorrelationId;
use crate::owner::OwnerKey;
use crate::{Error, Result};

/// Caller callback that receives the survivable component once it has loaded.
pub struct ComponentInitializer {
	expected: &'static str,
	run: Box<dyn FnOnce(ComponentHandle) -> bool + Send>,
}

impl fmt::Debug for ComponentInitializer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentInitializer").field("expected", &self.expected).finish_non_exhaustive()
	}
}

impl ComponentInitializer {
	/// Wraps a callback for components of type `C`.
	pub fn new<C, F>(f: F) -> Self
	where
		C: Any + Send + Sync,
		F: FnOnce(Arc<C>) + Send + 'static,
	{
		Self {
			expected: std::any::type_name::<C>(),
			run: Box::new(move |handle: ComponentHandle| match handle.downcast::<C>() {
				Ok(component) => {
					f(component);
					true
				}
				Err(_) => false,
			}),
		}
	}

	/// Runs the callback. Returns false if the component had another type.
	fn invoke(self, component: ComponentHandle) -> bool {
		(self.run)(component)
	}
}

struct Awaiting {
	requester: OwnerKey,
	initializer: ComponentInitializer,
	/// Container instances seen carrying this marker.
	sightings: u32,
}

#[derive(Default)]
struct ManagerState {
	outstanding: usize,
	awaiting: HashMap<CorrelationId, Awaiting>,
	registration: Option<ObserverKey>,
}

struct ManagerInner {
	hub: Arc<LifecycleHub>,
	state: Mutex<ManagerState>,
}

/// Reference-counted watcher of container creation.
///
/// The count is the number of tracked requests whose initializer has not run
/// and has not been released. The manager is the only writer of its hub
/// registration: 0 -> 1 registers, N -> 0 unregisters.
#[derive(Clone)]
pub struct ObserverLifecycleManager {
	inner: Arc<ManagerInner>,
}

impl fmt::Debug for ObserverLifecycleManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("ObserverLifecycleManager")
			.field("outstanding", &state.outstanding)
			.field("registered", &state.registration.is_some())
			.finish()
	}
}

/// What the hub actually holds; weak so a registration never keeps the
/// manager alive.
struct HubProxy {
	manager: Weak<ManagerInner>,
}

impl ContainerObserver for HubProxy {
	fn on_container_created(&self, container: &Arc<Container>) {
		if let Some(inner) = self.manager.upgrade() {
			ObserverLifecycleManager { inner }.on_container_created(container);
		}
	}
}

impl ObserverLifecycleManager {
	pub fn new(hub: Arc<LifecycleHub>) -> Self {
		Self {
			inner: Arc::new(ManagerInner {
				hub,
				state: Mutex::new(ManagerState::default()),
			}),
		}
	}

	pub fn hub(&self) -> &Arc<LifecycleHub> {
		&self.inner.hub
	}

	/// Requests whose initializer is still waiting.
	pub fn outstanding(&self) -> usize {
		self.inner.state.lock().outstanding
	}

	pub fn is_registered(&self) -> bool {
		self.inner.state.lock().registration.is_some()
	}

	pub fn is_awaiting(&self, id: CorrelationId) -> bool {
		self.inner.state.lock().awaiting.contains_key(&id)
	}

	/// Starts waiting for the component created on behalf of `id`.
	///
	/// Returns false, dropping `initializer`, if `id` is already tracked; the
	/// existing entry is left alone.
	pub(crate) fn track(&self, id: CorrelationId, requester: OwnerKey, initializer: ComponentInitializer) -> bool {
		let mut state = self.inner.state.lock();
		if state.awaiting.contains_key(&id) {
			tracing::warn!(%id, requester = requester.get(), "broker.observer.marker_in_use");
			return false;
		}
		state.awaiting.insert(
			id,
			Awaiting {
				requester,
				initializer,
				sightings: 0,
			},
		);
		self.increment(&mut state);
		tracing::debug!(%id, requester = requester.get(), outstanding = state.outstanding, "broker.observer.track");
		true
	}

	/// Stops waiting for `id` without running its initializer.
	///
	/// Used on cancellation and when the request settles before its component
	/// loaded. Returns false if nothing was waiting.
	pub fn release(&self, id: CorrelationId) -> bool {
		let mut state = self.inner.state.lock();
		if state.awaiting.remove(&id).is_none() {
			return false;
		}
		if let Err(err) = self.decrement(&mut state) {
			tracing::error!(%id, error = %err, "broker.observer.release");
		}
		tracing::debug!(%id, outstanding = state.outstanding, "broker.observer.released");
		true
	}

	/// Drops everything `requester` was waiting for; its owner was retired.
	///
	/// Once nothing is awaited the hub registration is removed even if the
	/// count disagrees, so a miscount cannot leak the registration.
	pub fn release_requester(&self, requester: OwnerKey) -> usize {
		let mut state = self.inner.state.lock();
		let ids: Vec<_> = state
			.awaiting
			.iter()
			.filter(|(_, a)| a.requester == requester)
			.map(|(id, _)| *id)
			.collect();
		for id in &ids {
			state.awaiting.remove(id);
			if let Err(err) = self.decrement(&mut state) {
				tracing::error!(%id, error = %err, "broker.observer.release_requester");
			}
		}

		if state.awaiting.is_empty() && state.outstanding != 0 {
			tracing::error!(outstanding = state.outstanding, "broker.observer.count_drift");
			state.outstanding = 0;
			if let Some(key) = state.registration.take() {
				self.inner.hub.unregister(key);
			}
		}
		tracing::debug!(requester = requester.get(), released = ids.len(), "broker.observer.requester_retired");
		ids.len()
	}

	fn increment(&self, state: &mut ManagerState) {
		state.outstanding += 1;
		if state.outstanding == 1 && state.registration.is_none() {
			let proxy = Arc::new(HubProxy {
				manager: Arc::downgrade(&self.inner),
			});
			state.registration = Some(self.inner.hub.register(proxy));
		}
	}

	fn decrement(&self, state: &mut ManagerState) -> Result<()> {
		let Some(next) = state.outstanding.checked_sub(1) else {
			debug_assert!(false, "observer registration count underflow");
			return Err(Error::RegistrationImbalance);
		};
		state.outstanding = next;
		if next == 0
			&& let Some(key) = state.registration.take()
		{
			self.inner.hub.unregister(key);
		}
		Ok(())
	}

	fn on_container_created(&self, container: &Arc<Container>) {
		let Some(marker) = container.marker() else {
			return;
		};
		{
			let mut state = self.inner.state.lock();
			let Some(awaiting) = state.awaiting.get_mut(&marker) else {
				return;
			};
			awaiting.sightings += 1;
			tracing::debug!(id = %marker, container = %container.id(), sightings = awaiting.sightings, "broker.observer.container_seen");
		}

		// Subscribe without the lock held: an already-loaded container runs
		// the callback inline.
		let manager = Arc::downgrade(&self.inner);
		let subscribed = container.on_owner_loaded(move |component| {
			if let Some(inner) = manager.upgrade() {
				ObserverLifecycleManager { inner }.complete(marker, component);
			}
		});
		if !subscribed {
			tracing::debug!(id = %marker, container = %container.id(), "broker.observer.container_already_destroyed");
		}
	}

	/// Runs the initializer for `id` if it is still waiting.
	fn complete(&self, id: CorrelationId, component: ComponentHandle) {
		let awaiting = {
			let mut state = self.inner.state.lock();
			let Some(awaiting) = state.awaiting.remove(&id) else {
				return;
			};
			if let Err(err) = self.decrement(&mut state) {
				tracing::error!(%id, error = %err, "broker.observer.complete");
			}
			awaiting
		};

		let expected = awaiting.initializer.expected;
		if awaiting.initializer.invoke(component) {
			tracing::debug!(%id, "broker.observer.initialized");
		} else {
			tracing::warn!(%id, expected, "broker.observer.component_type_mismatch");
		}
	}
}

#[cfg(test)]
mod tests;
