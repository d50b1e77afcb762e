//! Process-wide "container created" notification stream.
//!
//! The hub is the one piece of truly shared state. Only the
//! [`ObserverLifecycleManager`](crate::ObserverLifecycleManager) registers
//! with it from inside the broker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::container::Container;

/// Receives a callback for every container the runtime creates.
pub trait ContainerObserver: Send + Sync {
	fn on_container_created(&self, container: &Arc<Container>);
}

/// Registration handle returned by [`LifecycleHub::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverKey(u64);

/// Fan-out point for container creation.
#[derive(Default)]
pub struct LifecycleHub {
	observers: RwLock<Vec<(ObserverKey, Arc<dyn ContainerObserver>)>>,
	next_key: AtomicU64,
}

impl fmt::Debug for LifecycleHub {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LifecycleHub").field("observers", &self.observer_count()).finish()
	}
}

impl LifecycleHub {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// The hub shared by everything in this process.
	pub fn global() -> Arc<Self> {
		static GLOBAL: OnceLock<Arc<LifecycleHub>> = OnceLock::new();
		Arc::clone(GLOBAL.get_or_init(Self::new))
	}

	pub fn register(&self, observer: Arc<dyn ContainerObserver>) -> ObserverKey {
		let key = ObserverKey(self.next_key.fetch_add(1, Ordering::Relaxed));
		self.observers.write().push((key, observer));
		tracing::debug!(key = key.0, "broker.hub.register");
		key
	}

	/// Removes a registration. Returns false if `key` was not registered.
	pub fn unregister(&self, key: ObserverKey) -> bool {
		let mut observers = self.observers.write();
		let before = observers.len();
		observers.retain(|(k, _)| *k != key);
		let removed = observers.len() != before;
		tracing::debug!(key = key.0, removed, "broker.hub.unregister");
		removed
	}

	pub fn is_registered(&self, key: ObserverKey) -> bool {
		self.observers.read().iter().any(|(k, _)| *k == key)
	}

	pub fn observer_count(&self) -> usize {
		self.observers.read().len()
	}

	/// Notifies every observer that `container` was created.
	///
	/// Observers run on a snapshot taken before the first callback, so they
	/// may register or unregister from inside it.
	pub fn announce(&self, container: &Arc<Container>) {
		let snapshot: Vec<_> = self.observers.read().iter().map(|(_, o)| Arc::clone(o)).collect();
		tracing::trace!(container = %container.id(), marker = ?container.marker(), observers = snapshot.len(), "broker.hub.announce");
		for observer in snapshot {
			observer.on_container_created(container);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;
	use crate::container::CreationParams;
	use crate::registry::SessionScope;

	#[derive(Default)]
	struct Counting(AtomicUsize);

	impl ContainerObserver for Counting {
		fn on_container_created(&self, _container: &Arc<Container>) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[test]
	fn announce_reaches_registered_observers_only() {
		let hub = LifecycleHub::new();
		let observer = Arc::new(Counting::default());
		let key = hub.register(observer.clone());
		let container = Container::new(SessionScope::new(), CreationParams::default());

		hub.announce(&container);
		assert!(hub.unregister(key));
		assert!(!hub.unregister(key));
		hub.announce(&container);

		assert_eq!(observer.0.load(Ordering::SeqCst), 1);
		assert_eq!(hub.observer_count(), 0);
	}

	#[test]
	fn observer_may_unregister_itself_during_announce() {
		struct SelfRemoving {
			hub: Arc<LifecycleHub>,
			key: parking_lot::Mutex<Option<ObserverKey>>,
		}
		impl ContainerObserver for SelfRemoving {
			fn on_container_created(&self, _container: &Arc<Container>) {
				if let Some(key) = self.key.lock().take() {
					self.hub.unregister(key);
				}
			}
		}

		let hub = LifecycleHub::new();
		let observer = Arc::new(SelfRemoving {
			hub: hub.clone(),
			key: parking_lot::Mutex::new(None),
		});
		let key = hub.register(observer.clone());
		*observer.key.lock() = Some(key);

		hub.announce(&Container::new(SessionScope::new(), CreationParams::default()));
		assert!(!hub.is_registered(key));
	}
}
