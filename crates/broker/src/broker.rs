//! Shared broker context.

use std::fmt;
use std::sync::Arc;

use crate::boundary::Boundary;
use crate::cancel::CancellationBridge;
use crate::config::BrokerConfig;
use crate::container::Container;
use crate::hub::LifecycleHub;
use crate::id::IdAllocator;
use crate::observer::ObserverLifecycleManager;
use crate::owner::Owner;
use crate::registry::{self, SurvivableTag};
use crate::Result;

struct BrokerInner {
	config: BrokerConfig,
	allocator: Arc<IdAllocator>,
	boundary: Arc<dyn Boundary>,
	observers: ObserverLifecycleManager,
	cancellation: CancellationBridge,
}

/// Everything owners share: the id allocator, the boundary, the observer
/// manager and the cancellation bridge. Cheap to clone.
#[derive(Clone)]
pub struct Broker {
	inner: Arc<BrokerInner>,
}

impl fmt::Debug for Broker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Broker")
			.field("config", &self.inner.config)
			.field("observers", &self.inner.observers)
			.finish_non_exhaustive()
	}
}

impl Broker {
	/// Builds a broker over `boundary`, watching container creation on `hub`.
	///
	/// Every broker draws ids from the one process-wide allocator, so ids stay
	/// unique across brokers. A configured `id_offset` only raises that
	/// allocator's counter.
	pub fn new(config: BrokerConfig, boundary: Arc<dyn Boundary>, hub: Arc<LifecycleHub>) -> Self {
		let allocator = IdAllocator::shared();
		allocator.advance_to(config.id_offset);
		let observers = ObserverLifecycleManager::new(hub);
		let cancellation = CancellationBridge::new(Arc::clone(&boundary), observers.clone());
		tracing::debug!(id_offset = config.id_offset, settled_history = config.settled_history, "broker.new");
		Self {
			inner: Arc::new(BrokerInner {
				config,
				allocator,
				boundary,
				observers,
				cancellation,
			}),
		}
	}

	/// Default config on the process-wide hub.
	pub fn with_boundary(boundary: Arc<dyn Boundary>) -> Self {
		Self::new(BrokerConfig::default(), boundary, LifecycleHub::global())
	}

	pub fn config(&self) -> &BrokerConfig {
		&self.inner.config
	}

	pub fn allocator(&self) -> &Arc<IdAllocator> {
		&self.inner.allocator
	}

	pub fn boundary(&self) -> &Arc<dyn Boundary> {
		&self.inner.boundary
	}

	pub fn hub(&self) -> &Arc<LifecycleHub> {
		self.inner.observers.hub()
	}

	pub fn observers(&self) -> &ObserverLifecycleManager {
		&self.inner.observers
	}

	pub fn cancellation(&self) -> &CancellationBridge {
		&self.inner.cancellation
	}

	/// Finds the owner retained under `tag` in `container`'s session, creating
	/// it on first use. Every recreation of the container gets the same owner.
	pub fn owner_for(&self, container: &Container, tag: impl Into<SurvivableTag>) -> Result<Arc<Owner>> {
		let tag = tag.into();
		registry::find_or_create(container, &tag, || Owner::new(self, tag.clone()))
	}
}
