//! A stand-in for the platform runtime: launches "screens" as child
//! containers and reports their results after a delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use handoff_broker::{
	Boundary, BoundaryError, Container, CorrelationId, CreationParams, LaunchContext, LifecycleHub, SessionScope, StatusCode, Survivable, SurvivableTag,
};
use handoff_worker::TaskClass;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Tag the picker screen retains its state under.
pub const PICKER_TAG: &str = "picker";

/// Survivable state of a simulated picker screen.
#[derive(Debug, Default)]
pub struct PickerScreen {
	pub preselected: Mutex<Option<String>>,
}

impl Survivable for PickerScreen {}

struct Screen {
	container: Arc<Container>,
	reply: JoinHandle<()>,
}

/// Launches one child container per request and completes it after `delay`.
pub struct SimRuntime {
	hub: Arc<LifecycleHub>,
	delay: Duration,
	screens: Mutex<HashMap<CorrelationId, Screen>>,
}

impl SimRuntime {
	pub fn new(hub: Arc<LifecycleHub>, delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			hub,
			delay,
			screens: Mutex::new(HashMap::new()),
		})
	}

	/// Current instance of the screen launched for `id`.
	pub fn screen(&self, id: CorrelationId) -> Option<Arc<Container>> {
		self.screens.lock().get(&id).map(|s| Arc::clone(&s.container))
	}

	/// Destroys the screen for `id` and announces a fresh instance.
	pub fn recreate_screen(&self, id: CorrelationId) -> Option<Arc<Container>> {
		let next = {
			let mut screens = self.screens.lock();
			let screen = screens.get_mut(&id)?;
			screen.container.destroy();
			screen.container = screen.container.recreate();
			Arc::clone(&screen.container)
		};
		debug!(%id, container = %next.id(), "sim.screen.recreated");
		self.hub.announce(&next);
		Some(next)
	}

	/// Lets the current screen for `id` finish loading.
	pub fn load_screen(&self, id: CorrelationId) -> bool {
		let Some(container) = self.screen(id) else {
			return false;
		};
		let tag = SurvivableTag::from(PICKER_TAG);
		match handoff_broker::registry::find_or_create(&container, &tag, PickerScreen::default) {
			Ok(screen) => {
				let fired = container.notify_owner_loaded(screen);
				debug!(%id, container = %container.id(), fired, "sim.screen.loaded");
				true
			}
			Err(err) => {
				debug!(%id, error = %err, "sim.screen.load_failed");
				false
			}
		}
	}
}

impl Boundary for SimRuntime {
	fn launch(&self, launch: LaunchContext) -> Result<(), BoundaryError> {
		if launch.request.action != "pick" {
			return Err(BoundaryError::Rejected(format!("no handler for {}", launch.request.action)));
		}

		let LaunchContext { id, request, intake } = launch;
		let container = Container::new(SessionScope::new(), CreationParams::new(request.action.clone()).with_marker(id));
		let delay = self.delay;
		let reply = handoff_worker::spawn(TaskClass::Boundary, async move {
			tokio::time::sleep(delay).await;
			intake.complete(id, StatusCode::OK, json!({ "picked": "beach.jpg", "request": request.payload }));
		});
		info!(%id, container = %container.id(), "sim.screen.launched");

		self.screens.lock().insert(
			id,
			Screen {
				container: Arc::clone(&container),
				reply,
			},
		);
		self.hub.announce(&container);
		Ok(())
	}

	fn terminate(&self, id: CorrelationId) {
		if let Some(screen) = self.screens.lock().remove(&id) {
			screen.reply.abort();
			screen.container.destroy();
			info!(%id, "sim.screen.terminated");
		}
	}
}
