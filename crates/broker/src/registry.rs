//! Survivable component registry.
//!
//! A [`SessionScope`] is the parent scope shared by every instance of a
//! container within one logical session. Components retained in it by tag
//! survive any number of container destroy/recreate cycles and are retired
//! together when the session ends.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::container::Container;
use crate::{Error, Result};

/// Stable key a survivable component is retained under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurvivableTag(Arc<str>);

impl SurvivableTag {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SurvivableTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for SurvivableTag {
	fn from(value: &str) -> Self {
		Self(Arc::from(value))
	}
}

impl From<String> for SurvivableTag {
	fn from(value: String) -> Self {
		Self(Arc::from(value))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl fmt::Display for ScopeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "scope-{}", self.0)
	}
}

/// A component that can be retained across container recreation.
pub trait Survivable: Any + Send + Sync {
	/// Called once when the owning session ends.
	fn on_session_end(&self) {}
}

struct Retained {
	any: Arc<dyn Any + Send + Sync>,
	survivable: Arc<dyn Survivable>,
}

impl Retained {
	fn new<C: Survivable>(component: &Arc<C>) -> Self {
		Self {
			any: Arc::clone(component) as Arc<dyn Any + Send + Sync>,
			survivable: Arc::clone(component) as Arc<dyn Survivable>,
		}
	}

	fn downcast<C: Survivable>(&self, tag: &SurvivableTag) -> Result<Arc<C>> {
		Arc::clone(&self.any)
			.downcast::<C>()
			.map_err(|_| Error::TagTypeMismatch(tag.clone()))
	}
}

struct ScopeState {
	components: HashMap<SurvivableTag, Retained>,
	ended: bool,
}

/// Parent scope holding retained components for one session.
pub struct SessionScope {
	id: ScopeId,
	state: Mutex<ScopeState>,
}

impl fmt::Debug for SessionScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("SessionScope")
			.field("id", &self.id)
			.field("retained", &state.components.len())
			.field("ended", &state.ended)
			.finish()
	}
}

impl SessionScope {
	pub fn new() -> Arc<Self> {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Arc::new(Self {
			id: ScopeId(NEXT.fetch_add(1, Ordering::Relaxed)),
			state: Mutex::new(ScopeState {
				components: HashMap::new(),
				ended: false,
			}),
		})
	}

	pub fn id(&self) -> ScopeId {
		self.id
	}

	pub fn is_ended(&self) -> bool {
		self.state.lock().ended
	}

	pub fn retained_count(&self) -> usize {
		self.state.lock().components.len()
	}

	/// Looks up the component retained under `tag`.
	pub fn find<C: Survivable>(&self, tag: &SurvivableTag) -> Result<Option<Arc<C>>> {
		let state = self.state.lock();
		if state.ended {
			return Err(Error::SessionEnded(self.id));
		}
		state.components.get(tag).map(|r| r.downcast(tag)).transpose()
	}

	/// Returns the component under `tag`, constructing and retaining it first
	/// if there is none.
	///
	/// The component is retained before this returns, so destroying the
	/// container that asked for it does not destroy the component. The
	/// constructor runs without the scope lock held and may itself look up
	/// other tags.
	pub fn find_or_create<C: Survivable>(&self, tag: &SurvivableTag, constructor: impl FnOnce() -> C) -> Result<Arc<C>> {
		if let Some(existing) = self.find(tag)? {
			return Ok(existing);
		}

		let created = Arc::new(constructor());
		let mut state = self.state.lock();
		if state.ended {
			return Err(Error::SessionEnded(self.id));
		}
		if let Some(raced) = state.components.get(tag) {
			return raced.downcast(tag);
		}
		state.components.insert(tag.clone(), Retained::new(&created));
		tracing::debug!(scope = %self.id, %tag, "broker.registry.retained");
		Ok(created)
	}

	/// Ends the session and retires every retained component.
	///
	/// Returns how many components were retired; zero on repeated calls.
	pub fn end(&self) -> usize {
		let retired: Vec<_> = {
			let mut state = self.state.lock();
			if state.ended {
				return 0;
			}
			state.ended = true;
			state.components.drain().collect()
		};
		tracing::debug!(scope = %self.id, retired = retired.len(), "broker.registry.session_end");
		for (_, retained) in &retired {
			retained.survivable.on_session_end();
		}
		retired.len()
	}
}

/// A scope released without [`SessionScope::end`] still ends its session.
impl Drop for SessionScope {
	fn drop(&mut self) {
		self.end();
	}
}

/// Finds or creates the component under `tag` in `container`'s parent scope.
pub fn find_or_create<C: Survivable>(container: &Container, tag: &SurvivableTag, constructor: impl FnOnce() -> C) -> Result<Arc<C>> {
	container.scope().find_or_create(tag, constructor)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;
	use crate::container::CreationParams;

	#[derive(Debug, Default)]
	struct Screen {
		ended: AtomicUsize,
	}

	impl Survivable for Screen {
		fn on_session_end(&self) {
			self.ended.fetch_add(1, Ordering::SeqCst);
		}
	}

	struct Other;
	impl Survivable for Other {}

	#[test]
	fn same_instance_across_recreations() {
		let tag = SurvivableTag::from("screen");
		let mut container = Container::new(SessionScope::new(), CreationParams::new("main"));
		let first = find_or_create(&container, &tag, Screen::default).unwrap();

		for _ in 0..5 {
			container.destroy();
			container = container.recreate();
			let again = find_or_create::<Screen>(&container, &tag, || panic!("constructed twice")).unwrap();
			assert!(Arc::ptr_eq(&first, &again));
		}
		assert_eq!(container.scope().retained_count(), 1);
	}

	#[test]
	fn retained_before_container_destroyed() {
		let tag = SurvivableTag::from("screen");
		let container = Container::new(SessionScope::new(), CreationParams::default());
		let scope = Arc::clone(container.scope());
		let made = find_or_create(&container, &tag, || {
			container.destroy();
			Screen::default()
		})
		.unwrap();
		let found = scope.find::<Screen>(&tag).unwrap().unwrap();
		assert!(Arc::ptr_eq(&made, &found));
	}

	#[test]
	fn type_mismatch_is_reported() {
		let scope = SessionScope::new();
		let tag = SurvivableTag::from("slot");
		scope.find_or_create(&tag, || Other).unwrap();
		let err = scope.find_or_create(&tag, Screen::default).unwrap_err();
		assert!(matches!(err, Error::TagTypeMismatch(t) if t == tag));
	}

	#[test]
	fn ending_session_retires_components_once() {
		let scope = SessionScope::new();
		let tag = SurvivableTag::from("screen");
		let screen = scope.find_or_create(&tag, Screen::default).unwrap();

		assert_eq!(scope.end(), 1);
		assert_eq!(scope.end(), 0);
		assert_eq!(screen.ended.load(Ordering::SeqCst), 1);
		assert!(matches!(scope.find::<Screen>(&tag), Err(Error::SessionEnded(_))));
		assert!(scope.find_or_create(&tag, Screen::default).is_err());
	}

	#[test]
	fn dropping_the_scope_ends_the_session() {
		let scope = SessionScope::new();
		let screen = scope.find_or_create(&SurvivableTag::from("screen"), Screen::default).unwrap();
		drop(scope);
		assert_eq!(screen.ended.load(Ordering::SeqCst), 1);
	}
}
