use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::container::CreationParams;
use crate::registry::SessionScope;

fn id(raw: u32) -> CorrelationId {
	CorrelationId::from_raw(raw)
}

fn counting_initializer<C: Any + Send + Sync>(hits: &Arc<AtomicUsize>) -> ComponentInitializer {
	let hits = Arc::clone(hits);
	ComponentInitializer::new(move |_: Arc<C>| {
		hits.fetch_add(1, Ordering::SeqCst);
	})
}

fn child_container(marker: CorrelationId) -> Arc<Container> {
	Container::new(SessionScope::new(), CreationParams::new("child").with_marker(marker))
}

#[test]
fn registration_follows_outstanding_count() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let owner = OwnerKey::next();
	let hits = Arc::new(AtomicUsize::new(0));

	assert!(!manager.is_registered());
	manager.track(id(0x1_0000), owner, counting_initializer::<u8>(&hits));
	assert!(manager.is_registered());
	assert_eq!(hub.observer_count(), 1);

	manager.track(id(0x1_0001), owner, counting_initializer::<u8>(&hits));
	assert_eq!(manager.outstanding(), 2);
	assert_eq!(hub.observer_count(), 1);

	assert!(manager.release(id(0x1_0000)));
	assert!(!manager.release(id(0x1_0000)));
	assert!(manager.is_registered());

	assert!(manager.release(id(0x1_0001)));
	assert!(!manager.is_registered());
	assert_eq!(hub.observer_count(), 0);
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn initializer_survives_container_recreation() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let marker = id(0x1_0010);
	let received = Arc::new(Mutex::new(Vec::<u32>::new()));
	let sink = received.clone();
	manager.track(
		marker,
		OwnerKey::next(),
		ComponentInitializer::new(move |component: Arc<u32>| sink.lock().push(*component)),
	);

	let first = child_container(marker);
	hub.announce(&first);
	first.destroy();
	assert_eq!(first.notify_owner_loaded(Arc::new(1u32)), 0);

	let second = first.recreate();
	hub.announce(&second);
	assert_eq!(manager.outstanding(), 1);
	assert_eq!(second.notify_owner_loaded(Arc::new(2u32)), 1);

	assert_eq!(*received.lock(), vec![2]);
	assert_eq!(manager.outstanding(), 0);
	assert!(!manager.is_registered());

	// A further recreation carrying the same marker finds nothing to do.
	let third = second.recreate();
	hub.announce(&third);
	third.notify_owner_loaded(Arc::new(3u32));
	assert_eq!(*received.lock(), vec![2]);
}

#[test]
fn two_live_instances_fire_the_initializer_once() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let marker = id(0x1_0020);
	let hits = Arc::new(AtomicUsize::new(0));
	manager.track(marker, OwnerKey::next(), counting_initializer::<String>(&hits));

	let a = child_container(marker);
	let b = a.recreate();
	hub.announce(&a);
	hub.announce(&b);
	a.notify_owner_loaded(Arc::new(String::from("a")));
	b.notify_owner_loaded(Arc::new(String::from("b")));

	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(manager.outstanding(), 0);
}

#[test]
fn already_loaded_container_completes_inline() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let marker = id(0x1_0030);
	let hits = Arc::new(AtomicUsize::new(0));
	manager.track(marker, OwnerKey::next(), counting_initializer::<u8>(&hits));

	let container = child_container(marker);
	container.notify_owner_loaded(Arc::new(5u8));
	hub.announce(&container);

	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert!(!manager.is_registered());
}

#[test]
fn unrelated_containers_are_ignored() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let hits = Arc::new(AtomicUsize::new(0));
	manager.track(id(0x1_0040), OwnerKey::next(), counting_initializer::<u8>(&hits));

	let other = child_container(id(0x1_0041));
	let unmarked = Container::new(SessionScope::new(), CreationParams::new("plain"));
	hub.announce(&other);
	hub.announce(&unmarked);
	other.notify_owner_loaded(Arc::new(1u8));
	unmarked.notify_owner_loaded(Arc::new(1u8));

	assert_eq!(hits.load(Ordering::SeqCst), 0);
	assert!(manager.is_awaiting(id(0x1_0040)));
}

#[test]
fn wrong_component_type_still_settles_the_count() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let marker = id(0x1_0050);
	let hits = Arc::new(AtomicUsize::new(0));
	manager.track(marker, OwnerKey::next(), counting_initializer::<String>(&hits));

	let container = child_container(marker);
	hub.announce(&container);
	container.notify_owner_loaded(Arc::new(9u64));

	assert_eq!(hits.load(Ordering::SeqCst), 0);
	assert_eq!(manager.outstanding(), 0);
	assert!(!manager.is_registered());
}

#[test]
fn retired_requester_releases_only_its_entries() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let (alive, retired) = (OwnerKey::next(), OwnerKey::next());
	let hits = Arc::new(AtomicUsize::new(0));
	manager.track(id(0x1_0060), retired, counting_initializer::<u8>(&hits));
	manager.track(id(0x1_0061), retired, counting_initializer::<u8>(&hits));
	manager.track(id(0x1_0062), alive, counting_initializer::<u8>(&hits));

	assert_eq!(manager.release_requester(retired), 2);
	assert_eq!(manager.outstanding(), 1);
	assert!(manager.is_registered());

	assert_eq!(manager.release_requester(alive), 1);
	assert!(!manager.is_registered());
	assert_eq!(hub.observer_count(), 0);
}

#[test]
fn tracking_an_occupied_id_keeps_the_first_initializer() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let marker = id(0x1_0080);
	let (first, second) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));

	assert!(manager.track(marker, OwnerKey::next(), counting_initializer::<u8>(&first)));
	assert!(!manager.track(marker, OwnerKey::next(), counting_initializer::<u8>(&second)));
	assert_eq!(manager.outstanding(), 1);

	let container = child_container(marker);
	hub.announce(&container);
	container.notify_owner_loaded(Arc::new(1u8));
	assert_eq!(first.load(Ordering::SeqCst), 1);
	assert_eq!(second.load(Ordering::SeqCst), 0);
	assert!(!manager.is_registered());
}

#[test]
fn dropped_manager_leaves_a_dead_registration_harmless() {
	let hub = LifecycleHub::new();
	let manager = ObserverLifecycleManager::new(hub.clone());
	let hits = Arc::new(AtomicUsize::new(0));
	let marker = id(0x1_0070);
	manager.track(marker, OwnerKey::next(), counting_initializer::<u8>(&hits));
	drop(manager);

	let container = child_container(marker);
	hub.announce(&container);
	container.notify_owner_loaded(Arc::new(1u8));
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "underflow")]
fn decrement_below_zero_asserts() {
	let manager = ObserverLifecycleManager::new(LifecycleHub::new());
	let mut state = ManagerState::default();
	let _ = manager.decrement(&mut state);
}
