//! Correlation identifiers and their allocator.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// First id the broker hands out. Everything below is left to callers that
/// tag boundary operations by hand.
pub const FIRST_BROKER_ID: u32 = 0x1_0000;

/// Key linking a launched boundary operation to its eventual result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u32);

impl CorrelationId {
	/// Wraps a raw id received from the boundary.
	#[must_use]
	pub const fn from_raw(raw: u32) -> Self {
		Self(raw)
	}

	/// Returns the raw integer passed across the boundary.
	#[must_use]
	pub const fn get(self) -> u32 {
		self.0
	}

	/// Returns true for ids in the range reserved for manual tagging.
	#[must_use]
	pub const fn is_reserved(self) -> bool {
		self.0 < FIRST_BROKER_ID
	}
}

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{:x}", self.0)
	}
}

/// Monotonic, lock-free id source shared by every owner of a broker.
#[derive(Debug)]
pub struct IdAllocator {
	offset: u32,
	next: AtomicU32,
}

impl Default for IdAllocator {
	fn default() -> Self {
		Self::starting_at(FIRST_BROKER_ID)
	}
}

impl IdAllocator {
	/// Creates an allocator whose first id is `offset`, raised to
	/// [`FIRST_BROKER_ID`] if it would land in the reserved range.
	#[must_use]
	pub fn starting_at(offset: u32) -> Self {
		let offset = offset.max(FIRST_BROKER_ID);
		Self {
			offset,
			next: AtomicU32::new(offset),
		}
	}

	/// Process-wide allocator used by brokers built with the default offset.
	pub fn shared() -> Arc<Self> {
		static SHARED: OnceLock<Arc<IdAllocator>> = OnceLock::new();
		Arc::clone(SHARED.get_or_init(|| Arc::new(Self::default())))
	}

	/// Returns the first id of the allocator's range.
	#[must_use]
	pub const fn offset(&self) -> u32 {
		self.offset
	}

	/// Moves the counter up to at least `floor`. Never moves it back, so ids
	/// already handed out are not reissued.
	pub fn advance_to(&self, floor: u32) {
		let floor = floor.max(self.offset);
		let previous = self.next.fetch_max(floor, Ordering::AcqRel);
		if previous < floor {
			tracing::debug!(from = previous, to = floor, "broker.id.advanced");
		}
	}

	/// Returns the next id. Exhausting `u32` wraps back to the offset.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&self) -> CorrelationId {
		let offset = self.offset;
		let raw = self
			.next
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(if cur == u32::MAX { offset } else { cur + 1 }))
			.unwrap_or_else(|cur| cur);
		CorrelationId(raw)
	}

	#[cfg(test)]
	fn positioned(offset: u32, next: u32) -> Self {
		Self {
			offset,
			next: AtomicU32::new(next),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn ids_start_above_reserved_range() {
		let alloc = IdAllocator::default();
		let first = alloc.next();
		assert_eq!(first.get(), FIRST_BROKER_ID);
		assert!(!first.is_reserved());
		assert!(CorrelationId::from_raw(7).is_reserved());
	}

	#[test]
	fn low_offsets_are_clamped() {
		let alloc = IdAllocator::starting_at(3);
		assert_eq!(alloc.offset(), FIRST_BROKER_ID);
		assert_eq!(alloc.next().get(), FIRST_BROKER_ID);
	}

	#[test]
	fn ids_are_monotonic() {
		let alloc = IdAllocator::starting_at(0x2_0000);
		let a = alloc.next();
		let b = alloc.next();
		let c = alloc.next();
		assert!(a < b && b < c);
	}

	#[test]
	fn exhaustion_wraps_to_offset() {
		let alloc = IdAllocator::positioned(FIRST_BROKER_ID, u32::MAX);
		assert_eq!(alloc.next().get(), u32::MAX);
		assert_eq!(alloc.next().get(), FIRST_BROKER_ID);
	}

	#[test]
	fn concurrent_allocation_never_duplicates() {
		let alloc = Arc::new(IdAllocator::default());
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let alloc = Arc::clone(&alloc);
				std::thread::spawn(move || (0..500).map(|_| alloc.next()).collect::<Vec<_>>())
			})
			.collect();

		let mut seen = HashSet::new();
		for handle in handles {
			for id in handle.join().unwrap() {
				assert!(seen.insert(id), "duplicate id {id}");
			}
		}
		assert_eq!(seen.len(), 4000);
	}

	#[test]
	fn advancing_only_raises_the_counter() {
		let alloc = IdAllocator::default();
		alloc.advance_to(0x2_0000);
		assert_eq!(alloc.next().get(), 0x2_0000);

		alloc.advance_to(0x2_0000);
		alloc.advance_to(7);
		assert_eq!(alloc.next().get(), 0x2_0001);
	}

	#[test]
	fn shared_allocator_is_one_instance() {
		assert!(Arc::ptr_eq(&IdAllocator::shared(), &IdAllocator::shared()));
	}
}
