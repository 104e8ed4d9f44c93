//! Generation-checked storage for annotation records.
//!
//! Records live in a [`Slab`]. A [`RecordKey`] pairs the slab slot with the
//! generation stamped at insertion, so a key kept past its record's removal
//! never resolves to whatever record reuses the slot later.

use slab::Slab;

use crate::record::Record;

/// Stable handle to an annotation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
	slot: usize,
	generation: u64,
}

/// Handle to a mutable view registered with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ViewKey(pub(crate) usize);

struct Slot {
	generation: u64,
	record: Record,
}

#[derive(Default)]
pub(crate) struct Arena {
	slots: Slab<Slot>,
	next_generation: u64,
}

impl Arena {
	pub(crate) fn insert(&mut self, record: Record) -> RecordKey {
		let generation = self.next_generation;
		self.next_generation += 1;
		let slot = self.slots.insert(Slot { generation, record });
		RecordKey { slot, generation }
	}

	pub(crate) fn get(&self, key: RecordKey) -> Option<&Record> {
		self.slots
			.get(key.slot)
			.filter(|slot| slot.generation == key.generation)
			.map(|slot| &slot.record)
	}

	pub(crate) fn get_mut(&mut self, key: RecordKey) -> Option<&mut Record> {
		self.slots
			.get_mut(key.slot)
			.filter(|slot| slot.generation == key.generation)
			.map(|slot| &mut slot.record)
	}

	pub(crate) fn contains(&self, key: RecordKey) -> bool {
		self.get(key).is_some()
	}

	pub(crate) fn remove(&mut self, key: RecordKey) -> Option<Record> {
		if !self.contains(key) {
			return None;
		}
		Some(self.slots.remove(key.slot).record)
	}

	pub(crate) fn len(&self) -> usize {
		self.slots.len()
	}

	#[cfg(test)]
	pub(crate) fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = (RecordKey, &Record)> {
		self.slots.iter().map(|(slot, entry)| {
			(
				RecordKey {
					slot,
					generation: entry.generation,
				},
				&entry.record,
			)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(kind: &str) -> Record {
		Record::new(kind.to_string(), 0, 1, format!("id-{kind}"), 0)
	}

	#[test]
	fn test_stale_key_does_not_resolve_reused_slot() {
		let mut arena = Arena::default();
		let first = arena.insert(record("a"));
		assert!(arena.remove(first).is_some());

		let second = arena.insert(record("b"));
		assert!(arena.get(first).is_none());
		assert!(arena.remove(first).is_none());
		assert_eq!(arena.get(second).map(|r| r.kind.as_str()), Some("b"));
		assert_eq!(arena.len(), 1);
	}

	#[test]
	fn test_iter_yields_live_keys() {
		let mut arena = Arena::default();
		let a = arena.insert(record("a"));
		let b = arena.insert(record("b"));
		arena.remove(a);
		let keys: Vec<_> = arena.iter().map(|(key, _)| key).collect();
		assert_eq!(keys, [b]);
	}
}
