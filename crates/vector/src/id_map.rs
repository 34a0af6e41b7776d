use std::collections::HashMap;
use vitaledge_common::VectorId;

/// Bidirectional caller id <-> internal position map
///
/// Positions are dense: `slot_to_id[p]` is the caller id stored at row `p`
/// of the base index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMap {
    slot_to_id: Vec<VectorId>,
    id_to_slot: HashMap<VectorId, usize>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ids listed in position order, `None` if any id repeats
    pub fn from_ids(ids: Vec<VectorId>) -> Option<Self> {
        let mut id_to_slot = HashMap::with_capacity(ids.len());
        for (slot, &id) in ids.iter().enumerate() {
            if id_to_slot.insert(id, slot).is_some() {
                return None;
            }
        }

        Some(Self {
            slot_to_id: ids,
            id_to_slot,
        })
    }

    pub fn len(&self) -> usize {
        self.slot_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_to_id.is_empty()
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.id_to_slot.contains_key(&id)
    }

    pub fn slot_of(&self, id: VectorId) -> Option<usize> {
        self.id_to_slot.get(&id).copied()
    }

    pub fn id_at(&self, slot: usize) -> Option<VectorId> {
        self.slot_to_id.get(slot).copied()
    }

    /// Ids in position order
    pub fn ids(&self) -> &[VectorId] {
        &self.slot_to_id
    }

    /// Map `id` to the next position
    pub fn push(&mut self, id: VectorId) -> usize {
        let slot = self.slot_to_id.len();
        self.slot_to_id.push(id);
        self.id_to_slot.insert(id, slot);
        slot
    }

    /// Forget `ids` and shift the positions of every later id down,
    /// mirroring a compacting removal in the base index
    pub fn remove(&mut self, ids: &[VectorId]) {
        self.slot_to_id.retain(|id| !ids.contains(id));
        self.id_to_slot = self
            .slot_to_id
            .iter()
            .enumerate()
            .map(|(slot, &id)| (id, slot))
            .collect();
    }

    pub fn clear(&mut self) {
        self.slot_to_id.clear();
        self.id_to_slot.clear();
    }
}
