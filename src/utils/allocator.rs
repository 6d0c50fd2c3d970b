use serde::{Deserialize, Serialize};

/// Stable handle into an [`Arena`]. The generation counter makes handles to
/// removed slots resolve to `None` instead of aliasing a recycled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new(u32::MAX, 0)
    }
}

enum Slot<T> {
    Free { next_generation: u32 },
    Occupied { generation: u32, value: T },
}

/// Generational arena handing out [`EntityId`]s. Bodies and joint descriptors
/// live here; everything else refers to them by handle.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> EntityId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Free { next_generation } => *next_generation,
                Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            *slot = Slot::Occupied { generation, value };
            return EntityId::new(index, generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        EntityId::new(index, 0)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        match self.slots.get(id.index())? {
            Slot::Occupied { generation, value } if *generation == id.generation() => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self.slots.get_mut(id.index())? {
            Slot::Occupied { generation, value } if *generation == id.generation() => Some(value),
            _ => None,
        }
    }

    /// Mutable access to two distinct entries at once, for two-body solves.
    pub fn get2_mut(&mut self, id_a: EntityId, id_b: EntityId) -> Option<(&mut T, &mut T)> {
        if id_a.index() == id_b.index() {
            return None;
        }

        let (low, high, flipped) = if id_a.index() < id_b.index() {
            (id_a, id_b, false)
        } else {
            (id_b, id_a, true)
        };

        if high.index() >= self.slots.len() {
            return None;
        }

        let (left, right) = self.slots.split_at_mut(high.index());
        let first = match &mut left[low.index()] {
            Slot::Occupied { generation, value } if *generation == low.generation() => value,
            _ => return None,
        };
        let second = match &mut right[0] {
            Slot::Occupied { generation, value } if *generation == high.generation() => value,
            _ => return None,
        };

        if flipped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation() => {
                let next_generation = generation.wrapping_add(1);
                let old = std::mem::replace(slot, Slot::Free { next_generation });
                self.free.push(id.index() as u32);
                match old {
                    Slot::Occupied { value, .. } => Some(value),
                    Slot::Free { .. } => unreachable!(),
                }
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, value } => {
                Some((EntityId::new(index as u32, *generation), value))
            }
            Slot::Free { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((EntityId::new(index as u32, *generation), value))
                }
                Slot::Free { .. } => None,
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut arena = Arena::new();
        let a = arena.insert(10);
        let b = arena.insert(20);
        assert_eq!(arena.get(a), Some(&10));
        assert_eq!(arena.get(b), Some(&20));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn stale_handle_resolves_to_none_after_reuse() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);
        assert_eq!(a.index(), b.index());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn get2_mut_returns_disjoint_references() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let (ra, rb) = arena.get2_mut(a, b).unwrap();
        std::mem::swap(ra, rb);
        assert_eq!(arena.get(a), Some(&2));
        assert_eq!(arena.get(b), Some(&1));
        assert!(arena.get2_mut(a, a).is_none());
    }
}
