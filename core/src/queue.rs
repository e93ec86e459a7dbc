use std::collections::{HashSet, VecDeque};

use log::warn;

use crate::RegionCoord;

/// Ordered, deduplicated queue of region coordinates.
///
/// Pushing a coordinate that is already queued leaves the queue unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoordQueue {
    order: VecDeque<RegionCoord>,
    members: HashSet<RegionCoord>,
}

impl CoordQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a queue from packed coordinates, keeping the first occurrence of each.
    ///
    /// Coordinates that are not addressable are dropped.
    #[must_use]
    pub fn from_packed(packed: &[i64]) -> Self {
        let (kept, dropped): (Vec<RegionCoord>, Vec<RegionCoord>) = packed
            .iter()
            .copied()
            .map(RegionCoord::unpack)
            .partition(RegionCoord::is_addressable);
        if !dropped.is_empty() {
            warn!("dropped {} unaddressable queued regions", dropped.len());
        }
        kept.into_iter().collect()
    }

    /// Appends the coordinate unless it is already queued.
    ///
    /// Returns `true` when the coordinate was added.
    pub fn push(&mut self, coord: RegionCoord) -> bool {
        if !self.members.insert(coord) {
            return false;
        }
        self.order.push_back(coord);
        true
    }

    /// Removes and returns the coordinate at the front of the queue.
    pub fn pop(&mut self) -> Option<RegionCoord> {
        let coord = self.order.pop_front()?;
        let _ = self.members.remove(&coord);
        Some(coord)
    }

    /// Coordinate at the front of the queue.
    #[must_use]
    pub fn front(&self) -> Option<RegionCoord> {
        self.order.front().copied()
    }

    /// Removes up to `limit` coordinates matching the predicate, preserving
    /// the relative order of everything left behind.
    pub fn take_matching<F>(&mut self, limit: usize, mut predicate: F) -> Vec<RegionCoord>
    where
        F: FnMut(RegionCoord) -> bool,
    {
        let mut taken = Vec::new();
        if limit == 0 {
            return taken;
        }

        let mut kept = VecDeque::with_capacity(self.order.len());
        for coord in self.order.drain(..) {
            if taken.len() < limit && predicate(coord) {
                taken.push(coord);
            } else {
                kept.push_back(coord);
            }
        }
        self.order = kept;
        for coord in &taken {
            let _ = self.members.remove(coord);
        }
        taken
    }

    /// Reports whether the coordinate is queued.
    #[must_use]
    pub fn contains(&self, coord: RegionCoord) -> bool {
        self.members.contains(&coord)
    }

    /// Number of queued coordinates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Reports whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Removes every queued coordinate.
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    /// Iterator over the queued coordinates in order.
    pub fn iter(&self) -> impl Iterator<Item = RegionCoord> + '_ {
        self.order.iter().copied()
    }

    /// Queued coordinates in order, packed for persistence.
    #[must_use]
    pub fn to_packed(&self) -> Vec<i64> {
        self.order.iter().map(|coord| coord.pack()).collect()
    }
}

impl FromIterator<RegionCoord> for CoordQueue {
    fn from_iter<I: IntoIterator<Item = RegionCoord>>(iter: I) -> Self {
        let mut queue = Self::new();
        for coord in iter {
            let _ = queue.push(coord);
        }
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::CoordQueue;
    use crate::RegionCoord;

    #[test]
    fn enqueuing_twice_leaves_length_unchanged() {
        let mut queue = CoordQueue::new();
        let coord = RegionCoord::new(3, -2);
        assert!(queue.push(coord));
        assert_eq!(queue.len(), 1);
        assert!(!queue.push(coord));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn popped_coordinates_may_be_queued_again() {
        let mut queue = CoordQueue::new();
        let coord = RegionCoord::new(0, 0);
        let _ = queue.push(coord);
        assert_eq!(queue.pop(), Some(coord));
        assert!(queue.push(coord));
    }

    #[test]
    fn packed_round_trip_keeps_order_and_drops_duplicates() {
        let coords = [
            RegionCoord::new(1, 1),
            RegionCoord::new(-1, 4),
            RegionCoord::new(1, 1),
            RegionCoord::new(0, -7),
        ];
        let packed: Vec<i64> = coords.iter().map(|coord| coord.pack()).collect();
        let queue = CoordQueue::from_packed(&packed);
        assert_eq!(
            queue.iter().collect::<Vec<_>>(),
            vec![coords[0], coords[1], coords[3]]
        );
        assert_eq!(CoordQueue::from_packed(&queue.to_packed()), queue);
    }

    #[test]
    fn unaddressable_packed_coordinates_are_dropped() {
        let packed = [
            RegionCoord::new(i32::MAX, 0).pack(),
            RegionCoord::new(2, 2).pack(),
            RegionCoord::new(0, i32::MIN).pack(),
        ];
        let queue = CoordQueue::from_packed(&packed);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![RegionCoord::new(2, 2)]);
    }

    #[test]
    fn take_matching_respects_limit_and_order() {
        let mut queue: CoordQueue = (0..6).map(|x| RegionCoord::new(x, 0)).collect();
        let taken = queue.take_matching(2, |coord| coord.x() % 2 == 1);
        assert_eq!(taken, vec![RegionCoord::new(1, 0), RegionCoord::new(3, 0)]);
        assert_eq!(
            queue.iter().map(|coord| coord.x()).collect::<Vec<_>>(),
            vec![0, 2, 4, 5]
        );
        assert!(!queue.contains(RegionCoord::new(3, 0)));
        assert!(queue.push(RegionCoord::new(3, 0)));
    }
}
