//! Slot-indexed registry of the channels multiplexed over one connection.
//!
//! Channels are looked up by id on every dispatched frame, so the registry
//! is a flat vector indexed by channel id. A slot is vacated only once the
//! close is fully acknowledged (or the connection is torn down), and the
//! lowest vacant id is handed out first, so ids are reused but never while
//! the previous occupant could still receive traffic.

use crate::channel::{ChannelId, ChannelState};

#[derive(Debug)]
pub(crate) struct ChannelRegistry {
    /// Index is the channel id; slot 0 stays empty (reserved for the
    /// connection).
    slots: Vec<Option<ChannelState>>,
    /// Highest id that may be handed out; 0 until the tune completes.
    channel_max: u16,
}

impl ChannelRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            channel_max: 0,
        }
    }

    /// Install the tuned channel limit; 0 from the wire means unlimited.
    pub(crate) fn set_limit(&mut self, channel_max: u16) {
        self.channel_max = if channel_max == 0 { u16::MAX } else { channel_max };
    }

    /// Claim the lowest vacant id and seed it with an opening channel.
    ///
    /// Returns `None` when every id up to the tuned limit is occupied.
    pub(crate) fn allocate(&mut self) -> Option<ChannelId> {
        for id in 1..=self.channel_max {
            let slot = id as usize;
            if self.slots.len() <= slot {
                self.slots.resize_with(slot + 1, || None);
            }
            if self.slots[slot].is_none() {
                self.slots[slot] = Some(ChannelState::opening(id));
                return Some(id);
            }
        }
        None
    }

    pub(crate) fn get(&self, id: ChannelId) -> Option<&ChannelState> {
        self.slots.get(id as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> Option<&mut ChannelState> {
        self.slots.get_mut(id as usize)?.as_mut()
    }

    /// Vacate `id`, returning its state if it was occupied.
    pub(crate) fn release(&mut self, id: ChannelId) -> Option<ChannelState> {
        self.slots.get_mut(id as usize)?.take()
    }

    /// Empty every slot, returning the evicted channels in id order.
    pub(crate) fn drain(&mut self) -> Vec<ChannelState> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    /// Lowest id currently in the `Open` lifecycle state.
    pub(crate) fn lowest_open(&self) -> Option<ChannelId> {
        self.slots
            .iter()
            .flatten()
            .find(|ch| ch.is_open())
            .map(ChannelState::id)
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelRegistry;

    fn tuned(limit: u16) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new();
        registry.set_limit(limit);
        registry
    }

    #[test]
    fn ids_start_at_one_and_ascend() {
        let mut registry = tuned(4);
        assert_eq!(registry.allocate(), Some(1));
        assert_eq!(registry.allocate(), Some(2));
        assert_eq!(registry.allocate(), Some(3));
    }

    #[test]
    fn released_ids_are_reused_lowest_first() {
        let mut registry = tuned(4);
        registry.allocate();
        registry.allocate();
        registry.allocate();
        assert!(registry.release(2).is_some());
        assert_eq!(registry.allocate(), Some(2));
    }

    #[test]
    fn allocation_stops_at_the_tuned_limit() {
        let mut registry = tuned(2);
        assert_eq!(registry.allocate(), Some(1));
        assert_eq!(registry.allocate(), Some(2));
        assert_eq!(registry.allocate(), None);
    }

    #[test]
    fn nothing_is_handed_out_before_the_tune() {
        let mut registry = ChannelRegistry::new();
        assert_eq!(registry.allocate(), None);
    }

    #[test]
    fn drain_empties_every_slot() {
        let mut registry = tuned(8);
        registry.allocate();
        registry.allocate();
        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.allocate(), Some(1));
    }
}
