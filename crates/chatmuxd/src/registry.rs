//! Participant registry.
//!
//! Slot layout:
//!
//! ```text
//!  slot:   0          1           2        3        ...      2 + n - 1
//!        ┌──────────┬───────────┬────────┬────────┬───────┬──────────┐
//!        │ listener │ operator  │ client │ client │  ...  │  client  │
//!        └──────────┴───────────┴────────┴────────┴───────┴──────────┘
//!         fixed      fixed       contiguous tail, arrival order
//! ```
//!
//! Slots 0 and 1 are never recycled for clients. Removing a client shifts the
//! rest of the tail left, so the tail has no gaps and keeps arrival order.
//! Callers that need to survive removals in the middle of a pass look clients
//! up by [`ParticipantId`] instead of holding on to slot numbers.

use chatmux_core::ParticipantId;
use thiserror::Error;

use crate::router::Endpoint;

/// Slot of the listening endpoint.
pub const LISTENER_SLOT: usize = 0;

/// Slot of the operator channel.
pub const OPERATOR_SLOT: usize = 1;

/// First slot available to remote clients.
pub const FIRST_CLIENT_SLOT: usize = 2;

/// Errors from registry mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Relay full (max clients: {max})")]
    Full { max: usize },
}

/// Listener, operator channel and the remote clients, in slot order.
#[derive(Debug)]
pub struct Registry<L, O, C> {
    listener: L,
    operator: O,
    clients: Vec<C>,
    max_clients: usize,
}

impl<L, O, C> Registry<L, O, C> {
    pub fn new(listener: L, operator: O, max_clients: usize) -> Self {
        Self {
            listener,
            operator,
            clients: Vec::with_capacity(max_clients),
            max_clients,
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn operator_mut(&mut self) -> &mut O {
        &mut self.operator
    }

    /// Operator and clients borrowed together, for fan-out.
    pub fn split_mut(&mut self) -> (&mut O, &mut [C]) {
        (&mut self.operator, &mut self.clients)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Total number of occupied slots, fixed ones included.
    pub fn len(&self) -> usize {
        FIRST_CLIENT_SLOT + self.clients.len()
    }

    /// Never true: the two fixed slots are always occupied.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Appends a client to the tail and returns its slot.
    pub fn add(&mut self, client: C) -> Result<usize, RegistryError> {
        if self.is_full() {
            return Err(RegistryError::Full {
                max: self.max_clients,
            });
        }
        self.clients.push(client);
        Ok(FIRST_CLIENT_SLOT + self.clients.len() - 1)
    }

    /// Removes the client at `slot`, shifting later clients left.
    ///
    /// Returns `None` for the fixed slots and for empty slots.
    pub fn remove(&mut self, slot: usize) -> Option<C> {
        let index = slot.checked_sub(FIRST_CLIENT_SLOT)?;
        if index >= self.clients.len() {
            return None;
        }
        Some(self.clients.remove(index))
    }

    pub fn client_at(&self, slot: usize) -> Option<&C> {
        self.clients.get(slot.checked_sub(FIRST_CLIENT_SLOT)?)
    }

    /// Visits every client in slot order.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(usize, &C),
    {
        for (index, client) in self.clients.iter().enumerate() {
            visitor(FIRST_CLIENT_SLOT + index, client);
        }
    }

    pub fn clients(&self) -> impl Iterator<Item = &C> {
        self.clients.iter()
    }
}

impl<L, O, C: Endpoint> Registry<L, O, C> {
    pub fn slot_of(&self, id: ParticipantId) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.id() == id)
            .map(|index| FIRST_CLIENT_SLOT + index)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.slot_of(id).is_some()
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut C> {
        self.clients.iter_mut().find(|c| c.id() == id)
    }

    /// Removes a client by identity, returning the slot it occupied.
    pub fn remove_by_id(&mut self, id: ParticipantId) -> Option<(usize, C)> {
        let slot = self.slot_of(id)?;
        self.remove(slot).map(|client| (slot, client))
    }

    /// Client ids in slot order.
    pub fn client_ids(&self) -> Vec<ParticipantId> {
        self.clients.iter().map(Endpoint::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmux_core::ParticipantError;

    #[derive(Debug, PartialEq)]
    struct Fake(u64);

    impl Endpoint for Fake {
        fn id(&self) -> ParticipantId {
            ParticipantId::new(self.0)
        }

        fn send(&mut self, _payload: &[u8]) -> Result<(), ParticipantError> {
            Ok(())
        }
    }

    fn registry(max: usize) -> Registry<(), (), Fake> {
        Registry::new((), (), max)
    }

    fn ids(r: &Registry<(), (), Fake>) -> Vec<u64> {
        r.client_ids().iter().map(|id| id.as_u64()).collect()
    }

    #[test]
    fn test_add_assigns_tail_slots() {
        let mut r = registry(4);
        assert_eq!(r.add(Fake(2)).unwrap(), 2);
        assert_eq!(r.add(Fake(3)).unwrap(), 3);
        assert_eq!(r.len(), 4);
        assert_eq!(r.client_count(), 2);
    }

    #[test]
    fn test_add_past_capacity_is_rejected() {
        let mut r = registry(2);
        r.add(Fake(2)).unwrap();
        r.add(Fake(3)).unwrap();
        assert!(r.is_full());
        assert_eq!(r.add(Fake(4)), Err(RegistryError::Full { max: 2 }));
        assert_eq!(ids(&r), vec![2, 3]);
    }

    #[test]
    fn test_zero_capacity_refuses_everyone() {
        let mut r = registry(0);
        assert!(r.is_full());
        assert!(r.add(Fake(2)).is_err());
    }

    #[test]
    fn test_fixed_slots_cannot_be_removed() {
        let mut r = registry(2);
        r.add(Fake(2)).unwrap();
        assert!(r.remove(LISTENER_SLOT).is_none());
        assert!(r.remove(OPERATOR_SLOT).is_none());
        assert!(r.remove(9).is_none());
        assert_eq!(r.client_count(), 1);
    }

    #[test]
    fn test_remove_compacts_and_keeps_order() {
        let mut r = registry(8);
        for id in 2..6 {
            r.add(Fake(id)).unwrap();
        }

        assert_eq!(r.remove(3), Some(Fake(3)));
        assert_eq!(ids(&r), vec![2, 4, 5]);
        assert_eq!(r.slot_of(ParticipantId::new(4)), Some(3));
        assert_eq!(r.slot_of(ParticipantId::new(5)), Some(4));

        let mut seen = Vec::new();
        r.for_each(|slot, c| seen.push((slot, c.0)));
        assert_eq!(seen, vec![(2, 2), (3, 4), (4, 5)]);
    }

    #[test]
    fn test_remove_by_id_reports_slot() {
        let mut r = registry(8);
        r.add(Fake(2)).unwrap();
        r.add(Fake(3)).unwrap();

        let (slot, removed) = r.remove_by_id(ParticipantId::new(3)).unwrap();
        assert_eq!(slot, 3);
        assert_eq!(removed, Fake(3));
        assert!(r.remove_by_id(ParticipantId::new(3)).is_none());
        assert!(!r.contains(ParticipantId::new(3)));
    }

    #[test]
    fn test_repeated_cycles_at_same_slot_stay_contiguous() {
        let mut r = registry(3);
        r.add(Fake(2)).unwrap();

        for id in 10..60 {
            let slot = r.add(Fake(id)).unwrap();
            assert_eq!(slot, 3);
            assert_eq!(r.remove(slot), Some(Fake(id)));
            assert_eq!(r.len(), 3);
            assert_eq!(ids(&r), vec![2]);
        }
    }

    #[test]
    fn test_get_mut_and_client_at() {
        let mut r = registry(4);
        r.add(Fake(7)).unwrap();
        assert!(r.get_mut(ParticipantId::new(7)).is_some());
        assert!(r.get_mut(ParticipantId::new(8)).is_none());
        assert_eq!(r.client_at(2), Some(&Fake(7)));
        assert_eq!(r.client_at(1), None);
    }
}
