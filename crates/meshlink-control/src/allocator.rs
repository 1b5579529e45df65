//! Unicast address allocation.
//!
//! The allocator holds a cursor that only moves forward. It is seeded from the
//! persisted cursor and the end of every stored node's range, so an address
//! still held by a node is never handed out again, even after a restart.

use meshlink_core::UnicastAddress;
use meshlink_store::NodeRecord;

use crate::error::{ControlError, Result};

/// Hands out primary addresses for newly provisioned devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressAllocator {
    cursor: u16,
}

impl AddressAllocator {
    /// Seed from a persisted cursor and the nodes currently registered.
    #[must_use]
    pub fn seed(persisted: u16, nodes: &[NodeRecord]) -> Self {
        let high_water = nodes
            .iter()
            .map(|n| n.address_range().end)
            .max()
            .and_then(|end| u16::try_from(end).ok())
            .unwrap_or(0);
        Self {
            cursor: persisted.max(high_water).max(UnicastAddress::MIN),
        }
    }

    /// The raw cursor value, as persisted.
    #[must_use]
    pub const fn cursor(&self) -> u16 {
        self.cursor
    }

    /// The next free primary address.
    ///
    /// Skips past any node range covering the cursor. The cursor stays on the
    /// returned address until [`advance`](Self::advance) is called.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidAllocation` once the unicast range is
    /// exhausted.
    pub fn next(&mut self, nodes: &[NodeRecord]) -> Result<UnicastAddress> {
        while let Some(node) = nodes.iter().find(|n| n.occupies(self.cursor)) {
            self.cursor = u16::try_from(node.address_range().end).unwrap_or(u16::MAX);
        }
        UnicastAddress::new(self.cursor).map_err(|_| ControlError::InvalidAllocation(self.cursor))
    }

    /// Move the cursor past a device that was just provisioned.
    pub fn advance(&mut self, element_count: u8) {
        self.cursor = self
            .cursor
            .saturating_add(u16::from(element_count.max(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::DeviceUuid;

    fn node(addr: u16, elements: u8) -> NodeRecord {
        let mut node = NodeRecord::new(
            UnicastAddress::new(addr).unwrap(),
            DeviceUuid::from_bytes([addr.to_le_bytes()[0]; 16]),
        );
        node.element_count = elements;
        node
    }

    #[test]
    fn seeds_from_persisted_cursor() {
        let mut alloc = AddressAllocator::seed(0x0002, &[]);
        assert_eq!(alloc.next(&[]).unwrap().get(), 0x0002);
        alloc.advance(3);
        assert_eq!(alloc.next(&[]).unwrap().get(), 0x0005);
    }

    #[test]
    fn seed_never_goes_below_registered_nodes() {
        let nodes = vec![node(0x0002, 1), node(0x0010, 4)];
        let alloc = AddressAllocator::seed(0x0003, &nodes);
        assert_eq!(alloc.cursor(), 0x0014);
    }

    #[test]
    fn zero_cursor_is_lifted_to_first_unicast() {
        let mut alloc = AddressAllocator::seed(0, &[]);
        assert_eq!(alloc.next(&[]).unwrap().get(), 0x0001);
    }

    #[test]
    fn skips_occupied_ranges() {
        let nodes = vec![node(0x0005, 2), node(0x0007, 1)];
        let mut alloc = AddressAllocator { cursor: 0x0006 };
        assert_eq!(alloc.next(&nodes).unwrap().get(), 0x0008);
    }

    #[test]
    fn exhaustion_is_an_invalid_allocation() {
        let mut alloc = AddressAllocator::seed(0x7FFF, &[]);
        assert_eq!(alloc.next(&[]).unwrap().get(), 0x7FFF);
        alloc.advance(1);
        assert!(matches!(
            alloc.next(&[]),
            Err(ControlError::InvalidAllocation(0x8000))
        ));
    }

    #[test]
    fn allocated_ranges_never_overlap() {
        let existing = vec![node(0x0004, 2), node(0x0009, 3)];
        let mut alloc = AddressAllocator::seed(0x0002, &[]);
        let mut allocated: Vec<NodeRecord> = Vec::new();

        for elements in [1u8, 2, 3, 1, 4, 2, 1] {
            let address = alloc.next(&existing).unwrap();
            assert!(existing.iter().all(|n| !n.occupies(address.get())));

            let fresh = node(address.get(), elements);
            assert!(allocated.iter().all(|n| !n.overlaps(&fresh)));
            allocated.push(fresh);
            alloc.advance(elements);
        }
    }
}
