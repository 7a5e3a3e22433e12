//! Breakpoint table (spec.md §4.10, L6): a fixed-capacity set of slots
//! with dirty-tracking refresh-on-run semantics, grounded on
//! `original_source/drivers/device.c`'s `addbrk`/`delbrk`/`device_setbrk`.

use bitflags::bitflags;

use crate::address::Address;

/// Fixed slot capacity (spec.md §3, §8).
pub const MAX_BREAKPOINTS: usize = 32;

/// The kind of breakpoint a slot holds (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakType {
    Break,
    Watch,
    Read,
    Write,
}

bitflags! {
    /// Per-slot state flags (spec.md §3).
    pub struct BreakFlags: u8 {
        const ENABLED = 0x01;
        const DIRTY = 0x02;
    }
}

/// One breakpoint table slot.
#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pub addr: Address,
    pub bp_type: BreakType,
    pub flags: BreakFlags,
}

impl Default for Breakpoint {
    fn default() -> Self {
        Breakpoint {
            addr: Address::new(0),
            bp_type: BreakType::Break,
            flags: BreakFlags::empty(),
        }
    }
}

/// The fixed-capacity breakpoint table (spec.md §3, §4.10).
///
/// Invariant: at most one `ENABLED` entry per `(address, type)` pair
/// (enforced by `set` searching for an existing match before taking a
/// free slot, mirroring `addbrk`).
#[derive(Debug, Clone)]
pub struct BreakpointTable {
    slots: [Breakpoint; MAX_BREAKPOINTS],
}

impl Default for BreakpointTable {
    fn default() -> Self {
        BreakpointTable {
            slots: [Breakpoint::default(); MAX_BREAKPOINTS],
        }
    }
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[Breakpoint; MAX_BREAKPOINTS] {
        &self.slots
    }

    /// Implicit-slot form: search for an existing enabled `(addr, type)`
    /// match, else take the first free slot. Returns `None` if the table
    /// is full and no match exists (mirrors `addbrk` returning -1).
    fn add(&mut self, addr: Address, bp_type: BreakType) -> Option<usize> {
        let mut free = None;
        for (i, bp) in self.slots.iter().enumerate() {
            if bp.flags.contains(BreakFlags::ENABLED) {
                if bp.addr == addr && bp.bp_type == bp_type {
                    return Some(i);
                }
            } else if free.is_none() {
                free = Some(i);
            }
        }
        let which = free?;
        let bp = &mut self.slots[which];
        bp.flags = BreakFlags::ENABLED | BreakFlags::DIRTY;
        bp.addr = addr;
        bp.bp_type = bp_type;
        Some(which)
    }

    fn remove_matching(&mut self, addr: Address, bp_type: BreakType) {
        for bp in self.slots.iter_mut() {
            if bp.flags.contains(BreakFlags::ENABLED) && bp.addr == addr && bp.bp_type == bp_type {
                bp.flags = BreakFlags::DIRTY;
                bp.addr = Address::new(0);
            }
        }
    }

    /// `setbrk(slot_hint, enabled, addr, type)` (spec.md §4.10).
    ///
    /// `which = None` is the implicit-slot form: enabling searches for a
    /// match or allocates a free slot; disabling clears any matching
    /// enabled entries. `which = Some(i)` is the explicit-slot form: the
    /// slot is set directly, marked `DIRTY` only if its content actually
    /// changes.
    pub fn set(
        &mut self,
        which: Option<usize>,
        enabled: bool,
        addr: Address,
        bp_type: BreakType,
    ) -> Option<usize> {
        match which {
            None => {
                if enabled {
                    self.add(addr, bp_type)
                } else {
                    self.remove_matching(addr, bp_type);
                    None
                }
            }
            Some(i) => {
                let addr = if enabled { addr } else { Address::new(0) };
                let new_flags = if enabled {
                    BreakFlags::ENABLED
                } else {
                    BreakFlags::empty()
                };
                let bp = &mut self.slots[i];
                if bp.addr != addr || (bp.flags & BreakFlags::ENABLED) != new_flags {
                    bp.flags = new_flags | BreakFlags::DIRTY;
                    bp.addr = addr;
                    bp.bp_type = bp_type;
                }
                Some(i)
            }
        }
    }

    /// Iterates the dirty `BREAK` slots that need to be re-issued to the
    /// dongle, yielding `(slot_index, address_or_zero)`. Callers clear
    /// `DIRTY` via [`Self::clear_dirty`] once the dongle command succeeds.
    pub fn dirty_breaks(&self) -> impl Iterator<Item = (usize, Address)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, bp)| {
            if bp.flags.contains(BreakFlags::DIRTY) && bp.bp_type == BreakType::Break {
                let addr = if bp.flags.contains(BreakFlags::ENABLED) {
                    bp.addr
                } else {
                    Address::new(0)
                };
                Some((i, addr))
            } else {
                None
            }
        })
    }

    pub fn clear_dirty(&mut self, slot: usize) {
        self.slots[slot].flags.remove(BreakFlags::DIRTY);
    }

    pub fn enabled_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|bp| bp.flags.contains(BreakFlags::ENABLED))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setbrk_then_run_clears_dirty() {
        let mut table = BreakpointTable::new();
        let slot = table
            .set(None, true, Address::new(0x4000), BreakType::Break)
            .unwrap();
        assert_eq!(slot, 0);

        let dirty: Vec<_> = table.dirty_breaks().collect();
        assert_eq!(dirty, vec![(0, Address::new(0x4000))]);

        table.clear_dirty(0);
        assert!(table.dirty_breaks().next().is_none());

        table.set(Some(0), false, Address::new(0), BreakType::Break);
        let dirty: Vec<_> = table.dirty_breaks().collect();
        assert_eq!(dirty, vec![(0, Address::new(0))]);
    }

    #[test]
    fn enabled_count_never_exceeds_capacity() {
        let mut table = BreakpointTable::new();
        for i in 0..MAX_BREAKPOINTS as u32 {
            table.set(None, true, Address::new(i), BreakType::Break);
        }
        assert_eq!(table.enabled_count(), MAX_BREAKPOINTS);
        // The table is full: one more add must fail.
        assert!(table
            .set(None, true, Address::new(9999), BreakType::Break)
            .is_none());
        assert_eq!(table.enabled_count(), MAX_BREAKPOINTS);
    }

    #[test]
    fn duplicate_enable_reuses_slot() {
        let mut table = BreakpointTable::new();
        let a = table
            .set(None, true, Address::new(0x10), BreakType::Break)
            .unwrap();
        let b = table
            .set(None, true, Address::new(0x10), BreakType::Break)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(table.enabled_count(), 1);
    }
}
