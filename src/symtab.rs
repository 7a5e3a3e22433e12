//! Symbol store (spec.md §6 "Symbol store"), grounded on
//! `original_source/util/stab.c`: two [`BTree`]s kept in sync, one
//! keyed by name for `get`, one keyed by `(address, name)` for
//! `nearest`'s floor search.

use crate::address::Address;
use crate::btree::{BTree, SelectMode};

const BRANCHING: usize = 32;

/// Sentinel suffix guaranteed to sort after any real symbol name at the
/// same address, letting `nearest` floor-search with [`SelectMode::Le`]
/// (mirrors `stab_nearest`'s `0xff`-filled scratch key).
fn addr_key_ceiling(addr: Address) -> (Address, String) {
    (addr, "\u{10ffff}\u{10ffff}\u{10ffff}\u{10ffff}".to_string())
}

/// The symbol table (spec.md §6): `get(name) -> address`,
/// `nearest(address) -> (name, offset)`, `set(name, address)`.
#[derive(Debug)]
pub struct SymbolTable {
    by_name: BTree<String, Address>,
    by_addr: BTree<(Address, String), ()>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            by_name: BTree::new(BRANCHING),
            by_addr: BTree::new(BRANCHING),
        }
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.by_addr.clear();
    }

    /// Sets `name` to `addr`, removing any prior reverse mapping first
    /// (mirrors `stab_set`).
    pub fn set(&mut self, name: &str, addr: Address) {
        if let Some(old) = self.by_name.get(&name.to_string()) {
            self.by_addr.delete(&(old, name.to_string()));
        }
        self.by_addr.put((addr, name.to_string()), ());
        self.by_name.put(name.to_string(), addr);
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.by_name.get(&name.to_string())
    }

    /// Removes `name`. Returns `true` if it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        match self.by_name.get(&name.to_string()) {
            Some(addr) => {
                self.by_name.delete(&name.to_string());
                self.by_addr.delete(&(addr, name.to_string()));
                true
            }
            None => false,
        }
    }

    /// Finds the symbol at or below `addr` with the highest address
    /// (mirrors `stab_nearest`'s `BTREE_LE` floor search), returning
    /// `(name, offset)`.
    pub fn nearest(&mut self, addr: Address) -> Option<(String, u32)> {
        let ceiling = addr_key_ceiling(addr);
        let ((found_addr, name), ()) = self.by_addr.select(Some(&ceiling), SelectMode::Le)?;
        Some((name, addr.raw() - found_addr.raw()))
    }

    /// Visits every `(name, address)` pair in address order (mirrors
    /// `stab_enum`).
    pub fn for_each(&self, mut f: impl FnMut(&str, Address)) {
        for ((addr, name), ()) in self.by_addr.iter_entries() {
            f(&name, addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut st = SymbolTable::new();
        st.set("main", Address::new(0x4400));
        assert_eq!(st.get("main"), Some(Address::new(0x4400)));
    }

    #[test]
    fn nearest_finds_floor_symbol_with_offset() {
        let mut st = SymbolTable::new();
        st.set("main", Address::new(0x4400));
        st.set("loop", Address::new(0x4420));
        let (name, off) = st.nearest(Address::new(0x4430)).unwrap();
        assert_eq!(name, "loop");
        assert_eq!(off, 0x10);
    }

    #[test]
    fn nearest_below_everything_is_none() {
        let mut st = SymbolTable::new();
        st.set("main", Address::new(0x4400));
        assert!(st.nearest(Address::new(0x100)).is_none());
    }

    #[test]
    fn re_set_moves_reverse_mapping() {
        let mut st = SymbolTable::new();
        st.set("x", Address::new(0x10));
        st.set("x", Address::new(0x20));
        assert_eq!(st.get("x"), Some(Address::new(0x20)));
        assert!(st.nearest(Address::new(0x10)).is_none());
        let (name, off) = st.nearest(Address::new(0x20)).unwrap();
        assert_eq!((name.as_str(), off), ("x", 0));
    }

    #[test]
    fn delete_removes_both_mappings() {
        let mut st = SymbolTable::new();
        st.set("x", Address::new(0x10));
        assert!(st.delete("x"));
        assert_eq!(st.get("x"), None);
        assert!(st.nearest(Address::new(0x10)).is_none());
    }
}
