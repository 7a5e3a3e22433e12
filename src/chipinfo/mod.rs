//! Chip-identification database (spec.md §3, §4.9, L5), grounded on
//! `original_source/util/chipinfo.c/.h` and the TLV scanning in
//! `original_source/drivers/device.c`.

use bitflags::bitflags;

use crate::address::Address;

bitflags! {
    /// Chip feature bits (spec.md §3 "Chip info").
    pub struct Features: u16 {
        const I2C              = 0x0001;
        const LCFE             = 0x0002;
        const QUICK_MEM_READ   = 0x0004;
        const SFLLDH           = 0x0008;
        const FRAM             = 0x0010;
        const NO_BSL           = 0x0020;
        const TMR              = 0x0040;
        const JTAG             = 0x0080;
        const DTC              = 0x0100;
        const SYNC             = 0x0200;
        const INSTR            = 0x0400;
        const QUIRK_1337       = 0x0800;
        const PSACH            = 0x1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Psa {
    Regular,
    Enhanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSys {
    Bc1xx,
    Bc2xx,
    FllPlus,
    ModOsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemType {
    Rom,
    Ram,
    Flash,
    Register,
}

/// A chip identification tuple, and the mask a chip record matches it
/// under (spec.md §3 "Chip ID record").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChipId {
    pub ver_id: u16,
    pub ver_sub_id: u16,
    pub revision: u8,
    pub fab: u8,
    pub self_id: u16,
    pub config: u8,
    pub fuses: u8,
    pub activation_key: u32,
}

impl ChipId {
    /// `match(P, R, M) <=> for every field f: (P.f ^ R.f) & M.f == 0`
    /// (spec.md §8).
    pub fn matches(&self, record: &ChipId, mask: &ChipId) -> bool {
        (self.ver_id ^ record.ver_id) & mask.ver_id == 0
            && (self.ver_sub_id ^ record.ver_sub_id) & mask.ver_sub_id == 0
            && (self.revision ^ record.revision) & mask.revision == 0
            && (self.fab ^ record.fab) & mask.fab == 0
            && (self.self_id ^ record.self_id) & mask.self_id == 0
            && (self.config ^ record.config) & mask.config == 0
            && (self.fuses ^ record.fuses) & mask.fuses == 0
            && (self.activation_key ^ record.activation_key) & mask.activation_key == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Power {
    pub reg_mask: u32,
    pub enable_lpm5: u32,
    pub disable_lpm5: u32,
    pub reg_mask_3v: u32,
    pub enable_lpm5_3v: u32,
    pub disable_lpm5_3v: u32,
}

/// A memory region (spec.md §3 "Memory region").
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub name: &'static str,
    pub mem_type: MemType,
    pub bits: u8,
    pub mapped: bool,
    pub size: u32,
    pub offset: u32,
    pub seg_size: u32,
    pub bank_size: u32,
    pub banks: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ClockMapEntry {
    pub name: &'static str,
    pub value: u8,
}

/// A relocatable funclet: code plus its RAM-relative entry point
/// (spec.md §3 "Funclet").
#[derive(Debug, Clone)]
pub struct Funclet {
    pub max_payload: u16,
    pub entry_point: u16,
    pub code: &'static [u16],
}

/// One chip database record (spec.md §3 "Chip info", §4.9).
#[derive(Debug, Clone)]
pub struct ChipInfo {
    pub name: &'static str,
    pub bits: u8,
    pub psa: Psa,
    pub clock_control: u8,
    pub mclk_control: u16,
    pub clock_sys: ClockSys,
    pub features: Features,

    pub id: ChipId,
    pub id_mask: ChipId,

    pub power: Power,
    pub memory: &'static [MemoryRegion],
    pub clock_map: &'static [ClockMapEntry],

    /// `None` entries fall back to the default HIL v3 function ID.
    pub v3_functions: Option<&'static [(u8, u8)]>,
    pub v3_erase: Option<&'static Funclet>,
    pub v3_write: Option<&'static Funclet>,
    pub v3_unlock: Option<&'static Funclet>,
}

impl ChipInfo {
    /// Selects the mapped region of lowest offset covering `addr`
    /// (spec.md §4.9).
    pub fn find_mem_by_addr(&self, addr: Address) -> Option<&'static MemoryRegion> {
        self.memory
            .iter()
            .filter(|m| m.mapped && addr.raw() >= m.offset && addr.raw() < m.offset + m.size)
            .min_by_key(|m| m.offset)
    }

    pub fn find_mem_by_name(&self, name: &str) -> Option<&'static MemoryRegion> {
        self.memory.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn is_fram(&self) -> bool {
        self.features.contains(Features::FRAM)
    }

    /// Picks the largest RAM region (spec.md §4.7's funclet RAM
    /// staging area), grounded on `drivers/v3hil.c`'s `find_ram`.
    pub fn find_ram(&self) -> Option<&'static MemoryRegion> {
        self.memory
            .iter()
            .filter(|m| m.mem_type == MemType::Ram)
            .max_by_key(|m| m.size)
    }

    /// Remaps a default HIL v3 function ID to this chip's override, if
    /// any (spec.md §4.7 "each chip record carries an optional remap
    /// array").
    pub fn map_fid(&self, default_fid: u8) -> u8 {
        self.v3_functions
            .and_then(|table| table.iter().find(|(from, _)| *from == default_fid))
            .map(|(_, to)| *to)
            .unwrap_or(default_fid)
    }
}

/// Scans a TLV region (spec.md §6 "Chip-identification payloads") for
/// `tag`, returning its value bytes. Stops at tag `0xff`. Grounded on
/// `drivers/device.c`'s `tlv_find`.
pub fn tlv_find(data: &[u8], tag: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i + 2 <= data.len() {
        let t = data[i];
        let len = data[i + 1] as usize;
        if t == 0xff {
            break;
        }
        if t == tag && i + 2 + len <= data.len() {
            return Some(&data[i + 2..i + 2 + len]);
        }
        i += 2 + len;
    }
    None
}

/// A representative slice of the chip database (spec.md §4.9): enough
/// to ground the end-to-end scenarios in spec.md §8 without attempting
/// the full multi-hundred-entry TI table, which belongs to the CLI
/// front end's data files rather than this core.
pub static DB: &[ChipInfo] = &[
    ChipInfo {
        name: "MSP430F149",
        bits: 16,
        psa: Psa::Regular,
        clock_control: 0,
        mclk_control: 0,
        clock_sys: ClockSys::Bc1xx,
        features: Features::empty(),
        id: ChipId {
            ver_id: 0x00f1,
            ver_sub_id: 0,
            revision: 0,
            fab: 0,
            self_id: 0,
            config: 0,
            fuses: 0,
            activation_key: 0,
        },
        id_mask: ChipId {
            ver_id: 0xffff,
            ver_sub_id: 0,
            revision: 0,
            fab: 0,
            self_id: 0,
            config: 0,
            fuses: 0,
            activation_key: 0,
        },
        power: Power {
            reg_mask: 0,
            enable_lpm5: 0,
            disable_lpm5: 0,
            reg_mask_3v: 0,
            enable_lpm5_3v: 0,
            disable_lpm5_3v: 0,
        },
        memory: &[
            MemoryRegion {
                name: "main",
                mem_type: MemType::Flash,
                bits: 16,
                mapped: true,
                size: 0xf800,
                offset: 0x4000,
                seg_size: 512,
                bank_size: 0,
                banks: 1,
            },
            MemoryRegion {
                name: "ram",
                mem_type: MemType::Ram,
                bits: 16,
                mapped: true,
                size: 0x800,
                offset: 0x200,
                seg_size: 0,
                bank_size: 0,
                banks: 1,
            },
        ],
        clock_map: &[],
        v3_functions: None,
        v3_erase: None,
        v3_write: None,
        v3_unlock: None,
    },
    ChipInfo {
        name: "MSP430F5529",
        bits: 20,
        psa: Psa::Enhanced,
        clock_control: 1,
        mclk_control: 0x040f,
        clock_sys: ClockSys::FllPlus,
        features: Features::JTAG,
        id: ChipId {
            ver_id: 0x5529,
            ver_sub_id: 0,
            revision: 0,
            fab: 0,
            self_id: 0,
            config: 0,
            fuses: 0,
            activation_key: 0,
        },
        id_mask: ChipId {
            ver_id: 0xffff,
            ver_sub_id: 0,
            revision: 0,
            fab: 0,
            self_id: 0,
            config: 0,
            fuses: 0,
            activation_key: 0,
        },
        power: Power {
            reg_mask: 0,
            enable_lpm5: 0,
            disable_lpm5: 0,
            reg_mask_3v: 0,
            enable_lpm5_3v: 0,
            disable_lpm5_3v: 0,
        },
        memory: &[
            MemoryRegion {
                name: "main",
                mem_type: MemType::Flash,
                bits: 16,
                mapped: true,
                size: 0x80000,
                offset: 0x10000,
                seg_size: 512,
                bank_size: 0,
                banks: 1,
            },
            MemoryRegion {
                name: "ram",
                mem_type: MemType::Ram,
                bits: 16,
                mapped: true,
                size: 0x2000,
                offset: 0x2400,
                seg_size: 0,
                bank_size: 0,
                banks: 1,
            },
        ],
        clock_map: &[],
        v3_functions: None,
        v3_erase: None,
        v3_write: None,
        v3_unlock: None,
    },
];

/// First-match-wins database lookup (spec.md §3 "When multiple records
/// match, the first in database order wins").
pub fn find_by_id(probe: &ChipId) -> Option<&'static ChipInfo> {
    DB.iter().find(|c| probe.matches(&c.id, &c.id_mask))
}

pub fn find_by_name(name: &str) -> Option<&'static ChipInfo> {
    DB.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_match_ignores_dont_care_bits() {
        let probe = ChipId {
            ver_id: 0x00f1,
            ver_sub_id: 0xbeef, // masked out, ignored
            revision: 3,        // masked out
            fab: 0,
            self_id: 0,
            config: 0,
            fuses: 0,
            activation_key: 0,
        };
        let found = find_by_id(&probe).unwrap();
        assert_eq!(found.name, "MSP430F149");
    }

    #[test]
    fn non_matching_probe_finds_nothing() {
        let probe = ChipId {
            ver_id: 0xdead,
            ..Default::default()
        };
        assert!(find_by_id(&probe).is_none());
    }

    #[test]
    fn find_mem_by_addr_picks_lowest_covering_offset() {
        let chip = find_by_name("MSP430F149").unwrap();
        let region = chip.find_mem_by_addr(Address::new(0x4100)).unwrap();
        assert_eq!(region.name, "main");
        assert!(chip.find_mem_by_addr(Address::new(0xffff0)).is_none());
    }

    #[test]
    fn find_mem_by_name_is_case_insensitive() {
        let chip = find_by_name("msp430f5529").unwrap();
        assert!(chip.find_mem_by_name("RAM").is_some());
    }

    #[test]
    fn tlv_scan_finds_tagged_field_and_stops_at_terminator() {
        let data = [0x01, 0x02, 0xaa, 0xbb, 0x14, 0x02, 0x34, 0x12, 0xff, 0x00];
        assert_eq!(tlv_find(&data, 0x14), Some(&[0x34, 0x12][..]));
        assert_eq!(tlv_find(&data, 0x99), None);
    }
}
