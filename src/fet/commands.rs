//! Legacy FET command codes and parameter constants (spec.md §4.6),
//! grounded on `original_source/drivers/fet_core.c`'s `C_*`/`FET_*`
//! `#define`s.

pub const C_INITIALIZE: u8 = 0x01;
pub const C_CLOSE: u8 = 0x02;
pub const C_IDENTIFY: u8 = 0x03;
pub const C_DEVICE: u8 = 0x04;
pub const C_CONFIGURE: u8 = 0x05;
pub const C_VCC: u8 = 0x06;
pub const C_RESET: u8 = 0x07;
pub const C_READREGISTERS: u8 = 0x08;
pub const C_WRITEREGISTERS: u8 = 0x09;
pub const C_READREGISTER: u8 = 0x0a;
pub const C_WRITEREGISTER: u8 = 0x0b;
pub const C_ERASE: u8 = 0x0c;
pub const C_READMEMORY: u8 = 0x0d;
pub const C_WRITEMEMORY: u8 = 0x0e;
pub const C_FASTFLASHER: u8 = 0x0f;
pub const C_BREAKPOINT: u8 = 0x10;
pub const C_RUN: u8 = 0x11;
pub const C_STATE: u8 = 0x12;
pub const C_SECURE: u8 = 0x13;
pub const C_VERIFYMEMORY: u8 = 0x14;
pub const C_FASTVERIFYMEMORY: u8 = 0x15;
pub const C_ERASECHECK: u8 = 0x16;
pub const C_EEMOPEN: u8 = 0x17;
pub const C_EEMREADREGISTER: u8 = 0x18;
pub const C_EEMREADREGISTERTEST: u8 = 0x19;
pub const C_EEMWRITEREGISTER: u8 = 0x1a;
pub const C_EEMCLOSE: u8 = 0x1b;
pub const C_ERRORNUMBER: u8 = 0x1c;
pub const C_GETCURVCCT: u8 = 0x1d;
pub const C_GETEXTVOLTAGE: u8 = 0x1e;
pub const C_FETSELFTEST: u8 = 0x1f;
pub const C_FETSETSIGNALS: u8 = 0x20;
pub const C_FETRESET: u8 = 0x21;
pub const C_READI2C: u8 = 0x22;
pub const C_WRITEI2C: u8 = 0x23;
pub const C_ENTERBOOTLOADER: u8 = 0x24;
pub const C_IDENT1: u8 = 0x28;
pub const C_IDENT2: u8 = 0x29;
pub const C_IDENT3: u8 = 0x2b;
pub const C_CMM_PARAM: u8 = 0x36;
pub const C_CMM_CTRL: u8 = 0x37;
pub const C_CMM_READ: u8 = 0x38;

pub const FET_CONFIG_VERIFICATION: u32 = 0;
pub const FET_CONFIG_EMULATION: u32 = 1;
pub const FET_CONFIG_CLKCTRL: u32 = 2;
pub const FET_CONFIG_MCLKCTRL: u32 = 3;
pub const FET_CONFIG_FLASH_TESET: u32 = 4;
pub const FET_CONFIG_FLASH_LOCK: u32 = 5;
pub const FET_CONFIG_PROTOCOL: u32 = 8;
pub const FET_CONFIG_UNLOCK_BSL: u32 = 11;

pub const FET_RUN_FREE: u32 = 1;
pub const FET_RUN_STEP: u32 = 2;
pub const FET_RUN_BREAKPOINT: u32 = 3;

pub const FET_RESET_PUC: u32 = 0x01;
pub const FET_RESET_RST: u32 = 0x02;
pub const FET_RESET_VCC: u32 = 0x04;
pub const FET_RESET_ALL: u32 = 0x07;

pub const FET_ERASE_SEGMENT: u32 = 0;
pub const FET_ERASE_MAIN: u32 = 1;
pub const FET_ERASE_ALL: u32 = 2;

pub const FET_POLL_RUNNING: u32 = 0x01;
pub const FET_POLL_BREAKPOINT: u32 = 0x02;

/// FET protocol version below which the old `C_IDENTIFY` identification
/// path is used instead of `C_IDENT1` (spec.md §4.6, §6).
pub const OLD_IDENTIFY_VERSION_CUTOFF: u32 = 20_300_000;
