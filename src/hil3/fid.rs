//! HAL function IDs and `CONFIGURE` argument codes (spec.md §4.7),
//! grounded on `original_source/drivers/v3hil.c`'s `hal_proto_fid_t`
//! and `hal_proto_config_t` enums. Kept as a flat constant table
//! (rather than a Rust `enum`) because [`crate::chipinfo::ChipInfo::map_fid`]
//! remaps arbitrary `u8` function IDs to other `u8` function IDs.

#![allow(dead_code)]

pub const INIT: u8 = 0x01;
pub const SET_VCC: u8 = 0x02;
pub const GET_VCC: u8 = 0x03;
pub const START_JTAG: u8 = 0x04;
pub const START_JTAG_ACT_CODE: u8 = 0x05;
pub const STOP_JTAG: u8 = 0x06;
pub const CONFIGURE: u8 = 0x07;
pub const GET_FUSES: u8 = 0x08;
pub const BLOW_FUSE: u8 = 0x09;
pub const WAIT_FOR_EEM: u8 = 0x0a;
pub const BIT_SEQUENCE: u8 = 0x0b;
pub const GET_JTAG_ID: u8 = 0x0c;
pub const SET_DEVICE_CHAIN_INFO: u8 = 0x0d;
pub const SET_CHAIN_CONFIGURATION: u8 = 0x0e;
pub const GET_NUM_DEVICES: u8 = 0x0f;
pub const GET_INTERFACE_MODE: u8 = 0x10;
pub const SJ_ASSERT_POR_SC: u8 = 0x11;
pub const SJ_CONDITIONAL_SC: u8 = 0x12;
pub const RC_RELEASE_JTAG: u8 = 0x13;
pub const READ_MEM_BYTES: u8 = 0x14;
pub const READ_MEM_WORDS: u8 = 0x15;
pub const READ_MEM_QUICK: u8 = 0x16;
pub const WRITE_MEM_BYTES: u8 = 0x17;
pub const WRITE_MEM_WORDS: u8 = 0x18;
pub const EEM_DX: u8 = 0x19;
pub const EEM_DX_AFE2XX: u8 = 0x1a;
pub const SINGLE_STEP: u8 = 0x1b;
pub const READ_ALL_CPU_REGS: u8 = 0x1c;
pub const WRITE_ALL_CPU_REGS: u8 = 0x1d;
pub const PSA: u8 = 0x1e;
pub const EXECUTE_FUNCLET: u8 = 0x1f;
pub const EXECUTE_FUNCLET_JTAG: u8 = 0x20;
pub const GET_DCO_FREQUENCY: u8 = 0x21;
pub const GET_DCO_FREQUENCY_JTAG: u8 = 0x22;
pub const GET_FLL_FREQUENCY: u8 = 0x23;
pub const GET_FLL_FREQUENCY_JTAG: u8 = 0x24;
pub const WAIT_FOR_STORAGE: u8 = 0x25;
pub const SJ_ASSERT_POR_SC_X: u8 = 0x26;
pub const SJ_CONDITIONAL_SC_X: u8 = 0x27;
pub const RC_RELEASE_JTAG_X: u8 = 0x28;
pub const READ_MEM_BYTES_X: u8 = 0x29;
pub const READ_MEM_WORDS_X: u8 = 0x2a;
pub const READ_MEM_QUICK_X: u8 = 0x2b;
pub const WRITE_MEM_BYTES_X: u8 = 0x2c;
pub const WRITE_MEM_WORDS_X: u8 = 0x2d;
pub const EEM_DX_X: u8 = 0x2e;
pub const SINGLE_STEP_X: u8 = 0x2f;
pub const READ_ALL_CPU_REGS_X: u8 = 0x30;
pub const WRITE_ALL_CPU_REGS_X: u8 = 0x31;
pub const PSA_X: u8 = 0x32;
pub const EXECUTE_FUNCLET_X: u8 = 0x33;
pub const GET_DCO_FREQUENCY_X: u8 = 0x34;
pub const GET_FLL_FREQUENCY_X: u8 = 0x35;
pub const WAIT_FOR_STORAGE_X: u8 = 0x36;
pub const BLOW_FUSE_XV2: u8 = 0x37;
pub const BLOW_FUSE_FRAM: u8 = 0x38;
pub const SJ_ASSERT_POR_SC_XV2: u8 = 0x39;
pub const SJ_CONDITIONAL_SC_XV2: u8 = 0x3a;
pub const RC_RELEASE_JTAG_XV2: u8 = 0x3b;
pub const READ_MEM_WORDS_XV2: u8 = 0x3c;
pub const READ_MEM_QUICK_XV2: u8 = 0x3d;
pub const WRITE_MEM_WORDS_XV2: u8 = 0x3e;
pub const EEM_DX_XV2: u8 = 0x3f;
pub const SINGLE_STEP_XV2: u8 = 0x40;
pub const READ_ALL_CPU_REGS_XV2: u8 = 0x41;
pub const WRITE_ALL_CPU_REGS_XV2: u8 = 0x42;
pub const PSA_XV2: u8 = 0x43;
pub const EXECUTE_FUNCLET_XV2: u8 = 0x44;
pub const UNLOCK_DEVICE_XV2: u8 = 0x45;
pub const MAGIC_PATTERN: u8 = 0x46;
pub const UNLOCK_C092: u8 = 0x47;
pub const HIL_COMMAND: u8 = 0x48;
pub const POLL_JSTATE_REG: u8 = 0x49;
pub const POLL_JSTATE_REG_FR57XX: u8 = 0x4a;
pub const IS_JTAG_FUSE_BLOWN: u8 = 0x4b;
pub const RESET_XV2: u8 = 0x4c;
pub const WRITE_FRAM_QUICK_XV2: u8 = 0x4d;
pub const SEND_JTAG_MAILBOX_XV2: u8 = 0x4e;
pub const SINGLE_STEP_JSTATE_XV2: u8 = 0x4f;
pub const POLL_JSTATE_REG_ET8: u8 = 0x50;
pub const RESET_STATIC_GLOBAL_VARS: u8 = 0x51;
pub const RESET_430I: u8 = 0x52;
pub const POLL_JSTATE_REG_430I: u8 = 0x53;

/// `CONFIGURE` argument codes (`hal_proto_config_t`).
pub mod config {
    pub const ENHANCED_PSA: u8 = 0x01;
    pub const PSA_TCKL_HIGH: u8 = 0x02;
    pub const DEFAULT_CLK_CONTROL: u8 = 0x03;
    pub const POWER_TESTREG_MASK: u8 = 0x04;
    pub const TESTREG_ENABLE_LPMX5: u8 = 0x05;
    pub const TESTREG_DISABLE_LPMX5: u8 = 0x06;
    pub const POWER_TESTREG3V_MASK: u8 = 0x07;
    pub const TESTREG3V_ENABLE_LPMX5: u8 = 0x08;
    pub const TESTREG3V_DISABLE_LPMX5: u8 = 0x09;
    pub const CLK_CONTROL_TYPE: u8 = 0x0a;
    pub const JTAG_SPEED: u8 = 0x0b;
    pub const SFLLDEH: u8 = 0x0c;
    pub const NO_BSL: u8 = 0x0d;
    pub const ALT_ROM_ADDR_FOR_CPU_READ: u8 = 0x0e;
    pub const ASSERT_BSL_VALID_BIT: u8 = 0x0f;
}
