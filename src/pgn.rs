//! The catalog of Parameter Group Numbers this system speaks, and the
//! DBC signal-name builders that key into it.
//!
//! Every constant's low byte is the wildcard placeholder `0xFE`; the
//! real source address is substituted in at [`crate::id::build`] time.

/// Module info: request / heartbeat answer.
pub const MODULE_INFO_REQ: u32 = 0x000FE;
pub const MODULE_INFO_ANS: u32 = 0x001FE;
/// Extended module info (adds IP address, chip UID) / bootloader variant.
pub const MODULE_INFO_EX: u32 = 0x008FE;
pub const MODULE_INFO_BOOT: u32 = 0x002FE;
/// Per-pin/channel capability advertisement.
pub const PIN_INFO: u32 = 0x010FE;

// --- UIO ---
pub const OP_MODE_REQ: u32 = 0x121FE;
pub const OP_MODE_ANS: u32 = 0x120FE;
pub const VOLTAGE_OUT_REQ: u32 = 0x116FE;
pub const VOLTAGE_OUT_ANS: u32 = 0x117FE;
pub const VOLTAGE_IN_ANS: u32 = 0x114FE;
pub const CUR_LOOP_OUT_REQ: u32 = 0x126FE;
pub const CUR_LOOP_OUT_ANS: u32 = 0x127FE;
pub const CUR_LOOP_IN_ANS: u32 = 0x128FE;
pub const PWM_OUT_REQ: u32 = 0x112FE;
pub const PWM_OUT_ANS: u32 = 0x113FE;
pub const PWM_IN_ANS: u32 = 0x122FE;
pub const SWITCH_OUTPUT_REQ: u32 = 0x123FE;
pub const SWITCH_OUTPUT_ANS: u32 = 0x124FE;

// --- ELoad ---
// Shares a PGN with UIO's VOLTAGE_OUT_REQ/ANS; see DESIGN.md for the
// disambiguation rule (message-name-keyed encode, DBC-keyed decode).
pub const VOLTAGE_ELM_OUT_REQ: u32 = 0x116FE;
pub const VOLTAGE_ELM_OUT_ANS: u32 = 0x117FE;
pub const CUR_ELM_OUT_REQ: u32 = 0x129FE;
pub const CUR_ELM_OUT_ANS: u32 = 0x12BFE;
pub const CUR_ELM_IN_ANS: u32 = 0x12AFE;
pub const TEMP_ELM_IN_ANS: u32 = 0x12EFE;
pub const SWITCH_ELM_DOUT_REQ: u32 = 0x12CFE;
pub const SWITCH_ELM_DOUT_ANS: u32 = 0x12DFE;

// --- IfMux / CAN ---
pub const CAN_INFO_REQ: u32 = 0x021FE;
pub const CAN_INFO_ANS: u32 = 0x020FE;
pub const CAN_STATE_ANS: u32 = 0x022FE;
pub const CAN_MUX_REQ: u32 = 0x028FE;
pub const CAN_MUX_ANS: u32 = 0x029FE;

// --- LIN (IfMux, optional) ---
pub const LIN_CFG_REQ: u32 = 0x040FE;
pub const LIN_FRAME_SET_REQ: u32 = 0x042FE;
pub const LIN_FRAME_RCVD_ANS: u32 = 0x043FE;

/// Every PGN constant in the catalog, for exhaustive invariant checks.
pub const ALL: &[u32] = &[
    MODULE_INFO_REQ,
    MODULE_INFO_ANS,
    MODULE_INFO_EX,
    MODULE_INFO_BOOT,
    PIN_INFO,
    OP_MODE_REQ,
    OP_MODE_ANS,
    VOLTAGE_OUT_REQ,
    VOLTAGE_OUT_ANS,
    VOLTAGE_IN_ANS,
    CUR_LOOP_OUT_REQ,
    CUR_LOOP_OUT_ANS,
    CUR_LOOP_IN_ANS,
    PWM_OUT_REQ,
    PWM_OUT_ANS,
    PWM_IN_ANS,
    SWITCH_OUTPUT_REQ,
    SWITCH_OUTPUT_ANS,
    CUR_ELM_OUT_REQ,
    CUR_ELM_OUT_ANS,
    CUR_ELM_IN_ANS,
    TEMP_ELM_IN_ANS,
    SWITCH_ELM_DOUT_REQ,
    SWITCH_ELM_DOUT_ANS,
    CAN_INFO_REQ,
    CAN_INFO_ANS,
    CAN_STATE_ANS,
    CAN_MUX_REQ,
    CAN_MUX_ANS,
    LIN_CFG_REQ,
    LIN_FRAME_SET_REQ,
    LIN_FRAME_RCVD_ANS,
];

/// Feature prefixes used in UIO/ELoad signal names, in the fixed order
/// the source's `_OP_MODE_SIGNALS` table enumerates them.
pub const OP_MODE_PREFIXES: [&str; 6] = ["pwm", "icu", "vlt_i", "cur_i", "vlt_o", "cur_o"];

/// `{prefix}_{1-based index}_op_mode`, e.g. `vlt_o_1_op_mode`.
pub fn op_mode_signal(prefix: &str, index1: u8) -> String {
    format!("{prefix}_{index1}_op_mode")
}

/// `vlt_o_{1-based index}_value`.
pub fn voltage_out_signal(index1: u8) -> String {
    format!("vlt_o_{index1}_value")
}

/// `cur_ma_o_{1-based index}_value`.
pub fn current_out_signal(index1: u8) -> String {
    format!("cur_ma_o_{index1}_value")
}

/// `pwm_{1-based index}_{frequency|duty|voltage}`.
pub fn pwm_out_signal(index1: u8, field: &str) -> String {
    format!("pwm_{index1}_{field}")
}

/// `icu_{1-based index}_{frequency|duty}`.
pub fn icu_in_signal(index1: u8, field: &str) -> String {
    format!("icu_{index1}_{field}")
}

/// `sel_{icu|pwm|vlt_o|cur_o|cur_i}_{1-based index}`.
pub fn switch_select_signal(switch: &str, index1: u8) -> String {
    format!("sel_{switch}_{index1}")
}

/// `dout_{1-based index}_en`.
pub fn dout_enable_signal(index1: u8) -> String {
    format!("dout_{index1}_en")
}

/// `can{1-based index}_speed` or `can{1-based index}_speed_fd`.
pub fn can_speed_signal(index1: u8, fd: bool) -> String {
    if fd {
        format!("can{index1}_speed_fd")
    } else {
        format!("can{index1}_speed")
    }
}

/// `can_mux_int_can{1-based index}_en`.
pub fn can_mux_internal_signal(index1: u8) -> String {
    format!("can_mux_int_can{index1}_en")
}

/// `can_mux_ext_can{1-based index}_out`.
pub fn can_mux_external_signal(index1: u8) -> String {
    format!("can_mux_ext_can{index1}_out")
}

/// `lin_cfg_frm{0-based index}_{enable|dir_transmit|cst_classic|len}`.
pub fn lin_cfg_signal(index0: u8, field: &str) -> String {
    format!("lin_cfg_frm{index0}_{field}")
}

/// `cur_elm_o_{1-based index}_value` — ELoad sink-current signal, kept
/// distinct from [`current_out_signal`] since the two PGNs differ.
pub fn current_elm_signal(index1: u8) -> String {
    format!("cur_elm_o_{index1}_value")
}

/// `temp_elm_{1-based index}_value`.
pub fn temp_elm_signal(index1: u8) -> String {
    format!("temp_elm_{index1}_value")
}

/// `dout_elm_{1-based index}_en`.
pub fn dout_elm_enable_signal(index1: u8) -> String {
    format!("dout_elm_{index1}_en")
}
