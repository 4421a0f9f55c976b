use std::fmt;

use serde::{Serialize, Serializer};

use crate::Schema;

/// Inverter run state reported in input register 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingState {
    Standby,
    NoUse,
    Discharge,
    Fault,
    Flash,
    PvCharge,
    AcCharge,
    CombineCharge,
    CombineChargeBypass,
    PvChargeBypass,
    AcChargeBypass,
    Bypass,
    PvChargeDischarge,
}

impl OperatingState {
    pub const ALL: [OperatingState; 13] = [
        OperatingState::Standby,
        OperatingState::NoUse,
        OperatingState::Discharge,
        OperatingState::Fault,
        OperatingState::Flash,
        OperatingState::PvCharge,
        OperatingState::AcCharge,
        OperatingState::CombineCharge,
        OperatingState::CombineChargeBypass,
        OperatingState::PvChargeBypass,
        OperatingState::AcChargeBypass,
        OperatingState::Bypass,
        OperatingState::PvChargeDischarge,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Label as printed in the vendor protocol document.
    pub fn label(self) -> &'static str {
        match self {
            OperatingState::Standby => "Standby",
            OperatingState::NoUse => "noUSE",
            OperatingState::Discharge => "Discharge",
            OperatingState::Fault => "Fault",
            OperatingState::Flash => "Flash",
            OperatingState::PvCharge => "PV Charge",
            OperatingState::AcCharge => "AC Charge",
            OperatingState::CombineCharge => "Combine Charge",
            OperatingState::CombineChargeBypass => "Combine charge and Bypass",
            OperatingState::PvChargeBypass => "PV charge and Bypass",
            OperatingState::AcChargeBypass => "AC Charge and Bypass",
            OperatingState::Bypass => "Bypass",
            OperatingState::PvChargeDischarge => "PV charge and discharge",
        }
    }
}

impl TryFrom<u16> for OperatingState {
    /// The unrecognised code.
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        OperatingState::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(code)
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for OperatingState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

register_map! {
    /// Live measurements from one input-register block read.
    StatusRecord, STATUS_FIELDS, Schema::Status;

    0 => status_code: word = "StatusCode";
    0 => status: state = "Status";
    1 => vpv1: scaled / 10 ["V"] = "Vpv1";
    2 => vpv2: scaled / 10 ["V"] = "Vpv2";
    3 => ppv1: pair / 10 ["W"] = "Ppv1H" / "Ppv1L";
    5 => ppv2: pair / 10 ["W"] = "Ppv2H" / "Ppv2L";
    7 => buck1_curr: scaled / 10 ["A"] = "Buck1Curr";
    8 => buck2_curr: scaled / 10 ["A"] = "Buck2Curr";
    9 => op_watt: pair / 10 ["W"] = "OP_WattH" / "OP_WattL";
    11 => op_va: pair / 10 ["VA"] = "OP_VAH" / "OP_VAL";
    13 => ac_chr_watt: pair / 10 ["W"] = "ACChr_WattH" / "ACChr_WattL";
    15 => ac_chr_va: pair / 10 ["VA"] = "ACChr_VAH" / "ACChr_VAL";
    17 => bat_volt: scaled / 100 ["V"] = "Bat_Volt";
    18 => battery_soc: scaled / 1 ["%"] = "BatterySOC";
    19 => bus_volt: scaled / 10 ["V"] = "BusVolt";
    20 => grid_volt: scaled / 10 ["V"] = "GridVolt";
    21 => line_freq: scaled / 100 ["Hz"] = "LineFreq";
    22 => output_volt: scaled / 10 ["V"] = "OutputVolt";
    23 => output_freq: scaled / 100 ["Hz"] = "OutputFreq";
    24 => output_dcv: scaled / 10 ["V"] = "OutputDCV";
    25 => inv_temp: scaled / 10 ["°C"] = "InvTemp";
    26 => dcdc_temp: scaled / 10 ["°C"] = "DCDCTemp";
    27 => load_percent: scaled / 10 ["%"] = "LoadPercent";
    28 => bat_dspp_v: scaled / 100 ["V"] = "Bat_dspp_V";
    29 => bat_dspb_v: scaled / 100 ["V"] = "Bat_dspb_V";
    // Half-second ticks.
    30 => time_total: pair / 2 ["s"] = "TimeTotalH" / "TimeTotalL";
    32 => buck1_temp: scaled / 10 ["°C"] = "Buck1Temp";
    33 => buck2_temp: scaled / 10 ["°C"] = "Buck2Temp";
    34 => op_curr: scaled / 10 ["A"] = "OP_Curr";
    35 => inv_curr: scaled / 10 ["A"] = "Inv_Curr";
    36 => ac_in_watt: pair / 10 ["W"] = "AC_InWattH" / "AC_InWattL";
    38 => ac_in_va: pair / 10 ["VA"] = "AC_InVAH" / "AC_InVAL";
    40 => fault_bit: flags = "Faultbit";
    41 => warn_bit: flags = "Warnbit";
    42 => fault_value: flags = "Faultvalue";
    43 => warn_value: flags = "Warnvalue";
    44 => dtc: flags = "DTC";
    45 => check_step: flags = "CheckStep";
    46 => production_lm: flags = "ProductionLM";
    47 => const_power_ok: flags = "ConstPOKF";
    48 => epv1_today: pair / 10 ["kWh"] = "Epv1_todayH" / "Epv1_todayL";
    50 => epv1_total: pair / 10 ["kWh"] = "Epv1_totalH" / "Epv1_totalL";
    52 => epv2_today: pair / 10 ["kWh"] = "Epv2_todayH" / "Epv2_todayL";
    54 => epv2_total: pair / 10 ["kWh"] = "Epv2_totalH" / "Epv2_totalL";
    56 => eac_chr_today: pair / 10 ["kWh"] = "Eac_chrtodayH" / "Eac_chrtodayL";
    58 => eac_chr_total: pair / 10 ["kWh"] = "Eac_chrtotalH" / "Eac_chrtotalL";
    60 => ebat_chr_today: pair / 10 ["kWh"] = "Ebat_chrtodayH" / "Ebat_chrtodayL";
    62 => ebat_chr_total: pair / 10 ["kWh"] = "Ebat_chrtotalH" / "Ebat_chrtotalL";
    64 => eac_dischr_today: pair / 10 ["kWh"] = "Eac_dischrtodayH" / "Eac_dischrtodayL";
    66 => eac_dischr_total: pair / 10 ["kWh"] = "Eac_dischrtotalH" / "Eac_dischrtotalL";
    68 => ac_chr_curr: scaled / 10 ["A"] = "Acchrcurr";
    69 => ac_dischr_watt: pair / 10 ["W"] = "AC_dischrwattH" / "AC_dischrwattL";
    71 => ac_dischr_va: pair / 10 ["VA"] = "AC_dischrvaH" / "AC_dischrvaL";
    73 => bat_dischr_watt: pair / 10 ["W"] = "Bat_dischrwattH" / "Bat_dischrwattL";
    75 => bat_dischr_va: pair / 10 ["VA"] = "Bat_dischrvaH" / "Bat_dischrvaL";
    // Signed over both words: positive is discharge, negative is charge.
    77 => bat_watt: pair / 10 ["W"] = "Bat_wattH" / "Bat_wattL";
    80 => bat_overcharge: flags = "Batovercharge";
    81 => mppt_fan_speed: scaled / 1 ["%"] = "Mpptfanspeed";
    82 => inv_fan_speed: scaled / 1 ["%"] = "Invfanspeed";
}

impl StatusRecord {
    /// Battery power over both words; positive while discharging.
    pub fn battery_power(&self) -> f64 {
        self.bat_watt.combined_signed()
    }
}
