use crate::Schema;

register_map! {
    /// Device settings and identifiers from one holding-register block read.
    ConfigRecord, CONFIG_FIELDS, Schema::Config;

    // 0 off/output on, 1 on/output on, 4 off/disabled, 5 on/disabled
    0 => status_code: word = "StatusCode";
    // 0 battery first, 1 PV first, 2 utility first
    1 => output_config: word = "OutputConfig";
    // 0 PV first, 1 PV and utility, 2 PV only
    2 => charge_config: word = "ChargeConfig";
    3 => uti_out_start: word ["h"] = "UtiOutStart";
    4 => uti_out_end: word ["h"] = "UtiOutEnd";
    5 => uti_charge_start: word ["h"] = "UtiChargeStart";
    6 => uti_charge_end: word ["h"] = "UtiChargeEnd";
    7 => pv_model: word = "PVmodel";
    8 => ac_in_model: word = "ACInModel";
    9 => fw_version_h: word = "FwVersionH";
    10 => fw_version_m: word = "FwVersionM";
    11 => fw_version_l: word = "FwVersionL";
    12 => fw_version2_h: word = "FwVersion2H";
    13 => fw_version2_m: word = "FwVersion2M";
    14 => fw_version2_l: word = "FwVersion2L";
    // 0 208 V, 1 230 V, 2 240 V
    18 => output_volt_type: word = "OutputVoltType";
    // 0 50 Hz, 1 60 Hz
    19 => output_freq_type: word = "OutputFreqType";
    20 => over_load_restart: word = "OverLoadRestart";
    21 => over_temp_restart: word = "OverTempRestart";
    22 => buzzer_enabled: word = "BuzzerEN";
    23 => serno5: word = "Serno5";
    24 => serno4: word = "Serno4";
    25 => serno3: word = "Serno3";
    26 => serno2: word = "Serno2";
    27 => serno1: word = "Serno1";
    28 => module_h: word = "ModuleH";
    29 => module_l: word = "ModuleL";
    30 => com_address: word = "ComAddress";
    31 => flash_start: word = "FlashStart";
    34 => max_charge_curr: word ["A"] = "MaxChargeCurr";
    35 => bulk_charge_volt: scaled / 10 ["V"] = "BulkChargeVolt";
    36 => float_charge_volt: scaled / 10 ["V"] = "FloatChargeVolt";
    37 => bat_low_to_uti_volt: scaled / 10 ["V"] = "BatLowtoUtiVolt";
    38 => float_charge_curr: scaled / 10 ["A"] = "FloatChargeCurr";
    // 0 lead acid, 1 lithium, 2 custom lead
    39 => battery_type: word = "BatteryType";
    40 => aging_mode: word = "AgingMode";
    43 => dtc: word = "DTC";
    45 => sys_year: word = "SysYear";
    46 => sys_month: word = "SysMonth";
    47 => sys_day: word = "SysDay";
    48 => sys_hour: word = "SysHour";
    49 => sys_min: word = "SysMin";
    50 => sys_sec: word = "SysSec";
    67 => fw_build4: word = "FWBuild4";
    68 => fw_build3: word = "FWBuild3";
    69 => fw_build2: word = "FWBuild2";
    70 => fw_build1: word = "FWBuild1";
    // 0-6
    72 => sys_weekly: word = "SysWeekly";
    76 => rate_watt: pair / 10 ["W"] = "RateWattH" / "RateWattL";
    78 => rate_va: pair / 10 ["VA"] = "RateVAH" / "RateVAL";
    80 => factory: word = "Factory";
}

impl ConfigRecord {
    /// Rated output power over both words.
    pub fn rated_power(&self) -> f64 {
        self.rate_watt.combined()
    }
}
