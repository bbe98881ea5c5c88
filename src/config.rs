use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

/// Capacity of every per-module array in the store.
pub const MAX_MODULES: usize = 16;
pub const CELLS_PER_MODULE: usize = 18;
pub const TEMP_SENSORS_PER_MODULE: usize = 6;
pub const MAX_CELLS: usize = MAX_MODULES * CELLS_PER_MODULE;
pub const MAX_TEMP_SENSORS: usize = MAX_MODULES * TEMP_SENSORS_PER_MODULE;

// Module indexes travel as one byte on the bus and valid masks are u32.
const_assert!(MAX_MODULES <= u8::MAX as usize);
const_assert!(CELLS_PER_MODULE <= 32);
const_assert!(CELLS_PER_MODULE % 3 == 0);

const DEFAULT_TICK_MS: u16 = 1;
const DEFAULT_SHORT_TIME_MS: u16 = 1;
const DEFAULT_PULSE_WIDTH_MS: u16 = 100;
const DEFAULT_WAIT_AFTER_CLOSING_MINUS_MS: u16 = 100;
const DEFAULT_PRECHARGE_TIME_MS: u16 = 1000;
const DEFAULT_WAIT_AFTER_CLOSING_PLUS_MS: u16 = 100;
const DEFAULT_WAIT_AFTER_OPENING_PRECHARGE_MS: u16 = 50;
const DEFAULT_OSCILLATION_LIMIT: u16 = 500;
const DEFAULT_PRECHARGE_TIMEOUT_MS: u16 = 5000;
const DEFAULT_STALENESS_MS: u32 = 3000;

/// Dwell times of the contactor sequences.
///
/// All durations are in milliseconds and are consumed in steps of
/// `tick_ms`, the period at which the trigger is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactorTiming {
    pub tick_ms: u16,
    pub short_time_ms: u16,
    pub latching_pulse_width_ms: u16,
    pub wait_after_closing_minus_ms: u16,
    pub precharge_time_ms: u16,
    pub wait_after_closing_plus_ms: u16,
    pub wait_after_opening_precharge_ms: u16,
    /// Counted in trigger cycles, not milliseconds.
    pub oscillation_limit: u16,
    pub precharge_timeout_ms: u16,
}

impl Default for ContactorTiming {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            short_time_ms: DEFAULT_SHORT_TIME_MS,
            latching_pulse_width_ms: DEFAULT_PULSE_WIDTH_MS,
            wait_after_closing_minus_ms: DEFAULT_WAIT_AFTER_CLOSING_MINUS_MS,
            precharge_time_ms: DEFAULT_PRECHARGE_TIME_MS,
            wait_after_closing_plus_ms: DEFAULT_WAIT_AFTER_CLOSING_PLUS_MS,
            wait_after_opening_precharge_ms: DEFAULT_WAIT_AFTER_OPENING_PRECHARGE_MS,
            oscillation_limit: DEFAULT_OSCILLATION_LIMIT,
            precharge_timeout_ms: DEFAULT_PRECHARGE_TIMEOUT_MS,
        }
    }
}

/// Electrical thresholds used by the contactor checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactorLimits {
    pub bad_switch_off_current_pos_ma: i32,
    pub bad_switch_off_current_neg_ma: i32,
    pub precharge_voltage_threshold_mv: f32,
    pub precharge_current_threshold_ma: i32,
    pub charge_precharge_voltage_threshold_mv: f32,
    pub charge_precharge_current_threshold_ma: i32,
    pub max_voltage_drop_over_fuse_mv: f32,
}

impl Default for ContactorLimits {
    fn default() -> Self {
        Self {
            bad_switch_off_current_pos_ma: 10_000,
            bad_switch_off_current_neg_ma: -10_000,
            precharge_voltage_threshold_mv: 1000.0,
            precharge_current_threshold_ma: 50,
            charge_precharge_voltage_threshold_mv: 1000.0,
            charge_precharge_current_threshold_ma: 50,
            max_voltage_drop_over_fuse_mv: 4000.0,
        }
    }
}

/// Which sequences honour the oscillation guard at their entry step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OscillationGuardScope {
    /// Precharge and open sequences both stall while the guard runs.
    #[default]
    AllSequences,
    /// Only the open sequence stalls; precharge starts immediately.
    OpenOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub module_count: u8,
    pub state_request_staleness_ms: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            module_count: 8,
            state_request_staleness_ms: DEFAULT_STALENESS_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BmsConfig {
    pub contactor: ContactorTiming,
    pub limits: ContactorLimits,
    pub oscillation_guard: OscillationGuardScope,
    pub codec: CodecConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("module count {0} outside 1..={}", MAX_MODULES)]
    InvalidModuleCount(u8),
    #[error("tick period must be non-zero")]
    ZeroTick,
}

impl BmsConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.codec.validate()?;
        if self.contactor.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

impl CodecConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module_count == 0 || usize::from(self.module_count) > MAX_MODULES {
            return Err(ConfigError::InvalidModuleCount(self.module_count));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = BmsConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BmsConfig::default());
        assert_eq!(config.codec.state_request_staleness_ms, 3000);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = BmsConfig::from_json_str(
            r#"{ "contactor": { "precharge_time_ms": 250 }, "oscillation_guard": "open_only" }"#,
        )
        .unwrap();
        assert_eq!(config.contactor.precharge_time_ms, 250);
        assert_eq!(config.contactor.tick_ms, DEFAULT_TICK_MS);
        assert_eq!(config.oscillation_guard, OscillationGuardScope::OpenOnly);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            BmsConfig::from_json_str(r#"{ "codec": { "module_count": 0 } }"#),
            Err(ConfigError::InvalidModuleCount(0))
        ));
        assert!(matches!(
            BmsConfig::from_json_str(r#"{ "codec": { "module_count": 17 } }"#),
            Err(ConfigError::InvalidModuleCount(17))
        ));
        assert!(matches!(
            BmsConfig::from_json_str(r#"{ "contactor": { "tick_ms": 0 } }"#),
            Err(ConfigError::ZeroTick)
        ));
        assert!(matches!(BmsConfig::from_json_str("not json"), Err(ConfigError::Parse(_))));
    }
}
