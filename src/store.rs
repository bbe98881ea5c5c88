//! Keyed snapshot storage shared between the contactor machine and the
//! signal codec.
//!
//! Every record type is bound to one [`BlockId`]. A read returns a copy of
//! the whole record and a write replaces it; each access is atomic for its
//! block but there is no transaction spanning several blocks.

use crate::config::{MAX_CELLS, MAX_MODULES, MAX_TEMP_SENSORS};
use crate::contactor::{ContState, ContSubstate};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockId {
    CurrentSensor,
    CellVoltage,
    CellTemperature,
    MinMax,
    ContactorFeedback,
    InterlockFeedback,
    ContactorState,
    StateRequest,
    Sox,
    Sof,
    ErrorState,
    Msl,
    Rsl,
    Mol,
    Isolation,
    MovingAverage,
    SystemState,
    Balancing,
}

/// Fault classification of one current-sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelStatus {
    #[default]
    NoFault,
    Warning,
    Fault,
    Unrecoverable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorChannels {
    pub current: ChannelStatus,
    pub voltage: ChannelStatus,
    pub temperature: ChannelStatus,
    pub power: ChannelStatus,
    pub coulomb_count: ChannelStatus,
    pub energy_count: ChannelStatus,
}

impl SensorChannels {
    pub fn set_all(&mut self, status: ChannelStatus) {
        *self = Self {
            current: status,
            voltage: status,
            temperature: status,
            power: status,
            coulomb_count: status,
            energy_count: status,
        };
    }

    pub fn any_fault(&self) -> bool {
        [
            self.current,
            self.voltage,
            self.temperature,
            self.power,
            self.coulomb_count,
            self.energy_count,
        ]
        .iter()
        .any(|s| matches!(s, ChannelStatus::Fault | ChannelStatus::Unrecoverable))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentSensor {
    pub current_ma: i32,
    pub voltage_mv: [f32; 3],
    pub temperature_c: f32,
    pub power_w: f32,
    pub coulomb_count: f32,
    pub energy_count: f32,
    pub channels: SensorChannels,
    pub new_current: u32,
    pub new_power: u32,
    pub timestamp_current_ms: u32,
    pub previous_timestamp_current_ms: u32,
    pub timestamp_cc_ms: u32,
    pub previous_timestamp_cc_ms: u32,
}

/// Cell voltages in mV, module-major, plus one valid bit per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellVoltages {
    pub voltage_mv: [u16; MAX_CELLS],
    pub valid: [u32; MAX_MODULES],
    pub timestamp_ms: u32,
}

impl Default for CellVoltages {
    fn default() -> Self {
        Self {
            voltage_mv: [0; MAX_CELLS],
            valid: [0; MAX_MODULES],
            timestamp_ms: 0,
        }
    }
}

/// Cell temperatures in degrees Celsius, module-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CellTemperatures {
    pub temperature_c: [f32; MAX_TEMP_SENSORS],
    pub valid: [u16; MAX_MODULES],
    pub timestamp_ms: u32,
}

impl Default for CellTemperatures {
    fn default() -> Self {
        Self {
            temperature_c: [0.0; MAX_TEMP_SENSORS],
            valid: [0; MAX_MODULES],
            timestamp_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MinMax {
    pub voltage_mean_mv: u16,
    pub voltage_min_mv: u16,
    pub voltage_max_mv: u16,
    pub voltage_module_min: u8,
    pub voltage_module_max: u8,
    pub temperature_mean_c: f32,
    pub temperature_min_c: f32,
    pub temperature_max_c: f32,
    pub temperature_module_min: u8,
    pub temperature_module_max: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactorFeedback {
    pub bitmap: u16,
    pub timestamp_ms: u32,
    pub previous_timestamp_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterlockFeedback {
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactorStateRecord {
    pub state: ContState,
    pub substate: ContSubstate,
}

impl Default for ContactorStateRecord {
    fn default() -> Self {
        Self {
            state: ContState::Undefined,
            substate: ContSubstate::Entry,
        }
    }
}

/// Raw request codes as received from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateRequestRecord {
    pub state_request: u8,
    pub previous_state_request: u8,
    pub state_request_pending: u8,
    pub timestamp_ms: u32,
    pub counter: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sox {
    pub soc_mean: f32,
    pub soc_min: f32,
    pub soc_max: f32,
}

/// Recommended operating currents in amperes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sof {
    pub continuous_charge_a: f32,
    pub peak_charge_a: f32,
    pub continuous_discharge_a: f32,
    pub peak_discharge_a: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ErrorState {
    pub main_plus: bool,
    pub main_minus: bool,
    pub precharge: bool,
    pub charge_main_plus: bool,
    pub charge_main_minus: bool,
    pub charge_precharge: bool,
    pub fuse_state_normal: bool,
    pub fuse_state_charge: bool,
    pub interlock: bool,
    pub crc_error: bool,
    pub mux_error: bool,
    pub spi_error: bool,
    pub ltc_config_error: bool,
    pub current_sensor_not_responding: bool,
    pub open_wire: bool,
    pub insulation_error: bool,
    pub can_timing: bool,
    pub can_timing_cc: bool,
    pub deep_discharge_detected: bool,
    pub mcu_die_temperature: bool,
    pub coin_cell_voltage: u8,
    pub plausibility_check: u8,
}

impl ErrorState {
    pub fn any(&self) -> bool {
        self.deep_discharge_detected
            || self.any_contactor()
            || self.fuse_state_normal
            || self.fuse_state_charge
            || self.interlock
            || self.crc_error
            || self.mux_error
            || self.spi_error
            || self.current_sensor_not_responding
            || self.open_wire
            || self.insulation_error
            || self.can_timing_cc
            || self.can_timing
    }

    pub fn any_contactor(&self) -> bool {
        self.main_plus
            || self.main_minus
            || self.precharge
            || self.charge_main_plus
            || self.charge_main_minus
            || self.charge_precharge
    }
}

/// One set of limit violation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct LimitFlags {
    pub over_current_charge_cell: bool,
    pub over_current_discharge_cell: bool,
    pub over_current_charge_pl0: bool,
    pub over_current_discharge_pl0: bool,
    pub over_current_charge_pl1: bool,
    pub over_current_discharge_pl1: bool,
    pub over_voltage: bool,
    pub under_voltage: bool,
    pub over_temperature_charge: bool,
    pub over_temperature_discharge: bool,
    pub under_temperature_charge: bool,
    pub under_temperature_discharge: bool,
}

impl LimitFlags {
    pub fn any(&self) -> bool {
        self.over_current_charge()
            || self.over_current_discharge()
            || self.over_voltage
            || self.under_voltage
            || self.over_temperature_charge
            || self.over_temperature_discharge
            || self.under_temperature_charge
            || self.under_temperature_discharge
    }

    pub fn over_current_charge(&self) -> bool {
        self.over_current_charge_cell || self.over_current_charge_pl0 || self.over_current_charge_pl1
    }

    pub fn over_current_discharge(&self) -> bool {
        self.over_current_discharge_cell
            || self.over_current_discharge_pl0
            || self.over_current_discharge_pl1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaximumSafetyLimits(pub LimitFlags);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecommendedSafetyLimits(pub LimitFlags);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaximumOperatingLimits(pub LimitFlags);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Isolation {
    pub state: u8,
    pub resistance_kohm: u16,
}

/// Moving averages over 1 s, 5 s, 10 s, 30 s, 60 s and the configured window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovingAverage {
    pub current_ma: [f32; 6],
    pub power_w: [f32; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub bms_state: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balancing {
    pub enabled: bool,
}

/// Backing storage of [`MemoryStore`], one slot per block.
#[derive(Debug, Clone, Default)]
pub struct Blocks {
    current_sensor: CurrentSensor,
    cell_voltages: CellVoltages,
    cell_temperatures: CellTemperatures,
    min_max: MinMax,
    contactor_feedback: ContactorFeedback,
    interlock_feedback: InterlockFeedback,
    contactor_state: ContactorStateRecord,
    state_request: StateRequestRecord,
    sox: Sox,
    sof: Sof,
    error_state: ErrorState,
    msl: MaximumSafetyLimits,
    rsl: RecommendedSafetyLimits,
    mol: MaximumOperatingLimits,
    isolation: Isolation,
    moving_average: MovingAverage,
    system_state: SystemState,
    balancing: Balancing,
}

/// A record that lives under exactly one block id.
pub trait DataBlock: Clone + Default + Send + 'static {
    const ID: BlockId;

    fn slot(blocks: &Blocks) -> &Self;
    fn slot_mut(blocks: &mut Blocks) -> &mut Self;
}

macro_rules! data_block {
    ($ty:ty, $id:ident, $field:ident) => {
        impl DataBlock for $ty {
            const ID: BlockId = BlockId::$id;

            fn slot(blocks: &Blocks) -> &Self {
                &blocks.$field
            }

            fn slot_mut(blocks: &mut Blocks) -> &mut Self {
                &mut blocks.$field
            }
        }
    };
}

data_block!(CurrentSensor, CurrentSensor, current_sensor);
data_block!(CellVoltages, CellVoltage, cell_voltages);
data_block!(CellTemperatures, CellTemperature, cell_temperatures);
data_block!(MinMax, MinMax, min_max);
data_block!(ContactorFeedback, ContactorFeedback, contactor_feedback);
data_block!(InterlockFeedback, InterlockFeedback, interlock_feedback);
data_block!(ContactorStateRecord, ContactorState, contactor_state);
data_block!(StateRequestRecord, StateRequest, state_request);
data_block!(Sox, Sox, sox);
data_block!(Sof, Sof, sof);
data_block!(ErrorState, ErrorState, error_state);
data_block!(MaximumSafetyLimits, Msl, msl);
data_block!(RecommendedSafetyLimits, Rsl, rsl);
data_block!(MaximumOperatingLimits, Mol, mol);
data_block!(Isolation, Isolation, isolation);
data_block!(MovingAverage, MovingAverage, moving_average);
data_block!(SystemState, SystemState, system_state);
data_block!(Balancing, Balancing, balancing);

pub trait Store {
    fn read_block<B: DataBlock>(&self) -> B;
    fn write_block<B: DataBlock>(&self, block: &B);
}

/// In-process store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Mutex<Box<Blocks>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-modify-write of one block under the store lock.
    pub fn update_block<B: DataBlock>(&self, f: impl FnOnce(&mut B)) {
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        f(B::slot_mut(&mut blocks));
    }
}

impl Store for MemoryStore {
    fn read_block<B: DataBlock>(&self) -> B {
        let blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        B::slot(&blocks).clone()
    }

    fn write_block<B: DataBlock>(&self, block: &B) {
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        *B::slot_mut(&mut blocks) = block.clone();
    }
}
