//! Static signal tables of both buses.
//!
//! Every signal is a variant of [`TxSignal`] or [`RxSignal`]; the variant's
//! discriminant is its index into the descriptor table. Rows are grouped by
//! message and listed in wire order.

use super::cursor::CursorKind;
use super::signal::{ByteOrder, SignalDescriptor};
use super::Bus;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Largest number of signals any message carries.
pub const MAX_SIGNALS_PER_MESSAGE: usize = 16;

/// Cell-voltage messages per module, groups A to F.
pub const VOLTAGE_GROUPS: usize = 6;
/// Data slots in one module group.
pub const GROUP_SLOTS: usize = 3;

const U1: f64 = 1.0;
const U8: f64 = u8::MAX as f64;
const U16: f64 = u16::MAX as f64;
const U32: f64 = u32::MAX as f64;
const U64: f64 = u64::MAX as f64;
const I32_MIN: f64 = i32::MIN as f64;
const I32_MAX: f64 = i32::MAX as f64;
const AVG_MIN: f64 = -2_500_000.0;
const AVG_MAX: f64 = 4_292_467_295.0;
const AVG_OFFSET: f64 = 2_500_000.0;
const TEMP_MIN: f64 = -128.0;
const TEMP_MAX: f64 = 527.35;
const TEMP_OFFSET: f64 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    SystemState0,
    SystemState1,
    SystemState2,
    ContactorState,
    SlaveState0,
    SlaveState1,
    RecOperatingCurrent,
    Sop,
    Soc,
    Soh,
    Soe,
    MinMaxCellVoltage,
    Sov,
    MinMaxCellTemperature,
    Tempering,
    Insulation,
    Power0,
    Power1,
    Power2,
    Current0,
    Current1,
    Current2,
    PackVoltage,
    CellVoltageGroupA,
    CellVoltageGroupB,
    CellVoltageGroupC,
    CellVoltageGroupD,
    CellVoltageGroupE,
    CellVoltageGroupF,
    CellTemperatureGroupA,

    StateRequest,
    IvtCurrent,
    IvtVoltage1,
    IvtVoltage2,
    IvtVoltage3,
    IvtTemperature,
    IvtPower,
    IvtCoulombCount,
    IvtEnergyCount,
    Debug,
    GetReleaseVersion,
}

impl MessageId {
    pub const TX: [MessageId; 30] = [
        MessageId::SystemState0,
        MessageId::SystemState1,
        MessageId::SystemState2,
        MessageId::ContactorState,
        MessageId::SlaveState0,
        MessageId::SlaveState1,
        MessageId::RecOperatingCurrent,
        MessageId::Sop,
        MessageId::Soc,
        MessageId::Soh,
        MessageId::Soe,
        MessageId::MinMaxCellVoltage,
        MessageId::Sov,
        MessageId::MinMaxCellTemperature,
        MessageId::Tempering,
        MessageId::Insulation,
        MessageId::Power0,
        MessageId::Power1,
        MessageId::Power2,
        MessageId::Current0,
        MessageId::Current1,
        MessageId::Current2,
        MessageId::PackVoltage,
        MessageId::CellVoltageGroupA,
        MessageId::CellVoltageGroupB,
        MessageId::CellVoltageGroupC,
        MessageId::CellVoltageGroupD,
        MessageId::CellVoltageGroupE,
        MessageId::CellVoltageGroupF,
        MessageId::CellTemperatureGroupA,
    ];

    pub const RX: [MessageId; 11] = [
        MessageId::StateRequest,
        MessageId::IvtCurrent,
        MessageId::IvtVoltage1,
        MessageId::IvtVoltage2,
        MessageId::IvtVoltage3,
        MessageId::IvtTemperature,
        MessageId::IvtPower,
        MessageId::IvtCoulombCount,
        MessageId::IvtEnergyCount,
        MessageId::Debug,
        MessageId::GetReleaseVersion,
    ];

    pub const fn can_id(self) -> u16 {
        match self {
            MessageId::SystemState0 => 0x110,
            MessageId::SystemState1 => 0x111,
            MessageId::SystemState2 => 0x112,
            MessageId::ContactorState => 0x113,
            MessageId::SlaveState0 => 0x115,
            MessageId::SlaveState1 => 0x116,
            MessageId::Sop => 0x130,
            MessageId::RecOperatingCurrent => 0x131,
            MessageId::Soc => 0x140,
            MessageId::Soh => 0x150,
            MessageId::Soe => 0x160,
            MessageId::MinMaxCellVoltage => 0x170,
            MessageId::Sov => 0x171,
            MessageId::MinMaxCellTemperature => 0x180,
            MessageId::Tempering => 0x190,
            MessageId::Insulation => 0x1A0,
            MessageId::Power0 => 0x1D0,
            MessageId::Power1 => 0x1D1,
            MessageId::Power2 => 0x1D2,
            MessageId::Current0 => 0x1E0,
            MessageId::Current1 => 0x1E1,
            MessageId::Current2 => 0x1E2,
            MessageId::PackVoltage => 0x1F0,
            MessageId::CellVoltageGroupA => 0x200,
            MessageId::CellVoltageGroupB => 0x201,
            MessageId::CellVoltageGroupC => 0x202,
            MessageId::CellVoltageGroupD => 0x203,
            MessageId::CellVoltageGroupE => 0x204,
            MessageId::CellVoltageGroupF => 0x205,
            MessageId::CellTemperatureGroupA => 0x210,
            MessageId::Debug => 0x100,
            MessageId::StateRequest => 0x120,
            MessageId::IvtCurrent => 0x521,
            MessageId::IvtVoltage1 => 0x522,
            MessageId::IvtVoltage2 => 0x523,
            MessageId::IvtVoltage3 => 0x524,
            MessageId::IvtTemperature => 0x525,
            MessageId::IvtPower => 0x526,
            MessageId::IvtCoulombCount => 0x527,
            MessageId::IvtEnergyCount => 0x528,
            MessageId::GetReleaseVersion => 0x777,
        }
    }

    /// Messages sent once per module under the module cursor.
    pub const fn is_module_group(self) -> bool {
        matches!(
            self,
            MessageId::CellVoltageGroupA
                | MessageId::CellVoltageGroupB
                | MessageId::CellVoltageGroupC
                | MessageId::CellVoltageGroupD
                | MessageId::CellVoltageGroupE
                | MessageId::CellVoltageGroupF
                | MessageId::CellTemperatureGroupA
        )
    }

    pub fn is_tx(self) -> bool {
        Self::TX.contains(&self)
    }

    /// Messages transmitted on `bus`. The second bus carries none.
    pub fn tx_messages(bus: Bus) -> &'static [MessageId] {
        match bus {
            Bus::Can0 => &Self::TX,
            Bus::Can1 => &[],
        }
    }

    pub fn rx_messages(bus: Bus) -> &'static [MessageId] {
        match bus {
            Bus::Can0 => &Self::RX,
            Bus::Can1 => &[],
        }
    }

    /// Received message with identifier `can_id` on `bus`.
    pub fn rx_from_can_id(bus: Bus, can_id: u16) -> Option<MessageId> {
        Self::rx_messages(bus).iter().copied().find(|m| m.can_id() == can_id)
    }

    pub fn tx_from_can_id(bus: Bus, can_id: u16) -> Option<MessageId> {
        Self::tx_messages(bus).iter().copied().find(|m| m.can_id() == can_id)
    }
}

/// Source of a transmitted signal's physical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxAccessor {
    SystemError,
    ContactorState,
    RecommendedCurrent,
    MaxPower,
    Soc,
    MinMaxVoltage,
    MinMaxTemperature,
    Tempering,
    Isolation,
    MovingAveragePower,
    MovingAverageCurrent,
    PackVoltage,
    CellVoltage,
    CellTemperature,
    ModuleNumber,
}

/// Effect of a received signal on the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RxAccessor {
    StateRequest,
    SensorStatus,
    SensorMeasurement,
    Debug,
    SoftwareVersion,
}

macro_rules! signal_table {
    (@accessor $kind:ident) => { None };
    (@accessor $kind:ident $accessor:ident) => { Some($kind::$accessor) };
    (@signed) => { false };
    (@signed signed) => { true };

    (
        $(#[$meta:meta])*
        pub enum $name:ident, accessor $kind:ident, table $table:ident {
            $(
                $signal:ident = $message:ident, $start:literal, $length:literal,
                $min:expr, $max:expr, $factor:expr, $offset:expr, $order:ident
                $($sign:ident)? $(=> $accessor:ident)?;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($signal,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$signal,)*];
            pub const COUNT: usize = Self::ALL.len();

            pub const fn index(self) -> usize {
                self as usize
            }

            pub fn descriptor(self) -> &'static SignalDescriptor<$kind> {
                &$table[self.index()]
            }

            pub fn message(self) -> MessageId {
                self.descriptor().message
            }
        }

        pub static $table: [SignalDescriptor<$kind>; $name::COUNT] = [
            $(
                SignalDescriptor {
                    message: MessageId::$message,
                    bit_start: $start,
                    bit_length: $length,
                    min: $min,
                    max: $max,
                    factor: $factor,
                    offset: $offset,
                    byte_order: ByteOrder::$order,
                    signed: signal_table!(@signed $($sign)?),
                    accessor: signal_table!(@accessor $kind $($accessor)?),
                },
            )*
        ];
    };
}

signal_table! {
    /// Transmitted signals of the first bus.
    pub enum TxSignal, accessor TxAccessor, table CAN0_TX {
        Gs0GeneralError = SystemState0, 0, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs0CurrentState = SystemState0, 8, 8, 0.0, U8, 1.0, 0.0, LittleEndian => SystemError;
        Gs0OverTemperatureCharge = SystemState0, 16, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs0UnderTemperatureCharge = SystemState0, 24, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs0OverTemperatureDischarge = SystemState0, 32, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs0UnderTemperatureDischarge = SystemState0, 40, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs0OverCurrentCharge = SystemState0, 48, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs0OverCurrentDischarge = SystemState0, 56, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;

        Gs1OverVoltage = SystemState1, 0, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs1UnderVoltage = SystemState1, 8, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs1DeepDischarge = SystemState1, 11, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs1McuTemperature = SystemState1, 16, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs1Contactor = SystemState1, 24, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs1Selftest = SystemState1, 32, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs1CanTiming = SystemState1, 40, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs1CurrentSensor = SystemState1, 48, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs1BalancingActive = SystemState1, 56, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;

        Gs2StatesRelays = SystemState2, 0, 16, 0.0, U16, 1.0, 0.0, LittleEndian => SystemError;
        Gs2Insulation = SystemState2, 16, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs2FuseState = SystemState2, 24, 4, 0.0, 15.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs2CoinCellVoltage = SystemState2, 32, 2, 0.0, 3.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs2OpenWire = SystemState2, 40, 1, 0.0, U1, 1.0, 0.0, LittleEndian => SystemError;
        Gs2DaisyChain = SystemState2, 48, 4, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;
        Gs2PlausibilityCheck = SystemState2, 56, 3, 0.0, 7.0, 1.0, 0.0, LittleEndian => SystemError;

        ContactorStateCode = ContactorState, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ContactorState;
        ContactorSubstateCode = ContactorState, 8, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ContactorState;

        SlaveState0 = SlaveState0, 0, 64, 0.0, U64, 1.0, 0.0, LittleEndian;
        SlaveState1 = SlaveState1, 0, 64, 0.0, U64, 1.0, 0.0, LittleEndian;

        RecChargeCurrent = RecOperatingCurrent, 0, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => RecommendedCurrent;
        RecChargeCurrentPeak = RecOperatingCurrent, 16, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => RecommendedCurrent;
        RecDischargeCurrent = RecOperatingCurrent, 32, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => RecommendedCurrent;
        RecDischargeCurrentPeak = RecOperatingCurrent, 48, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => RecommendedCurrent;

        MaxChargePower = Sop, 0, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => MaxPower;
        MaxChargePowerPeak = Sop, 16, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => MaxPower;
        MaxDischargePower = Sop, 32, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => MaxPower;
        MaxDischargePowerPeak = Sop, 48, 16, 0.0, 6553.5, 10.0, 0.0, LittleEndian => MaxPower;

        SocMean = Soc, 0, 16, 0.0, 100.0, 100.0, 0.0, LittleEndian => Soc;
        SocMin = Soc, 16, 16, 0.0, 100.0, 100.0, 0.0, LittleEndian => Soc;
        SocMax = Soc, 32, 16, 0.0, 100.0, 100.0, 0.0, LittleEndian => Soc;

        SohMean = Soh, 0, 16, 0.0, 0.0, 100.0, 0.0, LittleEndian;
        SohMin = Soh, 16, 16, 0.0, 0.0, 100.0, 0.0, LittleEndian;
        SohMax = Soh, 32, 16, 0.0, 0.0, 100.0, 0.0, LittleEndian;

        Soe = Soe, 0, 16, 0.0, 0.0, 100.0, 0.0, LittleEndian;
        RemainingEnergy = Soe, 16, 32, 0.0, U32, 1.0, 0.0, LittleEndian;

        CellVoltageMean = MinMaxCellVoltage, 0, 16, 0.0, U16, 1.0, 0.0, LittleEndian => MinMaxVoltage;
        CellVoltageMin = MinMaxCellVoltage, 16, 16, 0.0, U16, 1.0, 0.0, LittleEndian => MinMaxVoltage;
        CellVoltageMax = MinMaxCellVoltage, 32, 16, 0.0, U16, 1.0, 0.0, LittleEndian => MinMaxVoltage;
        CellVoltageModuleMin = MinMaxCellVoltage, 48, 8, 0.0, U8, 1.0, 0.0, LittleEndian => MinMaxVoltage;
        CellVoltageModuleMax = MinMaxCellVoltage, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => MinMaxVoltage;

        Sov = Sov, 0, 16, 0.0, 100.0, 100.0, 0.0, LittleEndian;

        CellTemperatureMean = MinMaxCellTemperature, 0, 16, TEMP_MIN, TEMP_MAX, 100.0, TEMP_OFFSET, LittleEndian => MinMaxTemperature;
        CellTemperatureMin = MinMaxCellTemperature, 16, 16, TEMP_MIN, TEMP_MAX, 100.0, TEMP_OFFSET, LittleEndian => MinMaxTemperature;
        CellTemperatureMax = MinMaxCellTemperature, 32, 16, TEMP_MIN, TEMP_MAX, 100.0, TEMP_OFFSET, LittleEndian => MinMaxTemperature;
        CellTemperatureModuleMin = MinMaxCellTemperature, 48, 8, 0.0, U8, 1.0, 0.0, LittleEndian => MinMaxTemperature;
        CellTemperatureModuleMax = MinMaxCellTemperature, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => MinMaxTemperature;

        CoolingNeeded = Tempering, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => Tempering;
        HeatingNeeded = Tempering, 8, 8, 0.0, U8, 1.0, 0.0, LittleEndian => Tempering;
        TemperingDemand = Tempering, 16, 32, 0.0, U32, 1.0, 0.0, LittleEndian => Tempering;

        InsulationStatus = Insulation, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => Isolation;
        InsulationValue = Insulation, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => Isolation;

        MovingAveragePower1s = Power0, 0, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAveragePower;
        MovingAveragePower5s = Power0, 32, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAveragePower;
        MovingAveragePower10s = Power1, 0, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAveragePower;
        MovingAveragePower30s = Power1, 32, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAveragePower;
        MovingAveragePower60s = Power2, 0, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAveragePower;
        MovingAveragePowerConfig = Power2, 32, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAveragePower;

        MovingAverageCurrent1s = Current0, 0, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAverageCurrent;
        MovingAverageCurrent5s = Current0, 32, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAverageCurrent;
        MovingAverageCurrent10s = Current1, 0, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAverageCurrent;
        MovingAverageCurrent30s = Current1, 32, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAverageCurrent;
        MovingAverageCurrent60s = Current2, 0, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAverageCurrent;
        MovingAverageCurrentConfig = Current2, 32, 32, AVG_MIN, AVG_MAX, 1.0, AVG_OFFSET, LittleEndian => MovingAverageCurrent;

        PackVoltageBattery = PackVoltage, 0, 32, 0.0, U32, 1.0, 0.0, LittleEndian => PackVoltage;
        PackVoltagePowerNet = PackVoltage, 32, 32, 0.0, U32, 1.0, 0.0, LittleEndian => PackVoltage;

        ModuleVoltageValidA = CellVoltageGroupA, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage0 = CellVoltageGroupA, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage1 = CellVoltageGroupA, 24, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage2 = CellVoltageGroupA, 40, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltageNumberA = CellVoltageGroupA, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;
        ModuleVoltageValidB = CellVoltageGroupB, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage3 = CellVoltageGroupB, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage4 = CellVoltageGroupB, 24, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage5 = CellVoltageGroupB, 40, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltageNumberB = CellVoltageGroupB, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;
        ModuleVoltageValidC = CellVoltageGroupC, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage6 = CellVoltageGroupC, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage7 = CellVoltageGroupC, 24, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage8 = CellVoltageGroupC, 40, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltageNumberC = CellVoltageGroupC, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;
        ModuleVoltageValidD = CellVoltageGroupD, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage9 = CellVoltageGroupD, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage10 = CellVoltageGroupD, 24, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage11 = CellVoltageGroupD, 40, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltageNumberD = CellVoltageGroupD, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;
        ModuleVoltageValidE = CellVoltageGroupE, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage12 = CellVoltageGroupE, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage13 = CellVoltageGroupE, 24, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage14 = CellVoltageGroupE, 40, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltageNumberE = CellVoltageGroupE, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;
        ModuleVoltageValidF = CellVoltageGroupF, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage15 = CellVoltageGroupF, 8, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage16 = CellVoltageGroupF, 24, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltage17 = CellVoltageGroupF, 40, 16, 0.0, U16, 1.0, 0.0, LittleEndian => CellVoltage;
        ModuleVoltageNumberF = CellVoltageGroupF, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;

        ModuleTemperatureValid = CellTemperatureGroupA, 0, 8, 0.0, U8, 1.0, 0.0, LittleEndian => CellTemperature;
        ModuleTemperature0 = CellTemperatureGroupA, 8, 16, TEMP_MIN, TEMP_MAX, 100.0, TEMP_OFFSET, LittleEndian => CellTemperature;
        ModuleTemperature1 = CellTemperatureGroupA, 24, 16, TEMP_MIN, TEMP_MAX, 100.0, TEMP_OFFSET, LittleEndian => CellTemperature;
        ModuleTemperature2 = CellTemperatureGroupA, 40, 16, TEMP_MIN, TEMP_MAX, 100.0, TEMP_OFFSET, LittleEndian => CellTemperature;
        ModuleTemperatureNumber = CellTemperatureGroupA, 56, 8, 0.0, U8, 1.0, 0.0, LittleEndian => ModuleNumber;
    }
}

signal_table! {
    /// Received signals of the first bus.
    pub enum RxSignal, accessor RxAccessor, table CAN0_RX {
        StateRequestCode = StateRequest, 8, 8, 0.0, U8, 1.0, 0.0, LittleEndian => StateRequest;

        IvtCurrentMuxId = IvtCurrent, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtCurrentStatus = IvtCurrent, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtCurrentMeasurement = IvtCurrent, 16, 32, I32_MIN, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtVoltage1MuxId = IvtVoltage1, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtVoltage1Status = IvtVoltage1, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtVoltage1Measurement = IvtVoltage1, 16, 32, 0.0, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtVoltage2MuxId = IvtVoltage2, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtVoltage2Status = IvtVoltage2, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtVoltage2Measurement = IvtVoltage2, 16, 32, 0.0, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtVoltage3MuxId = IvtVoltage3, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtVoltage3Status = IvtVoltage3, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtVoltage3Measurement = IvtVoltage3, 16, 32, 0.0, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtTemperatureMuxId = IvtTemperature, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtTemperatureStatus = IvtTemperature, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtTemperatureMeasurement = IvtTemperature, 16, 32, I32_MIN, I32_MAX, 10.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtPowerMuxId = IvtPower, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtPowerStatus = IvtPower, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtPowerMeasurement = IvtPower, 16, 32, I32_MIN, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtCoulombCountMuxId = IvtCoulombCount, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtCoulombCountStatus = IvtCoulombCount, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtCoulombCountMeasurement = IvtCoulombCount, 16, 32, I32_MIN, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;
        IvtEnergyCountMuxId = IvtEnergyCount, 0, 8, 0.0, U8, 1.0, 0.0, BigEndian;
        IvtEnergyCountStatus = IvtEnergyCount, 8, 8, 0.0, U8, 1.0, 0.0, BigEndian => SensorStatus;
        IvtEnergyCountMeasurement = IvtEnergyCount, 16, 32, I32_MIN, I32_MAX, 1.0, 0.0, BigEndian signed => SensorMeasurement;

        DebugData = Debug, 0, 64, 0.0, U64, 1.0, 0.0, LittleEndian => Debug;
        ReleaseVersionRequest = GetReleaseVersion, 0, 64, 0.0, U64, 1.0, 0.0, LittleEndian => SoftwareVersion;
    }
}

const_assert_eq!(TxSignal::COUNT, 109);
const_assert_eq!(RxSignal::COUNT, 27);

/// Descriptor tables of the second bus. Nothing is routed there yet.
pub static CAN1_TX: [SignalDescriptor<TxAccessor>; 0] = [];
pub static CAN1_RX: [SignalDescriptor<RxAccessor>; 0] = [];

pub fn tx_table(bus: Bus) -> &'static [SignalDescriptor<TxAccessor>] {
    match bus {
        Bus::Can0 => &CAN0_TX,
        Bus::Can1 => &CAN1_TX,
    }
}

pub fn rx_table(bus: Bus) -> &'static [SignalDescriptor<RxAccessor>] {
    match bus {
        Bus::Can0 => &CAN0_RX,
        Bus::Can1 => &CAN1_RX,
    }
}

/// Signals of `message` in wire order.
pub fn tx_signals(message: MessageId) -> arrayvec::ArrayVec<TxSignal, MAX_SIGNALS_PER_MESSAGE> {
    TxSignal::ALL.iter().copied().filter(|s| s.message() == message).collect()
}

pub fn rx_signals(message: MessageId) -> arrayvec::ArrayVec<RxSignal, MAX_SIGNALS_PER_MESSAGE> {
    RxSignal::ALL.iter().copied().filter(|s| s.message() == message).collect()
}

/// Role of a signal inside a per-module group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    Valid,
    Data(u8),
    ModuleNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSlot {
    pub cursor: CursorKind,
    pub group: u8,
    pub kind: SlotKind,
}

impl ModuleSlot {
    /// The slot whose evaluation completes a module.
    pub fn advances_cursor(&self) -> bool {
        self.kind == SlotKind::ModuleNumber
            && match self.cursor {
                CursorKind::Voltage => usize::from(self.group) == VOLTAGE_GROUPS - 1,
                CursorKind::Temperature => true,
            }
    }
}

/// Per-module slot of every transmitted signal, `None` outside the groups.
pub static MODULE_SLOTS: [Option<ModuleSlot>; TxSignal::COUNT] = build_module_slots();

const fn group_slots(
    mut slots: [Option<ModuleSlot>; TxSignal::COUNT],
    first: usize,
    cursor: CursorKind,
    group: u8,
) -> [Option<ModuleSlot>; TxSignal::COUNT] {
    slots[first] = Some(ModuleSlot {
        cursor,
        group,
        kind: SlotKind::Valid,
    });
    let mut k = 0;
    while k < GROUP_SLOTS {
        slots[first + 1 + k] = Some(ModuleSlot {
            cursor,
            group,
            kind: SlotKind::Data(k as u8),
        });
        k += 1;
    }
    slots[first + 1 + GROUP_SLOTS] = Some(ModuleSlot {
        cursor,
        group,
        kind: SlotKind::ModuleNumber,
    });
    slots
}

const fn build_module_slots() -> [Option<ModuleSlot>; TxSignal::COUNT] {
    let stride = GROUP_SLOTS + 2;
    let mut slots = [None; TxSignal::COUNT];
    let mut group = 0;
    while group < VOLTAGE_GROUPS {
        let first = TxSignal::ModuleVoltageValidA.index() + group * stride;
        slots = group_slots(slots, first, CursorKind::Voltage, group as u8);
        group += 1;
    }
    group_slots(slots, TxSignal::ModuleTemperatureValid.index(), CursorKind::Temperature, 0)
}

pub fn module_slot(signal: TxSignal) -> Option<ModuleSlot> {
    MODULE_SLOTS[signal.index()]
}

const_assert_eq!(
    TxSignal::ModuleVoltageNumberF.index() - TxSignal::ModuleVoltageValidA.index() + 1,
    VOLTAGE_GROUPS * (GROUP_SLOTS + 2)
);
const_assert_eq!(
    TxSignal::ModuleTemperatureNumber.index() - TxSignal::ModuleTemperatureValid.index(),
    GROUP_SLOTS + 1
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_fit_their_frame() {
        for signal in TxSignal::ALL {
            let d = signal.descriptor();
            assert!(u32::from(d.bit_start) + u32::from(d.bit_length) <= 64, "{signal:?}");
            assert!(d.message.is_tx(), "{signal:?}");
        }
        for signal in RxSignal::ALL {
            let d = signal.descriptor();
            assert!(u32::from(d.bit_start) + u32::from(d.bit_length) <= 64, "{signal:?}");
            assert!(!d.message.is_tx(), "{signal:?}");
        }
    }

    #[test]
    fn test_every_message_has_signals() {
        for message in MessageId::TX {
            let signals = tx_signals(message);
            assert!(!signals.is_empty(), "{message:?}");
        }
        for message in MessageId::RX {
            assert!(!rx_signals(message).is_empty(), "{message:?}");
        }
        assert_eq!(tx_signals(MessageId::SystemState1).len(), 9);
    }

    #[test]
    fn test_module_slots_follow_group_layout() {
        let slot = module_slot(TxSignal::ModuleVoltage7).unwrap();
        assert_eq!(slot.cursor, CursorKind::Voltage);
        assert_eq!(slot.group, 2);
        assert_eq!(slot.kind, SlotKind::Data(1));

        assert!(!module_slot(TxSignal::ModuleVoltageNumberE).unwrap().advances_cursor());
        assert!(module_slot(TxSignal::ModuleVoltageNumberF).unwrap().advances_cursor());
        assert!(module_slot(TxSignal::ModuleTemperatureNumber).unwrap().advances_cursor());
        assert_eq!(module_slot(TxSignal::SocMean), None);

        for signal in TxSignal::ALL {
            if let Some(slot) = module_slot(*signal) {
                let expected = match slot.cursor {
                    CursorKind::Voltage => MessageId::TX[23 + usize::from(slot.group)],
                    CursorKind::Temperature => MessageId::CellTemperatureGroupA,
                };
                assert_eq!(signal.message(), expected, "{signal:?}");
            }
        }
    }

    #[test]
    fn test_can_ids_are_unique() {
        let mut ids: Vec<u16> = MessageId::TX.iter().chain(MessageId::RX.iter()).map(|m| m.can_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MessageId::TX.len() + MessageId::RX.len());
        assert_eq!(MessageId::rx_from_can_id(Bus::Can0, 0x521), Some(MessageId::IvtCurrent));
        assert_eq!(MessageId::rx_from_can_id(Bus::Can1, 0x521), None);
    }
}
