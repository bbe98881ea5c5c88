//! Outbound telemetry encoding.

use super::cursor::{CursorKind, ModuleCursor};
use super::table::{self, module_slot, MessageId, SlotKind, TxAccessor, TxSignal, GROUP_SLOTS};
use super::{Bus, CanFrame, CodecError, FRAME_BYTES};
use crate::config::{CodecConfig, CELLS_PER_MODULE, TEMP_SENSORS_PER_MODULE};
use crate::store::{
    Balancing, CellTemperatures, CellVoltages, ContactorFeedback, ContactorStateRecord,
    CurrentSensor, ErrorState, InterlockFeedback, Isolation, LimitFlags, MaximumOperatingLimits,
    MaximumSafetyLimits, MinMax, MovingAverage, RecommendedSafetyLimits, Sof, Sox, Store,
    SystemState,
};
use tracing::trace;

/// Relay-state bit that carries the interlock instead of a contactor.
const INTERLOCK_BIT: u16 = 9;
const FUSE_NORMAL_FLAG: u8 = 0x01;
const FUSE_CHARGE_FLAG: u8 = 0x04;

/// Error and limit blocks read with SystemState0 and reused by the two
/// following system-state messages.
#[derive(Debug, Clone, Copy, Default)]
struct SystemErrors {
    errors: ErrorState,
    msl: LimitFlags,
    rsl: LimitFlags,
    mol: LimitFlags,
    system: SystemState,
}

impl SystemErrors {
    fn read<S: Store>(store: &S) -> Self {
        Self {
            errors: store.read_block(),
            msl: store.read_block::<MaximumSafetyLimits>().0,
            rsl: store.read_block::<RecommendedSafetyLimits>().0,
            mol: store.read_block::<MaximumOperatingLimits>().0,
            system: store.read_block(),
        }
    }

    fn general_error(&self) -> u8 {
        u8::from(self.msl.any() || self.errors.any())
            | u8::from(self.rsl.any()) << 1
            | u8::from(self.mol.any()) << 2
    }

    /// `MOL<<2 | RSL<<1 | MSL` for one limit flag.
    fn limit(&self, flag: impl Fn(&LimitFlags) -> bool) -> u8 {
        u8::from(flag(&self.msl)) | u8::from(flag(&self.rsl)) << 1 | u8::from(flag(&self.mol)) << 2
    }

    fn daisy_chain(&self) -> u8 {
        let e = &self.errors;
        u8::from(e.spi_error)
            | u8::from(e.crc_error) << 1
            | u8::from(e.mux_error) << 2
            | u8::from(e.ltc_config_error) << 3
    }

    fn fuse_state(&self) -> u8 {
        let mut state = 0;
        if self.errors.fuse_state_normal {
            state |= FUSE_NORMAL_FLAG;
        }
        if self.errors.fuse_state_charge {
            state |= FUSE_CHARGE_FLAG;
        }
        state
    }
}

/// Store data fetched when a message is opened.
#[derive(Debug, Clone, Copy)]
enum Snapshot {
    Empty,
    Balancing(Balancing),
    Relays {
        feedback: ContactorFeedback,
        interlock: InterlockFeedback,
    },
    Contactor(ContactorStateRecord),
    Sof(Sof),
    Sox(Sox),
    MinMax(MinMax),
    Isolation(Isolation),
    MovingAverage(MovingAverage),
    Sensor(CurrentSensor),
}

/// Encoder state that outlives single messages: the system error snapshot,
/// the cell snapshots walked by the module cursor, and the cursor itself.
#[derive(Debug)]
pub struct TxCodec {
    config: CodecConfig,
    bus: Bus,
    cursor: ModuleCursor,
    system: SystemErrors,
    cell_voltages: Box<CellVoltages>,
    cell_temperatures: Box<CellTemperatures>,
    frames_encoded: u32,
}

impl TxCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self::for_bus(config, Bus::Can0)
    }

    pub fn for_bus(config: CodecConfig, bus: Bus) -> Self {
        Self {
            config,
            bus,
            cursor: ModuleCursor::new(),
            system: SystemErrors::default(),
            cell_voltages: Box::default(),
            cell_temperatures: Box::default(),
            frames_encoded: 0,
        }
    }

    pub fn bus(&self) -> Bus {
        self.bus
    }

    pub fn cursor(&self) -> &ModuleCursor {
        &self.cursor
    }

    pub fn frames_encoded(&self) -> u32 {
        self.frames_encoded
    }

    /// Starts a message, reading the store blocks it draws from.
    pub fn open<S: Store>(&mut self, store: &S, message: MessageId) -> Result<TxTransaction<'_>, CodecError> {
        if !MessageId::tx_messages(self.bus).contains(&message) {
            return Err(CodecError::NotInTable(message, self.bus));
        }

        let snapshot = match message {
            MessageId::SystemState0 => {
                self.system = SystemErrors::read(store);
                Snapshot::Empty
            }
            MessageId::SystemState1 => Snapshot::Balancing(store.read_block()),
            MessageId::SystemState2 => Snapshot::Relays {
                feedback: store.read_block(),
                interlock: store.read_block(),
            },
            MessageId::ContactorState => Snapshot::Contactor(store.read_block()),
            MessageId::RecOperatingCurrent => Snapshot::Sof(store.read_block()),
            MessageId::Soc => Snapshot::Sox(store.read_block()),
            MessageId::MinMaxCellVoltage | MessageId::MinMaxCellTemperature => {
                Snapshot::MinMax(store.read_block())
            }
            MessageId::Insulation => Snapshot::Isolation(store.read_block()),
            MessageId::Power0
            | MessageId::Power1
            | MessageId::Power2
            | MessageId::Current0
            | MessageId::Current1
            | MessageId::Current2 => Snapshot::MovingAverage(store.read_block()),
            MessageId::PackVoltage => Snapshot::Sensor(store.read_block()),
            MessageId::CellVoltageGroupA => {
                *self.cell_voltages = store.read_block();
                Snapshot::Empty
            }
            MessageId::CellTemperatureGroupA => {
                if self.cursor.position(CursorKind::Temperature) == 0 {
                    *self.cell_temperatures = store.read_block();
                }
                Snapshot::Empty
            }
            _ => Snapshot::Empty,
        };

        Ok(TxTransaction {
            codec: self,
            message,
            snapshot,
            data: [0; FRAME_BYTES],
            advance: None,
        })
    }

    /// Encodes every signal of `message` in table order.
    pub fn encode_message<S: Store>(&mut self, store: &S, message: MessageId) -> Result<CanFrame, CodecError> {
        let mut tx = self.open(store, message)?;
        for signal in table::tx_signals(message) {
            tx.encode(signal)?;
        }
        Ok(tx.close())
    }

    /// Encodes one full transmit schedule: every summary message once, then
    /// the voltage groups and the temperature group once per module.
    /// Returns the number of frames handed to `sink`.
    pub fn encode_cycle<S: Store>(
        &mut self,
        store: &S,
        mut sink: impl FnMut(CanFrame),
    ) -> Result<usize, CodecError> {
        let mut count = 0;
        let messages = MessageId::tx_messages(self.bus);
        for &message in messages.iter().filter(|m| !m.is_module_group()) {
            sink(self.encode_message(store, message)?);
            count += 1;
        }
        for _ in 0..self.config.module_count {
            for &message in messages.iter().filter(|m| m.is_module_group()) {
                sink(self.encode_message(store, message)?);
                count += 1;
            }
        }
        Ok(count)
    }

    fn cell_value(&self, cursor: CursorKind, group: u8, kind: SlotKind) -> f64 {
        let module = usize::from(self.cursor.position(cursor));
        match (cursor, kind) {
            (_, SlotKind::ModuleNumber) => f64::from(self.cursor.position(cursor)),
            (CursorKind::Voltage, SlotKind::Valid) => {
                let valid = self.cell_voltages.valid.get(module).copied().unwrap_or(0);
                f64::from((valid >> (3 * u32::from(group))) & 0x7)
            }
            (CursorKind::Voltage, SlotKind::Data(k)) => {
                let index = module * CELLS_PER_MODULE + usize::from(group) * GROUP_SLOTS + usize::from(k);
                f64::from(self.cell_voltages.voltage_mv.get(index).copied().unwrap_or(0))
            }
            (CursorKind::Temperature, SlotKind::Valid) => {
                let valid = self.cell_temperatures.valid.get(module).copied().unwrap_or(0);
                f64::from(valid & 0x7)
            }
            (CursorKind::Temperature, SlotKind::Data(k)) => {
                let index = module * TEMP_SENSORS_PER_MODULE + usize::from(k);
                f64::from(self.cell_temperatures.temperature_c.get(index).copied().unwrap_or(0.0))
            }
        }
    }
}

/// One outbound message being assembled.
#[derive(Debug)]
pub struct TxTransaction<'c> {
    codec: &'c mut TxCodec,
    message: MessageId,
    snapshot: Snapshot,
    data: [u8; FRAME_BYTES],
    advance: Option<CursorKind>,
}

impl TxTransaction<'_> {
    pub fn message(&self) -> MessageId {
        self.message
    }

    /// Encodes `signal` into the frame and returns its raw value.
    pub fn encode(&mut self, signal: TxSignal) -> Result<u64, CodecError> {
        let descriptor = signal.descriptor();
        if descriptor.message != self.message {
            return Err(CodecError::ForeignSignal {
                signal: signal.index(),
                message: self.message,
            });
        }

        let physical = match descriptor.accessor {
            Some(accessor) => self.physical(accessor, signal),
            None => 0.0,
        };
        let raw = descriptor.to_raw(physical);
        descriptor.insert(&mut self.data, raw);

        if let Some(slot) = module_slot(signal) {
            if slot.advances_cursor() {
                self.advance = Some(slot.cursor);
            }
        }
        Ok(raw)
    }

    /// Finishes the frame. The module cursor moves here, once the whole
    /// group has been encoded against the same module.
    pub fn close(self) -> CanFrame {
        let codec = self.codec;
        if let Some(kind) = self.advance {
            let module_count = codec.config.module_count;
            codec.cursor.advance(kind, module_count);
        }
        codec.frames_encoded = codec.frames_encoded.wrapping_add(1);

        let frame = CanFrame::for_message(self.message, self.data);
        trace!(message = ?self.message, id = frame.id, data = ?frame.data, "encoded frame");
        frame
    }

    fn physical(&self, accessor: TxAccessor, signal: TxSignal) -> f64 {
        let system = &self.codec.system;
        match (accessor, self.snapshot) {
            (TxAccessor::SystemError, snapshot) => f64::from(system_signal(system, snapshot, signal)),
            (TxAccessor::ContactorState, Snapshot::Contactor(record)) => match signal {
                TxSignal::ContactorStateCode => f64::from(record.state.code()),
                _ => f64::from(record.substate.code()),
            },
            (TxAccessor::RecommendedCurrent, Snapshot::Sof(sof)) => f64::from(match signal {
                TxSignal::RecChargeCurrent => sof.continuous_charge_a,
                TxSignal::RecChargeCurrentPeak => sof.peak_charge_a,
                TxSignal::RecDischargeCurrent => sof.continuous_discharge_a,
                _ => sof.peak_discharge_a,
            }),
            (TxAccessor::Soc, Snapshot::Sox(sox)) => f64::from(match signal {
                TxSignal::SocMean => sox.soc_mean,
                TxSignal::SocMin => sox.soc_min,
                _ => sox.soc_max,
            }),
            (TxAccessor::MinMaxVoltage, Snapshot::MinMax(mm)) => match signal {
                TxSignal::CellVoltageMean => f64::from(mm.voltage_mean_mv),
                TxSignal::CellVoltageMin => f64::from(mm.voltage_min_mv),
                TxSignal::CellVoltageMax => f64::from(mm.voltage_max_mv),
                TxSignal::CellVoltageModuleMin => f64::from(mm.voltage_module_min),
                _ => f64::from(mm.voltage_module_max),
            },
            (TxAccessor::MinMaxTemperature, Snapshot::MinMax(mm)) => match signal {
                TxSignal::CellTemperatureMean => f64::from(mm.temperature_mean_c),
                TxSignal::CellTemperatureMin => f64::from(mm.temperature_min_c),
                TxSignal::CellTemperatureMax => f64::from(mm.temperature_max_c),
                TxSignal::CellTemperatureModuleMin => f64::from(mm.temperature_module_min),
                _ => f64::from(mm.temperature_module_max),
            },
            (TxAccessor::Isolation, Snapshot::Isolation(iso)) => match signal {
                TxSignal::InsulationStatus => f64::from(iso.state),
                _ => f64::from(iso.resistance_kohm),
            },
            (TxAccessor::MovingAveragePower, Snapshot::MovingAverage(avg)) => {
                let window = signal.index() - TxSignal::MovingAveragePower1s.index();
                avg.power_w.get(window).copied().map_or(0.0, f64::from)
            }
            (TxAccessor::MovingAverageCurrent, Snapshot::MovingAverage(avg)) => {
                let window = signal.index() - TxSignal::MovingAverageCurrent1s.index();
                avg.current_ma.get(window).copied().map_or(0.0, f64::from)
            }
            (TxAccessor::PackVoltage, Snapshot::Sensor(sensor)) => f64::from(match signal {
                TxSignal::PackVoltageBattery => sensor.voltage_mv[0],
                _ => sensor.voltage_mv[2],
            }),
            (TxAccessor::CellVoltage | TxAccessor::CellTemperature | TxAccessor::ModuleNumber, _) => {
                match module_slot(signal) {
                    Some(slot) => self.codec.cell_value(slot.cursor, slot.group, slot.kind),
                    None => 0.0,
                }
            }
            // max power and tempering are not computed
            _ => 0.0,
        }
    }
}

fn system_signal(system: &SystemErrors, snapshot: Snapshot, signal: TxSignal) -> u16 {
    let e = &system.errors;
    let value = match signal {
        TxSignal::Gs0GeneralError => system.general_error(),
        TxSignal::Gs0CurrentState => system.system.bms_state,
        TxSignal::Gs0OverTemperatureCharge => system.limit(|f| f.over_temperature_charge),
        TxSignal::Gs0UnderTemperatureCharge => system.limit(|f| f.under_temperature_charge),
        TxSignal::Gs0OverTemperatureDischarge => system.limit(|f| f.over_temperature_discharge),
        TxSignal::Gs0UnderTemperatureDischarge => system.limit(|f| f.under_temperature_discharge),
        TxSignal::Gs0OverCurrentCharge => system.limit(LimitFlags::over_current_charge),
        TxSignal::Gs0OverCurrentDischarge => system.limit(LimitFlags::over_current_discharge),

        TxSignal::Gs1OverVoltage => system.limit(|f| f.over_voltage),
        TxSignal::Gs1UnderVoltage => system.limit(|f| f.under_voltage),
        TxSignal::Gs1DeepDischarge => u8::from(e.deep_discharge_detected),
        TxSignal::Gs1McuTemperature => u8::from(e.mcu_die_temperature),
        TxSignal::Gs1Contactor => u8::from(e.any_contactor()),
        TxSignal::Gs1CanTiming => u8::from(e.can_timing),
        TxSignal::Gs1CurrentSensor => u8::from(e.current_sensor_not_responding || e.can_timing_cc),
        TxSignal::Gs1BalancingActive => match snapshot {
            Snapshot::Balancing(balancing) => u8::from(balancing.enabled),
            _ => 0,
        },

        TxSignal::Gs2StatesRelays => {
            return match snapshot {
                Snapshot::Relays { feedback, interlock } => {
                    (feedback.bitmap & !(1 << INTERLOCK_BIT)) | u16::from(interlock.closed) << INTERLOCK_BIT
                }
                _ => 0,
            };
        }
        TxSignal::Gs2Insulation => u8::from(e.insulation_error),
        TxSignal::Gs2FuseState => system.fuse_state(),
        TxSignal::Gs2CoinCellVoltage => e.coin_cell_voltage,
        TxSignal::Gs2OpenWire => u8::from(e.open_wire),
        TxSignal::Gs2DaisyChain => system.daisy_chain(),
        TxSignal::Gs2PlausibilityCheck => e.plausibility_check,
        // self test is not run
        _ => 0,
    };
    u16::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_limit_packing() {
        let mut system = SystemErrors::default();
        system.msl.over_voltage = true;
        system.mol.over_voltage = true;
        system.rsl.over_current_discharge_pl1 = true;
        assert_eq!(system.limit(|f| f.over_voltage), 0b101);
        assert_eq!(system.limit(LimitFlags::over_current_discharge), 0b010);
        assert_eq!(system.general_error(), 0b111);
    }

    #[test]
    fn test_foreign_signal_is_rejected() {
        let store = MemoryStore::new();
        let mut codec = TxCodec::new(CodecConfig::default());
        let mut tx = codec.open(&store, MessageId::Soc).unwrap();
        assert!(matches!(
            tx.encode(TxSignal::SohMean),
            Err(CodecError::ForeignSignal { message: MessageId::Soc, .. })
        ));
        assert!(tx.encode(TxSignal::SocMax).is_ok());
    }

    #[test]
    fn test_second_bus_has_no_messages() {
        let store = MemoryStore::new();
        let mut codec = TxCodec::for_bus(CodecConfig::default(), Bus::Can1);
        assert_eq!(
            codec.open(&store, MessageId::Soc).err(),
            Some(CodecError::NotInTable(MessageId::Soc, Bus::Can1))
        );
        assert_eq!(codec.encode_cycle(&store, |_| {}).unwrap(), 0);
    }
}
