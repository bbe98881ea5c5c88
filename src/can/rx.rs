//! Inbound frame decoding into the store.

use super::table::{self, MessageId, RxAccessor, RxSignal};
use super::{Bus, CanFrame, CodecError, FRAME_BYTES};
use crate::config::CodecConfig;
use crate::contactor::state::NO_REQUEST_CODE;
use crate::contactor::{RequestHandle, RequestOutcome};
use crate::diag::{DiagChannel, DiagEvent, DiagReporter};
use crate::store::{
    Balancing, ChannelStatus, CurrentSensor, SensorChannels, Sox, StateRequestRecord, Store,
    SystemState,
};
use std::fmt;
use tracing::{debug, info, trace, warn};

const STATUS_UNRECOVERABLE: u8 = 0x80;
const STATUS_SENSOR_FAULT: u8 = 0x40;
const STATUS_CHANNEL_FAULT: u8 = 0x20;
const STATUS_CHANNEL_WARNING: u8 = 0x10;

const DEBUG_SET_SOC: u8 = 0x0B;
const DEBUG_BALANCING: u8 = 0x0E;
const DEBUG_DEEP_DISCHARGE_OK: u8 = 0xAA;
const DEBUG_FORCE_ERROR: u8 = 0xBB;
const FORCED_BMS_STATE: u8 = 0xF0;

/// Receiver of state requests that arrive over the bus.
pub trait RequestSink {
    fn forward(&self, code: u8) -> RequestOutcome;
}

impl RequestSink for RequestHandle {
    fn forward(&self, code: u8) -> RequestOutcome {
        self.submit_code(code)
    }
}

pub struct RxCodec {
    config: CodecConfig,
    bus: Bus,
    sink: Option<Box<dyn RequestSink + Send>>,
    frames_decoded: u32,
    version_requests: u32,
}

impl fmt::Debug for RxCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxCodec")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("forwarding", &self.sink.is_some())
            .field("frames_decoded", &self.frames_decoded)
            .field("version_requests", &self.version_requests)
            .finish()
    }
}

impl RxCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self::for_bus(config, Bus::Can0)
    }

    pub fn for_bus(config: CodecConfig, bus: Bus) -> Self {
        Self {
            config,
            bus,
            sink: None,
            frames_decoded: 0,
            version_requests: 0,
        }
    }

    /// Forwards newly pending bus state requests to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: impl RequestSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn frames_decoded(&self) -> u32 {
        self.frames_decoded
    }

    pub fn version_requests(&self) -> u32 {
        self.version_requests
    }

    pub fn open<'a, S: Store, D: DiagReporter>(
        &'a mut self,
        store: &'a S,
        diag: &'a mut D,
        message: MessageId,
        data: [u8; FRAME_BYTES],
        now_ms: u32,
    ) -> Result<RxTransaction<'a, S, D>, CodecError> {
        if !MessageId::rx_messages(self.bus).contains(&message) {
            return Err(CodecError::NotInTable(message, self.bus));
        }
        let sensor = is_sensor_message(message).then(|| store.read_block::<CurrentSensor>());
        Ok(RxTransaction {
            codec: self,
            store,
            diag,
            message,
            data,
            now_ms,
            sensor,
        })
    }

    /// Decodes every signal of the frame's message.
    pub fn decode_frame<S: Store, D: DiagReporter>(
        &mut self,
        store: &S,
        diag: &mut D,
        frame: &CanFrame,
        now_ms: u32,
    ) -> Result<MessageId, CodecError> {
        let message = MessageId::rx_from_can_id(self.bus, frame.id)
            .ok_or(CodecError::UnknownFrame(frame.id, self.bus))?;
        let mut rx = self.open(store, diag, message, frame.data, now_ms)?;
        for signal in table::rx_signals(message) {
            rx.decode(signal)?;
        }
        rx.close();
        Ok(message)
    }

    fn accept_state_request<S: Store>(&mut self, store: &S, code: u8, now_ms: u32) {
        let mut record: StateRequestRecord = store.read_block();
        record.previous_state_request = record.state_request;
        record.state_request = code;

        let stale = now_ms.wrapping_sub(record.timestamp_ms) > self.config.state_request_staleness_ms;
        let newly_pending = code != record.previous_state_request || stale;
        if newly_pending {
            record.state_request_pending = code;
            record.timestamp_ms = now_ms;
        }
        record.counter = record.counter.wrapping_add(1);
        store.write_block(&record);

        if newly_pending && code != NO_REQUEST_CODE {
            if let Some(sink) = &self.sink {
                let outcome = sink.forward(code);
                debug!(code, ?outcome, "bus state request forwarded");
            }
        }
    }
}

/// One inbound frame being applied to the store.
///
/// Current-sensor messages read the sensor block on open and write it back
/// on close, so status and measurement of one frame land together.
pub struct RxTransaction<'a, S, D> {
    codec: &'a mut RxCodec,
    store: &'a S,
    diag: &'a mut D,
    message: MessageId,
    data: [u8; FRAME_BYTES],
    now_ms: u32,
    sensor: Option<CurrentSensor>,
}

impl<S: Store, D: DiagReporter> RxTransaction<'_, S, D> {
    pub fn message(&self) -> MessageId {
        self.message
    }

    /// Decodes `signal` and applies it. Returns the physical value.
    pub fn decode(&mut self, signal: RxSignal) -> Result<f64, CodecError> {
        let descriptor = signal.descriptor();
        if descriptor.message != self.message {
            return Err(CodecError::ForeignSignal {
                signal: signal.index(),
                message: self.message,
            });
        }

        let raw = descriptor.extract(&self.data);
        let physical = descriptor.to_physical(raw);

        match descriptor.accessor {
            Some(RxAccessor::StateRequest) => {
                self.codec.accept_state_request(self.store, physical as u8, self.now_ms);
            }
            Some(RxAccessor::SensorStatus) => {
                if let Some(sensor) = self.sensor.as_mut() {
                    apply_status(&mut sensor.channels, self.message, raw as u8);
                }
            }
            Some(RxAccessor::SensorMeasurement) => {
                if let Some(sensor) = self.sensor.as_mut() {
                    apply_measurement(sensor, self.message, physical, self.now_ms);
                }
            }
            Some(RxAccessor::Debug) => self.apply_debug(raw),
            Some(RxAccessor::SoftwareVersion) => {
                self.codec.version_requests = self.codec.version_requests.wrapping_add(1);
                info!(count = self.codec.version_requests, "software version requested");
            }
            None => {}
        }
        Ok(physical)
    }

    pub fn close(self) {
        if let Some(sensor) = &self.sensor {
            self.store.write_block(sensor);
        }
        self.codec.frames_decoded = self.codec.frames_decoded.wrapping_add(1);
        trace!(message = ?self.message, data = ?self.data, "decoded frame");
    }

    fn apply_debug(&mut self, raw: u64) {
        let bytes = raw.to_le_bytes();
        match bytes[0] {
            DEBUG_SET_SOC => {
                let soc = f32::from((u16::from(bytes[1]) << 8) | u16::from(bytes[2])) / 100.0;
                self.store.write_block(&Sox {
                    soc_mean: soc,
                    soc_min: soc,
                    soc_max: soc,
                });
                debug!(soc, "debug: soc set");
            }
            DEBUG_BALANCING => {
                let enabled = bytes[1] != 0;
                self.store.write_block(&Balancing { enabled });
                debug!(enabled, "debug: balancing");
            }
            DEBUG_DEEP_DISCHARGE_OK => {
                self.diag.report(DiagChannel::DeepDischarge, DiagEvent::Ok, self.now_ms);
                debug!("debug: deep discharge cleared");
            }
            DEBUG_FORCE_ERROR => {
                self.store.write_block(&SystemState {
                    bms_state: FORCED_BMS_STATE,
                });
                warn!("debug: bms state forced to error");
            }
            command => debug!(command, "debug: unknown command"),
        }
    }
}

fn is_sensor_message(message: MessageId) -> bool {
    matches!(
        message,
        MessageId::IvtCurrent
            | MessageId::IvtVoltage1
            | MessageId::IvtVoltage2
            | MessageId::IvtVoltage3
            | MessageId::IvtTemperature
            | MessageId::IvtPower
            | MessageId::IvtCoulombCount
            | MessageId::IvtEnergyCount
    )
}

/// Store channel fed by a current-sensor message. The three voltage
/// messages share one channel.
fn channel_mut(channels: &mut SensorChannels, message: MessageId) -> Option<&mut ChannelStatus> {
    match message {
        MessageId::IvtCurrent => Some(&mut channels.current),
        MessageId::IvtVoltage1 | MessageId::IvtVoltage2 | MessageId::IvtVoltage3 => Some(&mut channels.voltage),
        MessageId::IvtTemperature => Some(&mut channels.temperature),
        MessageId::IvtPower => Some(&mut channels.power),
        MessageId::IvtCoulombCount => Some(&mut channels.coulomb_count),
        MessageId::IvtEnergyCount => Some(&mut channels.energy_count),
        _ => None,
    }
}

/// Sensor-wide bits widen to every channel; the lower bits affect only the
/// channel the message reports.
fn apply_status(channels: &mut SensorChannels, message: MessageId, status: u8) {
    let nibble = status & 0xF0;
    if nibble & STATUS_UNRECOVERABLE != 0 {
        channels.set_all(ChannelStatus::Unrecoverable);
    } else if nibble & STATUS_SENSOR_FAULT != 0 {
        channels.set_all(ChannelStatus::Fault);
    } else if let Some(channel) = channel_mut(channels, message) {
        *channel = if nibble & STATUS_CHANNEL_FAULT != 0 {
            ChannelStatus::Fault
        } else if nibble & STATUS_CHANNEL_WARNING != 0 {
            ChannelStatus::Warning
        } else {
            ChannelStatus::NoFault
        };
    }
    if nibble != 0 {
        warn!(?message, nibble, "current sensor status");
    }
}

fn apply_measurement(sensor: &mut CurrentSensor, message: MessageId, value: f64, now_ms: u32) {
    match message {
        MessageId::IvtCurrent => {
            sensor.current_ma = value as i32;
            sensor.new_current = sensor.new_current.wrapping_add(1);
            sensor.previous_timestamp_current_ms = sensor.timestamp_current_ms;
            sensor.timestamp_current_ms = now_ms;
        }
        MessageId::IvtVoltage1 => sensor.voltage_mv[0] = value as f32,
        MessageId::IvtVoltage2 => sensor.voltage_mv[1] = value as f32,
        MessageId::IvtVoltage3 => sensor.voltage_mv[2] = value as f32,
        MessageId::IvtTemperature => sensor.temperature_c = value as f32,
        MessageId::IvtPower => {
            sensor.power_w = value as f32;
            sensor.new_power = sensor.new_power.wrapping_add(1);
        }
        MessageId::IvtCoulombCount => {
            sensor.previous_timestamp_cc_ms = sensor.timestamp_cc_ms;
            sensor.timestamp_cc_ms = now_ms;
            sensor.coulomb_count = value as f32;
        }
        MessageId::IvtEnergyCount => sensor.energy_count = value as f32,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_nibble_widening() {
        let mut channels = SensorChannels::default();
        apply_status(&mut channels, MessageId::IvtPower, 0x21);
        assert_eq!(channels.power, ChannelStatus::Fault);
        assert_eq!(channels.current, ChannelStatus::NoFault);

        apply_status(&mut channels, MessageId::IvtVoltage2, 0x10);
        assert_eq!(channels.voltage, ChannelStatus::Warning);

        apply_status(&mut channels, MessageId::IvtCurrent, 0x40);
        assert_eq!(channels.energy_count, ChannelStatus::Fault);

        apply_status(&mut channels, MessageId::IvtCurrent, 0x80);
        assert_eq!(channels.temperature, ChannelStatus::Unrecoverable);

        apply_status(&mut channels, MessageId::IvtPower, 0x00);
        assert_eq!(channels.power, ChannelStatus::NoFault);
        assert_eq!(channels.current, ChannelStatus::Unrecoverable);
    }

    #[test]
    fn test_coulomb_count_keeps_previous_timestamp() {
        let mut sensor = CurrentSensor::default();
        apply_measurement(&mut sensor, MessageId::IvtCoulombCount, 12.0, 100);
        apply_measurement(&mut sensor, MessageId::IvtCoulombCount, 13.0, 110);
        assert_eq!(sensor.timestamp_cc_ms, 110);
        assert_eq!(sensor.previous_timestamp_cc_ms, 100);
        assert!((sensor.coulomb_count - 13.0).abs() < f32::EPSILON);
    }
}
