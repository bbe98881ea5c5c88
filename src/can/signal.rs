//! Signal descriptors and the bit-level packing of one signal into a frame.

use super::table::MessageId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Intel layout: `bit_start` counts from the LSB of byte 0.
    LittleEndian,
    /// Motorola layout: `bit_start` counts from the MSB of byte 0.
    BigEndian,
}

/// Static description of one signal inside an 8-byte message.
///
/// Physical and raw values relate as `raw = (physical + offset) * factor`;
/// the physical value is clamped to `[min, max]` before scaling in both
/// directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDescriptor<A> {
    pub message: MessageId,
    pub bit_start: u8,
    pub bit_length: u8,
    pub min: f64,
    pub max: f64,
    pub factor: f64,
    pub offset: f64,
    pub byte_order: ByteOrder,
    /// Raw values are two's complement in the signal width.
    pub signed: bool,
    pub accessor: Option<A>,
}

impl<A> SignalDescriptor<A> {
    /// Saturates `value` to the descriptor range. Never reports.
    pub fn check_limits(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub fn to_raw(&self, physical: f64) -> u64 {
        let scaled = (self.check_limits(physical) + self.offset) * self.factor;
        let raw = if scaled < 0.0 {
            // two's complement in the signal width
            (scaled as i64) as u64
        } else {
            scaled as u64
        };
        raw & self.mask()
    }

    pub fn to_physical(&self, raw: u64) -> f64 {
        let raw = raw & self.mask();
        let value = if self.signed {
            sign_extend(raw, self.bit_length) as f64
        } else {
            raw as f64
        };
        self.check_limits(value / self.factor - self.offset)
    }

    pub fn mask(&self) -> u64 {
        if self.bit_length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_length) - 1
        }
    }

    fn shift(&self) -> u32 {
        debug_assert!(
            u32::from(self.bit_start) + u32::from(self.bit_length) <= 64,
            "signal exceeds the 8-byte frame"
        );
        match self.byte_order {
            ByteOrder::LittleEndian => u32::from(self.bit_start),
            ByteOrder::BigEndian => 64 - u32::from(self.bit_start) - u32::from(self.bit_length),
        }
    }

    /// Writes `raw` into its bit range, leaving the other bits untouched.
    pub fn insert(&self, data: &mut [u8; 8], raw: u64) {
        let mask = self.mask();
        let shift = self.shift();
        let field = (raw & mask) << shift;
        let cleared = !(mask << shift);
        *data = match self.byte_order {
            ByteOrder::LittleEndian => ((u64::from_le_bytes(*data) & cleared) | field).to_le_bytes(),
            ByteOrder::BigEndian => ((u64::from_be_bytes(*data) & cleared) | field).to_be_bytes(),
        };
    }

    pub fn extract(&self, data: &[u8; 8]) -> u64 {
        let word = match self.byte_order {
            ByteOrder::LittleEndian => u64::from_le_bytes(*data),
            ByteOrder::BigEndian => u64::from_be_bytes(*data),
        };
        (word >> self.shift()) & self.mask()
    }
}

fn sign_extend(raw: u64, bits: u8) -> i64 {
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let unused = 64 - u32::from(bits);
    ((raw << unused) as i64) >> unused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(bit_start: u8, bit_length: u8, byte_order: ByteOrder) -> SignalDescriptor<()> {
        SignalDescriptor {
            message: MessageId::Debug,
            bit_start,
            bit_length,
            min: 0.0,
            max: f64::from(u32::MAX),
            factor: 1.0,
            offset: 0.0,
            byte_order,
            signed: false,
            accessor: None,
        }
    }

    #[test]
    fn test_little_endian_spans_bytes() {
        let signal = descriptor(8, 16, ByteOrder::LittleEndian);
        let mut data = [0xFF; 8];
        signal.insert(&mut data, 0x1234);
        assert_eq!(data, [0xFF, 0x34, 0x12, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(signal.extract(&data), 0x1234);
    }

    #[test]
    fn test_sub_byte_fields_do_not_overlap() {
        let deep_discharge = descriptor(11, 1, ByteOrder::LittleEndian);
        let under_voltage = descriptor(8, 3, ByteOrder::LittleEndian);
        let mut data = [0; 8];
        under_voltage.insert(&mut data, 0b101);
        deep_discharge.insert(&mut data, 1);
        assert_eq!(data[1], 0b0000_1101);
        assert_eq!(under_voltage.extract(&data), 0b101);
    }

    #[test]
    fn test_big_endian_counts_from_first_byte() {
        let measurement = descriptor(16, 32, ByteOrder::BigEndian);
        let data = [0x00, 0x00, 0x00, 0x01, 0x86, 0xA0, 0x00, 0x00];
        assert_eq!(measurement.extract(&data), 100_000);

        let mut out = [0; 8];
        measurement.insert(&mut out, 100_000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_full_width_mask() {
        let signal = descriptor(0, 64, ByteOrder::LittleEndian);
        assert_eq!(signal.mask(), u64::MAX);
        let data = 0x0102_0304_0506_0708_u64.to_le_bytes();
        assert_eq!(signal.extract(&data), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_signed_decode_sign_extends() {
        let signal = SignalDescriptor {
            min: f64::from(i32::MIN),
            max: f64::from(i32::MAX),
            signed: true,
            ..descriptor(16, 32, ByteOrder::BigEndian)
        };
        assert_eq!(signal.to_physical(0xFFFF_FF9C), -100.0);
        assert_eq!(signal.to_raw(-100.0), 0xFFFF_FF9C);
    }

    #[test]
    fn test_signed_decode_saturates_at_range_floor() {
        let voltage = SignalDescriptor {
            max: f64::from(i32::MAX),
            signed: true,
            ..descriptor(16, 32, ByteOrder::BigEndian)
        };
        assert_eq!(voltage.to_physical(0xFFFF_FF9C), 0.0);

        let unsigned = SignalDescriptor { signed: false, ..voltage };
        assert_eq!(unsigned.to_physical(0xFFFF_FF9C), f64::from(i32::MAX));
    }
}
