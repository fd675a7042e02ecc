//! Register schema and numeric encodings shared by both servo families.
//!
//! A control table maps a named register to its wire address, width and
//! encoding. Values travel little-endian on the wire; signed quantities use
//! either two's complement (Dynamixel) or sign-magnitude (Feetech, with the
//! sign bit at a register-specific index).

use crate::error::{Error, Result};

/// Numeric encoding of a register field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain unsigned integer
    Unsigned,
    /// Two's complement signed integer over the full field width
    TwosComplement,
    /// Sign bit at the given index, magnitude in the low bits.
    /// Only valid for fields of width <= 2.
    SignMagnitude(u8),
}

/// Register access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read-only
    Read,
    /// Read-write
    ReadWrite,
}

/// One entry of a motor family's control table
#[derive(Debug, Clone, Copy)]
pub struct RegisterEntry {
    /// Wire address of the field
    pub address: u16,
    /// Field width in bytes (1, 2 or 4)
    pub width: u8,
    /// Numeric encoding
    pub encoding: Encoding,
    /// Access mode
    pub access: Access,
    /// Whether position calibration applies to this field
    pub needs_calibration: bool,
}

impl RegisterEntry {
    /// Decode a raw little-endian field value to a signed integer
    pub fn decode(&self, raw: u32) -> i32 {
        match self.encoding {
            Encoding::Unsigned => raw as i32,
            Encoding::TwosComplement => {
                let bits = 8 * u32::from(self.width);
                let sign_bit = 1u64 << (bits - 1);
                if u64::from(raw) & sign_bit != 0 {
                    (i64::from(raw) - (1i64 << bits)) as i32
                } else {
                    raw as i32
                }
            }
            Encoding::SignMagnitude(bit) => decode_sign_magnitude(raw, bit),
        }
    }

    /// Encode a signed integer back to the raw wire representation
    pub fn encode(&self, value: i32) -> u32 {
        match self.encoding {
            Encoding::Unsigned | Encoding::TwosComplement => {
                let bits = 8 * u32::from(self.width);
                let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
                (value as u32) & mask
            }
            Encoding::SignMagnitude(bit) => encode_sign_magnitude(value, bit),
        }
    }

    /// Split a raw value into `width` little-endian bytes
    pub fn split_into_bytes(&self, raw: u32) -> Vec<u8> {
        raw.to_le_bytes()[..self.width as usize].to_vec()
    }

    /// Assemble a raw value from little-endian wire bytes
    pub fn assemble_from_bytes(&self, bytes: &[u8]) -> Result<u32> {
        if bytes.len() != self.width as usize {
            return Err(Error::InvalidParameter(format!(
                "expected {} bytes for register field, got {}",
                self.width,
                bytes.len()
            )));
        }
        let mut buf = [0u8; 4];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }
}

/// Decode a sign-magnitude encoded value to a signed integer.
///
/// Sign bit set means negative; the remaining low bits are the magnitude.
pub fn decode_sign_magnitude(encoded: u32, sign_bit_index: u8) -> i32 {
    let direction = (encoded >> sign_bit_index) & 1;
    let magnitude = (encoded & ((1 << sign_bit_index) - 1)) as i32;
    if direction != 0 { -magnitude } else { magnitude }
}

/// Encode a signed integer into sign-magnitude format.
///
/// The magnitude is clamped to `2^sign_bit_index - 1` before combining.
pub fn encode_sign_magnitude(value: i32, sign_bit_index: u8) -> u32 {
    let max_magnitude = (1u32 << sign_bit_index) - 1;
    let magnitude = (value.unsigned_abs()).min(max_magnitude);
    let direction = u32::from(value < 0);
    (direction << sign_bit_index) | magnitude
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(width: u8, encoding: Encoding) -> RegisterEntry {
        RegisterEntry {
            address: 0,
            width,
            encoding,
            access: Access::ReadWrite,
            needs_calibration: false,
        }
    }

    #[test]
    fn test_twos_complement_decode() {
        let e16 = entry(2, Encoding::TwosComplement);
        assert_eq!(e16.decode(0x0000), 0);
        assert_eq!(e16.decode(0x7FFF), 32767);
        assert_eq!(e16.decode(0x8000), -32768);
        assert_eq!(e16.decode(0xFFFF), -1);

        let e32 = entry(4, Encoding::TwosComplement);
        assert_eq!(e32.decode(0xFFFF_FFFF), -1);
        assert_eq!(e32.decode(0x8000_0000), i32::MIN);
        assert_eq!(e32.decode(0x7FFF_FFFF), i32::MAX);
    }

    #[test]
    fn test_twos_complement_round_trip() {
        let e16 = entry(2, Encoding::TwosComplement);
        for raw in [0u32, 1, 0x00FF, 0x7FFF, 0x8000, 0xABCD, 0xFFFF] {
            assert_eq!(e16.encode(e16.decode(raw)), raw, "raw={:#06x}", raw);
        }
        let e32 = entry(4, Encoding::TwosComplement);
        for raw in [0u32, 0x7FFF_FFFF, 0x8000_0000, 0xDEAD_BEEF, u32::MAX] {
            assert_eq!(e32.encode(e32.decode(raw)), raw, "raw={:#010x}", raw);
        }
    }

    #[test]
    fn test_sign_magnitude_round_trip() {
        for bit in [10u8, 11, 15] {
            let limit = (1i32 << bit) - 1;
            for value in [-limit, -1024, -1, 0, 1, 873, limit] {
                let value = value.clamp(-limit, limit);
                assert_eq!(
                    decode_sign_magnitude(encode_sign_magnitude(value, bit), bit),
                    value,
                    "bit={} value={}",
                    bit,
                    value
                );
            }
        }
    }

    #[test]
    fn test_sign_magnitude_clamps_magnitude() {
        // bit 11 -> max magnitude 2047
        assert_eq!(encode_sign_magnitude(5000, 11), 2047);
        assert_eq!(encode_sign_magnitude(-5000, 11), (1 << 11) | 2047);
    }

    #[test]
    fn test_sign_magnitude_known_values() {
        // 0x8005 with sign bit 15 -> -5
        assert_eq!(decode_sign_magnitude(0x8005, 15), -5);
        assert_eq!(decode_sign_magnitude(0x0005, 15), 5);
        assert_eq!(encode_sign_magnitude(-5, 15), 0x8005);
    }

    #[test]
    fn test_byte_split_little_endian() {
        let e = entry(4, Encoding::Unsigned);
        assert_eq!(e.split_into_bytes(0x1234_5678), vec![0x78, 0x56, 0x34, 0x12]);
        let e2 = entry(2, Encoding::Unsigned);
        assert_eq!(e2.split_into_bytes(0xBEEF), vec![0xEF, 0xBE]);
        assert_eq!(e2.assemble_from_bytes(&[0xEF, 0xBE]).unwrap(), 0xBEEF);
    }
}
