//! Record decoding: extract a typed value from a packed record buffer.
//!
//! All bit-level extraction funnels through one accumulator routine; the
//! data-type dispatch is a single `match` on the channel descriptor.

use crate::blocks::{ChannelBlock, ChannelType, DataType, cn_flags};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

pub use crate::types::DecodedValue;

/// Result of decoding a channel value, including validity status.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannelValue {
    pub value: DecodedValue,
    pub is_valid: bool,
}

/// Checks if a channel value is valid based on invalidation bits.
///
/// - If the all-invalid flag is set, every value is invalid.
/// - If neither the all-invalid nor the invalidation-bit-valid flag is
///   set, every value is valid.
/// - Otherwise the invalidation bit in the record's invalidation-byte
///   suffix decides.
///
/// # Parameters
/// - `record`: complete record bytes including record id, data, and
///   invalidation bytes
/// - `record_id_size`: bytes of the record id prefix
/// - `cg_data_bytes`: data bytes of the record (from the channel group)
/// - `channel`: the channel block with flags and invalidation bit position
pub fn check_value_validity(
    record: &[u8],
    record_id_size: usize,
    cg_data_bytes: u32,
    channel: &ChannelBlock,
) -> bool {
    if channel.flags & cn_flags::ALL_VALUES_INVALID != 0 {
        return false;
    }

    if channel.flags & (cn_flags::ALL_VALUES_INVALID | cn_flags::INVALIDATION_VALID) == 0 {
        return true;
    }

    // Invalidation byte location: record_id + data_bytes + (bit_pos >> 3)
    let inval_byte_offset =
        record_id_size + cg_data_bytes as usize + (channel.pos_invalidation_bit >> 3) as usize;
    let inval_bit_index = (channel.pos_invalidation_bit & 0x07) as usize;

    if inval_byte_offset < record.len() {
        let inval_byte = record[inval_byte_offset];
        let bit_is_set = (inval_byte >> inval_bit_index) & 0x01 != 0;
        !bit_is_set
    } else {
        // No invalidation byte available, assume valid
        true
    }
}

/// Assemble up to 64 bits from `slice`, shift out the bit offset, mask to
/// the bit count and optionally sign-extend.
///
/// Big-endian sources are byte-reversed into the little-endian accumulator
/// first, so the same shift/mask path serves both endiannesses.
fn extract_bits(slice: &[u8], bit_offset: usize, bit_count: usize, big_endian: bool) -> u64 {
    let raw = if big_endian {
        slice.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    } else {
        slice
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    };
    let shifted = raw >> bit_offset;
    let mask = if bit_count >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_count) - 1
    };
    shifted & mask
}

/// Sign-extend `value` from `bit_count` bits.
fn sign_extend(value: u64, bit_count: usize) -> i64 {
    if bit_count == 0 || bit_count >= 64 {
        return value as i64;
    }
    let sign_bit = 1u64 << (bit_count - 1);
    if value & sign_bit != 0 {
        let mask = (1u64 << bit_count) - 1;
        (value as i64) | !(mask as i64)
    } else {
        value as i64
    }
}

/// Decodes a channel's sample from a record without validity checking.
///
/// Takes the raw record bytes, skips the record id, and decodes the value
/// described by the channel's bit layout and data type. For variable-length
/// channels the decoded value is the 64-bit index into the side table, not
/// the payload itself.
///
/// # Returns
/// The decoded sample, or `None` if the record is too short or the type
/// cannot be decoded (for example 16-bit half floats, which are declared
/// by the format but fail closed here).
pub fn decode_channel_value(
    record: &[u8],
    record_id_size: usize,
    channel: &ChannelBlock,
) -> Option<DecodedValue> {
    decode_value_internal(record, record_id_size, channel)
}

/// Decodes a channel's sample from a record with validity checking.
///
/// # Returns
/// The decoded sample and its validity flag, or `None` if there isn't
/// enough data to decode.
pub fn decode_channel_value_with_validity(
    record: &[u8],
    record_id_size: usize,
    cg_data_bytes: u32,
    channel: &ChannelBlock,
) -> Option<DecodedChannelValue> {
    let value = decode_value_internal(record, record_id_size, channel)?;
    let is_valid = check_value_validity(record, record_id_size, cg_data_bytes, channel);

    Some(DecodedChannelValue { value, is_valid })
}

/// Interpret a variable-length payload according to the channel's declared
/// data type (string, byte array, or MIME).
pub fn decode_vlsd_payload(payload: &[u8], channel: &ChannelBlock) -> DecodedValue {
    match channel.data_type {
        DataType::StringLatin1 => {
            let s: String = payload.iter().map(|&b| b as char).collect();
            DecodedValue::String(s.trim_end_matches('\0').to_string())
        }
        DataType::StringUtf8 => match core::str::from_utf8(payload) {
            Ok(s) => DecodedValue::String(s.trim_end_matches('\0').to_string()),
            Err(_) => DecodedValue::String(String::from("<Invalid UTF8>")),
        },
        DataType::MimeSample => DecodedValue::MimeSample(payload.to_vec()),
        DataType::MimeStream => DecodedValue::MimeStream(payload.to_vec()),
        _ => DecodedValue::ByteArray(payload.to_vec()),
    }
}

fn decode_value_internal(
    record: &[u8],
    record_id_size: usize,
    channel: &ChannelBlock,
) -> Option<DecodedValue> {
    // Virtual masters carry no record bytes; their value is the record
    // index, which the observer supplies. Report zero here.
    if matches!(
        channel.channel_type,
        ChannelType::VirtualMaster | ChannelType::VirtualData
    ) {
        return Some(DecodedValue::UnsignedInteger(0));
    }

    let base_offset = record_id_size + channel.byte_offset as usize;
    let bit_offset = channel.bit_offset as usize;
    let bit_count = channel.bit_count as usize;

    let num_bytes = if channel.data_type.is_byte_aligned() {
        bit_count / 8
    } else {
        (bit_offset + bit_count).div_ceil(8).max(1)
    };

    if base_offset + num_bytes > record.len() {
        return None;
    }
    let slice = &record[base_offset..base_offset + num_bytes];

    // Variable-length channels store a 64-bit index into their side table
    // in the fixed record, whatever payload type they declare.
    if channel.channel_type == ChannelType::VariableLength {
        return Some(DecodedValue::UnsignedInteger(extract_bits(
            slice, bit_offset, bit_count, false,
        )));
    }

    match &channel.data_type {
        DataType::UnsignedIntegerLE => Some(DecodedValue::UnsignedInteger(extract_bits(
            slice, bit_offset, bit_count, false,
        ))),
        DataType::UnsignedIntegerBE => Some(DecodedValue::UnsignedInteger(extract_bits(
            slice, bit_offset, bit_count, true,
        ))),
        DataType::SignedIntegerLE => {
            let raw = extract_bits(slice, bit_offset, bit_count, false);
            Some(DecodedValue::SignedInteger(sign_extend(raw, bit_count)))
        }
        DataType::SignedIntegerBE => {
            let raw = extract_bits(slice, bit_offset, bit_count, true);
            Some(DecodedValue::SignedInteger(sign_extend(raw, bit_count)))
        }
        DataType::FloatLE | DataType::FloatBE => {
            let big_endian = channel.data_type == DataType::FloatBE;
            let raw = extract_bits(slice, bit_offset, bit_count, big_endian);
            match bit_count {
                32 => Some(DecodedValue::Float(f32::from_bits(raw as u32) as f64)),
                64 => Some(DecodedValue::Float(f64::from_bits(raw))),
                // Half precision is declared by the format but unsupported:
                // fail closed rather than guess a layout.
                _ => None,
            }
        }
        DataType::StringLatin1 => {
            let s: String = slice.iter().map(|&b| b as char).collect();
            let terminated = s.split('\0').next().unwrap_or("").to_string();
            Some(DecodedValue::String(terminated))
        }
        DataType::StringUtf8 => match core::str::from_utf8(slice) {
            Ok(s) => Some(DecodedValue::String(
                s.split('\0').next().unwrap_or("").to_string(),
            )),
            Err(_) => Some(DecodedValue::String(String::from("<Invalid UTF8>"))),
        },
        DataType::StringUtf16LE | DataType::StringUtf16BE => {
            if slice.len() % 2 != 0 {
                return None;
            }
            let big_endian = channel.data_type == DataType::StringUtf16BE;
            let u16_data: Vec<u16> = slice
                .chunks_exact(2)
                .map(|chunk| {
                    let pair = [chunk[0], chunk[1]];
                    if big_endian {
                        u16::from_be_bytes(pair)
                    } else {
                        u16::from_le_bytes(pair)
                    }
                })
                .take_while(|&c| c != 0)
                .collect();
            match String::from_utf16(&u16_data) {
                Ok(s) => Some(DecodedValue::String(s)),
                Err(_) => Some(DecodedValue::String(String::from("<Invalid UTF16>"))),
            }
        }
        DataType::ByteArray => Some(DecodedValue::ByteArray(slice.to_vec())),
        DataType::MimeSample => Some(DecodedValue::MimeSample(slice.to_vec())),
        DataType::MimeStream => Some(DecodedValue::MimeStream(slice.to_vec())),
        DataType::CanOpenDate => decode_canopen_date(slice),
        DataType::CanOpenTime => decode_canopen_time(slice),
        _ => Some(DecodedValue::Unknown),
    }
}

/// CANopen date: 7 bytes packing ms-of-minute, minute, hour, day, month
/// and year-since-1984. Normalized to nanoseconds since the Unix epoch.
fn decode_canopen_date(slice: &[u8]) -> Option<DecodedValue> {
    if slice.len() < 7 {
        return None;
    }
    let ms = u16::from_le_bytes([slice[0], slice[1]]) as u64;
    let minute = (slice[2] & 0x3F) as u64;
    let hour = (slice[3] & 0x1F) as u64;
    let day = (slice[4] & 0x1F) as u64;
    let month = (slice[5] & 0x3F) as u64;
    let year = 1984 + (slice[6] & 0x7F) as u64;

    if day == 0 || month == 0 || month > 12 {
        return None;
    }

    let days = days_from_civil(year as i64, month as u32, day as u32);
    let total_ms = (days as u64 * 86_400 + hour * 3_600 + minute * 60) * 1_000 + ms;
    Some(DecodedValue::Timestamp(total_ms * 1_000_000))
}

/// CANopen time: 6 bytes packing ms-since-midnight (28 bits) and days
/// since 1984-01-01. Normalized to nanoseconds since the Unix epoch.
fn decode_canopen_time(slice: &[u8]) -> Option<DecodedValue> {
    if slice.len() < 6 {
        return None;
    }
    let ms = (u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]) & 0x0FFF_FFFF) as u64;
    let days = u16::from_le_bytes([slice[4], slice[5]]) as u64;

    // Days between 1970-01-01 and 1984-01-01.
    const EPOCH_TO_1984_DAYS: u64 = 5113;
    let total_ms = (days + EPOCH_TO_1984_DAYS) * 86_400_000 + ms;
    Some(DecodedValue::Timestamp(total_ms * 1_000_000))
}

/// Days from the Unix epoch for a civil date (proleptic Gregorian).
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy as u64;
    era * 146_097 + doe as i64 - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ChannelBlock;

    fn channel(data_type: DataType, byte_offset: u32, bit_offset: u8, bit_count: u32) -> ChannelBlock {
        ChannelBlock {
            data_type,
            byte_offset,
            bit_offset,
            bit_count,
            ..Default::default()
        }
    }

    #[test]
    fn unsigned_bitfield_extraction() {
        // Value 0b101 stored at bit offset 3 of byte 1
        let record = [0u8, 0b0010_1000, 0];
        let ch = channel(DataType::UnsignedIntegerLE, 1, 3, 3);
        let v = decode_channel_value(&record, 0, &ch).unwrap();
        assert_eq!(v, DecodedValue::UnsignedInteger(0b101));
    }

    #[test]
    fn signed_sign_extension() {
        // 4-bit value 0b1111 == -1
        let record = [0b0000_1111u8];
        let ch = channel(DataType::SignedIntegerLE, 0, 0, 4);
        let v = decode_channel_value(&record, 0, &ch).unwrap();
        assert_eq!(v, DecodedValue::SignedInteger(-1));
    }

    #[test]
    fn big_endian_integer() {
        let record = [0x12u8, 0x34];
        let ch = channel(DataType::UnsignedIntegerBE, 0, 0, 16);
        let v = decode_channel_value(&record, 0, &ch).unwrap();
        assert_eq!(v, DecodedValue::UnsignedInteger(0x1234));
    }

    #[test]
    fn float64_le() {
        let mut record = [0u8; 8];
        record.copy_from_slice(&42.5f64.to_le_bytes());
        let ch = channel(DataType::FloatLE, 0, 0, 64);
        let v = decode_channel_value(&record, 0, &ch).unwrap();
        assert_eq!(v, DecodedValue::Float(42.5));
    }

    #[test]
    fn half_float_fails_closed() {
        let record = [0u8; 2];
        let ch = channel(DataType::FloatLE, 0, 0, 16);
        assert!(decode_channel_value(&record, 0, &ch).is_none());
    }

    #[test]
    fn utf8_string_stops_at_nul() {
        let record = *b"abc\0defg";
        let ch = channel(DataType::StringUtf8, 0, 0, 64);
        let v = decode_channel_value(&record, 0, &ch).unwrap();
        assert_eq!(v, DecodedValue::String("abc".into()));
    }

    #[test]
    fn record_id_prefix_is_skipped() {
        let record = [9u8, 0x2A]; // record id 9, value 42
        let ch = channel(DataType::UnsignedIntegerLE, 0, 0, 8);
        let v = decode_channel_value(&record, 1, &ch).unwrap();
        assert_eq!(v, DecodedValue::UnsignedInteger(42));
    }

    #[test]
    fn invalidation_bit() {
        // 1 data byte + 1 invalidation byte; bit 0 set => invalid
        let record = [0x55u8, 0x01];
        let mut ch = channel(DataType::UnsignedIntegerLE, 0, 0, 8);
        ch.flags = cn_flags::INVALIDATION_VALID;
        ch.pos_invalidation_bit = 0;
        assert!(!check_value_validity(&record, 0, 1, &ch));

        let record_valid = [0x55u8, 0x00];
        assert!(check_value_validity(&record_valid, 0, 1, &ch));
    }

    #[test]
    fn all_invalid_flag_wins() {
        let record = [0u8];
        let mut ch = channel(DataType::UnsignedIntegerLE, 0, 0, 8);
        ch.flags = cn_flags::ALL_VALUES_INVALID;
        assert!(!check_value_validity(&record, 0, 1, &ch));
    }

    #[test]
    fn canopen_time_epoch_offset() {
        // day 0, ms 0 => 1984-01-01T00:00:00
        let slice = [0u8, 0, 0, 0, 0, 0];
        let ch = channel(DataType::CanOpenTime, 0, 0, 48);
        let v = decode_channel_value(&slice, 0, &ch).unwrap();
        assert_eq!(
            v,
            DecodedValue::Timestamp(5113 * 86_400_000 * 1_000_000)
        );
    }

    #[test]
    fn canopen_date_known_value() {
        // 1984-01-01T00:00:00.000, minute 0, hour 0, day 1, month 1, year 0
        let slice = [0u8, 0, 0, 0, 1, 1, 0];
        let ch = channel(DataType::CanOpenDate, 0, 0, 56);
        let v = decode_channel_value(&slice, 0, &ch).unwrap();
        assert_eq!(
            v,
            DecodedValue::Timestamp(5113 * 86_400_000 * 1_000_000)
        );
    }

    #[test]
    fn vlsd_channel_decodes_its_index() {
        let mut ch = channel(DataType::ByteArray, 0, 0, 64);
        ch.channel_type = ChannelType::VariableLength;
        let record = 0x1122u64.to_le_bytes();
        let v = decode_channel_value(&record, 0, &ch).unwrap();
        assert_eq!(v, DecodedValue::UnsignedInteger(0x1122));
    }

    #[test]
    fn civil_day_math() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(1984, 1, 1), 5113);
        assert_eq!(days_from_civil(2000, 3, 1), 11017);
    }
}
