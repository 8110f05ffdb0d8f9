//! Integer, floating-point, logical and packed-BCD encodings.
//!
//! Numeric values are stored big-endian with the sign bit inverted so that unsigned byte order
//! matches numeric order. An all-zero slot is a blank (NULL) value.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::BCD_WIDTH;

const SIGN_BIT_64: u64 = 0x8000_0000_0000_0000;
const SIGN_BIT_32: u32 = 0x8000_0000;
const SIGN_BIT_16: u16 = 0x8000;
/// Auto-increment values reserve the top nibble.
pub const AUTO_INCREMENT_MASK: u32 = 0x0FFF_FFFF;

pub const LOGICAL_FALSE: u8 = 0x80;
pub const LOGICAL_TRUE: u8 = 0x81;

/// Largest mantissa a `Decimal` can carry (2^96 - 1).
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;
const DECIMAL_MAX_SCALE: u32 = 28;

pub fn decode_short(bytes: [u8; 2]) -> Option<i16> {
    let raw = u16::from_be_bytes(bytes);
    (raw != 0).then(|| (raw ^ SIGN_BIT_16) as i16)
}

pub fn encode_short(value: i16) -> [u8; 2] {
    ((value as u16) ^ SIGN_BIT_16).to_be_bytes()
}

pub fn decode_long(bytes: [u8; 4]) -> Option<i32> {
    let raw = u32::from_be_bytes(bytes);
    (raw != 0).then(|| (raw ^ SIGN_BIT_32) as i32)
}

pub fn encode_long(value: i32) -> [u8; 4] {
    ((value as u32) ^ SIGN_BIT_32).to_be_bytes()
}

pub fn decode_auto_increment(bytes: [u8; 4]) -> Option<u32> {
    let raw = u32::from_be_bytes(bytes);
    (raw != 0).then_some(raw & AUTO_INCREMENT_MASK)
}

/// Decode a number or currency slot.
///
/// Positive values have the sign bit set on disk; negative values are stored bit-inverted. The
/// pattern decoding to negative zero (whose reciprocal is negative infinity) marks a blank value,
/// as does an all-zero slot.
pub fn decode_number(bytes: [u8; 8]) -> Option<f64> {
    let raw = u64::from_be_bytes(bytes);
    if raw == 0 {
        return None;
    }
    let bits = if raw & SIGN_BIT_64 != 0 {
        raw & !SIGN_BIT_64
    } else {
        !raw
    };
    let value = f64::from_bits(bits);
    if value == 0.0 && (1.0 / value) == f64::NEG_INFINITY {
        return None;
    }
    Some(value)
}

pub fn encode_number(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let raw = if bits & SIGN_BIT_64 == 0 {
        bits | SIGN_BIT_64
    } else {
        !bits
    };
    raw.to_be_bytes()
}

/// Decode a logical slot: 0 is blank, the false sentinel is `false`, any other byte is `true`.
///
/// `0x80` (`LOGICAL_FALSE`) decodes to `false`. Readers that treat both `0x80` and `0x81` as
/// `true` never produce `false`; this one does.
pub fn decode_logical(byte: u8) -> Option<bool> {
    match byte {
        0 => None,
        LOGICAL_FALSE => Some(false),
        _ => Some(true),
    }
}

pub fn encode_logical(value: bool) -> u8 {
    if value {
        LOGICAL_TRUE
    } else {
        LOGICAL_FALSE
    }
}

fn nibble(bytes: &[u8; BCD_WIDTH], index: usize) -> u8 {
    let byte = bytes[index / 2];
    if index % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

/// Decode a 17-byte packed BCD slot with the given scale.
///
/// Byte 0 carries the sign (bit 7 set = positive) and is zero for a blank value; the remaining 32
/// nibbles are digits, bit-inverted for negative values. Values with more than 28 significant
/// digits are rounded with `rounding`; an integer part too large for `Decimal` is an error.
pub fn decode_bcd(
    bytes: &[u8; BCD_WIDTH],
    scale: u8,
    rounding: RoundingStrategy,
) -> Result<Option<Decimal>, String> {
    if bytes[0] == 0 {
        return Ok(None);
    }
    let negative = bytes[0] & 0x80 == 0;
    let flip = if negative { 0x0F } else { 0x00 };

    let mut mantissa: u128 = 0;
    for index in 2..BCD_WIDTH * 2 {
        let digit = nibble(bytes, index) ^ flip;
        if digit > 9 {
            return Err(format!("invalid BCD digit 0x{digit:X} at nibble {index}"));
        }
        mantissa = mantissa * 10 + u128::from(digit);
    }

    let (mantissa, scale) = fit_decimal(mantissa, u32::from(scale), negative, rounding)
        .ok_or_else(|| "BCD value exceeds the decimal range".to_string())?;
    let magnitude = i128::try_from(mantissa).map_err(|_| "BCD mantissa overflow".to_string())?;
    let signed = if negative { -magnitude } else { magnitude };
    Ok(Some(Decimal::from_i128_with_scale(signed, scale)))
}

/// Drop trailing fraction digits until the mantissa and scale fit a `Decimal`.
fn fit_decimal(
    mut mantissa: u128,
    mut scale: u32,
    negative: bool,
    rounding: RoundingStrategy,
) -> Option<(u128, u32)> {
    while mantissa > DECIMAL_MAX_MANTISSA || scale > DECIMAL_MAX_SCALE {
        if scale == 0 {
            return None;
        }
        let excess = if scale > DECIMAL_MAX_SCALE {
            scale - DECIMAL_MAX_SCALE
        } else {
            1
        };
        let divisor = 10u128.pow(excess);
        let quotient = mantissa / divisor;
        let remainder = mantissa % divisor;
        mantissa = round_magnitude(quotient, remainder, divisor, negative, rounding);
        scale -= excess;
    }
    Some((mantissa, scale))
}

/// Round the magnitude `quotient + remainder / divisor` to an integer.
fn round_magnitude(
    quotient: u128,
    remainder: u128,
    divisor: u128,
    negative: bool,
    rounding: RoundingStrategy,
) -> u128 {
    if remainder == 0 {
        return quotient;
    }
    let twice = remainder * 2;
    let round_up = match rounding {
        RoundingStrategy::MidpointNearestEven => {
            twice > divisor || (twice == divisor && quotient % 2 == 1)
        }
        RoundingStrategy::MidpointAwayFromZero => twice >= divisor,
        RoundingStrategy::MidpointTowardZero => twice > divisor,
        RoundingStrategy::ToZero => false,
        RoundingStrategy::AwayFromZero => true,
        RoundingStrategy::ToNegativeInfinity => negative,
        RoundingStrategy::ToPositiveInfinity => !negative,
        _ => twice >= divisor,
    };
    if round_up {
        quotient + 1
    } else {
        quotient
    }
}

/// Encode a decimal into the 17-byte BCD layout with the given scale. Used by fixture builders.
pub fn encode_bcd(value: Decimal, scale: u8) -> Option<[u8; BCD_WIDTH]> {
    let mut rescaled = value;
    rescaled.rescale(u32::from(scale));
    if rescaled.scale() != u32::from(scale) {
        return None;
    }
    let negative = rescaled.is_sign_negative() && !rescaled.is_zero();
    let mut mantissa = rescaled.mantissa().unsigned_abs();

    let mut digits = [0u8; 32];
    for slot in digits.iter_mut().rev() {
        *slot = (mantissa % 10) as u8;
        mantissa /= 10;
    }
    if mantissa != 0 {
        return None;
    }

    let flip = if negative { 0x0F } else { 0x00 };
    let mut out = [0u8; BCD_WIDTH];
    // Byte 0 is never zero for a present value; negatives store it inverted like the digits.
    let lead = 0x80 | (scale & 0x3F);
    out[0] = if negative { !lead } else { lead };
    for (i, digit) in digits.iter().enumerate() {
        let index = i + 2;
        let value = digit ^ flip;
        if index % 2 == 0 {
            out[index / 2] |= value << 4;
        } else {
            out[index / 2] |= value;
        }
    }
    Some(out)
}
