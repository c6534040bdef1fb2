//! Binary `numeric` decoding.
//!
//! The server packs arbitrary-precision decimals as base-10000 digit groups:
//!
//! ```text
//! ndigits: u16 | weight: i16 | sign: u16 | dscale: u16 | digits: u16 * ndigits
//! ```
//!
//! `weight` is the power of 10000 of the first group. Trailing zero groups
//! are not transmitted, so the number of groups after the decimal point can
//! be smaller (or larger) than the display scale requires.

use bytes::Buf;
use smallvec::SmallVec;

use super::error::{PgError, PgResult};
use super::protocol::{read_i16, read_u16};

/// Base of one digit group.
pub const NBASE: i128 = 10_000;

/// Decimal digits per digit group.
pub const DEC_DIGITS: i32 = 4;

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

/// Largest power of ten that fits an i128.
const MAX_POW10: u32 = 38;

/// Digit groups; most values need only a handful.
pub type DigitGroups = SmallVec<[u16; 8]>;

/// Sign word of a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericSign {
    Positive,
    Negative,
    NaN,
    PosInfinity,
    NegInfinity,
}

impl NumericSign {
    fn from_wire(word: u16) -> PgResult<Self> {
        match word {
            SIGN_POSITIVE => Ok(NumericSign::Positive),
            SIGN_NEGATIVE => Ok(NumericSign::Negative),
            SIGN_NAN => Ok(NumericSign::NaN),
            SIGN_PINF => Ok(NumericSign::PosInfinity),
            SIGN_NINF => Ok(NumericSign::NegInfinity),
            other => Err(PgError::Protocol(format!(
                "invalid numeric sign word 0x{:04X}",
                other
            ))),
        }
    }

    pub fn is_special(self) -> bool {
        matches!(
            self,
            NumericSign::NaN | NumericSign::PosInfinity | NumericSign::NegInfinity
        )
    }
}

/// Header of one numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalLayout {
    pub digit_count: i16,
    pub weight: i16,
    pub sign: NumericSign,
    pub display_scale: i16,
}

impl DecimalLayout {
    pub fn is_negative(&self) -> bool {
        self.sign == NumericSign::Negative
    }
}

/// Read the header and digit groups of a binary numeric field.
pub fn read_numeric<B: Buf>(buf: &mut B) -> PgResult<(DecimalLayout, DigitGroups)> {
    let digit_count = read_i16(buf, "numeric digit count")?;
    let weight = read_i16(buf, "numeric weight")?;
    let sign = NumericSign::from_wire(read_u16(buf, "numeric sign")?)?;
    let display_scale = read_i16(buf, "numeric scale")?;
    if digit_count < 0 {
        return Err(PgError::Protocol(format!(
            "negative numeric digit count {}",
            digit_count
        )));
    }
    let mut digits = DigitGroups::with_capacity(digit_count as usize);
    for _ in 0..digit_count {
        digits.push(read_u16(buf, "numeric digit")?);
    }
    let layout = DecimalLayout {
        digit_count,
        weight,
        sign,
        display_scale,
    };
    Ok((layout, digits))
}

fn pow10(exp: i32) -> PgResult<i128> {
    if exp < 0 || exp as u32 > MAX_POW10 {
        return Err(PgError::NumericOutOfRange(format!(
            "power of ten 10^{} does not fit 128 bits",
            exp
        )));
    }
    Ok(10i128.pow(exp as u32))
}

fn overflow(target_scale: u8) -> PgError {
    PgError::NumericOutOfRange(format!(
        "value does not fit a 128-bit decimal at scale {}",
        target_scale
    ))
}

/// Decode digit groups into an integer scaled by `10^target_scale`.
///
/// Digits beyond `target_scale` are truncated. NaN and infinities have no
/// fixed-point representation and are rejected.
pub fn decode_scaled(layout: &DecimalLayout, digits: &[u16], target_scale: u8) -> PgResult<i128> {
    if layout.sign.is_special() {
        return Err(PgError::NumericOutOfRange(format!(
            "{:?} cannot be stored in a fixed-point decimal",
            layout.sign
        )));
    }
    let ndigits = layout.digit_count as i32;
    if ndigits == 0 {
        return Ok(0);
    }
    let weight = layout.weight as i32;
    let scale = target_scale as i32;
    let group = |i: i32| -> i128 { digits.get(i as usize).copied().unwrap_or(0) as i128 };

    let mut integral: i128 = 0;
    if weight >= 0 {
        integral = group(0);
        for i in 1..=weight {
            integral = integral.checked_mul(NBASE).ok_or_else(|| overflow(target_scale))?;
            if i < ndigits {
                integral += group(i);
            }
        }
        integral = integral
            .checked_mul(pow10(scale)?)
            .ok_or_else(|| overflow(target_scale))?;
    }

    let mut fractional: i128 = 0;
    if ndigits > weight + 1 {
        let fractional_power = (ndigits - weight - 1) * DEC_DIGITS;
        let correction = fractional_power - scale;
        for i in weight.max(-1) + 1..ndigits {
            let shifted = fractional
                .checked_mul(NBASE)
                .and_then(|v| v.checked_add(group(i)))
                .ok_or_else(|| overflow(target_scale))?;
            fractional = if i + 1 < ndigits {
                shifted
            } else if correction >= 0 {
                // more fractional digits on the wire than the target keeps
                shifted / pow10(correction)?
            } else {
                // trailing zero groups were suppressed
                shifted
                    .checked_mul(pow10(-correction)?)
                    .ok_or_else(|| overflow(target_scale))?
            };
        }
    }

    let magnitude = integral
        .checked_add(fractional)
        .ok_or_else(|| overflow(target_scale))?;
    Ok(if layout.is_negative() {
        -magnitude
    } else {
        magnitude
    })
}

/// Decode digit groups into a double.
pub fn decode_f64(layout: &DecimalLayout, digits: &[u16]) -> f64 {
    match layout.sign {
        NumericSign::NaN => return f64::NAN,
        NumericSign::PosInfinity => return f64::INFINITY,
        NumericSign::NegInfinity => return f64::NEG_INFINITY,
        _ => {}
    }
    let scale = layout.display_scale.clamp(0, MAX_POW10 as i16) as u8;
    if let Ok(scaled) = decode_scaled(layout, digits, scale) {
        return scaled as f64 / 10f64.powi(scale as i32);
    }
    // Out of 128-bit range: sum the groups directly.
    let weight = layout.weight as i32;
    let magnitude: f64 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| *d as f64 * 10_000f64.powi(weight - i as i32))
        .sum();
    if layout.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn layout(digits: &[u16], weight: i16, negative: bool, dscale: i16) -> DecimalLayout {
        DecimalLayout {
            digit_count: digits.len() as i16,
            weight,
            sign: if negative {
                NumericSign::Negative
            } else {
                NumericSign::Positive
            },
            display_scale: dscale,
        }
    }

    #[test]
    fn test_empty_digits_is_zero() {
        for weight in [-3, 0, 5] {
            let l = layout(&[], weight, false, 2);
            assert_eq!(decode_scaled(&l, &[], 2).unwrap(), 0);
        }
    }

    #[test]
    fn test_one_fifty_at_scale_two() {
        // 1.50 -> groups [1, 5000], weight 0
        let digits = [1, 5000];
        let l = layout(&digits, 0, false, 2);
        assert_eq!(decode_scaled(&l, &digits, 2).unwrap(), 150);
    }

    #[test]
    fn test_suppressed_trailing_groups() {
        // 100.00 is the single group [100]; the zero fraction group is not sent
        let digits = [100];
        let l = layout(&digits, 0, false, 2);
        assert_eq!(decode_scaled(&l, &digits, 2).unwrap(), 10000);

        // 10000.00 is [1] at weight 1; the zero low integral group is not sent
        let digits = [1];
        let l = layout(&digits, 1, false, 2);
        assert_eq!(decode_scaled(&l, &digits, 2).unwrap(), 1_000_000);

        // 12.5 in a numeric(10,8) column: one fraction group for eight digits
        let digits = [12, 5000];
        let l = layout(&digits, 0, false, 8);
        assert_eq!(decode_scaled(&l, &digits, 8).unwrap(), 1_250_000_000);
    }

    #[test]
    fn test_negative_weight() {
        // 0.0005 -> groups [5], weight -1
        let digits = [5];
        let l = layout(&digits, -1, false, 4);
        assert_eq!(decode_scaled(&l, &digits, 4).unwrap(), 5);

        // 0.00000001 -> groups [1], weight -2
        let digits = [1];
        let l = layout(&digits, -2, true, 8);
        assert_eq!(decode_scaled(&l, &digits, 8).unwrap(), -1);
    }

    #[test]
    fn test_extra_fraction_digits_truncate() {
        // 1.23456789 at scale 2 -> 123
        let digits = [1, 2345, 6789];
        let l = layout(&digits, 0, false, 8);
        assert_eq!(decode_scaled(&l, &digits, 2).unwrap(), 123);
    }

    #[test]
    fn test_special_values() {
        let l = DecimalLayout {
            digit_count: 0,
            weight: 0,
            sign: NumericSign::NaN,
            display_scale: 0,
        };
        assert!(decode_f64(&l, &[]).is_nan());
        assert!(matches!(
            decode_scaled(&l, &[], 2),
            Err(PgError::NumericOutOfRange(_))
        ));
    }

    #[test]
    fn test_decode_f64() {
        let digits = [12, 3400];
        let l = layout(&digits, 0, true, 2);
        assert_eq!(decode_f64(&l, &digits), -12.34);
    }

    #[test]
    fn test_overflow_is_error() {
        let digits = [9999; 12];
        let l = layout(&digits, 11, false, 0);
        assert!(matches!(
            decode_scaled(&l, &digits, 0),
            Err(PgError::NumericOutOfRange(_))
        ));
        // The double path still produces a value.
        assert!(decode_f64(&l, &digits) > 9.9e47);
    }

    #[test]
    fn test_read_numeric_from_wire() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_i16(0);
        buf.put_u16(0x4000);
        buf.put_u16(2);
        buf.put_u16(1);
        buf.put_u16(5000);
        let mut bytes = buf.freeze();
        let (l, digits) = read_numeric(&mut bytes).unwrap();
        assert!(l.is_negative());
        assert_eq!(decode_scaled(&l, &digits, 2).unwrap(), -150);
    }

    #[test]
    fn test_read_numeric_truncated() {
        let mut buf = BytesMut::new();
        buf.put_u16(3);
        buf.put_i16(0);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u16(1);
        let mut bytes = buf.freeze();
        assert!(matches!(
            read_numeric(&mut bytes),
            Err(PgError::Truncated { .. })
        ));
    }
}
