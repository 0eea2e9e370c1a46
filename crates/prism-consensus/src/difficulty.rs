// Consensus-critical. Changes require spec update + tests.
//! Difficulty target utilities.
//!
//! Targets travel in Bitcoin's "compact" encoding:
//! `bits = (exponent << 24) | mantissa`, three mantissa bytes, and
//! `target = mantissa * 256^(exponent - 3)` (shifted right below
//! exponent 3). Decoding never fails; instead it reports the sign and
//! overflow flags alongside the value, because the retarget engine feeds
//! raw historical `bits` through arithmetic while validation rejects
//! flagged encodings. All conversions are strict integer math, no floats.

use crate::error::ValidationError;
use num_bigint::BigUint;
use num_traits::Zero;

/// A decoded compact target with its encoding flags.
#[derive(Clone, Debug)]
pub struct CompactTarget {
    /// Expanded target value.
    pub value: BigUint,
    /// The encoding carried a sign bit with a non-zero mantissa.
    pub negative: bool,
    /// The encoding does not fit in 256 bits.
    pub overflow: bool,
}

impl CompactTarget {
    /// Whether the decoded target is unusable for validation.
    pub fn is_invalid(&self) -> bool {
        self.negative || self.overflow || self.value.is_zero()
    }
}

/// Decode compact `bits` into `{value, negative, overflow}`.
pub fn decode_compact(bits: u32) -> CompactTarget {
    let exponent = (bits >> 24) & 0xff;
    let mantissa = bits & 0x007f_ffff;

    let value = if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    };

    let negative = mantissa != 0 && (bits & 0x0080_0000) != 0;
    let overflow = mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32));

    CompactTarget {
        value,
        negative,
        overflow,
    }
}

/// Decode compact `bits` to a full target, rejecting negative, overflowing,
/// or zero encodings.
pub fn bits_to_target(bits: u32) -> Result<BigUint, ValidationError> {
    let decoded = decode_compact(bits);
    if decoded.is_invalid() {
        return Err(ValidationError::BitsOutOfRange);
    }
    Ok(decoded.value)
}

/// Encode a target into compact `bits`.
///
/// The exponent counts the target's significant bytes and the mantissa
/// keeps the top three of them, renormalized so its sign bit stays
/// clear; `decode_compact` therefore never reports an encoding produced
/// here as negative.
pub fn target_to_bits(target: &BigUint) -> Result<u32, ValidationError> {
    if target.is_zero() {
        return Err(ValidationError::BitsOutOfRange);
    }

    let mut exponent = ((target.bits() + 7) / 8) as u32;
    let mut mantissa: u32 = if exponent <= 3 {
        // Everything fits in the mantissa; scale up to three bytes.
        let low = target.iter_u32_digits().next().unwrap_or(0);
        low << (8 * (3 - exponent))
    } else {
        let top = target >> (8 * (exponent - 3));
        top.iter_u32_digits().next().unwrap_or(0)
    };

    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    if mantissa == 0 || exponent > 0xff {
        return Err(ValidationError::BitsOutOfRange);
    }

    Ok((exponent << 24) | mantissa)
}

/// Compare a 32-byte hash value (big-endian) with a target.
/// Returns `true` if `hash <= target`.
pub fn hash_meets_target(hash_be: &[u8; 32], target: &BigUint) -> bool {
    let h = BigUint::from_bytes_be(hash_be);
    h <= *target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bits_target() {
        for bits in [
            0x1d00_ffffu32,
            0x1e05_0000,
            0x1e12_7ff8,
            0x1e02_b2dc,
            0x207f_ffff,
            // Small targets exercise the scale-up branch.
            0x0212_3400,
            0x0112_0000,
        ] {
            let target = bits_to_target(bits).expect("decode");
            let encoded = target_to_bits(&target).expect("encode");
            assert_eq!(encoded, bits, "roundtrip failed for {bits:#010x}");
        }

        // Renormalization keeps the mantissa's sign bit clear.
        let top_heavy = BigUint::from(0xff_ffffu32);
        assert_eq!(target_to_bits(&top_heavy).unwrap(), 0x0400_ffff);
    }

    #[test]
    fn flags_follow_the_encoding() {
        // Sign bit with non-zero mantissa.
        let neg = decode_compact(0x1e80_0001);
        assert!(neg.negative);
        assert!(neg.is_invalid());

        // Sign bit with zero mantissa is not negative.
        let zero_mant = decode_compact(0x1e80_0000);
        assert!(!zero_mant.negative);
        assert!(zero_mant.value.is_zero());

        // Exponent far past 32 bytes overflows.
        let over = decode_compact(0xff00_0001);
        assert!(over.overflow);

        // Boundary: two mantissa bytes at exponent 33 still fit.
        let edge = decode_compact(0x2100_ffff);
        assert!(!edge.overflow);
        // Three mantissa bytes at exponent 33 spill past 256 bits.
        let past = decode_compact(0x2101_0000);
        assert!(past.overflow);
    }

    #[test]
    fn low_exponents_shift_right() {
        // exponent 3: target == mantissa.
        let t = decode_compact(0x0301_2345);
        assert_eq!(t.value, BigUint::from(0x01_2345u32));
        // exponent 1: two bytes shifted away.
        let t = decode_compact(0x0101_2345);
        assert_eq!(t.value, BigUint::from(0x01u32));
    }

    #[test]
    fn rejects_zero_targets() {
        assert!(matches!(
            bits_to_target(0),
            Err(ValidationError::BitsOutOfRange)
        ));
        assert!(matches!(
            target_to_bits(&BigUint::zero()),
            Err(ValidationError::BitsOutOfRange)
        ));
    }

    #[test]
    fn hash_target_comparison() {
        let max_target = BigUint::from_bytes_be(&[0xff; 32]);
        assert!(hash_meets_target(&[0u8; 32], &max_target));

        let min_target = BigUint::from(1u32);
        assert!(!hash_meets_target(&[0xff; 32], &min_target));
    }
}
