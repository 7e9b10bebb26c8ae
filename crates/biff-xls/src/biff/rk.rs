//! RK number codec [MS-XLS 2.5.217].
//!
//! An RK value packs a number into 32 bits:
//! - bit 0 (`fX100`): the decoded value is divided by 100
//! - bit 1 (`fInt`): bits 2-31 are a signed 30-bit integer; otherwise they are the high 30 bits
//!   of an IEEE-754 double whose remaining bits are zero

const RK_FLAG_DIV_100: u32 = 0x0000_0001;
const RK_FLAG_INTEGER: u32 = 0x0000_0002;
const RK_VALUE_MASK: u32 = 0xFFFF_FFFC;

/// Decode an RK value. Total over all inputs.
pub(crate) fn decode_rk(bits: u32) -> f64 {
    let value = if bits & RK_FLAG_INTEGER != 0 {
        // Arithmetic shift keeps the sign of the 30-bit integer.
        f64::from((bits as i32) >> 2)
    } else {
        f64::from_bits(u64::from(bits & RK_VALUE_MASK) << 32)
    };

    if bits & RK_FLAG_DIV_100 != 0 {
        value / 100.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn encode_int(value: i32, div_100: bool) -> u32 {
        ((value << 2) as u32) | RK_FLAG_INTEGER | u32::from(div_100)
    }

    #[test]
    fn decodes_integer_encodings() {
        assert_eq!(decode_rk(0x0000_0002), 0.0);
        assert_eq!(decode_rk(encode_int(1, false)), 1.0);
        assert_eq!(decode_rk(encode_int(-7, false)), -7.0);
        assert_eq!(decode_rk(encode_int(12345, true)), 123.45);
        assert_eq!(decode_rk(encode_int(-150, true)), -1.5);
        // Largest and smallest 30-bit integers.
        assert_eq!(decode_rk(0x7FFF_FFFE), 536_870_911.0);
        assert_eq!(decode_rk(0x8000_0002), -536_870_912.0);
    }

    #[test]
    fn decodes_truncated_double_encodings() {
        // 3.0 = 0x4008_0000_0000_0000
        assert_eq!(decode_rk(0x4008_0000), 3.0);
        // 1.0 = 0x3FF0_0000_0000_0000
        assert_eq!(decode_rk(0x3FF0_0000), 1.0);
        // -2.5 = 0xC004_0000_0000_0000
        assert_eq!(decode_rk(0xC004_0000), -2.5);
        // 1.0 with fX100
        assert_eq!(decode_rk(0x3FF0_0001), 0.01);
    }

    #[test]
    fn flag_bits_never_leak_into_the_mantissa() {
        assert_eq!(decode_rk(0x4008_0000), decode_rk(0x4008_0000 & RK_VALUE_MASK));
        assert_eq!(decode_rk(0x4008_0001), 0.03);
    }

    proptest! {
        #[test]
        fn integer_fast_path_round_trips(value in -536_870_912i32..=536_870_911i32) {
            prop_assert_eq!(decode_rk(encode_int(value, false)), f64::from(value));
        }

        #[test]
        fn cents_round_trip(cents in -536_870_912i32..=536_870_911i32) {
            prop_assert_eq!(decode_rk(encode_int(cents, true)), f64::from(cents) / 100.0);
        }

        #[test]
        fn float_path_only_drops_low_mantissa_bits(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let high = (value.to_bits() >> 32) as u32 & RK_VALUE_MASK;
            let decoded = decode_rk(high);
            prop_assert_eq!(decoded.to_bits() >> 34, value.to_bits() >> 34);
            prop_assert_eq!(decoded.to_bits() & 0x3_FFFF_FFFF, 0);
        }
    }
}
