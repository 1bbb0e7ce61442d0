//! 64-bit wire encoding for handles.
//!
//! Small integers and doubles travel by value so native code never pays a
//! table round-trip for them. The encoding lives in the IEEE-754 NaN space:
//!
//! - any bit pattern that is not a tagged NaN is a double, passed raw;
//! - `0x7FF9_....` carries a boxed `i32` in the low 32 bits;
//! - `0x7FFA_....` carries an allocated table handle: a 16-bit slot
//!   generation in bits 32..48 and a 32-bit slot index in the low word.
//!
//! Table index 0 is permanently reserved, so the handle-tagged word with
//! index 0 and generation 0 doubles as the null handle. Doubles that are
//! NaN are canonicalized to one quiet NaN on encode; that keeps the tag
//! ranges unreachable from the double range and makes the four ranges
//! disjoint. `+0.0` is a plain double word and round-trips exactly.

const TAG_MASK: u64 = 0xFFFF_0000_0000_0000;
const TAG_INT: u64 = 0x7FF9_0000_0000_0000;
const TAG_HANDLE: u64 = 0x7FFA_0000_0000_0000;

const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

/// The null handle: handle tag, reserved index 0, generation 0.
pub const WIRE_NULL: u64 = TAG_HANDLE;

/// A decoded wire word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wire {
    Null,
    Int(i32),
    Double(f64),
    Handle { index: u32, generation: u16 },
}

pub fn classify(bits: u64) -> Wire {
    if bits == WIRE_NULL {
        return Wire::Null;
    }
    match bits & TAG_MASK {
        TAG_INT => Wire::Int(bits as u32 as i32),
        TAG_HANDLE => Wire::Handle {
            index: bits as u32,
            generation: (bits >> 32) as u16,
        },
        _ => Wire::Double(f64::from_bits(bits)),
    }
}

pub fn box_int(value: i32) -> u64 {
    TAG_INT | value as u32 as u64
}

pub fn box_double(value: f64) -> u64 {
    if value.is_nan() {
        CANONICAL_NAN
    } else {
        value.to_bits()
    }
}

pub fn box_handle(index: u32, generation: u16) -> u64 {
    debug_assert!(index != 0 || generation == 0);
    TAG_HANDLE | ((generation as u64) << 32) | index as u64
}

/// True when the word decodes without touching the handle table.
pub fn is_boxed(bits: u64) -> bool {
    !matches!(classify(bits), Wire::Handle { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        for v in [0, 1, -1, 42, i32::MIN, i32::MAX] {
            assert_eq!(classify(box_int(v)), Wire::Int(v));
        }
    }

    #[test]
    fn double_round_trip_is_bit_exact() {
        for v in [
            0.0,
            -0.0,
            1.5,
            -2.25e300,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::MIN_POSITIVE,
        ] {
            match classify(box_double(v)) {
                Wire::Double(d) => assert_eq!(d.to_bits(), v.to_bits()),
                other => panic!("{v} decoded as {other:?}"),
            }
        }
    }

    #[test]
    fn nan_is_canonicalized() {
        let exotic = f64::from_bits(0x7FFA_0000_0000_1234);
        assert!(exotic.is_nan());
        match classify(box_double(exotic)) {
            Wire::Double(d) => assert!(d.is_nan()),
            other => panic!("NaN decoded as {other:?}"),
        }
    }

    #[test]
    fn null_is_distinct_from_boxed_zero() {
        assert_ne!(WIRE_NULL, box_double(0.0));
        assert_ne!(WIRE_NULL, box_int(0));
        assert_eq!(classify(WIRE_NULL), Wire::Null);
        assert_eq!(classify(box_double(0.0)), Wire::Double(0.0));
    }

    #[test]
    fn handle_carries_index_and_generation() {
        let bits = box_handle(7, 3);
        assert_eq!(classify(bits), Wire::Handle { index: 7, generation: 3 });
        assert!(!is_boxed(bits));
        assert!(is_boxed(box_int(9)));
    }
}
