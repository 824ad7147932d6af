//! Type and range conversion of attribute arrays
//!
//! Colors and intensities carry their value range in their type: an `uint8`
//! channel spans `[0, 255]`, an `uint16` channel `[0, 65535]`, and a float
//! channel spans `[0, 1]` or `[0, type max]` depending on the
//! `float_max_is_one` flag. [`convert`] moves an array between types while
//! keeping its position inside that range.
//!
//! The reference maximum of a float type is `1.0` when `float_max_is_one`
//! is set and the type's largest finite value otherwise. The same rule is
//! applied on every path, so float to float with the flag set is a plain
//! value cast.

use crate::scalar::{ScalarArray, ScalarType};

/// Reference maximum used to normalize values of `ty`
fn reference_max(ty: ScalarType, float_max_is_one: bool) -> f64 {
    if ty.is_float() && float_max_is_one {
        1.0
    } else {
        ty.max_value()
    }
}

/// Convert `array` to `target`, rescaling values between the ranges of the
/// two types.
///
/// * float to float: `v / ref(source) * ref(target)`
/// * integer to integer: scaled by the ratio of the type cardinalities
///   (`max + 1`); a narrowing conversion divides, a widening one multiplies
/// * float to integer: `v / ref(source) * max(target)`
/// * integer to float: `v / max(source) * ref(target)`
///
/// Integer results truncate toward zero and saturate at the target bounds,
/// NaN becomes zero. Converting a signed integer array into an unsigned type
/// keeps the magnitude only and logs a warning.
///
/// An array that already has the target type is returned unchanged.
pub fn convert(array: ScalarArray, target: ScalarType, float_max_is_one: bool) -> ScalarArray {
    let source = array.scalar_type();
    if source == target {
        return array;
    }

    let source_ref = reference_max(source, float_max_is_one);
    let target_ref = reference_max(target, float_max_is_one);

    match (source.is_float(), target.is_float()) {
        (true, true) => {
            if source_ref == target_ref {
                array.cast(target)
            } else {
                array.map_into(target, |v| v / source_ref * target_ref)
            }
        }
        (true, false) => array.map_into(target, |v| v / source_ref * target.max_value()),
        (false, true) => array.map_into(target, |v| v / source.max_value() * target_ref),
        (false, false) => convert_integers(&array, source, target),
    }
}

fn convert_integers(array: &ScalarArray, source: ScalarType, target: ScalarType) -> ScalarArray {
    let source_cardinality = source.cardinality();
    let target_cardinality = target.cardinality();

    let factor = if source_cardinality > target_cardinality {
        1.0 / (source_cardinality / target_cardinality)
    } else {
        target_cardinality / source_cardinality
    };

    if source.is_signed() && !target.is_signed() {
        log::warn!(
            "converting signed {} to unsigned {}: negative values lose their sign",
            source,
            target
        );
        array.map_into(target, |v| (v * factor).abs())
    } else {
        array.map_into(target, |v| v * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_same_type_is_identity() {
        let original = ScalarArray::from(vec![0.25f32, 0.5, 1.0]);
        for flag in [true, false] {
            let converted = convert(original.clone(), ScalarType::F32, flag);
            assert_eq!(converted, original);
        }
    }

    #[test]
    fn test_u8_to_u16_extremes() {
        for flag in [true, false] {
            let converted = convert(ScalarArray::from(vec![0u8, 1, 128, 255]), ScalarType::U16, flag);
            assert_eq!(converted, ScalarArray::U16(vec![0, 256, 32768, 65280]));
        }
    }

    #[test]
    fn test_u16_to_u8_divides_by_ratio() {
        let converted = convert(ScalarArray::from(vec![0u16, 255, 256, 65535]), ScalarType::U8, true);
        assert_eq!(converted, ScalarArray::U8(vec![0, 0, 1, 255]));
    }

    #[test]
    fn test_signed_to_unsigned_keeps_magnitude() {
        // i16 -> u8 divides by 128
        let converted = convert(ScalarArray::from(vec![-256i16, 256, 1280]), ScalarType::U8, true);
        assert_eq!(converted, ScalarArray::U8(vec![2, 2, 10]));

        // i8 -> u8 doubles (cardinality 128 -> 256)
        let converted = convert(ScalarArray::from(vec![-5i8, 7]), ScalarType::U8, true);
        assert_eq!(converted, ScalarArray::U8(vec![10, 14]));
    }

    #[test]
    fn test_float_to_integer() {
        let unit = ScalarArray::from(vec![0.0f32, 0.5, 1.0]);
        let converted = convert(unit, ScalarType::U8, true);
        assert_eq!(converted, ScalarArray::U8(vec![0, 127, 255]));

        let full_range = ScalarArray::from(vec![0.0f32, f32::MAX]);
        let converted = convert(full_range, ScalarType::U8, false);
        assert_eq!(converted, ScalarArray::U8(vec![0, 255]));
    }

    #[test]
    fn test_float_to_integer_saturates() {
        let converted = convert(
            ScalarArray::from(vec![2.0f64, -0.5, f64::NAN]),
            ScalarType::U8,
            true,
        );
        assert_eq!(converted, ScalarArray::U8(vec![255, 0, 0]));
    }

    #[test]
    fn test_integer_to_float() {
        let converted = convert(ScalarArray::from(vec![0u8, 51, 255]), ScalarType::F32, true);
        let values = converted.as_slice::<f32>().unwrap();
        assert_relative_eq!(values[0], 0.0);
        assert_relative_eq!(values[1], 0.2, epsilon = 1e-6);
        assert_relative_eq!(values[2], 1.0);

        let converted = convert(ScalarArray::from(vec![65535u16]), ScalarType::F32, false);
        assert_eq!(converted, ScalarArray::F32(vec![f32::MAX]));
    }

    #[test]
    fn test_float_to_float() {
        // Unit range: plain cast
        let converted = convert(ScalarArray::from(vec![0.75f32]), ScalarType::F64, true);
        assert_eq!(converted, ScalarArray::F64(vec![0.75]));

        // Type-max range: rescaled by the ratio of the maxima
        let converted = convert(ScalarArray::from(vec![1.0f32]), ScalarType::F64, false);
        let value = converted.as_slice::<f64>().unwrap()[0];
        assert_relative_eq!(value, f64::MAX / f32::MAX as f64, max_relative = 1e-12);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let mut rng = StdRng::seed_from_u64(42);

        // u16 -> u8 -> u16 loses at most one u8 step (256 in u16 units)
        let values: Vec<u16> = (0..1000).map(|_| rng.gen_range(0..=u16::MAX)).collect();
        let narrowed = convert(ScalarArray::from(values.clone()), ScalarType::U8, true);
        let restored = convert(narrowed, ScalarType::U16, true);
        for (original, back) in values.iter().zip(restored.as_slice::<u16>().unwrap()) {
            assert!((*original as i32 - *back as i32).abs() < 256);
        }

        // f32 in [0, 1] -> u16 -> f32 loses at most one u16 step
        let values: Vec<f32> = (0..1000).map(|_| rng.gen::<f32>()).collect();
        let narrowed = convert(ScalarArray::from(values.clone()), ScalarType::U16, true);
        let restored = convert(narrowed, ScalarType::F32, true);
        for (original, back) in values.iter().zip(restored.as_slice::<f32>().unwrap()) {
            assert!((original - back).abs() <= 1.0 / 65535.0 + 1e-6);
        }

        // u8 -> f32 -> u8 with the type-max convention
        let values: Vec<u8> = (0..=255).collect();
        let widened = convert(ScalarArray::from(values.clone()), ScalarType::F32, false);
        let restored = convert(widened, ScalarType::U8, false);
        for (original, back) in values.iter().zip(restored.as_slice::<u8>().unwrap()) {
            assert!((*original as i32 - *back as i32).abs() <= 1);
        }
    }
}
