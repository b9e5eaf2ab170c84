//! Exact-rational <-> `f64` conversion at the library boundary. The kernel
//! never rounds internally; every external-facing coordinate crosses this
//! file exactly once, on the way in or out.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rexact_math::{Vec3, R};

/// Converts an IEEE-754 `f64` to the exact rational with the identical
/// value (not an approximation): decomposes the float's own sign, mantissa
/// and exponent rather than going through any lossy intermediate.
pub fn r_from_f64(v: f64) -> R {
    if v == 0.0 {
        return R::from_integer(BigInt::from(0));
    }
    let bits = v.to_bits();
    let sign: i64 = if (bits >> 63) & 1 == 1 { -1 } else { 1 };
    let raw_exponent = ((bits >> 52) & 0x7ff) as i64;
    let raw_mantissa = bits & 0x000f_ffff_ffff_ffff;

    let (mantissa, exponent) =
        if raw_exponent == 0 { (raw_mantissa, -1074i64) } else { (raw_mantissa | (1u64 << 52), raw_exponent - 1075) };

    let numer = BigInt::from(sign) * BigInt::from(mantissa);
    if exponent >= 0 {
        R::from_integer(numer * (BigInt::from(1) << exponent as usize))
    } else {
        R::new(numer, BigInt::from(1) << (-exponent) as usize)
    }
}

pub fn vec3_from_f64(p: [f64; 3]) -> Vec3 {
    Vec3::new(r_from_f64(p[0]), r_from_f64(p[1]), r_from_f64(p[2]))
}

/// Lossy by necessity (the exact kernel can represent values no `f64` can),
/// used only when handing geometry back across the library boundary.
pub fn r_to_f64(v: &R) -> f64 {
    v.numer().to_f64().unwrap_or(f64::NAN) / v.denom().to_f64().unwrap_or(1.0)
}

pub fn vec3_to_f64(v: &Vec3) -> [f64; 3] {
    [r_to_f64(v.component(0)), r_to_f64(v.component(1)), r_to_f64(v.component(2))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_representable_values() {
        for v in [0.0, 1.0, -1.0, 0.5, 1.0 / 3.0 * 3.0, 123456.789, -0.0001] {
            let r = r_from_f64(v);
            assert!((r_to_f64(&r) - v).abs() < 1e-9, "{v} round-tripped to {}", r_to_f64(&r));
        }
    }
}
