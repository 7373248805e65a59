//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Tolerance for nodata matching.
///
/// Resampling and format conversion can perturb stored sentinels slightly
/// (an `f32` round trip of `-9999.0` is exact, but bilinear weights summing
/// to 0.9999999 are not), so float cells within this distance of the
/// sentinel, relative to its magnitude, count as nodata.
pub const NODATA_TOLERANCE: f64 = 1e-6;

/// Trait for types that can be stored in a raster cell.
///
/// This trait bounds the types that can be used as raster values,
/// ensuring they support necessary numeric operations.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert from f64, `None` when out of range or NaN for integers
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }
}

/// Epsilon-tolerant float comparison against a nodata sentinel.
///
/// Scales the tolerance by the sentinel magnitude so that both `0.0` and
/// `-3.4e38` sentinels behave sensibly.
pub fn nodata_matches(value: f64, nodata: f64) -> bool {
    if value.is_nan() {
        return nodata.is_nan();
    }
    let scale = nodata.abs().max(1.0);
    (value - nodata).abs() <= NODATA_TOLERANCE * scale
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                match nodata {
                    Some(nd) => *self == nd,
                    None => false,
                }
            }

            fn is_float() -> bool {
                false
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                -9999.0
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => nodata_matches(*self as f64, nd as f64),
                    None => false,
                }
            }

            fn is_float() -> bool {
                true
            }
        }
    };
}

impl_raster_element_int!(i8);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(i64);
impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);
impl_raster_element_int!(u64);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_nodata_tolerates_drift() {
        let drifted = -9999.0_f64 + 1e-4;
        assert!(drifted.is_nodata(Some(-9999.0)));
        assert!(!(-9998.0_f64).is_nodata(Some(-9999.0)));
    }

    #[test]
    fn zero_nodata_differs_from_none() {
        assert!(0.0_f64.is_nodata(Some(0.0)));
        assert!(!0.0_f64.is_nodata(None));
        assert!(0u8.is_nodata(Some(0)));
        assert!(!0u8.is_nodata(None));
    }

    #[test]
    fn nan_is_always_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(f32::NAN.is_nodata(Some(-9999.0)));
    }
}
