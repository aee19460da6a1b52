//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Heights are `f32`, direction codes `u8` and accumulation counts `u64`;
/// the remaining impls exist so the decoder can read any integer sample
/// format and widen it.
pub trait RasterElement:
    Copy + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Value used when a decoded sample cannot be represented
    fn fallback() -> Self;

    /// Whether this value carries no measurement (NaN for floats)
    fn is_missing(&self) -> bool;
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn fallback() -> Self {
                0
            }

            fn is_missing(&self) -> bool {
                false
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn fallback() -> Self {
                <$t>::NAN
            }

            fn is_missing(&self) -> bool {
                self.is_nan()
            }
        }
    };
}

impl_raster_element_int!(i8);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);
impl_raster_element_int!(u64);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);
