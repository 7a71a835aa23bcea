//! Little-endian packing for the primitive sample types a producer can
//! hand to [`crate::signal::ValueSignal::add_data`] /
//! [`crate::signal::ValueSignal::add_constant_data`] without building a
//! raw byte buffer by hand. Non-scalar sample types (`COMPLEX*`,
//! `ARRAY`, `STRUCT`) are written through `add_data_raw` instead.

/// A scalar value whose wire representation is its fixed-width
/// little-endian byte pattern.
pub trait WireScalar: Copy {
    const WIRE_SIZE: usize;
    fn to_wire_bytes(self) -> Vec<u8>;
}

macro_rules! impl_wire_scalar {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl WireScalar for $ty {
                const WIRE_SIZE: usize = std::mem::size_of::<$ty>();
                fn to_wire_bytes(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )+
    };
}

impl_wire_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
