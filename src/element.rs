// SPDX-License-Identifier: MIT
//! Host element types that can be stored in an array payload

use half::f16;

use crate::byteorder::{extend_in_order, to_host, ByteOrder, Primitive};
use crate::datatype::ScalarTypeId;

/// Complex number stored as a real part followed by an imaginary part
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// A scalar element with a fixed datatype and byte layout
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    const TYPE_ID: ScalarTypeId;

    /// Append the element to `out` in `order`
    fn write_to(self, order: ByteOrder, out: &mut Vec<u8>);

    /// Read one element stored in `order` from the front of `bytes`
    fn read_from(bytes: &[u8], order: ByteOrder) -> Self;
}

macro_rules! make_element {
    ($($t:ty => $id:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const TYPE_ID: ScalarTypeId = ScalarTypeId::$id;

                #[inline]
                fn write_to(self, order: ByteOrder, out: &mut Vec<u8>) {
                    extend_in_order(self, order, out);
                }

                #[inline]
                fn read_from(bytes: &[u8], order: ByteOrder) -> Self {
                    to_host::<$t>(bytes, order)
                }
            }
        )*
    };
}

make_element!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    f16 => Float16,
    f32 => Float32,
    f64 => Float64,
);

impl Element for bool {
    const TYPE_ID: ScalarTypeId = ScalarTypeId::Bool8;

    fn write_to(self, _order: ByteOrder, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_from(bytes: &[u8], _order: ByteOrder) -> Self {
        bytes[0] != 0
    }
}

macro_rules! make_complex_element {
    ($($t:ty => $id:ident),* $(,)?) => {
        $(
            impl Element for Complex<$t> {
                const TYPE_ID: ScalarTypeId = ScalarTypeId::$id;

                fn write_to(self, order: ByteOrder, out: &mut Vec<u8>) {
                    extend_in_order(self.re, order, out);
                    extend_in_order(self.im, order, out);
                }

                fn read_from(bytes: &[u8], order: ByteOrder) -> Self {
                    let width = <$t as Primitive>::SIZE;
                    Complex {
                        re: to_host::<$t>(bytes, order),
                        im: to_host::<$t>(&bytes[width..], order),
                    }
                }
            }
        )*
    };
}

make_complex_element!(f16 => Complex32, f32 => Complex64, f64 => Complex128);

/// Encode a slice of elements into a payload in `order`
pub fn encode_elements<T: Element>(values: &[T], order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::TYPE_ID.size());
    for value in values {
        value.write_to(order, &mut out);
    }
    out
}
