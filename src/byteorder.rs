// SPDX-License-Identifier: MIT
//! Byte order of stored scalars and conversion to and from the host order

use std::fmt;
use std::str::FromStr;

use half::f16;
use serde_yaml::Value;

use crate::error::{AsdfError, Result};

/// Byte order of the scalars in a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Byte order of the running machine, probed at runtime
    pub fn host() -> Self {
        if 1u16.to_ne_bytes()[0] == 1 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Name used in the tree (`big` or `little`)
    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Big => "big",
            ByteOrder::Little => "little",
        }
    }

    #[inline]
    pub fn is_host(self) -> bool {
        self == Self::host()
    }

    pub fn from_node(node: &Value) -> Result<Self> {
        match node {
            Value::String(s) => s.parse(),
            Value::Tagged(tagged) => Self::from_node(&tagged.value),
            other => Err(AsdfError::invalid_node(
                "byteorder",
                format!("expected a string, got {other:?}"),
            )),
        }
    }

    pub fn to_node(self) -> Value {
        Value::String(self.name().to_string())
    }
}

impl FromStr for ByteOrder {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "big" => Ok(ByteOrder::Big),
            "little" => Ok(ByteOrder::Little),
            other => Err(AsdfError::invalid_node(
                "byteorder",
                format!("unknown byte order '{other}'"),
            )),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of the running machine
pub fn host_byteorder() -> ByteOrder {
    ByteOrder::host()
}

/// Fixed-size scalar that can be moved between byte orders
pub trait Primitive: Copy {
    const SIZE: usize;

    /// Read from the first `SIZE` bytes in native order
    fn from_ne_slice(bytes: &[u8]) -> Self;

    /// Append the native-order bytes
    fn extend_ne(self, out: &mut Vec<u8>);
}

macro_rules! impl_primitive {
    ($($t:ty),* $(,)?) => {
        $(
            impl Primitive for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_ne_bytes(buf)
                }

                #[inline]
                fn extend_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64, f16);

/// Decode a scalar stored in `order`.
///
/// `bytes` must hold at least `T::SIZE` bytes; only the first `T::SIZE` are read.
#[inline]
pub fn to_host<T: Primitive>(bytes: &[u8], order: ByteOrder) -> T {
    if order.is_host() {
        T::from_ne_slice(bytes)
    } else {
        let mut swapped = bytes[..T::SIZE].to_vec();
        swapped.reverse();
        T::from_ne_slice(&swapped)
    }
}

/// Encode a host scalar in `order`
#[inline]
pub fn from_host<T: Primitive>(value: T, order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(T::SIZE);
    extend_in_order(value, order, &mut out);
    out
}

/// Append a host scalar to `out` in `order`
#[inline]
pub fn extend_in_order<T: Primitive>(value: T, order: ByteOrder, out: &mut Vec<u8>) {
    let start = out.len();
    value.extend_ne(out);
    if !order.is_host() {
        out[start..].reverse();
    }
}

/// Reverse every `width`-byte word of `bytes` in place.
///
/// A trailing partial word is left untouched.
pub fn swap_words(bytes: &mut [u8], width: usize) {
    if width <= 1 {
        return;
    }
    for word in bytes.chunks_exact_mut(width) {
        word.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn other(order: ByteOrder) -> ByteOrder {
        match order {
            ByteOrder::Big => ByteOrder::Little,
            ByteOrder::Little => ByteOrder::Big,
        }
    }

    #[test]
    fn test_host_probe_matches_target() {
        let expected = if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        };
        assert_eq!(host_byteorder(), expected);
    }

    #[test]
    fn test_explicit_orders() {
        assert_eq!(from_host(0x0102u16, ByteOrder::Big), vec![1, 2]);
        assert_eq!(from_host(0x0102u16, ByteOrder::Little), vec![2, 1]);
        assert_eq!(to_host::<u32>(&[0, 0, 0, 7], ByteOrder::Big), 7);
        assert_eq!(to_host::<u32>(&[7, 0, 0, 0], ByteOrder::Little), 7);
    }

    #[test]
    fn test_round_trip_through_foreign_order() {
        let foreign = other(ByteOrder::host());
        let bytes = from_host(-1.5f64, foreign);
        assert_eq!(to_host::<f64>(&bytes, foreign), -1.5);

        let bytes = from_host(i128::MIN + 3, foreign);
        assert_eq!(to_host::<i128>(&bytes, foreign), i128::MIN + 3);

        let bytes = from_host(f16::from_f32(0.25), foreign);
        assert_eq!(to_host::<f16>(&bytes, foreign), f16::from_f32(0.25));
    }

    #[test]
    fn test_host_order_is_identity() {
        let bytes = 0xdead_beefu32.to_ne_bytes();
        assert_eq!(from_host(0xdead_beefu32, ByteOrder::host()), bytes.to_vec());
    }

    #[test]
    fn test_swap_words() {
        let mut bytes = vec![1, 2, 3, 4, 5, 6, 7];
        swap_words(&mut bytes, 2);
        assert_eq!(bytes, vec![2, 1, 4, 3, 6, 5, 7]);
    }

    #[test]
    fn test_node_conversion() {
        assert_eq!(
            ByteOrder::from_node(&Value::String("big".into())).unwrap(),
            ByteOrder::Big
        );
        assert_eq!(ByteOrder::Little.to_node(), Value::String("little".into()));
        assert!(ByteOrder::from_node(&Value::String("middle".into())).is_err());
        assert!(ByteOrder::from_node(&Value::Null).is_err());
    }
}
