//! Byte strings for `char *` data crossing the native boundary.
//!
//! [`ByteString`] is immutable and hashable. [`MutableByteString`] can be
//! edited in place and therefore has no `Hash` implementation:
//!
//! ```compile_fail
//! use std::collections::HashSet;
//! use sai_loader::marshal::MutableByteString;
//!
//! let mut keys = HashSet::new();
//! keys.insert(MutableByteString::new("SAI_KEY_INIT_CONFIG_FILE"));
//! ```
//!
//! Both variants normalize every source (buffer, another wrapper, raw
//! pointer, null, integer address, fixed-size array) to an owned byte buffer
//! and share the same text operations, which work on the bytes and re-wrap
//! the result.

use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::ops::{Bound, Range, RangeBounds};

use crate::error::{MarshalError, MarshalResult};

fn resolve_range(range: impl RangeBounds<usize>, len: usize) -> MarshalResult<Range<usize>> {
    let past = |index: usize| {
        index
            .checked_add(1)
            .ok_or(MarshalError::IndexOutOfRange { index, len })
    };
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => past(s)?,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => past(e)?,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    if end > len {
        return Err(MarshalError::IndexOutOfRange { index: end, len });
    }
    if start > end {
        return Err(MarshalError::IndexOutOfRange { index: start, len });
    }
    Ok(start..end)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn split_bytes(bytes: &[u8], sep: &[u8]) -> Vec<Vec<u8>> {
    if sep.is_empty() {
        return vec![bytes.to_vec()];
    }
    let mut parts = Vec::new();
    let mut rest = bytes;
    while let Some(at) = find_bytes(rest, sep) {
        parts.push(rest[..at].to_vec());
        rest = &rest[at + sep.len()..];
    }
    parts.push(rest.to_vec());
    parts
}

fn pad(bytes: &[u8], left: usize, right: usize, fill: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + left + right);
    out.resize(left, fill);
    out.extend_from_slice(bytes);
    out.resize(out.len() + right, fill);
    out
}

macro_rules! byte_string_common {
    ($ty:ident) => {
        impl $ty {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self { bytes: bytes.into() }
            }

            /// Copies the bytes of any other byte source, including the
            /// other wrapper variant.
            pub fn copy(source: impl AsRef<[u8]>) -> Self {
                Self::new(source.as_ref())
            }

            /// Reads a NUL-terminated string. A null pointer yields an empty
            /// string.
            ///
            /// # Safety
            ///
            /// A non-null `ptr` must point to a readable NUL-terminated
            /// buffer.
            pub unsafe fn from_ptr(ptr: *const c_char) -> Self {
                if ptr.is_null() {
                    return Self::default();
                }
                Self::new(CStr::from_ptr(ptr).to_bytes())
            }

            /// Reinterprets an integer as the address of a NUL-terminated
            /// string. Address zero yields an empty string.
            ///
            /// # Safety
            ///
            /// Same as [`Self::from_ptr`].
            pub unsafe fn from_address(address: usize) -> Self {
                Self::from_ptr(address as *const c_char)
            }

            /// Reads a fixed-size C array up to its first NUL.
            pub fn from_c_array(array: &[u8]) -> Self {
                let end = array.iter().position(|&b| b == 0).unwrap_or(array.len());
                Self::new(&array[..end])
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.bytes
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.bytes
            }

            pub fn len(&self) -> usize {
                self.bytes.len()
            }

            pub fn is_empty(&self) -> bool {
                self.bytes.is_empty()
            }

            pub fn get(&self, index: usize) -> MarshalResult<u8> {
                self.bytes
                    .get(index)
                    .copied()
                    .ok_or(MarshalError::IndexOutOfRange {
                        index,
                        len: self.bytes.len(),
                    })
            }

            pub fn slice(&self, range: impl RangeBounds<usize>) -> MarshalResult<Self> {
                let range = resolve_range(range, self.bytes.len())?;
                Ok(Self::new(&self.bytes[range]))
            }

            /// Copies into a `CString` for passing as `const char *`.
            pub fn to_cstring(&self) -> MarshalResult<CString> {
                CString::new(self.bytes.clone()).map_err(|e| MarshalError::InteriorNul {
                    position: e.nul_position(),
                })
            }

            pub fn to_uppercase(&self) -> Self {
                Self::new(self.bytes.to_ascii_uppercase())
            }

            pub fn to_lowercase(&self) -> Self {
                Self::new(self.bytes.to_ascii_lowercase())
            }

            pub fn swapcase(&self) -> Self {
                Self::new(
                    self.bytes
                        .iter()
                        .map(|b| {
                            if b.is_ascii_uppercase() {
                                b.to_ascii_lowercase()
                            } else {
                                b.to_ascii_uppercase()
                            }
                        })
                        .collect::<Vec<u8>>(),
                )
            }

            pub fn capitalize(&self) -> Self {
                let mut bytes = self.bytes.to_ascii_lowercase();
                if let Some(first) = bytes.first_mut() {
                    first.make_ascii_uppercase();
                }
                Self::new(bytes)
            }

            pub fn strip(&self) -> Self {
                Self::new(self.bytes.trim_ascii())
            }

            pub fn lstrip(&self) -> Self {
                Self::new(self.bytes.trim_ascii_start())
            }

            pub fn rstrip(&self) -> Self {
                Self::new(self.bytes.trim_ascii_end())
            }

            /// Strips any of `chars` from both ends.
            pub fn strip_bytes(&self, chars: &[u8]) -> Self {
                let start = self
                    .bytes
                    .iter()
                    .position(|b| !chars.contains(b))
                    .unwrap_or(self.bytes.len());
                let end = self
                    .bytes
                    .iter()
                    .rposition(|b| !chars.contains(b))
                    .map_or(start, |i| i + 1);
                Self::new(&self.bytes[start..end.max(start)])
            }

            pub fn ljust(&self, width: usize, fill: u8) -> Self {
                let extra = width.saturating_sub(self.len());
                Self::new(pad(&self.bytes, 0, extra, fill))
            }

            pub fn rjust(&self, width: usize, fill: u8) -> Self {
                let extra = width.saturating_sub(self.len());
                Self::new(pad(&self.bytes, extra, 0, fill))
            }

            /// Centers within `width`; odd padding goes to the right.
            pub fn center(&self, width: usize, fill: u8) -> Self {
                let extra = width.saturating_sub(self.len());
                Self::new(pad(&self.bytes, extra / 2, extra - extra / 2, fill))
            }

            /// Left-pads with `0`, keeping a leading sign in front.
            pub fn zfill(&self, width: usize) -> Self {
                let extra = width.saturating_sub(self.len());
                match self.bytes.first() {
                    Some(&sign @ (b'+' | b'-')) => {
                        let mut out = vec![sign];
                        out.extend(pad(&self.bytes[1..], extra, 0, b'0'));
                        Self::new(out)
                    }
                    _ => Self::new(pad(&self.bytes, extra, 0, b'0')),
                }
            }

            pub fn find(&self, needle: impl AsRef<[u8]>) -> Option<usize> {
                find_bytes(&self.bytes, needle.as_ref())
            }

            pub fn rfind(&self, needle: impl AsRef<[u8]>) -> Option<usize> {
                rfind_bytes(&self.bytes, needle.as_ref())
            }

            /// Non-overlapping occurrences of `needle`.
            pub fn count(&self, needle: impl AsRef<[u8]>) -> usize {
                let needle = needle.as_ref();
                if needle.is_empty() {
                    return self.bytes.len() + 1;
                }
                split_bytes(&self.bytes, needle).len() - 1
            }

            pub fn contains(&self, needle: impl AsRef<[u8]>) -> bool {
                self.find(needle).is_some()
            }

            pub fn starts_with(&self, prefix: impl AsRef<[u8]>) -> bool {
                self.bytes.starts_with(prefix.as_ref())
            }

            pub fn ends_with(&self, suffix: impl AsRef<[u8]>) -> bool {
                self.bytes.ends_with(suffix.as_ref())
            }

            pub fn split(&self, sep: impl AsRef<[u8]>) -> Vec<Self> {
                split_bytes(&self.bytes, sep.as_ref())
                    .into_iter()
                    .map(Self::new)
                    .collect()
            }

            /// Splits on runs of ASCII whitespace, dropping empty parts.
            pub fn split_whitespace(&self) -> Vec<Self> {
                self.bytes
                    .split(u8::is_ascii_whitespace)
                    .filter(|part| !part.is_empty())
                    .map(Self::new)
                    .collect()
            }

            /// Joins `parts` with `self` as the separator.
            pub fn join<I, P>(&self, parts: I) -> Self
            where
                I: IntoIterator<Item = P>,
                P: AsRef<[u8]>,
            {
                let mut out = Vec::new();
                for (i, part) in parts.into_iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(&self.bytes);
                    }
                    out.extend_from_slice(part.as_ref());
                }
                Self::new(out)
            }

            pub fn replace(&self, from: impl AsRef<[u8]>, to: impl AsRef<[u8]>) -> Self {
                let from = from.as_ref();
                if from.is_empty() {
                    return self.clone();
                }
                let parts = split_bytes(&self.bytes, from);
                Self::new(parts.join(to.as_ref()))
            }

            pub fn concat(&self, other: impl AsRef<[u8]>) -> Self {
                let mut out = self.bytes.clone();
                out.extend_from_slice(other.as_ref());
                Self::new(out)
            }

            pub fn is_alpha(&self) -> bool {
                !self.is_empty() && self.bytes.iter().all(u8::is_ascii_alphabetic)
            }

            pub fn is_digit(&self) -> bool {
                !self.is_empty() && self.bytes.iter().all(u8::is_ascii_digit)
            }

            pub fn is_alnum(&self) -> bool {
                !self.is_empty() && self.bytes.iter().all(u8::is_ascii_alphanumeric)
            }

            pub fn is_space(&self) -> bool {
                !self.is_empty() && self.bytes.iter().all(u8::is_ascii_whitespace)
            }

            /// True when there is at least one cased byte and none is
            /// lowercase.
            pub fn is_upper(&self) -> bool {
                self.bytes.iter().any(u8::is_ascii_uppercase)
                    && !self.bytes.iter().any(u8::is_ascii_lowercase)
            }

            pub fn is_lower(&self) -> bool {
                self.bytes.iter().any(u8::is_ascii_lowercase)
                    && !self.bytes.iter().any(u8::is_ascii_uppercase)
            }

            pub fn to_string_lossy(&self) -> String {
                String::from_utf8_lossy(&self.bytes).into_owned()
            }
        }

        impl AsRef<[u8]> for $ty {
            fn as_ref(&self) -> &[u8] {
                &self.bytes
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<&[u8]> for $ty {
            fn from(b: &[u8]) -> Self {
                Self::new(b)
            }
        }

        impl From<Vec<u8>> for $ty {
            fn from(b: Vec<u8>) -> Self {
                Self::new(b)
            }
        }

        impl From<&CStr> for $ty {
            fn from(s: &CStr) -> Self {
                Self::new(s.to_bytes())
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_string_lossy())
            }
        }
    };
}

/// Immutable byte string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteString {
    bytes: Vec<u8>,
}

/// Byte string editable in place. Not usable as a hash key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MutableByteString {
    bytes: Vec<u8>,
}

byte_string_common!(ByteString);
byte_string_common!(MutableByteString);

impl ByteString {
    pub fn to_mutable(&self) -> MutableByteString {
        MutableByteString::new(self.bytes.clone())
    }
}

impl MutableByteString {
    pub fn set(&mut self, index: usize, value: u8) -> MarshalResult<()> {
        let len = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(index)
            .ok_or(MarshalError::IndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Replaces `range` with `replacement`, which may differ in length.
    pub fn set_range(
        &mut self,
        range: impl RangeBounds<usize>,
        replacement: impl AsRef<[u8]>,
    ) -> MarshalResult<()> {
        let range = resolve_range(range, self.bytes.len())?;
        self.bytes
            .splice(range, replacement.as_ref().iter().copied());
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> MarshalResult<u8> {
        if index >= self.bytes.len() {
            return Err(MarshalError::IndexOutOfRange {
                index,
                len: self.bytes.len(),
            });
        }
        Ok(self.bytes.remove(index))
    }

    pub fn remove_range(&mut self, range: impl RangeBounds<usize>) -> MarshalResult<()> {
        let range = resolve_range(range, self.bytes.len())?;
        self.bytes.drain(range);
        Ok(())
    }

    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn extend(&mut self, bytes: impl AsRef<[u8]>) {
        self.bytes.extend_from_slice(bytes.as_ref());
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Pointer to the buffer, for native calls that write into it.
    pub fn as_mut_ptr(&mut self) -> *mut c_char {
        self.bytes.as_mut_ptr().cast()
    }

    pub fn freeze(self) -> ByteString {
        ByteString::new(self.bytes)
    }
}

impl From<MutableByteString> for ByteString {
    fn from(b: MutableByteString) -> Self {
        b.freeze()
    }
}

impl From<ByteString> for MutableByteString {
    fn from(b: ByteString) -> Self {
        MutableByteString::new(b.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sources_normalize_to_same_bytes() {
        let original = b"SAI_VS_SWITCH_TYPE".to_vec();
        let c = CString::new(original.clone()).unwrap();

        let from_buffer = ByteString::new(original.clone());
        let from_wrapper = ByteString::copy(&MutableByteString::new(original.clone()));
        let from_ptr = unsafe { ByteString::from_ptr(c.as_ptr()) };
        let from_address = unsafe { ByteString::from_address(c.as_ptr() as usize) };

        for b in [&from_buffer, &from_wrapper, &from_ptr, &from_address] {
            assert_eq!(b.as_bytes(), original.as_slice());
        }
    }

    #[test]
    fn test_null_sources_are_empty() {
        assert!(unsafe { ByteString::from_ptr(std::ptr::null()) }.is_empty());
        assert!(unsafe { MutableByteString::from_address(0) }.is_empty());
    }

    #[test]
    fn test_from_c_array_stops_at_nul() {
        let mut array = [0u8; 16];
        array[..4].copy_from_slice(b"eth0");
        assert_eq!(ByteString::from_c_array(&array).as_bytes(), b"eth0");
        assert_eq!(ByteString::from_c_array(b"full").as_bytes(), b"full");
    }

    #[test]
    fn test_immutable_is_hashable() {
        let mut keys = HashSet::new();
        keys.insert(ByteString::from("a"));
        keys.insert(ByteString::from("a"));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_case_and_padding() {
        let b = ByteString::from("Port");
        assert_eq!(b.to_uppercase().as_bytes(), b"PORT");
        assert_eq!(b.swapcase().as_bytes(), b"pORT");
        assert_eq!(ByteString::from("vLAN").capitalize().as_bytes(), b"Vlan");
        assert_eq!(b.ljust(6, b'.').as_bytes(), b"Port..");
        assert_eq!(b.rjust(6, b' ').as_bytes(), b"  Port");
        assert_eq!(b.center(7, b'*').as_bytes(), b"*Port**");
        assert_eq!(ByteString::from("-42").zfill(5).as_bytes(), b"-0042");
        assert_eq!(b.ljust(2, b'.'), b);
    }

    #[test]
    fn test_strip() {
        let b = ByteString::from("  lane \t\n");
        assert_eq!(b.strip().as_bytes(), b"lane");
        assert_eq!(b.lstrip().as_bytes(), b"lane \t\n");
        assert_eq!(b.rstrip().as_bytes(), b"  lane");
        assert_eq!(ByteString::from("xxabxx").strip_bytes(b"x").as_bytes(), b"ab");
        assert!(ByteString::from("xxx").strip_bytes(b"x").is_empty());
    }

    #[test]
    fn test_search() {
        let b = ByteString::from("a.b.c");
        assert_eq!(b.find("."), Some(1));
        assert_eq!(b.rfind("."), Some(3));
        assert_eq!(b.find("z"), None);
        assert_eq!(b.count("."), 2);
        assert!(b.contains("b.c"));
        assert!(b.starts_with("a."));
        assert!(b.ends_with(".c"));
    }

    #[test]
    fn test_split_join_replace() {
        let b = ByteString::from("10.0.0.1");
        let parts = b.split(".");
        assert_eq!(parts.len(), 4);
        assert_eq!(ByteString::from(":").join(&parts).as_bytes(), b"10:0:0:1");
        assert_eq!(b.replace(".", "::").as_bytes(), b"10::0::0::1");
        let words = ByteString::from("  a  b ").split_whitespace();
        assert_eq!(words, vec![ByteString::from("a"), ByteString::from("b")]);
    }

    #[test]
    fn test_predicates() {
        assert!(ByteString::from("abc").is_alpha());
        assert!(ByteString::from("123").is_digit());
        assert!(ByteString::from("a1").is_alnum());
        assert!(ByteString::from(" \t").is_space());
        assert!(ByteString::from("SAI_1").is_upper());
        assert!(!ByteString::from("").is_alpha());
        assert!(!ByteString::from("123").is_lower());
    }

    #[test]
    fn test_mutable_edits() {
        let mut b = MutableByteString::from("switch");
        b.set(0, b'S').unwrap();
        b.set_range(1..3, "W").unwrap();
        assert_eq!(b.as_bytes(), b"SWtch");
        assert_eq!(b.remove(0).unwrap(), b'S');
        b.remove_range(..2).unwrap();
        assert_eq!(b.as_bytes(), b"ch");
        b.push(b'!');
        b.extend("!!");
        assert_eq!(b.as_bytes(), b"ch!!!");
        b.clear();
        assert!(b.is_empty());
    }

    #[test]
    fn test_mutable_out_of_range() {
        let mut b = MutableByteString::from("ab");
        assert_eq!(
            b.set(2, b'x'),
            Err(MarshalError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert!(b.remove(5).is_err());
        assert!(b.remove_range(1..4).is_err());
        assert!(b.get(2).is_err());
        assert_eq!(b.as_bytes(), b"ab");
    }

    #[test]
    fn test_range_bounds_at_usize_max() {
        let b = ByteString::from("ab");
        assert_eq!(
            b.slice(..=usize::MAX),
            Err(MarshalError::IndexOutOfRange {
                index: usize::MAX,
                len: 2
            })
        );
        assert_eq!(
            b.slice((Bound::Excluded(usize::MAX), Bound::Unbounded)),
            Err(MarshalError::IndexOutOfRange {
                index: usize::MAX,
                len: 2
            })
        );
        assert_eq!(b.slice(..=1).unwrap().as_bytes(), b"ab");

        let mut m = MutableByteString::from("ab");
        assert!(m.set_range(..=usize::MAX, b"x").is_err());
        assert!(m.remove_range(..=usize::MAX).is_err());
        assert_eq!(m.as_bytes(), b"ab");
    }

    #[test]
    fn test_to_cstring() {
        assert_eq!(
            ByteString::from("lo").to_cstring().unwrap().as_bytes_with_nul(),
            b"lo\0"
        );
        assert_eq!(
            ByteString::new(b"a\0b".to_vec()).to_cstring(),
            Err(MarshalError::InteriorNul { position: 1 })
        );
    }

    #[test]
    fn test_freeze_round_trip() {
        let mut b = MutableByteString::from("x");
        b.extend("y");
        let frozen = b.freeze();
        assert_eq!(frozen, ByteString::from("xy"));
        assert_eq!(frozen.to_mutable().as_bytes(), b"xy");
    }
}
