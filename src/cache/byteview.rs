//! Immutable cached value

use bytes::Bytes;

use super::lru::Value;

/// Read-only view over one cached value.
///
/// Backed by [`Bytes`], so clones share the buffer without copying and no
/// caller can mutate what the cache holds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    b: Bytes,
}

impl ByteView {
    /// Copy `data` into a fresh view
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            b: Bytes::copy_from_slice(data),
        }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.b.len()
    }

    /// Check if the view is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Owned copy of the data
    pub fn byte_slice(&self) -> Vec<u8> {
        self.b.to_vec()
    }

    /// Shared immutable handle (no copy)
    pub fn bytes(&self) -> Bytes {
        self.b.clone()
    }
}

impl Value for ByteView {
    fn len(&self) -> usize {
        self.b.len()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(v: Vec<u8>) -> Self {
        Self { b: Bytes::from(v) }
    }
}

impl From<Bytes> for ByteView {
    fn from(b: Bytes) -> Self {
        Self { b }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl std::fmt::Display for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.b))
    }
}
