// TYPED KEY ENCODING
// Fixed-width, order-preserving binary keys for every persisted record.
//
// SAFETY INVARIANTS:
// 1. Every key starts with a one-byte namespace, followed by a one-byte record tag
// 2. Integers are encoded big-endian and fixed-width, so byte order == numeric order
// 3. A key built from a prefix of components is a byte prefix of every longer key
//    built from the same components (prefix iteration relies on this)
// 4. Variable-length components are length-prefixed and may only appear last

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store namespace. Each module owns one; the pipeline owns `MAIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace(pub u8);

impl Namespace {
    /// Pipeline-owned records: current protocol version, consensus params,
    /// pending upgrade config, last failed version.
    pub const MAIN: Namespace = Namespace(0x00);

    pub fn as_byte(&self) -> u8 {
        self.0
    }

    /// Prefix covering every key in this namespace.
    pub fn prefix(&self) -> Vec<u8> {
        vec![self.0]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// Builder for namespaced binary keys.
///
/// ```
/// use vela_store::{KeyBuilder, Namespace};
/// let key = KeyBuilder::new(Namespace(0x02)).tag(0x20).u64(7).build();
/// assert_eq!(key, vec![0x02, 0x20, 0, 0, 0, 0, 0, 0, 0, 7]);
/// ```
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn new(namespace: Namespace) -> Self {
        let mut buf = Vec::with_capacity(32);
        buf.push(namespace.as_byte());
        KeyBuilder { buf }
    }

    /// Record tag identifying the kind of entry within a namespace.
    pub fn tag(mut self, tag: u8) -> Self {
        self.buf.push(tag);
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Fixed-width component (addresses, hashes). The caller guarantees that
    /// every key of this shape uses the same width.
    pub fn fixed(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Length-prefixed trailing component.
    pub fn var(mut self, bytes: &[u8]) -> Self {
        let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(&bytes[..len as usize]);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
/// Returns `None` when the prefix is empty or all `0xff` (unbounded scan).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Reads a big-endian `u64` at `offset`.
pub fn read_u64(key: &[u8], offset: usize) -> Option<u64> {
    let slice = key.get(offset..offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice);
    Some(u64::from_be_bytes(raw))
}
