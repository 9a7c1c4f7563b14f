use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::Rid;

/// Fixed-width byte codec for keys and values stored in hash bucket pages.
/// `store` must always write exactly `STORED_SIZE` bytes, and equal values
/// must encode to equal bytes so the content hash is stable.
pub trait Storable: Clone + PartialEq + Send + Sync + 'static {
    const STORED_SIZE: usize;

    fn store(&self, buf: &mut [u8]);
    fn load(buf: &[u8]) -> Self;
}

impl Storable for i32 {
    const STORED_SIZE: usize = 4;

    fn store(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn load(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl Storable for u32 {
    const STORED_SIZE: usize = 4;

    fn store(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn load(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl Storable for i64 {
    const STORED_SIZE: usize = 8;

    fn store(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn load(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl Storable for u64 {
    const STORED_SIZE: usize = 8;

    fn store(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn load(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl Storable for Rid {
    const STORED_SIZE: usize = 8;

    fn store(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot);
    }

    fn load(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

/// 32-bit stable content hash of a key's encoded bytes. Keys with identical
/// bytes hash identically across runs.
pub fn hash_key<K: Storable>(key: &K) -> u32 {
    let mut buf = vec![0u8; K::STORED_SIZE];
    key.store(&mut buf);
    crc32fast::hash(&buf)
}
