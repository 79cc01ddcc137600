//! Store header format.
//!
//! Page 0 of every data file starts with a fixed-layout header.
//!
//! # Header Layout (40 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       8   global magic ("damsondb")
//!   8       8   store magic ("dmnstore")
//!  16       4   format version (currently 1)
//!  20       4   page_shift
//!  24       8   page_count (includes the header page)
//!  32       8   free-list head page ID (0 = empty free list)
//! ```
//!
//! All fields are little-endian. The rest of page 0 is reserved.

use damson_common::types::PageId;

/// The size of a serialized store header, in bytes.
///
/// This is a constant because the header only has fixed-width fields.
pub const STORE_HEADER_SIZE: usize = 40;

/// Magic number used to tag all damson files.
///
/// Encoded as "damsondb" on little-endian systems.
const GLOBAL_MAGIC: u64 = u64::from_le_bytes(*b"damsondb");

/// Magic number used to tag damson store data files.
///
/// Encoded as "dmnstore" on little-endian systems.
const STORE_MAGIC: u64 = u64::from_le_bytes(*b"dmnstore");

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Metadata stored in the data file's header page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    /// Base-2 logarithm of the store's page size.
    pub page_shift: usize,
    /// Total number of pages in the data file, including the header page.
    pub page_count: u64,
    /// Head of the free-page chain; [`PageId::HEADER`] when the chain is
    /// empty.
    pub free_list_head: PageId,
}

impl StoreHeader {
    /// Creates the header for a freshly bootstrapped store.
    pub fn new(page_shift: usize) -> Self {
        Self {
            page_shift,
            page_count: 1,
            free_list_head: PageId::HEADER,
        }
    }

    /// Stores this header into a buffer meant for on-disk storage.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than [`STORE_HEADER_SIZE`].
    pub fn serialize(&self, to: &mut [u8]) {
        assert!(to.len() >= STORE_HEADER_SIZE, "buffer too small for header");

        to[0..8].copy_from_slice(&GLOBAL_MAGIC.to_le_bytes());
        to[8..16].copy_from_slice(&STORE_MAGIC.to_le_bytes());
        to[16..20].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        to[20..24].copy_from_slice(&(self.page_shift as u32).to_le_bytes());
        to[24..32].copy_from_slice(&self.page_count.to_le_bytes());
        to[32..40].copy_from_slice(&self.free_list_head.as_u64().to_le_bytes());
    }

    /// Parses a header from the start of a header page.
    ///
    /// Returns a static description of the problem if validation fails.
    pub fn deserialize(from: &[u8]) -> Result<Self, &'static str> {
        if from.len() < STORE_HEADER_SIZE {
            return Err("header page truncated");
        }

        if read_u64(from, 0) != GLOBAL_MAGIC {
            return Err("bad global magic");
        }
        if read_u64(from, 8) != STORE_MAGIC {
            return Err("bad store magic");
        }
        let version = u32::from_le_bytes([from[16], from[17], from[18], from[19]]);
        if version != FORMAT_VERSION {
            return Err("unsupported format version");
        }

        let page_shift = u32::from_le_bytes([from[20], from[21], from[22], from[23]]) as usize;
        let page_count = read_u64(from, 24);
        let free_list_head = PageId::new(read_u64(from, 32));

        if page_count == 0 {
            return Err("header page count is zero");
        }

        Ok(Self {
            page_shift,
            page_count,
            free_list_head,
        })
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
