//! Database metadata header (stored in the first bytes of page 0).

use crate::config::{validate_page_size, DEFAULT_PAGE_SIZE};
use crate::error::{Result, StorageError};
use crate::pager::PageNum;

/// Magic bytes identifying a leafdb database file.
pub const MAGIC: &[u8; 16] = b"leafdb format 1\0";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 32;

/// The metadata stored at the beginning of the database file (page 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Page size in bytes (power of two).
    pub page_size: u32,
    /// Total number of pages, including page 0. Also the next page to allocate.
    pub page_count: u32,
    /// Page number of the table's B+tree root (0 = no tree yet).
    pub root_page: PageNum,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl FileHeader {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page_count: 1, // just the header page itself
            root_page: 0,
        }
    }

    /// Serialize the header into the start of `buf`.
    pub fn serialize(&self, buf: &mut [u8]) {
        assert!(buf.len() >= HEADER_SIZE, "buffer too small for header");
        buf[..HEADER_SIZE].fill(0);

        // Bytes 0..16: magic
        buf[0..16].copy_from_slice(MAGIC);
        // Bytes 16..20: page_size (big-endian)
        buf[16..20].copy_from_slice(&self.page_size.to_be_bytes());
        // Bytes 20..24: page_count
        buf[20..24].copy_from_slice(&self.page_count.to_be_bytes());
        // Bytes 24..28: root_page
        buf[24..28].copy_from_slice(&self.root_page.to_be_bytes());
    }

    /// Deserialize a header, rejecting foreign files and impossible values.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StorageError::corrupt("header truncated"));
        }
        if &buf[0..16] != MAGIC.as_slice() {
            return Err(StorageError::corrupt("invalid database header (bad magic)"));
        }
        let page_size = read_u32(buf, 16);
        let page_count = read_u32(buf, 20);
        let root_page = read_u32(buf, 24);

        validate_page_size(page_size)
            .map_err(|_| StorageError::corrupt(format!("unsupported page size {page_size}")))?;
        if page_count == 0 {
            return Err(StorageError::corrupt("page count is zero"));
        }
        if root_page >= page_count {
            return Err(StorageError::corrupt(format!(
                "root page {root_page} out of range (page_count={page_count})"
            )));
        }

        Ok(Self {
            page_size,
            page_count,
            root_page,
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_header() {
        let header = FileHeader::default();
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf);
        let decoded = FileHeader::deserialize(&buf).expect("should decode");
        assert_eq!(header, decoded);
    }

    #[test]
    fn roundtrip_custom_header() {
        let header = FileHeader {
            page_size: 8192,
            page_count: 42,
            root_page: 7,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf);
        let decoded = FileHeader::deserialize(&buf).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"bad!");
        assert!(matches!(
            FileHeader::deserialize(&buf),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn too_short_is_corrupt() {
        let buf = [0u8; 10];
        assert!(FileHeader::deserialize(&buf).is_err());
    }

    #[test]
    fn root_past_page_count_is_corrupt() {
        let header = FileHeader {
            page_size: 4096,
            page_count: 3,
            root_page: 3,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf);
        assert!(FileHeader::deserialize(&buf).is_err());
    }
}
