//! Pager: page-level I/O with an in-memory buffer pool.
//!
//! The pager manages reading and writing fixed-size pages from/to a backing
//! medium. It maintains a buffer pool with LRU eviction and dirty-page
//! tracking. Page 0 carries the [`FileHeader`]; every other page belongs to
//! the B+tree.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::backend::{FileBackend, MemoryBackend, PageBackend};
use crate::config::PagerConfig;
use crate::error::{Result, StorageError};
use crate::header::{FileHeader, HEADER_SIZE};

/// A page number (0-based). Page 0 contains the file header.
pub type PageNum = u32;

/// A single in-memory page frame.
struct Frame {
    data: Vec<u8>,
    /// Whether this page has been modified since last flush.
    dirty: bool,
    /// Access counter for LRU tracking.
    last_access: u64,
}

/// The pager manages page I/O between the backend and a bounded buffer pool.
pub struct Pager {
    backend: Box<dyn PageBackend>,
    header: FileHeader,
    header_dirty: bool,
    page_size: usize,
    /// Buffer pool: page_num -> frame.
    pool: HashMap<PageNum, Frame>,
    max_frames: usize,
    max_pages: u32,
    /// Monotonically increasing access counter for LRU.
    access_counter: u64,
}

impl Pager {
    /// Open or create a database file with default settings.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PagerConfig::default())
    }

    /// Open or create a database file.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PagerConfig) -> Result<Self> {
        let path = path.as_ref();
        let backend = FileBackend::open(path)?;
        info!(path = %path.display(), "opening database file");
        Self::with_backend(Box::new(backend), config)
    }

    /// Create an empty database that lives only in memory.
    pub fn in_memory(config: PagerConfig) -> Result<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()), config)
    }

    /// Open a pager over any backing medium. An empty medium is initialized
    /// with a fresh header; otherwise the existing header is validated.
    pub fn with_backend(mut backend: Box<dyn PageBackend>, config: PagerConfig) -> Result<Self> {
        config.validate()?;

        let (header, header_dirty) = if backend.is_empty()? {
            (FileHeader::new(config.page_size), true)
        } else {
            let mut buf = [0u8; HEADER_SIZE];
            backend.read_at(0, &mut buf)?;
            (FileHeader::deserialize(&buf)?, false)
        };

        if header.page_count > config.max_pages {
            return Err(StorageError::InvalidConfig(format!(
                "database has {} pages but max_pages is {}",
                header.page_count, config.max_pages
            )));
        }

        info!(
            page_size = header.page_size,
            page_count = header.page_count,
            root_page = header.root_page,
            "pager ready"
        );

        Ok(Self {
            backend,
            page_size: header.page_size as usize,
            header,
            header_dirty,
            pool: HashMap::new(),
            max_frames: config.pool_size,
            max_pages: config.max_pages,
            access_counter: 0,
        })
    }

    /// Returns a reference to the file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Returns the page number of the table's root, or 0 when none exists yet.
    pub fn root_page(&self) -> PageNum {
        self.header.root_page
    }

    /// Record a new root page in the header.
    pub fn set_root_page(&mut self, root_page: PageNum) {
        if self.header.root_page != root_page {
            self.header.root_page = root_page;
            self.header_dirty = true;
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the total number of pages currently in the database.
    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    /// Upper bound on `page_count`, header page included.
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Number of frames currently cached.
    pub fn cached_pages(&self) -> usize {
        self.pool.len()
    }

    /// Read a page into the buffer pool and return a reference to its data.
    pub fn read_page(&mut self, page_num: PageNum) -> Result<&[u8]> {
        let frame = self.frame_mut(page_num)?;
        Ok(&frame.data)
    }

    /// Get a mutable reference to a page's data. Marks the page as dirty.
    pub fn write_page(&mut self, page_num: PageNum) -> Result<&mut [u8]> {
        let frame = self.frame_mut(page_num)?;
        frame.dirty = true;
        Ok(&mut frame.data)
    }

    /// Allocate a new zero-filled page at the end of the database.
    /// Page numbers are never reused.
    pub fn allocate_page(&mut self) -> Result<PageNum> {
        let page_num = self.header.page_count;
        if page_num >= self.max_pages {
            return Err(StorageError::StorageFull {
                max_pages: self.max_pages,
            });
        }

        self.maybe_evict()?;
        let frame = Frame {
            data: vec![0u8; self.page_size],
            dirty: true,
            last_access: self.next_access(),
        };
        self.pool.insert(page_num, frame);
        self.header.page_count += 1;
        self.header_dirty = true;

        debug!(page_num, "allocated page");
        Ok(page_num)
    }

    /// Flush the header and all dirty pages to the backend, then sync.
    pub fn flush_all(&mut self) -> Result<()> {
        if self.header_dirty {
            self.stage_header_page()?;
        }

        let mut dirty_pages: Vec<PageNum> = self
            .pool
            .iter()
            .filter(|(_, f)| f.dirty)
            .map(|(&pn, _)| pn)
            .collect();
        dirty_pages.sort_unstable();

        for &page_num in &dirty_pages {
            self.flush_page(page_num)?;
        }

        self.backend.sync()?;
        self.header_dirty = false;
        debug!(pages = dirty_pages.len(), "flushed dirty pages");
        Ok(())
    }

    /// Write a single cached page back to the backend.
    fn flush_page(&mut self, page_num: PageNum) -> Result<()> {
        let offset = page_num as u64 * self.page_size as u64;
        let frame = self
            .pool
            .get_mut(&page_num)
            .ok_or(StorageError::PageOutOfRange {
                page: page_num,
                page_count: self.header.page_count,
            })?;
        self.backend.write_at(offset, &frame.data)?;
        frame.dirty = false;
        Ok(())
    }

    /// Stage the in-memory header into page 0 and mark the page dirty.
    fn stage_header_page(&mut self) -> Result<()> {
        let header = self.header.clone();
        let frame = self.frame_mut(0)?;
        header.serialize(&mut frame.data);
        frame.dirty = true;
        Ok(())
    }

    /// Load (if needed) and touch a frame.
    fn frame_mut(&mut self, page_num: PageNum) -> Result<&mut Frame> {
        self.ensure_loaded(page_num)?;
        let ts = self.next_access();
        let page_count = self.header.page_count;
        let frame = self
            .pool
            .get_mut(&page_num)
            .ok_or(StorageError::PageOutOfRange {
                page: page_num,
                page_count,
            })?;
        frame.last_access = ts;
        Ok(frame)
    }

    /// Ensure a page is loaded into the buffer pool.
    fn ensure_loaded(&mut self, page_num: PageNum) -> Result<()> {
        if self.pool.contains_key(&page_num) {
            return Ok(());
        }

        if page_num >= self.header.page_count {
            return Err(StorageError::PageOutOfRange {
                page: page_num,
                page_count: self.header.page_count,
            });
        }

        self.maybe_evict()?;

        let mut data = vec![0u8; self.page_size];
        let offset = page_num as u64 * self.page_size as u64;
        self.backend.read_at(offset, &mut data)?;

        let frame = Frame {
            data,
            dirty: false,
            last_access: self.next_access(),
        };
        self.pool.insert(page_num, frame);
        Ok(())
    }

    /// Evict the least recently used page while the pool is at capacity.
    fn maybe_evict(&mut self) -> Result<()> {
        while self.pool.len() >= self.max_frames {
            let victim = self
                .pool
                .iter()
                .min_by_key(|(_, f)| f.last_access)
                .map(|(&pn, f)| (pn, f.dirty));

            let Some((page_num, dirty)) = victim else {
                break;
            };
            if dirty {
                if page_num == 0 && self.header_dirty {
                    self.stage_header_page()?;
                }
                self.flush_page(page_num)?;
            }
            self.pool.remove(&page_num);
        }
        Ok(())
    }

    /// Increment and return the access counter.
    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FaultyBackend;
    use crate::config::DEFAULT_PAGE_SIZE;
    use std::cell::Cell;
    use std::rc::Rc;

    fn small_pool(pool_size: usize) -> PagerConfig {
        PagerConfig {
            pool_size,
            ..PagerConfig::default()
        }
    }

    #[test]
    fn create_new_database() {
        let dir = tempfile::tempdir().unwrap();
        let pager = Pager::open(dir.path().join("create_new.db")).unwrap();
        assert_eq!(pager.page_count(), 1);
        assert_eq!(pager.page_size(), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(pager.root_page(), 0);
    }

    #[test]
    fn reopen_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.db");

        {
            let mut pager = Pager::open(&path).unwrap();
            let pg = pager.allocate_page().unwrap();
            pager.set_root_page(pg);
            pager.flush_all().unwrap();
        }

        let pager = Pager::open(&path).unwrap();
        assert_eq!(pager.page_count(), 2);
        assert_eq!(pager.root_page(), 1);
    }

    #[test]
    fn read_write_page() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let pg = pager.allocate_page().unwrap();
        assert_eq!(pg, 1);

        {
            let data = pager.write_page(pg).unwrap();
            data[0..5].copy_from_slice(b"hello");
        }

        let data = pager.read_page(pg).unwrap();
        assert_eq!(&data[0..5], b"hello");
    }

    #[test]
    fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");

        {
            let mut pager = Pager::open(&path).unwrap();
            let pg = pager.allocate_page().unwrap();
            let data = pager.write_page(pg).unwrap();
            data[0..6].copy_from_slice(b"world!");
            pager.flush_all().unwrap();
        }

        let mut pager = Pager::open(&path).unwrap();
        let data = pager.read_page(1).unwrap();
        assert_eq!(&data[0..6], b"world!");
    }

    #[test]
    fn allocate_multiple_pages() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let p1 = pager.allocate_page().unwrap();
        let p2 = pager.allocate_page().unwrap();
        let p3 = pager.allocate_page().unwrap();

        assert_eq!((p1, p2, p3), (1, 2, 3));
        assert_eq!(pager.page_count(), 4);
    }

    #[test]
    fn allocation_stops_at_max_pages() {
        let config = PagerConfig {
            max_pages: 3,
            ..PagerConfig::default()
        };
        let mut pager = Pager::in_memory(config).unwrap();
        pager.allocate_page().unwrap();
        pager.allocate_page().unwrap();

        let err = pager.allocate_page().unwrap_err();
        assert!(matches!(err, StorageError::StorageFull { max_pages: 3 }));
        assert_eq!(pager.page_count(), 3);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        assert!(matches!(
            pager.read_page(5),
            Err(StorageError::PageOutOfRange { page: 5, .. })
        ));
    }

    #[test]
    fn eviction_writes_back_dirty_pages() {
        let mut pager = Pager::in_memory(small_pool(3)).unwrap();
        let pages: Vec<PageNum> = (0..8).map(|_| pager.allocate_page().unwrap()).collect();

        for &pg in &pages {
            let data = pager.write_page(pg).unwrap();
            data[0..4].copy_from_slice(&pg.to_be_bytes());
        }
        assert!(pager.cached_pages() <= 3);

        for &pg in &pages {
            let data = pager.read_page(pg).unwrap();
            assert_eq!(&data[0..4], &pg.to_be_bytes());
        }
    }

    #[test]
    fn repeated_reads_see_same_bytes() {
        let mut pager = Pager::in_memory(PagerConfig::default()).unwrap();
        let pg = pager.allocate_page().unwrap();
        pager.write_page(pg).unwrap()[10] = 0xAB;
        assert_eq!(pager.read_page(pg).unwrap()[10], 0xAB);
        pager.write_page(pg).unwrap()[11] = 0xCD;
        let data = pager.read_page(pg).unwrap();
        assert_eq!((data[10], data[11]), (0xAB, 0xCD));
    }

    #[test]
    fn io_faults_surface_and_pager_recovers() {
        let fail = Rc::new(Cell::new(false));
        let backend = FaultyBackend::new(Rc::clone(&fail));
        let mut pager = Pager::with_backend(Box::new(backend), small_pool(2)).unwrap();
        let pages: Vec<PageNum> = (0..4).map(|_| pager.allocate_page().unwrap()).collect();
        for &pg in &pages {
            pager.write_page(pg).unwrap()[0..4].copy_from_slice(&pg.to_be_bytes());
        }

        // The first page was evicted; loading it must evict a dirty frame.
        fail.set(true);
        assert!(matches!(
            pager.read_page(pages[0]),
            Err(StorageError::Io(_))
        ));
        assert!(matches!(pager.flush_all(), Err(StorageError::Io(_))));
        assert!(pager.allocate_page().is_err());

        fail.set(false);
        pager.flush_all().unwrap();
        for &pg in &pages {
            assert_eq!(&pager.read_page(pg).unwrap()[0..4], &pg.to_be_bytes());
        }
        assert_eq!(pager.page_count(), 5);
    }

    #[test]
    fn reopen_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

        assert!(matches!(
            Pager::open(&path),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
