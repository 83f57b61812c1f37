use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::cursor::DbIterator;
use crate::database;
use crate::error::{DbError, OpResult};
use crate::heap_page::{HeapPage, HeapPageId, Permission};
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::types::page_size;

/// A heap file: an unordered, contiguous sequence of `HeapPage`s backing
/// one table. `tableId = stableHash(absolutePath)`.
pub struct HeapFile {
    file: Mutex<File>,
    td: TupleDesc,
    id: usize,
}

/// Deterministic table id from the file's absolute path, so the same
/// table always gets the same id across process restarts.
fn stable_hash_path(path: &Path) -> usize {
    let absolute = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    absolute.hash(&mut hasher);
    hasher.finish() as usize
}

impl HeapFile {
    pub fn new(file: File, path: &Path, td: TupleDesc) -> Self {
        HeapFile {
            file: Mutex::new(file),
            td,
            id: stable_hash_path(path),
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    /// `numPages = length / PAGE_SIZE`; the file is kept an exact
    /// multiple of the page size.
    pub fn num_pages(&self) -> usize {
        let file = self.file.lock().unwrap();
        (file.metadata().unwrap().len() as usize) / page_size()
    }

    /// Reads page `pid` from disk. Fails with `PageOutOfRange` if the
    /// page number is at or beyond EOF instead of silently extending the
    /// file.
    pub fn read_page(&self, pid: &HeapPageId) -> Result<HeapPage, DbError> {
        let page_no = pid.get_page_number();
        if page_no >= self.num_pages() {
            return Err(DbError::PageOutOfRange(*pid));
        }
        let mut data = vec![0; page_size()];
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((page_no * page_size()) as u64))
            .unwrap();
        file.read_exact(&mut data).unwrap();
        drop(file);
        HeapPage::new(*pid, &data, self.td.clone())
    }

    pub fn write_page(&self, page: &HeapPage) {
        let pid = page.get_id();
        let data = page.serialize();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(
            (pid.get_page_number() * page_size()) as u64,
        ))
        .unwrap();
        file.write_all(&data).unwrap();
    }

    /// Appends a blank page at the current end of file, growing
    /// `num_pages()` by one.
    fn append_blank_page(&self) -> usize {
        let mut file = self.file.lock().unwrap();
        let page_no = (file.metadata().unwrap().len() as usize) / page_size();
        file.seek(SeekFrom::Start((page_no * page_size()) as u64))
            .unwrap();
        file.write_all(&HeapPage::empty_page_data()).unwrap();
        page_no
    }

    /// Scans pages acquiring each READ_WRITE through the buffer pool;
    /// the first page whose `insert_tuple` doesn't raise `PageFull` is
    /// dirtied and its id returned. If every page rejects, a fresh blank
    /// page is appended and the insert retried on it.
    pub fn insert_tuple(&self, tid: TransactionId, tuple: Tuple) -> OpResult<HeapPageId> {
        let table_id = self.get_id();
        let bp = database::get_global_db().get_buffer_pool();

        for page_no in 0..self.num_pages() {
            let pid = HeapPageId::new(table_id, page_no);
            let page_ref = bp.get_page(tid, pid, Permission::ReadWrite)?;
            let mut page = page_ref.write().unwrap();
            match page.insert_tuple(tuple.clone()) {
                Ok(()) => {
                    page.mark_dirty(Some(tid));
                    drop(page);
                    bp.note_dirtied(tid, pid);
                    return Ok(pid);
                }
                Err(DbError::PageFull) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let page_no = self.append_blank_page();
        let pid = HeapPageId::new(table_id, page_no);
        let page_ref = bp.get_page(tid, pid, Permission::ReadWrite)?;
        let mut page = page_ref.write().unwrap();
        page.insert_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        drop(page);
        bp.note_dirtied(tid, pid);
        Ok(pid)
    }

    /// Reads the page containing `t.recordId` READ_WRITE and deletes it
    /// there.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> OpResult<HeapPageId> {
        let rid = tuple.get_record_id().ok_or(DbError::TupleNotOnPage)?;
        let pid = rid.get_page_id();
        let bp = database::get_global_db().get_buffer_pool();
        let page_ref = bp.get_page(tid, pid, Permission::ReadWrite)?;
        let mut page = page_ref.write().unwrap();
        page.delete_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        drop(page);
        bp.note_dirtied(tid, pid);
        Ok(pid)
    }

    pub fn iterator(&self, tid: TransactionId) -> HeapFileIter<'_> {
        HeapFileIter::new(self, tid)
    }
}

/// Walks all tuples of a `HeapFile` page by page, fetching each page via
/// the buffer pool under READ_ONLY. `rewind == open`.
pub struct HeapFileIter<'a> {
    file: &'a HeapFile,
    tid: TransactionId,
    page_no: usize,
    buf: Vec<Tuple>,
    buf_idx: usize,
    opened: bool,
}

impl<'a> HeapFileIter<'a> {
    fn new(file: &'a HeapFile, tid: TransactionId) -> Self {
        HeapFileIter {
            file,
            tid,
            page_no: 0,
            buf: Vec::new(),
            buf_idx: 0,
            opened: false,
        }
    }

    /// Loads the next page's tuples into the buffer, skipping empty
    /// pages, until a non-empty page is found or pages are exhausted.
    fn advance_to_next_nonempty_page(&mut self) -> OpResult<()> {
        let table_id = self.file.get_id();
        let bp = database::get_global_db().get_buffer_pool();
        loop {
            if self.page_no >= self.file.num_pages() {
                self.buf.clear();
                self.buf_idx = 0;
                return Ok(());
            }
            let pid = HeapPageId::new(table_id, self.page_no);
            self.page_no += 1;
            let page_ref = bp.get_page(self.tid, pid, Permission::ReadOnly)?;
            let page = page_ref.read().unwrap();
            let tuples: Vec<Tuple> = page.iter().cloned().collect();
            if !tuples.is_empty() {
                self.buf = tuples;
                self.buf_idx = 0;
                return Ok(());
            }
        }
    }
}

impl<'a> DbIterator for HeapFileIter<'a> {
    fn open(&mut self) -> OpResult<()> {
        self.page_no = 0;
        self.buf.clear();
        self.buf_idx = 0;
        self.opened = true;
        self.advance_to_next_nonempty_page()
    }

    fn has_next(&mut self) -> OpResult<bool> {
        if !self.opened {
            return Ok(false);
        }
        if self.buf_idx >= self.buf.len() {
            self.advance_to_next_nonempty_page()?;
        }
        Ok(self.buf_idx < self.buf.len())
    }

    fn next(&mut self) -> OpResult<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        let t = self.buf[self.buf_idx].clone();
        self.buf_idx += 1;
        Ok(Some(t))
    }

    fn rewind(&mut self) -> OpResult<()> {
        self.open()
    }

    fn close(&mut self) {
        self.opened = false;
        self.buf.clear();
    }

    fn get_tuple_desc(&self) -> &TupleDesc {
        self.file.get_tuple_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic() {
        let p = Path::new("/tmp/does/not/need/to/exist.dat");
        assert_eq!(stable_hash_path(p), stable_hash_path(p));
    }
}
