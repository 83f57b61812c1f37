use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::database;
use crate::error::{DbError, OpError, OpResult};
use crate::heap_page::{HeapPage, HeapPageId, Permission};
use crate::page_lock::PageLock;
use crate::transaction::TransactionId;
use crate::tuple::Tuple;

/// Default capacity of the buffer pool, in frames.
pub const DEFAULT_PAGES: usize = 50;

struct Frame {
    page: Arc<RwLock<HeapPage>>,
    dirty_by: Option<TransactionId>,
    /// Snapshot taken at load and refreshed after each commit; restored
    /// verbatim on abort (NO STEAL means it's the only copy that ever
    /// needed writing back).
    before_image: HeapPage,
}

#[derive(Default)]
struct PoolState {
    frames: HashMap<HeapPageId, Frame>,
    /// Access order, MRU at the back.
    lru: VecDeque<HeapPageId>,
}

/// Fixed-capacity page cache doing page-granularity 2PL, wait-for-graph
/// deadlock detection, and FORCE-commit/UNDO-abort.
pub struct BufferPool {
    state: Mutex<PoolState>,
    page_locks: Mutex<HashMap<HeapPageId, Mutex<PageLock>>>,
    pages_held_by: Mutex<HashMap<TransactionId, HashSet<HeapPageId>>>,
    waits_for: Mutex<HashMap<TransactionId, HashSet<TransactionId>>>,
    max_frames: usize,
}

impl BufferPool {
    pub fn new(max_frames: usize) -> Self {
        BufferPool {
            state: Mutex::new(PoolState::default()),
            page_locks: Mutex::new(HashMap::new()),
            pages_held_by: Mutex::new(HashMap::new()),
            waits_for: Mutex::new(HashMap::new()),
            max_frames,
        }
    }

    pub fn get_num_pages(&self) -> usize {
        self.max_frames
    }

    /// Acquires `pid` under `perm` for `tid`, then fetches it (cache hit
    /// or disk read, possibly evicting). Retries until the lock is
    /// granted or a wait-for cycle including `tid` is detected, in which
    /// case the call fails with `TransactionAborted`.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: HeapPageId,
        perm: Permission,
    ) -> OpResult<Arc<RwLock<HeapPage>>> {
        loop {
            let granted = {
                let mut locks = self.page_locks.lock().unwrap();
                let entry = locks.entry(pid).or_insert_with(|| Mutex::new(PageLock::new()));
                entry.lock().unwrap().add_lock(perm, tid)
            };
            if granted {
                break;
            }

            let related = {
                let locks = self.page_locks.lock().unwrap();
                locks
                    .get(&pid)
                    .map(|entry| {
                        let mut r = entry.lock().unwrap().related_txs();
                        r.remove(&tid);
                        r
                    })
                    .unwrap_or_default()
            };
            self.waits_for.lock().unwrap().insert(tid, related);

            if self.waits_for_cycle_through(tid) {
                self.waits_for.lock().unwrap().remove(&tid);
                warn!("transaction {:?} aborted: deadlock on page {:?}", tid, pid);
                return Err(OpError::TransactionAborted);
            }

            std::thread::yield_now();
        }

        self.waits_for.lock().unwrap().remove(&tid);
        self.pages_held_by
            .lock()
            .unwrap()
            .entry(tid)
            .or_default()
            .insert(pid);

        self.fetch_into_cache(pid)
    }

    /// DFS over the wait-for graph starting at `start`; `true` iff a
    /// path leads back to `start`.
    fn waits_for_cycle_through(&self, start: TransactionId) -> bool {
        let graph = self.waits_for.lock().unwrap().clone();
        let mut visited = HashSet::new();
        let mut stack: Vec<TransactionId> = graph.get(&start).cloned().unwrap_or_default().into_iter().collect();
        while let Some(cur) = stack.pop() {
            if cur == start {
                return true;
            }
            if !visited.insert(cur) {
                continue;
            }
            if let Some(next) = graph.get(&cur) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    fn fetch_into_cache(&self, pid: HeapPageId) -> OpResult<Arc<RwLock<HeapPage>>> {
        let mut state = self.state.lock().unwrap();
        if let Some(frame) = state.frames.get(&pid) {
            let page_ref = Arc::clone(&frame.page);
            state.lru.retain(|&p| p != pid);
            state.lru.push_back(pid);
            return Ok(page_ref);
        }

        let table = database::get_global_db()
            .get_catalog()
            .get_table_from_id(pid.get_table_id())
            .expect("page request for a table not in the catalog");
        let page = table.read_page(&pid)?;
        debug!("buffer pool miss, loaded {:?} from disk", pid);

        if state.frames.len() >= self.max_frames {
            self.evict_one(&mut state)?;
        }

        let before_image = page.clone();
        let page_ref = Arc::new(RwLock::new(page));
        state.frames.insert(
            pid,
            Frame {
                page: Arc::clone(&page_ref),
                dirty_by: None,
                before_image,
            },
        );
        state.lru.push_back(pid);
        Ok(page_ref)
    }

    /// Evicts the least-recently-used *clean* page. Fails with
    /// `AllPagesDirty` if every cached page is dirty (NO STEAL forbids
    /// writing a dirty page back before commit).
    fn evict_one(&self, state: &mut PoolState) -> Result<(), DbError> {
        let victim = state
            .lru
            .iter()
            .find(|pid| {
                state
                    .frames
                    .get(pid)
                    .map(|f| f.dirty_by.is_none())
                    .unwrap_or(false)
            })
            .copied();
        match victim {
            Some(pid) => {
                state.frames.remove(&pid);
                state.lru.retain(|&p| p != pid);
                debug!("evicted clean page {:?}", pid);
                Ok(())
            }
            None => Err(DbError::AllPagesDirty),
        }
    }

    /// Records that `pid`'s cached frame was dirtied by `tid`. Called by
    /// `HeapFile` after mutating a page it fetched READ_WRITE.
    pub fn note_dirtied(&self, tid: TransactionId, pid: HeapPageId) {
        let mut state = self.state.lock().unwrap();
        if let Some(frame) = state.frames.get_mut(&pid) {
            frame.dirty_by = Some(tid);
        }
    }

    pub fn insert_tuple(&self, tid: TransactionId, table_id: usize, tuple: Tuple) -> OpResult<()> {
        let table = database::get_global_db()
            .get_catalog()
            .get_table_from_id(table_id)
            .expect("insert into a table not in the catalog");
        table.insert_tuple(tid, tuple)?;
        Ok(())
    }

    pub fn delete_tuple(&self, tid: TransactionId, tuple: Tuple) -> OpResult<()> {
        let rid = tuple.get_record_id().ok_or(DbError::TupleNotOnPage)?;
        let table_id = rid.get_page_id().get_table_id();
        let table = database::get_global_db()
            .get_catalog()
            .get_table_from_id(table_id)
            .expect("delete from a table not in the catalog");
        table.delete_tuple(tid, &tuple)?;
        Ok(())
    }

    /// Unsafe manual release used only by tests: drops `tid`'s hold on
    /// `pid` without the commit/abort bookkeeping.
    pub fn release_page(&self, tid: TransactionId, pid: HeapPageId) {
        if let Some(entry) = self.page_locks.lock().unwrap().get(&pid) {
            entry.lock().unwrap().release_lock(tid);
        }
        if let Some(set) = self.pages_held_by.lock().unwrap().get_mut(&tid) {
            set.remove(&pid);
        }
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: HeapPageId) -> bool {
        self.page_locks
            .lock()
            .unwrap()
            .get(&pid)
            .map(|entry| entry.lock().unwrap().is_holding(tid))
            .unwrap_or(false)
    }

    /// Finalizes `tid`: FORCE-writes its dirty pages on commit, restores
    /// before-images on abort, then releases every lock it holds.
    /// Idempotent: a transaction with no recorded pages is a no-op.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) {
        let pids: Vec<HeapPageId> = self
            .pages_held_by
            .lock()
            .unwrap()
            .get(&tid)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        {
            let mut state = self.state.lock().unwrap();
            for pid in &pids {
                let Some(frame) = state.frames.get_mut(pid) else {
                    continue;
                };
                if frame.dirty_by != Some(tid) {
                    continue;
                }
                if commit {
                    let snapshot = frame.page.read().unwrap().clone();
                    let table = database::get_global_db()
                        .get_catalog()
                        .get_table_from_id(pid.get_table_id())
                        .expect("committed page references a table not in the catalog");
                    table.write_page(&snapshot);
                    frame.page.write().unwrap().mark_dirty(None);
                    frame.before_image = snapshot;
                    debug!("committed {:?} by {:?}", pid, tid);
                } else {
                    let restored = frame.before_image.clone();
                    *frame.page.write().unwrap() = restored;
                    debug!("aborted {:?} by {:?}, restored before-image", pid, tid);
                }
                frame.dirty_by = None;
            }
        }

        {
            let locks = self.page_locks.lock().unwrap();
            for pid in &pids {
                if let Some(entry) = locks.get(pid) {
                    entry.lock().unwrap().release_lock(tid);
                }
            }
        }

        self.pages_held_by.lock().unwrap().remove(&tid);
        self.waits_for.lock().unwrap().remove(&tid);
    }

    /// Writes every dirty cached page to disk, regardless of which
    /// transaction owns it. Internal/administrative, not part of the
    /// per-transaction commit protocol.
    pub fn flush_all_pages(&self) {
        let mut state = self.state.lock().unwrap();
        let pids: Vec<HeapPageId> = state.frames.keys().copied().collect();
        for pid in pids {
            Self::flush_locked(&mut state, pid);
        }
    }

    pub fn flush_page(&self, pid: HeapPageId) {
        let mut state = self.state.lock().unwrap();
        Self::flush_locked(&mut state, pid);
    }

    fn flush_locked(state: &mut PoolState, pid: HeapPageId) {
        let Some(frame) = state.frames.get_mut(&pid) else {
            return;
        };
        if frame.dirty_by.is_none() {
            return;
        }
        let snapshot = frame.page.read().unwrap().clone();
        if let Some(table) = database::get_global_db().get_catalog().get_table_from_id(pid.get_table_id()) {
            table.write_page(&snapshot);
        }
        frame.page.write().unwrap().mark_dirty(None);
        frame.before_image = snapshot;
        frame.dirty_by = None;
    }

    /// Frees the frame for `pid` without writing it back.
    pub fn discard_page(&self, pid: HeapPageId) {
        let mut state = self.state.lock().unwrap();
        state.frames.remove(&pid);
        state.lru.retain(|&p| p != pid);
    }

    /// Whether `pid` currently occupies a frame. Test-only introspection
    /// for asserting on frame-table membership directly.
    #[cfg(test)]
    pub fn is_cached(&self, pid: HeapPageId) -> bool {
        self.state.lock().unwrap().frames.contains_key(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{self, Database};
    use crate::fields::{FieldVal, IntField};
    use crate::tuple::TupleDesc;
    use crate::types::Type;
    use serial_test::serial;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    /// Installs a fresh global database (own catalog, own buffer pool of
    /// `max_frames` capacity) with one single-int-column table, and
    /// returns its table id. Tests are `#[serial]` since they all share
    /// the one process-wide singleton.
    fn install_test_db(max_frames: usize) -> usize {
        install_test_db_with_pages(max_frames, 0)
    }

    /// Like `install_test_db`, but the file is pre-extended with
    /// `blank_pages` empty pages up front, for tests that need several
    /// distinct `HeapPageId`s without inserting enough tuples to force
    /// real page splits.
    fn install_test_db_with_pages(max_frames: usize, blank_pages: usize) -> usize {
        use std::io::{Seek, SeekFrom, Write};

        let _ = env_logger::try_init();
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        std::mem::forget(dir); // keep the tempdir alive for the test's duration
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        for _ in 0..blank_pages {
            file.seek(SeekFrom::End(0)).unwrap();
            file.write_all(&HeapPage::empty_page_data()).unwrap();
        }
        let td = TupleDesc::new(vec![Type::Int], vec!["a".into()]);
        let heap_file = crate::heap_file::HeapFile::new(file, &path, td);
        let table_id = heap_file.get_id();

        let db = Database::with_buffer_pool(BufferPool::new(max_frames));
        db.get_catalog().add_table(heap_file, "t".to_string());
        database::reset_global_db(db);
        table_id
    }

    #[test]
    #[serial]
    fn insert_commit_then_scan_sees_all_tuples() {
        let table_id = install_test_db(DEFAULT_PAGES);
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let table = db.get_catalog().get_table_from_id(table_id).unwrap();
        let td = table.get_tuple_desc().clone();

        let t1 = TransactionId::new();
        for v in [1, 2, 3] {
            bp.insert_tuple(t1, table_id, Tuple::new(vec![FieldVal::IntField(IntField::new(v))], &td))
                .unwrap();
        }
        bp.transaction_complete(t1, true);

        let t2 = TransactionId::new();
        use crate::cursor::DbIterator;
        let mut iter = table.iterator(t2);
        iter.open().unwrap();
        let mut values = vec![];
        while let Some(tuple) = iter.next().unwrap() {
            values.push(tuple.get_field(0).unwrap().clone().into_int().unwrap().get_value());
        }
        values.sort();
        assert_eq!(values, vec![1, 2, 3]);
        bp.transaction_complete(t2, true);
        assert_eq!(table.num_pages(), 1);
    }

    #[test]
    #[serial]
    fn abort_undoes_in_memory_writes() {
        let table_id = install_test_db(DEFAULT_PAGES);
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let table = db.get_catalog().get_table_from_id(table_id).unwrap();
        let td = table.get_tuple_desc().clone();

        let t1 = TransactionId::new();
        bp.insert_tuple(t1, table_id, Tuple::new(vec![FieldVal::IntField(IntField::new(42))], &td))
            .unwrap();
        bp.transaction_complete(t1, false);

        let t2 = TransactionId::new();
        use crate::cursor::DbIterator;
        let mut iter = table.iterator(t2);
        iter.open().unwrap();
        assert!(iter.next().unwrap().is_none());
        bp.transaction_complete(t2, true);
    }

    #[test]
    #[serial]
    fn read_then_write_upgrade_does_not_block() {
        let table_id = install_test_db(DEFAULT_PAGES);
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let pid = HeapPageId::new(table_id, 0);

        let table = db.get_catalog().get_table_from_id(table_id).unwrap();
        let td = table.get_tuple_desc().clone();
        let t1 = TransactionId::new();
        bp.insert_tuple(t1, table_id, Tuple::new(vec![FieldVal::IntField(IntField::new(1))], &td))
            .unwrap();
        bp.transaction_complete(t1, true);

        let t2 = TransactionId::new();
        bp.get_page(t2, pid, Permission::ReadOnly).unwrap();
        bp.get_page(t2, pid, Permission::ReadWrite).unwrap();
        assert!(bp.holds_lock(t2, pid));
        bp.transaction_complete(t2, true);
    }

    #[test]
    #[serial]
    fn all_pages_dirty_eviction_refuses() {
        let table_id = install_test_db_with_pages(2, 3);
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        let p0 = HeapPageId::new(table_id, 0);
        let p1 = HeapPageId::new(table_id, 1);
        let p2 = HeapPageId::new(table_id, 2);

        bp.get_page(t1, p0, Permission::ReadWrite).unwrap();
        bp.note_dirtied(t1, p0);
        bp.get_page(t2, p1, Permission::ReadWrite).unwrap();
        bp.note_dirtied(t2, p1);

        let t3 = TransactionId::new();
        let result = bp.get_page(t3, p2, Permission::ReadOnly);
        assert!(matches!(result, Err(OpError::Db(DbError::AllPagesDirty))));
    }

    #[test]
    #[serial]
    fn lru_evicts_least_recently_used_clean_page() {
        let table_id = install_test_db_with_pages(3, 5);
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let tid = TransactionId::new();

        let p0 = HeapPageId::new(table_id, 0);
        let p1 = HeapPageId::new(table_id, 1);
        let p2 = HeapPageId::new(table_id, 2);
        let p3 = HeapPageId::new(table_id, 3);
        let p4 = HeapPageId::new(table_id, 4);

        bp.get_page(tid, p0, Permission::ReadOnly).unwrap();
        bp.get_page(tid, p1, Permission::ReadOnly).unwrap();
        bp.get_page(tid, p2, Permission::ReadOnly).unwrap();
        bp.get_page(tid, p3, Permission::ReadOnly).unwrap();
        assert!(!bp.is_cached(p0), "p0 should have been evicted to make room for p3");
        assert!(bp.is_cached(p1));
        assert!(bp.is_cached(p2));
        assert!(bp.is_cached(p3));

        // touch p1 again, moving it to the front of the LRU queue.
        bp.get_page(tid, p1, Permission::ReadOnly).unwrap();
        bp.get_page(tid, p4, Permission::ReadOnly).unwrap();

        assert!(!bp.is_cached(p2), "p2 was least recently used once p1 was re-touched");
        assert!(bp.is_cached(p1));
        assert!(bp.is_cached(p3));
        assert!(bp.is_cached(p4));

        bp.transaction_complete(tid, true);
    }

    #[test]
    #[serial]
    fn two_transaction_cross_lock_aborts_one() {
        let table_id = install_test_db_with_pages(DEFAULT_PAGES, 2);
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();

        let p0 = HeapPageId::new(table_id, 0);
        let p1 = HeapPageId::new(table_id, 1);
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        bp.get_page(t1, p0, Permission::ReadWrite).unwrap();
        bp.get_page(t2, p1, Permission::ReadWrite).unwrap();

        let h1 = std::thread::spawn(move || database::get_global_db().get_buffer_pool().get_page(t1, p1, Permission::ReadWrite));
        std::thread::sleep(std::time::Duration::from_millis(50));
        let h2 = std::thread::spawn(move || database::get_global_db().get_buffer_pool().get_page(t2, p0, Permission::ReadWrite));

        let r2 = h2.join().unwrap();
        assert!(
            matches!(r2, Err(OpError::TransactionAborted)),
            "the later entrant into the cycle should detect it and abort"
        );
        // releases t2's hold on p1, letting t1's blocked attempt through.
        bp.transaction_complete(t2, false);

        let r1 = h1.join().unwrap();
        assert!(r1.is_ok());
        bp.transaction_complete(t1, false);
    }
}
