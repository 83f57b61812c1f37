use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::buffer_pool::{BufferPool, DEFAULT_PAGES};
use crate::catalog::Catalog;

lazy_static! {
    static ref GLOBAL_DB: RwLock<Arc<Database>> = RwLock::new(Arc::new(Database::new()));
}

/// Retrieves a reference to the global database instance.
pub fn get_global_db() -> Arc<Database> {
    Arc::clone(&GLOBAL_DB.read().unwrap())
}

/// Swaps in a fresh `Database`. Production code never calls this; tests
/// use it to get an isolated catalog and buffer pool instead of sharing
/// the one process-wide instance.
#[doc(hidden)]
pub fn reset_global_db(db: Database) {
    *GLOBAL_DB.write().unwrap() = Arc::new(db);
}

/// Slot for a future write-ahead/redo log. Recovery isn't implemented
/// here, so nothing reads or writes through it yet; it exists so a
/// recovery layer wouldn't need to reshape the singleton to land.
pub struct LogFile;

pub struct Database {
    buffer_pool: BufferPool,
    catalog: Catalog,
    #[allow(dead_code)]
    log_file: LogFile,
}

impl Database {
    pub fn new() -> Self {
        Database {
            buffer_pool: BufferPool::new(DEFAULT_PAGES),
            catalog: Catalog::new(),
            log_file: LogFile,
        }
    }

    pub fn with_buffer_pool(buffer_pool: BufferPool) -> Self {
        Database {
            buffer_pool,
            catalog: Catalog::new(),
            log_file: LogFile,
        }
    }

    pub fn get_buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn get_catalog(&self) -> &Catalog {
        &self.catalog
    }
}
