use thiserror::Error;

use crate::heap_page::HeapPageId;

/// Reasons an operation on the storage core can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("tuple descriptor does not match the table's schema")]
    NotMatchingSchema,
    #[error("page is full")]
    PageFull,
    #[error("tuple not found on page")]
    TupleNotOnPage,
    #[error("page {0:?} is out of range")]
    PageOutOfRange(HeapPageId),
    #[error("all pages in the buffer pool are dirty")]
    AllPagesDirty,
}

/// Top-level error surface an operator sees: `TransactionAborted` is kept
/// distinct from `DbError`/`IoError` so a cursor can propagate it without
/// catching it.
#[derive(Error, Debug)]
pub enum OpError {
    #[error("transaction aborted (deadlock detected)")]
    TransactionAborted,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OpResult<T> = Result<T, OpError>;
