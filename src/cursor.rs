//! The operator contract surface: the interface this core exposes to
//! query operators, not the operators themselves. Sequential scan,
//! filter, hash-equijoin, aggregate, insert and delete are external
//! collaborators that would consume this trait; they are out of scope
//! for this crate.

use crate::error::OpResult;
use crate::tuple::{Tuple, TupleDesc};

/// `open`-before-iterate, `close`-after cursor discipline. `next` may
/// return `OpError::TransactionAborted`, which callers must propagate
/// rather than swallow.
pub trait DbIterator {
    fn open(&mut self) -> OpResult<()>;
    fn has_next(&mut self) -> OpResult<bool>;
    fn next(&mut self) -> OpResult<Option<Tuple>>;
    fn rewind(&mut self) -> OpResult<()>;
    fn close(&mut self);
    fn get_tuple_desc(&self) -> &TupleDesc;
}
