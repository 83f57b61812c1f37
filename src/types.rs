use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::DbError;
use crate::fields::{FieldVal, IntField, StringField};

/// Default page size in bytes. Overridable in tests via `set_page_size`,
/// since some tests need a process-wide, test-settable constant rather
/// than a bare `const`.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(4096);

pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// Test-only hook; never called from non-test code.
pub fn set_page_size(size: usize) {
    PAGE_SIZE.store(size, Ordering::Relaxed);
}

/// Only INT and STRING(n) are supported.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Type {
    Int,
    /// Fixed-capacity string; `n` is the maximum byte length stored.
    Str(usize),
}

impl Type {
    /// `size(INT) = 4`, `size(STRING(n)) = 4 + n`.
    pub fn get_len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Str(n) => 4 + n,
        }
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<FieldVal, DbError> {
        match self {
            Type::Int => {
                let mut int_bytes = [0; 4];
                int_bytes.copy_from_slice(&bytes[..4]);
                Ok(FieldVal::IntField(IntField::new(i32::from_be_bytes(int_bytes))))
            }
            Type::Str(n) => {
                let mut len_bytes = [0; 4];
                len_bytes.copy_from_slice(&bytes[..4]);
                let len = u32::from_be_bytes(len_bytes) as usize;
                let len = len.min(*n);
                let string_bytes = bytes[4..4 + len].to_vec();
                let value = String::from_utf8_lossy(&string_bytes).into_owned();
                Ok(FieldVal::StringField(StringField::new(value, *n)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_size_is_four() {
        assert_eq!(Type::Int.get_len(), 4);
    }

    #[test]
    fn string_size_is_four_plus_capacity() {
        assert_eq!(Type::Str(10).get_len(), 14);
    }
}
