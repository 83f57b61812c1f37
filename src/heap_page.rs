use crate::error::DbError;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::types::page_size;

/// Read/write intent a caller requests a page under.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// (tableId, pageNumber) identity of a page.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Copy)]
pub struct HeapPageId {
    table_id: usize,
    page_number: usize,
}

impl HeapPageId {
    pub fn new(table_id: usize, page_number: usize) -> Self {
        HeapPageId {
            table_id,
            page_number,
        }
    }

    pub fn get_table_id(&self) -> usize {
        self.table_id
    }

    pub fn get_page_number(&self) -> usize {
        self.page_number
    }

    pub fn serialize(&self) -> [usize; 2] {
        [self.table_id, self.page_number]
    }
}

/// A fixed-size page: a tuple-occupancy bitmap header followed by
/// slotted tuples. `numSlots = floor((PAGE_SIZE*8) / (tupleSize*8 + 1))`.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: HeapPageId,
    td: TupleDesc,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    num_slots: usize,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Builds a page from exactly `page_size()` bytes of on-disk data.
    pub fn new(pid: HeapPageId, data: &[u8], td: TupleDesc) -> Result<Self, DbError> {
        debug_assert_eq!(data.len(), page_size());
        let tuple_size = td.get_size();
        let num_slots = (page_size() * 8) / (tuple_size * 8 + 1);
        let header_size = (num_slots + 7) / 8;
        let header = data[..header_size].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for i in 0..num_slots {
            if Self::get_slot(&header, i) {
                let start = header_size + i * tuple_size;
                let end = start + tuple_size;
                let tuple_data = &data[start..end];
                let mut t = Tuple::deserialize(tuple_data, &td)?;
                t.set_record_id(crate::tuple::RecordId::new(pid, i));
                tuples.push(Some(t));
            } else {
                tuples.push(None);
            }
        }

        Ok(HeapPage {
            pid,
            td,
            header,
            tuples,
            num_slots,
            dirtied_by: None,
        })
    }

    /// A blank page of exactly `page_size()` zero bytes.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0; page_size()]
    }

    pub fn get_id(&self) -> HeapPageId {
        self.pid
    }

    pub fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    /// Bit-exact with the constructor: header bitmap then slots, unused
    /// slot bytes zero-filled.
    pub fn serialize(&self) -> Vec<u8> {
        let tuple_size = self.td.get_size();
        let mut data = self.header.clone();
        for i in 0..self.num_slots {
            match &self.tuples[i] {
                Some(t) => data.extend(t.serialize()),
                None => data.extend(vec![0; tuple_size]),
            }
        }
        data.extend(vec![0; page_size() - data.len()]);
        data
    }

    fn get_slot(header: &[u8], i: usize) -> bool {
        let idx = i / 8;
        let bit = i % 8;
        if idx >= header.len() {
            return false;
        }
        header[idx] & (1 << bit) != 0
    }

    fn set_slot(header: &mut [u8], i: usize, value: bool) {
        let idx = i / 8;
        let bit = i % 8;
        if value {
            header[idx] |= 1 << bit;
        } else {
            header[idx] &= !(1 << bit);
        }
    }

    /// Finds the lowest unused slot and writes `t` into it, assigning its
    /// `recordId`. Fails with `NotMatchingSchema` if `t`'s schema doesn't
    /// match the file's, or `PageFull` if no slot is free.
    pub fn insert_tuple(&mut self, mut t: Tuple) -> Result<(), DbError> {
        if t.get_tuple_desc() != &self.td {
            return Err(DbError::NotMatchingSchema);
        }
        for i in 0..self.num_slots {
            if !Self::get_slot(&self.header, i) {
                t.set_record_id(crate::tuple::RecordId::new(self.pid, i));
                self.tuples[i] = Some(t);
                Self::set_slot(&mut self.header, i, true);
                return Ok(());
            }
        }
        Err(DbError::PageFull)
    }

    /// Clears the slot `t.recordId` points at. Requires the tuple to
    /// actually be on this page and its slot to be occupied.
    pub fn delete_tuple(&mut self, t: &Tuple) -> Result<(), DbError> {
        let rid = t.get_record_id().ok_or(DbError::TupleNotOnPage)?;
        if rid.get_page_id() != self.pid {
            return Err(DbError::TupleNotOnPage);
        }
        let slot = rid.get_tuple_no();
        if slot >= self.num_slots || !Self::get_slot(&self.header, slot) {
            return Err(DbError::TupleNotOnPage);
        }
        self.tuples[slot] = None;
        Self::set_slot(&mut self.header, slot, false);
        Ok(())
    }

    pub fn get_num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|&i| !Self::get_slot(&self.header, i))
            .count()
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(|t| t.as_ref())
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }
}
