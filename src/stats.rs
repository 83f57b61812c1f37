//! Equi-width histograms and per-table statistics feeding selectivity
//! estimation for a cost-based planner. The planner itself is an
//! external collaborator; this module only builds and answers the
//! numbers it would consume.

use crate::cursor::DbIterator;
use crate::database;
use crate::error::OpResult;
use crate::fields::{FieldVal, Op};
use crate::transaction::TransactionId;
use crate::types::Type;

/// Default number of buckets for a freshly built histogram.
pub const DEFAULT_BUCKETS: usize = 100;
pub const DEFAULT_IO_COST_PER_PAGE: f64 = 1000.0;

/// Equi-width histogram over an `i32` domain.
#[derive(Debug, Clone)]
pub struct IntHistogram {
    buckets: Vec<usize>,
    min: i32,
    max: i32,
    width: i32,
    n: usize,
}

impl IntHistogram {
    pub fn new(buckets: usize, min: i32, max: i32) -> Self {
        assert!(buckets > 0, "a histogram needs at least one bucket");
        assert!(min <= max, "histogram domain must be non-empty");
        let range = max - min + 1;
        let width = (range / buckets as i32).max(1);
        IntHistogram {
            buckets: vec![0; buckets],
            min,
            max,
            width,
            n: 0,
        }
    }

    fn idx(&self, v: i32) -> usize {
        let i = (v - self.min) / self.width;
        i.clamp(0, self.buckets.len() as i32 - 1) as usize
    }

    fn bucket_width(&self, i: usize) -> i32 {
        if i < self.buckets.len() - 1 {
            self.width
        } else {
            (self.max - self.min + 1) - self.width * (self.buckets.len() as i32 - 1)
        }
    }

    fn right_edge(&self, i: usize) -> i32 {
        i as i32 * self.width + self.bucket_width(i)
    }

    pub fn add_value(&mut self, v: i32) {
        let idx = self.idx(v);
        self.buckets[idx] += 1;
        self.n += 1;
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// Estimated fraction of rows matching `field <op> v`, where `v` is
    /// the constant side of the comparison.
    pub fn estimate_selectivity(&self, op: Op, v: i32) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        match op {
            Op::Eq => {
                if v < self.min || v > self.max {
                    0.0
                } else {
                    let idx = self.idx(v);
                    self.buckets[idx] as f64 / self.bucket_width(idx) as f64 / self.n as f64
                }
            }
            Op::Gt => {
                if v < self.min {
                    1.0
                } else if v >= self.max {
                    0.0
                } else {
                    let idx = self.idx(v);
                    let above: usize = self.buckets[idx + 1..].iter().sum();
                    let partial =
                        self.buckets[idx] as f64 * (self.right_edge(idx) - v) as f64 / self.bucket_width(idx) as f64;
                    (above as f64 + partial) / self.n as f64
                }
            }
            Op::Lt => {
                if v > self.max {
                    1.0
                } else if v <= self.min {
                    0.0
                } else {
                    let idx = self.idx(v);
                    let below: usize = self.buckets[..idx].iter().sum();
                    let left_edge = idx as i32 * self.width + 1;
                    let partial = self.buckets[idx] as f64 * (v - left_edge) as f64 / self.bucket_width(idx) as f64;
                    (below as f64 + partial) / self.n as f64
                }
            }
            Op::Le => self.estimate_selectivity(Op::Lt, v + 1),
            Op::Ge => self.estimate_selectivity(Op::Gt, v - 1),
            Op::Neq => 1.0 - self.estimate_selectivity(Op::Eq, v),
            // Not defined for int domains.
            Op::Like => 0.0,
        }
    }
}

const HASH_PREFIX_LEN: usize = 3;
const HASH_BASE: i64 = 256;

/// Bounds a string to `[0, 256^HASH_PREFIX_LEN - 1]` by treating its
/// first `HASH_PREFIX_LEN` bytes as a base-256 number, then delegates to
/// an `IntHistogram` over that bounded domain.
#[derive(Debug, Clone)]
pub struct StringHistogram {
    inner: IntHistogram,
}

impl StringHistogram {
    pub fn new(buckets: usize) -> Self {
        StringHistogram {
            inner: IntHistogram::new(buckets, 0, Self::max_hash()),
        }
    }

    fn max_hash() -> i32 {
        (HASH_BASE.pow(HASH_PREFIX_LEN as u32) - 1) as i32
    }

    fn hash(s: &str) -> i32 {
        let bytes = s.as_bytes();
        let mut v: i64 = 0;
        for i in 0..HASH_PREFIX_LEN {
            let byte = *bytes.get(i).unwrap_or(&0) as i64;
            v += byte * HASH_BASE.pow((HASH_PREFIX_LEN - i - 1) as u32);
        }
        v as i32
    }

    pub fn add_value(&mut self, s: &str) {
        self.inner.add_value(Self::hash(s));
    }

    /// `LIKE` is meaningful only here, as `EQ`. `IntHistogram` leaves
    /// `LIKE` undefined and always evaluates it to `false`.
    pub fn estimate_selectivity(&self, op: Op, s: &str) -> f64 {
        let op = if op == Op::Like { Op::Eq } else { op };
        self.inner.estimate_selectivity(op, Self::hash(s))
    }
}

enum FieldHistogram {
    Int(IntHistogram),
    Str(StringHistogram),
}

/// Per-table statistics built by two full scans over the table via a
/// transient transaction.
pub struct TableStats {
    io_cost_per_page: f64,
    num_tuples: usize,
    num_pages: usize,
    histograms: Vec<FieldHistogram>,
}

impl TableStats {
    pub fn compute(table_id: usize, io_cost_per_page: f64) -> OpResult<Self> {
        let db = database::get_global_db();
        let table = db
            .get_catalog()
            .get_table_from_id(table_id)
            .expect("stats requested for a table not in the catalog");
        let td = table.get_tuple_desc().clone();
        let num_pages = table.num_pages();

        // Pass 1: per-int-field min/max and the tuple count.
        let mut mins: Vec<Option<i32>> = vec![None; td.get_num_fields()];
        let mut maxs: Vec<Option<i32>> = vec![None; td.get_num_fields()];
        let mut num_tuples = 0usize;
        {
            let tid = TransactionId::new();
            let mut iter = table.iterator(tid);
            iter.open()?;
            while let Some(t) = iter.next()? {
                num_tuples += 1;
                for (i, ty) in td.types().iter().enumerate() {
                    if *ty == Type::Int {
                        let v = t.get_field(i).unwrap().clone().into_int().unwrap().get_value();
                        mins[i] = Some(mins[i].map_or(v, |m| m.min(v)));
                        maxs[i] = Some(maxs[i].map_or(v, |m| m.max(v)));
                    }
                }
            }
            iter.close();
            db.get_buffer_pool().transaction_complete(tid, true);
        }

        // Pass 2: populate one histogram per field.
        let mut histograms: Vec<FieldHistogram> = td
            .types()
            .iter()
            .enumerate()
            .map(|(i, ty)| match ty {
                Type::Int => {
                    let min = mins[i].unwrap_or(0);
                    let max = maxs[i].unwrap_or(0);
                    FieldHistogram::Int(IntHistogram::new(DEFAULT_BUCKETS.min((max - min + 1).max(1) as usize), min, max))
                }
                Type::Str(_) => FieldHistogram::Str(StringHistogram::new(DEFAULT_BUCKETS)),
            })
            .collect();

        {
            let tid = TransactionId::new();
            let mut iter = table.iterator(tid);
            iter.open()?;
            while let Some(t) = iter.next()? {
                for (i, hist) in histograms.iter_mut().enumerate() {
                    match (hist, t.get_field(i).unwrap()) {
                        (FieldHistogram::Int(h), FieldVal::IntField(f)) => h.add_value(f.get_value()),
                        (FieldHistogram::Str(h), FieldVal::StringField(f)) => h.add_value(&f.get_value()),
                        _ => unreachable!("histogram kind tracks the field's type"),
                    }
                }
            }
            iter.close();
            db.get_buffer_pool().transaction_complete(tid, true);
        }

        Ok(TableStats {
            io_cost_per_page,
            num_tuples,
            num_pages,
            histograms,
        })
    }

    pub fn estimate_scan_cost(&self) -> f64 {
        self.num_pages as f64 * self.io_cost_per_page
    }

    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (self.num_tuples as f64 * selectivity).ceil() as usize
    }

    pub fn estimate_selectivity(&self, field: usize, op: Op, constant: &FieldVal) -> f64 {
        match (&self.histograms[field], constant) {
            (FieldHistogram::Int(h), FieldVal::IntField(c)) => h.estimate_selectivity(op, c.get_value()),
            (FieldHistogram::Str(h), FieldVal::StringField(c)) => h.estimate_selectivity(op, &c.get_value()),
            _ => 0.0,
        }
    }

    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_boundary_example() {
        let mut h = IntHistogram::new(10, 1, 10);
        for i in 1..=10 {
            h.add_value(i);
        }
        assert!((h.estimate_selectivity(Op::Eq, 5) - 0.1).abs() < 1e-9);
        assert!((h.estimate_selectivity(Op::Lt, 5) - 0.4).abs() < 1e-9);
        assert_eq!(h.estimate_selectivity(Op::Gt, 10), 0.0);
    }

    #[test]
    fn eq_and_neq_are_complementary() {
        let mut h = IntHistogram::new(5, 1, 20);
        for v in 1..=20 {
            h.add_value(v);
        }
        for v in 1..=20 {
            let eq = h.estimate_selectivity(Op::Eq, v);
            let neq = h.estimate_selectivity(Op::Neq, v);
            assert!((eq + neq - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn lt_eq_gt_partition_the_distribution() {
        let mut h = IntHistogram::new(4, 0, 99);
        for v in 0..100 {
            h.add_value(v);
        }
        for v in [10, 37, 63, 90] {
            let total =
                h.estimate_selectivity(Op::Lt, v) + h.estimate_selectivity(Op::Eq, v) + h.estimate_selectivity(Op::Gt, v);
            assert!((total - 1.0).abs() < 0.02, "v={} total={}", v, total);
        }
    }

    #[test]
    fn string_histogram_like_matches_eq() {
        let mut h = StringHistogram::new(50);
        h.add_value("alice");
        h.add_value("bob");
        h.add_value("alice");
        let like = h.estimate_selectivity(Op::Like, "alice");
        let eq = h.estimate_selectivity(Op::Eq, "alice");
        assert_eq!(like, eq);
        assert!(like > 0.0);
    }
}
