//! Records and chains
//!
//! A `Record` is one `(category, message)` pair. A `Chain` is an ordered
//! sequence of records that travels the pipeline as a single unit: one
//! wire frame, one spool write, one processor hand-off.
//!
//! Chains are built for cheap batching: appending one chain to another is
//! O(1) amortised, and the two split operations (`split_off_over_budget`,
//! `split_off_category_change`) detach an owned suffix without copying
//! record payloads.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::codec::varint_len;

/// A single log record: an opaque category tag and an opaque message
///
/// Both fields are arbitrary byte strings. The category is used for
/// routing; the message is never inspected by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Routing tag, typically short and printable
    pub category: Bytes,

    /// Opaque payload
    pub message: Bytes,
}

impl Record {
    /// Create a record from anything convertible to `Bytes`
    pub fn new(category: impl Into<Bytes>, message: impl Into<Bytes>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Size of this record in the wire/spool encoding
    #[inline]
    pub fn encoded_len(&self) -> usize {
        varint_len(self.category.len() as u64)
            + varint_len(self.message.len() as u64)
            + self.category.len()
            + self.message.len()
    }
}

/// An ordered sequence of records forming one transmission unit
///
/// Ownership of a chain transfers into whatever processor is currently
/// draining it; a chain handed to a processor is never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    records: VecDeque<Record>,
}

impl Chain {
    /// Create an empty chain
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chain holding a single record
    pub fn single(record: Record) -> Self {
        let mut records = VecDeque::with_capacity(1);
        records.push_back(record);
        Self { records }
    }

    /// Number of records in the chain
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the chain holds no records
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record to the tail
    #[inline]
    pub fn push(&mut self, record: Record) {
        self.records.push_back(record);
    }

    /// Concatenate another chain onto this one's tail
    ///
    /// The other chain is drained and left empty.
    #[inline]
    pub fn append(&mut self, other: &mut Chain) {
        self.records.append(&mut other.records);
    }

    /// Concatenate another chain ahead of this one's head
    ///
    /// Used to re-queue a detached batch after a failed send while
    /// preserving order relative to records that arrived in the meantime.
    pub fn prepend(&mut self, mut other: Chain) {
        other.records.append(&mut self.records);
        self.records = other.records;
    }

    /// The first record, if any
    #[inline]
    pub fn front(&self) -> Option<&Record> {
        self.records.front()
    }

    /// Remove and return the first record
    #[inline]
    pub fn pop_front(&mut self) -> Option<Record> {
        self.records.pop_front()
    }

    /// Iterate the records in order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Total encoded size of all records
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(Record::encoded_len).sum()
    }

    /// Detach and return the suffix starting at `index`
    ///
    /// The chain keeps records `[0, index)`. An index at or past the end
    /// returns an empty chain.
    pub fn split_off_at(&mut self, index: usize) -> Chain {
        if index >= self.records.len() {
            return Chain::new();
        }
        Chain {
            records: self.records.split_off(index),
        }
    }

    /// Split so that this chain's encoded size fits within `byte_budget`
    ///
    /// Walks the records summing encoded sizes; at the first record whose
    /// inclusion would exceed the budget the remainder is detached and
    /// returned. The first record is always kept even when it alone
    /// exceeds the budget, so progress is guaranteed.
    pub fn split_off_over_budget(&mut self, byte_budget: usize) -> Chain {
        let mut total = 0usize;
        let mut split_at = None;
        for (index, record) in self.records.iter().enumerate() {
            total = total.saturating_add(record.encoded_len());
            if total > byte_budget && index > 0 {
                split_at = Some(index);
                break;
            }
        }
        match split_at {
            Some(index) => self.split_off_at(index),
            None => Chain::new(),
        }
    }

    /// Split at the first change of category
    ///
    /// Detaches and returns the suffix starting at the first record whose
    /// category differs from the head's. The remaining prefix is known to
    /// be single-category; downstream formatting relies on that and does
    /// not re-check per record.
    pub fn split_off_category_change(&mut self) -> Chain {
        let Some(head) = self.records.front() else {
            return Chain::new();
        };
        let head_category = head.category.clone();
        let split_at = self
            .records
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, record)| record.category != head_category)
            .map(|(index, _)| index);
        match split_at {
            Some(index) => self.split_off_at(index),
            None => Chain::new(),
        }
    }
}

impl From<Record> for Chain {
    fn from(record: Record) -> Self {
        Chain::single(record)
    }
}

impl FromIterator<Record> for Chain {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Chain {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Chain {
    type Item = Record;
    type IntoIter = std::collections::vec_deque::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
