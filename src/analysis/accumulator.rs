//! Insertion-ordered accumulation of declaration records.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::parser::types::DeclarationRecord;

/// Bucket name used when records are not grouped.
pub const FLAT_GROUP: &str = "all";

/// Key by which scanned records are bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    /// One bucket per declaration kind.
    #[default]
    Kind,
    /// One bucket per owning module.
    Module,
    /// A single bucket holding every record in scan order.
    Flat,
}

impl GroupBy {
    /// Grouping key of `record` under this mode.
    pub fn key_for<'a>(&self, record: &'a DeclarationRecord) -> &'a str {
        match self {
            GroupBy::Kind => record.kind().as_str(),
            GroupBy::Module => record.module_name(),
            GroupBy::Flat => FLAT_GROUP,
        }
    }
}

impl std::str::FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kind" | "type" => Ok(GroupBy::Kind),
            "module" => Ok(GroupBy::Module),
            "flat" | "none" => Ok(GroupBy::Flat),
            _ => Err(format!(
                "Unknown grouping: '{}'. Valid groupings: kind, module, flat",
                s
            )),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Kind => write!(f, "kind"),
            GroupBy::Module => write!(f, "module"),
            GroupBy::Flat => write!(f, "flat"),
        }
    }
}

/// Records bucketed by grouping key.
///
/// Buckets appear in the order their key was first seen, and records keep
/// the order they were merged in, so iteration reflects scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    group_by: GroupBy,
    groups: IndexMap<String, Vec<DeclarationRecord>>,
}

impl Accumulator {
    pub fn new(group_by: GroupBy) -> Self {
        Self {
            group_by,
            groups: IndexMap::new(),
        }
    }

    pub fn group_by(&self) -> GroupBy {
        self.group_by
    }

    /// Append `records` to their buckets.
    pub fn merge(&mut self, records: impl IntoIterator<Item = DeclarationRecord>) {
        for record in records {
            let key = self.group_by.key_for(&record).to_string();
            self.groups.entry(key).or_default().push(record);
        }
    }

    /// Total number of records across all buckets.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, key: &str) -> Option<&[DeclarationRecord]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Buckets in first-seen order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[DeclarationRecord])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Every record, bucket by bucket.
    pub fn records(&self) -> impl Iterator<Item = &DeclarationRecord> {
        self.groups.values().flatten()
    }
}

impl Serialize for Accumulator {
    /// Grouped modes serialize as `key -> [records]`; flat mode as a plain
    /// array.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.group_by {
            GroupBy::Flat => {
                let mut seq = serializer.serialize_seq(Some(self.len()))?;
                for record in self.records() {
                    seq.serialize_element(record)?;
                }
                seq.end()
            }
            GroupBy::Kind | GroupBy::Module => self.groups.serialize(serializer),
        }
    }
}
