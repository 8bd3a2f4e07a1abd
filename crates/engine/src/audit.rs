//! Audit trail of committed invocations

use chrono::{DateTime, Utc};
use pop_transaction::DeltaEntry;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The delta log of one committed invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Transaction id of the invocation
    pub txn_id: u64,
    /// Process that ran
    pub process: String,
    /// Commit time
    pub committed_at: DateTime<Utc>,
    /// Mutations, in the order they were made
    pub entries: Vec<DeltaEntry>,
}

/// Append-only record list, optionally bounded to the most recent N
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    records: VecDeque<AuditRecord>,
    capacity: Option<usize>,
}

impl AuditLog {
    /// Create a log; `capacity` of `None` keeps everything
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    /// Append a record, evicting the oldest when over capacity
    pub fn push(&mut self, record: AuditRecord) {
        if self.capacity == Some(0) {
            return;
        }
        self.records.push_back(record);
        if let Some(cap) = self.capacity {
            while self.records.len() > cap {
                self.records.pop_front();
            }
        }
    }

    /// Records, oldest first
    pub fn records(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter()
    }

    /// Most recent record
    pub fn last(&self) -> Option<&AuditRecord> {
        self.records.back()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no record is retained
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize the retained records as a JSON array
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(txn_id: u64) -> AuditRecord {
        AuditRecord {
            txn_id,
            process: "p_total".to_string(),
            committed_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut log = AuditLog::new(None);
        for id in 1..=5 {
            log.push(record(id));
        }
        assert_eq!(log.len(), 5);
        assert_eq!(log.last().unwrap().txn_id, 5);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = AuditLog::new(Some(2));
        for id in 1..=4 {
            log.push(record(id));
        }
        let ids: Vec<u64> = log.records().map(|r| r.txn_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = AuditLog::new(Some(0));
        log.push(record(1));
        assert!(log.is_empty());
    }

    #[test]
    fn test_json_export() {
        let mut log = AuditLog::new(None);
        log.push(record(7));
        let json: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["txn_id"], 7);
        assert_eq!(json[0]["process"], "p_total");
        assert!(json[0]["committed_at"].is_string());
    }
}
