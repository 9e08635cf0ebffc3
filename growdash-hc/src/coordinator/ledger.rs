//! Plant record ledger for one session
//!
//! Duplicate-free by plant number. Removal deletes the record outright,
//! freeing the number for re-recording.

use crate::error::{HarvestError, HarvestResult};
use growdash_common::harvest::PlantRecord;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// Insertion order
    records: Vec<PlantRecord>,
    numbers: HashSet<u32>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<PlantRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            if ledger.numbers.insert(record.plant_number) {
                ledger.records.push(record);
            } else {
                tracing::warn!(
                    plant_number = record.plant_number,
                    "Dropping duplicate stored plant record"
                );
            }
        }
        ledger
    }

    pub fn contains(&self, plant_number: u32) -> bool {
        self.numbers.contains(&plant_number)
    }

    /// Records ordered by `recorded_at`, ties in insertion order
    pub fn ordered(&self) -> Vec<PlantRecord> {
        let mut records = self.records.clone();
        // sort_by_key is stable
        records.sort_by_key(|r| r.recorded_at);
        records
    }

    /// Insertion-order records, as stored
    pub fn records(&self) -> &[PlantRecord] {
        &self.records
    }

    pub fn insert(&mut self, record: PlantRecord) -> HarvestResult<()> {
        if !self.numbers.insert(record.plant_number) {
            return Err(HarvestError::DuplicatePlant {
                plant_number: record.plant_number,
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Delete a record; false when it was not there
    pub fn remove(&mut self, plant_number: u32) -> bool {
        if !self.numbers.remove(&plant_number) {
            return false;
        }
        self.records.retain(|r| r.plant_number != plant_number);
        true
    }

    /// Set or clear the error note without touching weight or identity
    pub fn annotate(&mut self, plant_number: u32, note: Option<String>) -> HarvestResult<()> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let record = self
            .records
            .iter_mut()
            .find(|r| r.plant_number == plant_number)
            .ok_or(HarvestError::PlantNotFound { plant_number })?;
        record.error_note = note;
        Ok(())
    }
}
