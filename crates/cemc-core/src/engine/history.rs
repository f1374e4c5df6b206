use super::change::SymbolChange;
use super::error::EngineError;

/// Default number of pending change records: one paired swap.
pub const DEFAULT_HISTORY_CAPACITY: usize = 2;

/// A change that has been applied but not yet committed, together with the
/// correlation function values it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub change: SymbolChange,
    pub previous_cf: Vec<f64>,
}

/// Bounded stack of pending changes.
#[derive(Debug, Clone, PartialEq)]
pub struct CfHistory {
    records: Vec<ChangeRecord>,
    capacity: usize,
}

impl Default for CfHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CfHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, change: SymbolChange, previous_cf: Vec<f64>) -> Result<(), EngineError> {
        if self.records.len() >= self.capacity {
            return Err(EngineError::Logic(format!(
                "Change history is full ({} pending changes); commit or undo before proposing more",
                self.capacity
            )));
        }
        self.records.push(ChangeRecord {
            change,
            previous_cf,
        });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<ChangeRecord> {
        self.records.pop()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.records.len()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }
}
