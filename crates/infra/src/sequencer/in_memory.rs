use std::collections::HashMap;
use std::sync::Mutex;

use forgeerp_core::TenantId;

use super::{format_number, Sequencer, SequencerError};

/// In-memory `Sequencer` for tests and single-process dev deployments.
#[derive(Default)]
pub struct InMemorySequencer {
    counters: Mutex<HashMap<(TenantId, String, i32), u64>>,
}

impl InMemorySequencer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sequencer for InMemorySequencer {
    fn next_number(&self, tenant_id: TenantId, year: i32, prefix: &str) -> Result<String, SequencerError> {
        let mut counters = self.counters.lock().expect("sequencer mutex poisoned");
        let key = (tenant_id, prefix.to_string(), year);
        let next = counters.entry(key).or_insert(0);
        *next += 1;
        Ok(format_number(prefix, year, *next))
    }
}
