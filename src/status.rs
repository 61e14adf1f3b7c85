use std::sync::{Arc, Mutex};

/// Shared progress state the host application polls while a multi-market
/// simulation runs.
#[derive(Clone, Default)]
pub struct SimulationStatus {
    inner: Arc<Mutex<SimulationStatusData>>,
}

#[derive(Default)]
struct SimulationStatusData {
    phase: String,
    total_markets: usize,
    completed_markets: usize,
    failed_markets: usize,
    skipped_markets: usize,
}

#[derive(Clone, Debug)]
pub struct SimulationStatusSnapshot {
    pub phase: String,
    pub total_markets: usize,
    pub completed_markets: usize,
    pub failed_markets: usize,
    pub skipped_markets: usize,
}

impl SimulationStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulationStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    pub fn set_progress(
        &self,
        total_markets: usize,
        completed_markets: usize,
        failed_markets: usize,
        skipped_markets: usize,
    ) {
        if let Ok(mut data) = self.inner.lock() {
            data.total_markets = total_markets;
            data.completed_markets = completed_markets;
            data.failed_markets = failed_markets;
            data.skipped_markets = skipped_markets;
        }
    }

    pub fn snapshot(&self) -> SimulationStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            SimulationStatusSnapshot {
                phase: data.phase.clone(),
                total_markets: data.total_markets,
                completed_markets: data.completed_markets,
                failed_markets: data.failed_markets,
                skipped_markets: data.skipped_markets,
            }
        } else {
            SimulationStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_markets: 0,
                completed_markets: 0,
                failed_markets: 0,
                skipped_markets: 0,
            }
        }
    }
}
