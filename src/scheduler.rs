use crate::candles::{CandleSource, MarketDataSource};
use crate::models::Trade;
use crate::policy::{PolicyError, SimulationOptions};
use crate::runner::SimulationRunner;
use crate::status::SimulationStatus;
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// One market's simulation work: the market plus its seed orders. Each item
/// is owned exclusively by the worker that claims it.
#[derive(Debug, Clone)]
pub struct MarketWorkItem {
    pub market: String,
    pub orders: Vec<Trade>,
}

/// Cooperative cancellation shared between the caller and the workers.
/// Workers poll it before claiming each work item: in-flight items run to
/// completion, queued ones are skipped.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

enum MarketOutcome {
    Completed(Vec<Trade>),
    Failed(String),
    Skipped,
}

struct MarketTaskResult {
    market: String,
    outcome: MarketOutcome,
}

/// Fans per-market simulation runs out over a bounded pool of worker
/// threads and merges the results into one flat trade list. Cross-market
/// ordering of the merged list is unspecified.
pub struct MarketScheduler {
    candles: Arc<dyn CandleSource>,
    markets: Arc<dyn MarketDataSource>,
    workers: usize,
}

impl MarketScheduler {
    pub fn new(candles: Arc<dyn CandleSource>, markets: Arc<dyn MarketDataSource>) -> Self {
        Self {
            candles,
            markets,
            workers: default_worker_count(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Runs every work item, bounded by the configured worker count.
    /// Configuration problems fail fast; a single market's failure is
    /// logged and surfaces as that market's empty contribution.
    pub fn simulate_markets(
        &self,
        options: &SimulationOptions,
        items: Vec<MarketWorkItem>,
        status: &SimulationStatus,
        cancel: &CancellationToken,
    ) -> Result<Vec<Trade>> {
        if self.workers == 0 {
            return Err(PolicyError::ZeroWorkers.into());
        }
        options.validate()?;

        let total = items.len();
        if total == 0 {
            status.set_phase("No markets to simulate");
            return Ok(Vec::new());
        }

        status.set_phase(format!("Simulating {} markets", total));
        status.set_progress(total, 0, 0, 0);

        let worker_count = self.workers.min(total);
        let (task_tx, task_rx): (Sender<MarketWorkItem>, Receiver<MarketWorkItem>) =
            bounded(total);
        let (result_tx, result_rx): (Sender<MarketTaskResult>, Receiver<MarketTaskResult>) =
            bounded(total);

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            let runner = SimulationRunner::new(self.candles.clone(), self.markets.clone());
            let options = *options;

            let handle = thread::spawn(move || {
                while let Ok(item) = task_rx.recv() {
                    let MarketWorkItem { market, orders } = item;
                    let outcome = if cancel.is_cancelled() {
                        MarketOutcome::Skipped
                    } else {
                        info!(
                            "Running simulation for {} and {} trades",
                            market,
                            orders.len()
                        );
                        match runner.run(&options, &market, &orders) {
                            Ok(trades) => MarketOutcome::Completed(trades),
                            Err(error) => MarketOutcome::Failed(error.to_string()),
                        }
                    };
                    if result_tx.send(MarketTaskResult { market, outcome }).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }
        drop(result_tx);

        for item in items {
            task_tx.send(item)?;
        }
        drop(task_tx);

        let mut merged: Vec<Trade> = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        for _ in 0..total {
            let Ok(message) = result_rx.recv() else {
                break;
            };
            match message.outcome {
                MarketOutcome::Completed(trades) => {
                    completed += 1;
                    info!(
                        "Completed {}/{} markets (last: {})",
                        completed, total, message.market
                    );
                    merged.extend(trades);
                }
                MarketOutcome::Failed(error) => {
                    failed += 1;
                    warn!("Simulation failed for {}: {}", message.market, error);
                }
                MarketOutcome::Skipped => {
                    skipped += 1;
                }
            }
            status.set_progress(total, completed, failed, skipped);
        }

        for handle in handles {
            let _ = handle.join();
        }

        if failed > 0 {
            status.set_phase(format!(
                "Completed {}/{} markets with {} failures",
                completed, total, failed
            ));
        } else if skipped > 0 {
            status.set_phase(format!(
                "Cancelled after {}/{} markets ({} skipped)",
                completed, total, skipped
            ));
        } else {
            status.set_phase("Simulation completed");
        }

        Ok(merged)
    }
}

/// The reference usage runs two to three concurrent market replays.
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 3)
}
