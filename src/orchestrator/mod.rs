//! Volume Orchestrator
//!
//! Single-owner campaign loop:
//! - Rotates the wallet queue, one wallet per cycle
//! - Re-reads settings every cycle
//! - Accumulates volume from successful cycles only
//! - Absorbs cycle failures and keeps the wallet in rotation
//! - Stops on reaching the target or on cancellation

pub mod cycle;
pub mod state_machine;

pub use cycle::{CycleDecision, CycleExecutor, CycleResult, SwapCycle};
pub use state_machine::{CampaignState, CampaignStateMachine, StateTransition};

#[cfg(test)]
pub use cycle::MockCycleExecutor;

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{CampaignSettings, SettingsSource};
use crate::error::CampaignError;
use crate::telemetry::metrics;
use crate::utils::{elapsed_ms, generate_id};
use crate::wallet::WalletHandle;

/// Cooperative stop signal, observed at cycle boundaries
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Queue and counters mutated only by the orchestrator
#[derive(Debug)]
pub struct OrchestratorState {
    wallets: VecDeque<WalletHandle>,
    accumulated: Decimal,
    target: Decimal,
    cycles_succeeded: u64,
    cycles_failed: u64,
}

impl OrchestratorState {
    pub fn new(wallets: Vec<WalletHandle>) -> Self {
        Self {
            wallets: wallets.into(),
            accumulated: Decimal::ZERO,
            target: Decimal::ZERO,
            cycles_succeeded: 0,
            cycles_failed: 0,
        }
    }

    pub fn head(&self) -> Option<&WalletHandle> {
        self.wallets.front()
    }

    /// Move the head wallet to the tail; a single wallet stays put
    pub fn rotate(&mut self) {
        if self.wallets.len() > 1 {
            self.wallets.rotate_left(1);
        }
    }

    /// Apply one cycle outcome; returns the new total
    pub fn record(&mut self, result: &CycleResult) -> Decimal {
        if result.success {
            self.accumulated += result.volume.max(Decimal::ZERO);
            self.cycles_succeeded += 1;
        } else {
            self.cycles_failed += 1;
        }
        self.accumulated
    }

    pub fn target_reached(&self) -> bool {
        self.accumulated >= self.target
    }

    pub fn accumulated(&self) -> Decimal {
        self.accumulated
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }
}

/// Summary returned when a campaign ends
#[derive(Debug, Clone)]
pub struct CampaignReport {
    pub id: String,
    pub state: CampaignState,
    pub accumulated: Decimal,
    pub target: Decimal,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub elapsed: Duration,
}

impl fmt::Display for CampaignReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "campaign {} {}: volume {}/{} after {} ok / {} failed cycles in {:.0?}",
            self.id,
            self.state,
            self.accumulated,
            self.target,
            self.cycles_succeeded,
            self.cycles_failed,
            self.elapsed
        )
    }
}

pub struct VolumeOrchestrator {
    id: String,
    state: OrchestratorState,
    machine: CampaignStateMachine,
    settings: Arc<dyn SettingsSource>,
    executor: Arc<dyn CycleExecutor>,
    rng: StdRng,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl VolumeOrchestrator {
    /// `seed` makes every random cycle choice reproducible
    pub fn new(
        wallets: Vec<WalletHandle>,
        settings: Arc<dyn SettingsSource>,
        executor: Arc<dyn CycleExecutor>,
        seed: Option<u64>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            id: generate_id(),
            state: OrchestratorState::new(wallets),
            machine: CampaignStateMachine::new(),
            settings,
            executor,
            rng,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    pub fn campaign_state(&self) -> CampaignState {
        self.machine.current_state()
    }

    pub fn history(&self) -> &[StateTransition] {
        self.machine.history()
    }

    pub fn accumulated(&self) -> Decimal {
        self.state.accumulated()
    }

    fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn set_state(&mut self, target: CampaignState, reason: String) {
        if self.machine.transition_to_with_reason(target, Some(reason)) {
            metrics::record_campaign_state(target.code());
        }
    }

    /// Run until the target is reached or the campaign is cancelled.
    ///
    /// Only an empty wallet set or unreadable initial settings fail the run;
    /// everything that goes wrong inside a cycle is absorbed.
    pub async fn run(&mut self) -> Result<CampaignReport, CampaignError> {
        let current = self.machine.current_state();
        if current != CampaignState::Idle {
            return Err(CampaignError::AlreadyStarted(current));
        }
        if self.state.wallet_count() == 0 {
            return Err(CampaignError::EmptyWalletSet);
        }
        let mut settings = self.settings.load().map_err(CampaignError::Settings)?;

        let started = Instant::now();
        self.state.target = settings.target_volume;
        metrics::record_wallet_count(self.state.wallet_count());
        self.set_state(
            CampaignState::Running,
            format!("{} wallets, target {}", self.state.wallet_count(), settings.target_volume),
        );

        loop {
            if self.cancelled() {
                self.set_state(CampaignState::Aborted, "cancelled".to_string());
                break;
            }

            match self.settings.load() {
                Ok(fresh) => settings = fresh,
                Err(e) => {
                    // Counted as a failed cycle; pacing uses the last good settings
                    warn!("Settings reload failed, skipping cycle: {:#}", e);
                    self.state.cycles_failed += 1;
                    metrics::record_cycle_failure(0.0);
                    if self.pause(&settings).await {
                        self.set_state(CampaignState::Aborted, "cancelled".to_string());
                        break;
                    }
                    continue;
                }
            }
            self.state.target = settings.target_volume;

            if self.state.target_reached() {
                self.complete();
                break;
            }

            let decision = CycleDecision::sample(&settings, &mut self.rng);
            let result = self.run_cycle(&settings, &decision).await;
            // Failed wallets rotate like successful ones
            self.state.rotate();

            if result.success && self.state.target_reached() {
                self.complete();
                break;
            }

            if self.sleep_or_cancel(decision.next_delay).await {
                self.set_state(CampaignState::Aborted, "cancelled".to_string());
                break;
            }
        }

        let report = CampaignReport {
            id: self.id.clone(),
            state: self.machine.current_state(),
            accumulated: self.state.accumulated,
            target: self.state.target,
            cycles_succeeded: self.state.cycles_succeeded,
            cycles_failed: self.state.cycles_failed,
            elapsed: started.elapsed(),
        };
        info!("{}", report);
        Ok(report)
    }

    async fn run_cycle(&mut self, settings: &CampaignSettings, decision: &CycleDecision) -> CycleResult {
        let Some(wallet) = self.state.head().cloned() else {
            return CycleResult::failed(Default::default(), "wallet queue is empty");
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.executor.run_cycle(&wallet, settings, decision))
            .catch_unwind()
            .await;
        let latency = elapsed_ms(started);

        let result = match outcome {
            Ok(Ok(volume)) => CycleResult::succeeded(wallet.pubkey(), volume),
            Ok(Err(e)) => CycleResult::failed(wallet.pubkey(), &e),
            Err(_) => CycleResult::failed(wallet.pubkey(), "cycle panicked"),
        };

        let total = self.state.record(&result);
        metrics::record_volume(
            total.to_f64().unwrap_or_default(),
            self.state.target.to_f64().unwrap_or_default(),
        );

        if result.success {
            metrics::record_cycle_success(latency);
            info!(
                "Cycle ok for {}: +{} -> {}/{} ({:.0}ms)",
                wallet, result.volume, total, self.state.target, latency
            );
        } else {
            metrics::record_cycle_failure(latency);
            warn!(
                "Cycle failed for {}: {} (volume {}/{})",
                wallet,
                result.error.as_deref().unwrap_or("unknown"),
                total,
                self.state.target
            );
        }
        result
    }

    fn complete(&mut self) {
        let reason = format!("volume {} >= target {}", self.state.accumulated, self.state.target);
        self.set_state(CampaignState::Completed, reason);
    }

    async fn pause(&mut self, settings: &CampaignSettings) -> bool {
        let decision = CycleDecision::sample(settings, &mut self.rng);
        self.sleep_or_cancel(decision.next_delay).await
    }

    /// Returns true when cancelled during the sleep
    async fn sleep_or_cancel(&mut self, delay: Duration) -> bool {
        if self.cancelled() {
            return true;
        }
        let cancel_rx = &mut self.cancel_rx;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel_rx.changed() => {}
        }
        self.cancelled()
    }
}
