use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::credentials::{short_address, CredentialSet};
use crate::error::BotError;
use crate::pipeline::{OperationResult, Outcome, StakePipeline};
use crate::proxy::ProxyPool;
use crate::state::StateStore;
use std::sync::Arc;

/// Aggregate result of one pass over all accounts.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub staked: usize,
    pub compounded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<OperationResult>,
}

impl PassSummary {
    fn record(&mut self, result: OperationResult) {
        match result.outcome {
            Outcome::Staked { .. } => self.staked += 1,
            Outcome::Compounded { .. } => self.compounded += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }
}

/// Sequences accounts through the pipeline one at a time, pacing every step
/// so the batch never looks like a burst to the provider. Per-account
/// failures are contained; only state-write failures abort a pass.
pub struct Orchestrator {
    credentials: CredentialSet,
    proxies: ProxyPool,
    pipeline: StakePipeline,
    store: StateStore,
    config: Arc<Config>,
    stop: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        credentials: CredentialSet,
        proxies: ProxyPool,
        pipeline: StakePipeline,
        store: StateStore,
        config: Arc<Config>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            credentials,
            proxies,
            pipeline,
            store,
            config,
            stop,
        }
    }

    pub async fn run_pass(&mut self) -> Result<PassSummary, BotError> {
        let total = self.credentials.len();
        let mut summary = PassSummary::default();
        info!(
            "Starting pass: {} accounts, {} proxies{}",
            total,
            self.proxies.len(),
            if self.proxies.is_empty() { " (proxyless)" } else { "" }
        );

        for i in 0..total {
            if *self.stop.borrow() {
                info!("Stop requested, ending the pass early");
                break;
            }

            // iteration stays in credential-file order; the clone keeps the
            // borrow checker out of the pacing waits below
            let Some(account) = self.credentials.get(i).cloned() else {
                break;
            };
            let proxy = self.proxies.assign(i);
            info!(
                "[{}/{}] {} via {}",
                i + 1,
                total,
                short_address(&account.address),
                proxy.unwrap_or("proxyless")
            );

            let mut state = self.store.get(&account.address);
            let outcome = self.pipeline.process(&account, proxy, &mut state).await;

            let now = Utc::now().timestamp_millis();
            state.last_run = Some(state.last_run.map_or(now, |prev| prev.max(now)));
            state.last_error = match &outcome {
                Outcome::Failed { kind } => Some(kind.clone()),
                _ => None,
            };
            if let Outcome::Failed { kind } = &outcome {
                error!("{}: {}", short_address(&account.address), kind);
            }

            // the next account must not start before this record is durable
            if let Err(e) = self.store.merge(&account.address, move |record| *record = state) {
                error!("State write failed, aborting the pass: {}", e);
                let _ = self.store.save();
                return Err(e);
            }

            summary.record(OperationResult {
                address: account.address.clone(),
                outcome,
            });

            // uniform pacing, also after skips and failures
            if i + 1 < total
                && !sleep_unless_stopped(&mut self.stop, self.config.delays.between_accounts())
                    .await
            {
                info!("Stop requested, ending the pass early");
                break;
            }
        }

        info!(
            "Pass complete: {} staked, {} compounded, {} skipped, {} failed",
            summary.staked, summary.compounded, summary.skipped, summary.failed
        );
        Ok(summary)
    }
}

/// Cancellable wait. Returns false as soon as the stop signal fires; returns
/// true after the full duration otherwise.
pub(crate) async fn sleep_unless_stopped(
    stop: &mut watch::Receiver<bool>,
    duration: Duration,
) -> bool {
    if *stop.borrow() {
        return false;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = stop.changed() => {
                match changed {
                    Ok(()) if *stop.borrow() => return false,
                    Ok(()) => {}
                    // sender gone: nobody can stop us anymore
                    Err(_) => {
                        sleep.as_mut().await;
                        return true;
                    }
                }
            }
        }
    }
}
