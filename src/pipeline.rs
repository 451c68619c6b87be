use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::config::Config;
use crate::credentials::{short_address, AccountCredential};
use crate::error::ChainError;
use crate::state::AccountState;

/// What one pipeline invocation did for one account.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Staked { amount: f64 },
    Compounded { amount: f64 },
    Skipped { reason: String },
    Failed { kind: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub address: String,
    pub outcome: Outcome,
}

/// Per-account decision and action logic: inspect the live balance, fold in
/// claimed rewards when compounding, and stake everything above the reserve.
/// All chain calls go through a bounded exponential-backoff retry; errors
/// never escape as anything but an `Outcome::Failed`.
pub struct StakePipeline {
    chain: Arc<dyn ChainClient>,
    config: Arc<Config>,
}

impl StakePipeline {
    pub fn new(chain: Arc<dyn ChainClient>, config: Arc<Config>) -> Self {
        Self { chain, config }
    }

    pub async fn process(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
        state: &mut AccountState,
    ) -> Outcome {
        let short = short_address(&account.address);

        // 1. live balance
        let balance = match self
            .with_retry(|| self.chain.balance(account, proxy))
            .await
        {
            Ok(balance) => balance,
            Err(e) => return Outcome::Failed { kind: fail_kind(&e) },
        };
        state.balance = balance;

        // 2. fold rewards into the principal before computing the stake
        let mut compounded = false;
        if self.config.stake.auto_compound {
            sleep(self.config.delays.between_operations()).await;
            let pending = match self
                .with_retry(|| self.chain.pending_rewards(account, proxy))
                .await
            {
                Ok(pending) => pending,
                Err(e) => return Outcome::Failed { kind: fail_kind(&e) },
            };
            state.pending_rewards = pending;
            if pending > 0.0 {
                sleep(self.config.delays.between_operations()).await;
                match self
                    .with_retry(|| self.chain.claim_rewards(account, proxy))
                    .await
                {
                    Ok(claimed) => {
                        info!("{}: claimed {:.6} in rewards", short, claimed);
                        state.balance += claimed;
                        state.pending_rewards = 0.0;
                        compounded = claimed > 0.0;
                    }
                    Err(e) => return Outcome::Failed { kind: fail_kind(&e) },
                }
            }
        }

        // 3. the reserve is never staked; a skip returns immediately, the
        // inter-task pause is only owed before an actual submission
        let available = (state.balance - self.config.stake.reserve_balance).max(0.0);
        if available <= 0.0 {
            info!(
                "{}: balance {:.6} does not exceed the {:.6} reserve, skipping",
                short, state.balance, self.config.stake.reserve_balance
            );
            return Outcome::Skipped {
                reason: "insufficient balance".to_string(),
            };
        }
        sleep(self.config.delays.between_tasks()).await;

        // 4/5. submit and classify
        match self
            .with_retry(|| {
                self.chain
                    .stake(account, available, self.config.stake.tier_id, proxy)
            })
            .await
        {
            Ok(receipt) => {
                state.points = receipt.points;
                state.rank = receipt.rank;
                state.balance -= available;
                info!(
                    "{}: staked {:.6} at tier {} (tx {})",
                    short, available, self.config.stake.tier_id, receipt.tx_hash
                );
                if compounded {
                    Outcome::Compounded { amount: available }
                } else {
                    Outcome::Staked { amount: available }
                }
            }
            Err(e) => Outcome::Failed { kind: fail_kind(&e) },
        }
    }

    /// Bounded exponential backoff, local to one account: capped by both an
    /// attempt count and a total time budget. Permanent errors short-circuit.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let retry = &self.config.retry;
        let budget = Duration::from_millis(retry.max_total_ms);
        let started = Instant::now();
        let mut backoff = Duration::from_millis(retry.base_backoff_ms);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt >= retry.max_attempts || started.elapsed() + backoff > budget {
                        return Err(e);
                    }
                    warn!(
                        "transient chain error ({}), retrying in {:?} (attempt {}/{})",
                        e, backoff, attempt, retry.max_attempts
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn fail_kind(e: &ChainError) -> String {
    if e.is_transient() {
        "transient-exhausted".to_string()
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;

    fn test_config() -> Config {
        let mut config = Config::default();
        // keep the tests fast
        config.delays.between_accounts_ms = 0;
        config.delays.between_tasks_ms = 0;
        config.delays.between_operations_ms = 0;
        config.retry.base_backoff_ms = 1;
        config.retry.max_total_ms = 1_000;
        config
    }

    fn credential(byte: u8) -> AccountCredential {
        AccountCredential::from_secret_hex(&hex::encode([byte; 32])).unwrap()
    }

    fn pipeline(chain: Arc<MockChain>, config: Config) -> StakePipeline {
        StakePipeline::new(chain, Arc::new(config))
    }

    #[tokio::test]
    async fn stakes_everything_above_the_reserve() {
        let cred = credential(1);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 2.0));
        let mut config = test_config();
        config.stake.reserve_balance = 0.5;
        config.stake.auto_compound = false;
        let mut state = AccountState::default();

        let outcome = pipeline(chain.clone(), config)
            .process(&cred, None, &mut state)
            .await;

        assert_eq!(outcome, Outcome::Staked { amount: 1.5 });
        assert_eq!(state.balance, 0.5);
        assert_eq!(state.points, 10);
        assert_eq!(chain.stake_calls.lock().unwrap()[0].1, 1.5);
    }

    #[tokio::test]
    async fn skips_below_the_reserve_without_submitting() {
        let cred = credential(2);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 0.3));
        let mut config = test_config();
        config.stake.reserve_balance = 0.5;
        config.stake.auto_compound = false;
        let mut state = AccountState::default();

        let pipeline = pipeline(chain.clone(), config);
        // unchanged balance: both invocations skip, no submission either time
        for _ in 0..2 {
            let outcome = pipeline.process(&cred, None, &mut state).await;
            assert_eq!(
                outcome,
                Outcome::Skipped {
                    reason: "insufficient balance".to_string()
                }
            );
        }
        assert_eq!(chain.stake_count(&cred.address), 0);
        assert_eq!(state.balance, 0.3);
    }

    #[tokio::test]
    async fn a_skip_pays_no_in_pipeline_delay() {
        let cred = credential(8);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 0.3));
        let mut config = test_config();
        config.stake.reserve_balance = 0.5;
        config.stake.auto_compound = false;
        config.delays.between_tasks_ms = 300;
        let mut state = AccountState::default();

        let started = Instant::now();
        let outcome = pipeline(chain, config).process(&cred, None, &mut state).await;

        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "skip waited {:?} inside the pipeline",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn second_run_with_unchanged_balance_skips_again() {
        let cred = credential(3);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 2.0));
        let mut config = test_config();
        config.stake.reserve_balance = 0.5;
        config.stake.auto_compound = false;
        let pipeline = pipeline(chain.clone(), config);
        let mut state = AccountState::default();

        let first = pipeline.process(&cred, None, &mut state).await;
        assert_eq!(first, Outcome::Staked { amount: 1.5 });

        // the mock debits the staked amount, so the balance is now the reserve
        let second = pipeline.process(&cred, None, &mut state).await;
        assert!(matches!(second, Outcome::Skipped { .. }));
        assert_eq!(chain.stake_count(&cred.address), 1, "no duplicate submission");
    }

    #[tokio::test]
    async fn compounds_claimed_rewards_into_the_stake() {
        let cred = credential(4);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 1.0));
        chain.set_rewards(&cred.address, 0.4);
        let mut config = test_config();
        config.stake.reserve_balance = 0.5;
        config.stake.auto_compound = true;
        let mut state = AccountState::default();

        let outcome = pipeline(chain.clone(), config)
            .process(&cred, None, &mut state)
            .await;

        // 1.0 balance + 0.4 claimed - 0.5 reserve
        assert_eq!(outcome, Outcome::Compounded { amount: 0.9 });
        assert_eq!(state.pending_rewards, 0.0);
        assert_eq!(*chain.rewards.lock().unwrap().get(&cred.address).unwrap(), 0.0);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_succeed() {
        let cred = credential(5);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 2.0));
        chain.script_stake_errors(&cred.address, vec![ChainError::Timeout]);
        let mut config = test_config();
        config.stake.auto_compound = false;
        let mut state = AccountState::default();

        let outcome = pipeline(chain.clone(), config)
            .process(&cred, None, &mut state)
            .await;

        assert_eq!(outcome, Outcome::Staked { amount: 1.5 });
        assert_eq!(chain.stake_count(&cred.address), 1);
    }

    #[tokio::test]
    async fn transient_exhaustion_is_reported_as_such() {
        let cred = credential(6);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 2.0));
        chain.script_stake_errors(
            &cred.address,
            vec![ChainError::Timeout, ChainError::RateLimited, ChainError::Timeout],
        );
        let mut config = test_config();
        config.stake.auto_compound = false;
        config.retry.max_attempts = 3;
        let mut state = AccountState::default();

        let outcome = pipeline(chain.clone(), config)
            .process(&cred, None, &mut state)
            .await;

        assert_eq!(
            outcome,
            Outcome::Failed {
                kind: "transient-exhausted".to_string()
            }
        );
        assert_eq!(chain.stake_count(&cred.address), 0);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let cred = credential(7);
        let chain = Arc::new(MockChain::with_balance(&cred.address, 2.0));
        chain.script_stake_errors(
            &cred.address,
            vec![
                ChainError::Rejected("invalid tier".to_string()),
                // would succeed if a second attempt were (wrongly) made
            ],
        );
        let mut config = test_config();
        config.stake.auto_compound = false;
        let mut state = AccountState::default();

        let outcome = pipeline(chain.clone(), config)
            .process(&cred, None, &mut state)
            .await;

        match outcome {
            Outcome::Failed { kind } => assert!(kind.contains("invalid tier")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(chain.stake_count(&cred.address), 0);
    }
}
