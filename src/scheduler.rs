use chrono::{DateTime, NaiveTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::{parse_clock, Config, LoopConfig, LoopMode};
use crate::error::BotError;
use crate::orchestrator::{sleep_unless_stopped, Orchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Waiting,
    Stopped,
}

/// When the next pass should start. Interval mode waits a fixed duration
/// after completion; daily mode aligns to a UTC time of day.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    mode: LoopMode,
    every: Duration,
}

impl Cadence {
    pub fn from_config(cfg: &LoopConfig) -> Result<Self, BotError> {
        let every = parse_clock(&cfg.every)?;
        match cfg.mode {
            LoopMode::Interval if every.is_zero() => {
                return Err(BotError::Config(format!(
                    "loop.every '{}' must be greater than zero in interval mode",
                    cfg.every
                )));
            }
            LoopMode::Daily if every.as_secs() >= 86_400 => {
                return Err(BotError::Config(format!(
                    "loop.every '{}' is not a valid time of day for daily mode",
                    cfg.every
                )));
            }
            _ => {}
        }
        Ok(Self {
            mode: cfg.mode,
            every,
        })
    }

    /// Pure function of the current instant, so cadence math is testable
    /// without sleeping.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self.mode {
            LoopMode::Interval => self.every,
            LoopMode::Daily => {
                let time_of_day =
                    NaiveTime::from_num_seconds_from_midnight_opt(self.every.as_secs() as u32, 0)
                        .unwrap_or(NaiveTime::MIN);
                let mut target = now.date_naive().and_time(time_of_day).and_utc();
                if target <= now {
                    target += chrono::Duration::days(1);
                }
                (target - now).to_std().unwrap_or(self.every)
            }
        }
    }
}

/// Wraps the orchestrator in an optional recurring cadence:
/// Idle -> Running -> (Waiting <-> Running) -> Stopped.
pub struct LoopScheduler {
    orchestrator: Orchestrator,
    cadence: Option<Cadence>,
    stop: watch::Receiver<bool>,
    state: SchedulerState,
}

impl LoopScheduler {
    pub fn new(
        orchestrator: Orchestrator,
        config: &Config,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, BotError> {
        let cadence = if config.loop_cfg.enabled {
            Some(Cadence::from_config(&config.loop_cfg)?)
        } else {
            None
        };
        Ok(Self {
            orchestrator,
            cadence,
            stop,
            state: SchedulerState::Idle,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub async fn run(&mut self) -> Result<(), BotError> {
        loop {
            self.state = SchedulerState::Running;
            match self.orchestrator.run_pass().await {
                Ok(_) => {}
                Err(e) if self.cadence.is_some() => {
                    // a failed pass does not kill the loop; the next scheduled
                    // window gets a fresh attempt
                    error!("Pass failed: {}; retrying at the next scheduled window", e);
                }
                Err(e) => {
                    self.state = SchedulerState::Stopped;
                    return Err(e);
                }
            }

            let Some(cadence) = self.cadence else {
                break;
            };
            if *self.stop.borrow() {
                break;
            }

            let delay = cadence.next_delay(Utc::now());
            info!(
                "Next pass in {}s (around {})",
                delay.as_secs(),
                (Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()))
                    .format("%Y-%m-%d %H:%M:%S UTC")
            );
            self.state = SchedulerState::Waiting;
            if !sleep_unless_stopped(&mut self.stop, delay).await {
                break;
            }
        }
        self.state = SchedulerState::Stopped;
        info!("Scheduler stopped");
        Ok(())
    }
}
