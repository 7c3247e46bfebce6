//! Dispatcher - Drives the control loop on three independent cadences
//!
//! ## Message Flow
//!
//! ```text
//! metrics tick  → spawn(collect → alerts → [auto-scale] → publish)
//! forecast tick → spawn(refresh → publish)
//! health tick   → spawn(aggregate health → publish)
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```
//!
//! Every tick body runs in its own task, so a slow or failing cycle never holds
//! up the select loop, the other cadences, or the next tick of its own cadence.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Intervals;
use crate::control::ControlPlane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Metrics,
    Forecast,
    Health,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Metrics => f.write_str("metrics"),
            Cadence::Forecast => f.write_str("forecast"),
            Cadence::Health => f.write_str("health"),
        }
    }
}

/// Periods of the three cadences
#[derive(Debug, Clone, Copy)]
pub struct Cadences {
    pub metrics: Duration,
    pub forecast: Duration,
    pub health: Duration,
}

impl From<&Intervals> for Cadences {
    fn from(intervals: &Intervals) -> Self {
        Self {
            metrics: Duration::from_secs(intervals.metrics_secs),
            forecast: Duration::from_secs(intervals.forecast_secs),
            health: Duration::from_secs(intervals.health_secs),
        }
    }
}

/// Shortest period a cadence may tick at
const MIN_PERIOD: Duration = Duration::from_millis(100);

fn clamp_period(cadence: Cadence, period: Duration) -> Duration {
    if period < MIN_PERIOD {
        warn!("{cadence} period {period:?} is too short, using {MIN_PERIOD:?}");
        MIN_PERIOD
    } else {
        period
    }
}

/// Commands that can be sent to the dispatcher
#[derive(Debug)]
pub enum DispatcherCommand {
    /// Run one cycle immediately, outside the cadence
    RunNow {
        cadence: Cadence,
        /// Signalled once the cycle has finished
        respond_to: oneshot::Sender<()>,
    },

    /// Stop scheduling. Cycles already running finish on their own.
    Shutdown,
}

pub struct DispatcherActor {
    control: ControlPlane,
    cadences: Cadences,
    command_rx: mpsc::Receiver<DispatcherCommand>,
}

impl DispatcherActor {
    pub fn new(
        control: ControlPlane,
        cadences: Cadences,
        command_rx: mpsc::Receiver<DispatcherCommand>,
    ) -> Self {
        Self {
            control,
            cadences,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!(
            "starting dispatcher (metrics every {:?}, forecast every {:?}, health every {:?})",
            self.cadences.metrics, self.cadences.forecast, self.cadences.health
        );

        let mut metrics_ticker = interval(clamp_period(Cadence::Metrics, self.cadences.metrics));
        let mut forecast_ticker =
            interval(clamp_period(Cadence::Forecast, self.cadences.forecast));
        let mut health_ticker = interval(clamp_period(Cadence::Health, self.cadences.health));
        for ticker in [&mut metrics_ticker, &mut forecast_ticker, &mut health_ticker] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = metrics_ticker.tick() => self.spawn_cycle(Cadence::Metrics, None),
                _ = forecast_ticker.tick() => self.spawn_cycle(Cadence::Forecast, None),
                _ = health_ticker.tick() => self.spawn_cycle(Cadence::Health, None),

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DispatcherCommand::RunNow { cadence, respond_to } => {
                            debug!("received RunNow({cadence}) command");
                            self.spawn_cycle(cadence, Some(respond_to));
                        }

                        DispatcherCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        info!("dispatcher stopped");
    }

    fn spawn_cycle(&self, cadence: Cadence, respond_to: Option<oneshot::Sender<()>>) {
        let control = self.control.clone();

        tokio::spawn(async move {
            run_cycle(&control, cadence).await;
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(());
            }
        });
    }
}

/// Run one cycle body. Failures are logged here and go no further.
pub async fn run_cycle(control: &ControlPlane, cadence: Cadence) {
    match cadence {
        Cadence::Metrics => {
            control.run_metrics_cycle().await;
        }
        Cadence::Forecast => {
            if let Err(e) = control.run_forecast_cycle().await {
                error!("forecast cycle failed: {e:#}");
            }
        }
        Cadence::Health => {
            control.run_health_cycle().await;
        }
    }
}

/// Handle for controlling the dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Spawn the dispatcher as a Tokio task. The first tick of every cadence
    /// fires right away.
    pub fn spawn(control: ControlPlane, cadences: Cadences) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = DispatcherActor::new(control, cadences, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run one cycle now and wait for it to finish.
    pub async fn run_now(&self, cadence: Cadence) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatcherCommand::RunNow {
                cadence,
                respond_to: tx,
            })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("cycle did not complete")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(DispatcherCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
