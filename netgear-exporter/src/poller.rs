//! Modem polling: login, scrape, project.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::{ModemConfig, PollConfig};
use crate::error::{Result, ScrapeError};
use crate::parser::{StatusTable, StatusTableParser};
use crate::session;
use crate::store::SharedStore;

/// Lifecycle of the poll loop.
///
/// Any cycle error moves the poller to `Terminated`, which is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Terminated,
}

/// Outcome of one successful scrape cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Channel records projected.
    pub channels: usize,
    /// Rows skipped for their cell count.
    pub skipped_rows: usize,
    /// Numeric fields left unset.
    pub field_errors: usize,
}

/// Drives scrape cycles against one modem.
pub struct ModemPoller {
    modem: ModemConfig,
    interval: Duration,
    parser: StatusTableParser,
    store: SharedStore,
    state: watch::Sender<PollState>,
}

impl ModemPoller {
    /// Create a new poller writing into `store`.
    pub fn new(modem: ModemConfig, poll: &PollConfig, store: SharedStore) -> Result<Self> {
        let parser = StatusTableParser::new(&modem.table_selector)?;

        Ok(Self {
            modem,
            interval: Duration::from_secs(poll.interval_secs),
            parser,
            store,
            state: watch::Sender::new(PollState::Running),
        })
    }

    /// Current state of the poller.
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Follow state changes, e.g. for readiness reporting.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Run the polling loop.
    ///
    /// The first cycle runs immediately, later ones every interval. Returns
    /// `Ok` only when the shutdown signal fires; a failed cycle ends the loop
    /// with its error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            url = %self.modem.url,
            interval_secs = self.interval.as_secs(),
            "Starting modem poller"
        );

        self.poll_once().await?;

        let mut interval = cycle_interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Modem poller stopped");
        Ok(())
    }

    /// Perform a single scrape cycle.
    ///
    /// A fresh session is established every cycle. Records are only projected
    /// when login and status fetch both succeed.
    pub async fn poll_once(&mut self) -> Result<CycleSummary> {
        if self.state() == PollState::Terminated {
            return Err(ScrapeError::Terminated);
        }

        match self.scrape().await {
            Ok(table) => {
                self.store.project(&table.records);
                self.store.record_field_errors(table.field_errors.len());

                let summary = CycleSummary {
                    channels: table.records.len(),
                    skipped_rows: table.skipped_rows,
                    field_errors: table.field_errors.len(),
                };
                info!(
                    channels = summary.channels,
                    skipped_rows = summary.skipped_rows,
                    field_errors = summary.field_errors,
                    "Scrape cycle completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.state.send_replace(PollState::Terminated);
                error!(url = %self.modem.url, "Scrape cycle failed: {}", e);
                Err(e)
            }
        }
    }

    async fn scrape(&self) -> Result<StatusTable> {
        let session = session::authenticate(&self.modem).await?;
        debug!("Session established");

        self.parser.fetch_and_parse(&session, &self.modem).await
    }
}

/// Ticker for the cycles after the first one.
///
/// A stalled cycle pushes the schedule back instead of being followed by a
/// burst of catch-up logins.
fn cycle_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
