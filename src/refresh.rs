//! The refresh loop: fetch, aggregate, present, wait, repeat.
//!
//! The loop is a two-state machine. While [`LoopState::Cycling`] it runs
//! cycles back to back, suspending for the configured interval between them.
//! With auto-refresh off, or after a cycle aborted on a hard failure, it goes
//! [`LoopState::Idle`] and blocks until an external trigger arrives.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cache::{CacheLookup, ResultCache};
use crate::config::{ConfigResolver, DashboardConfig};
use crate::error::{DashboardError, Result};
use crate::frame::{lookup_warning, DashboardFrame, ViewTable, Warning};
use crate::output::Presenter;
use crate::types::OrderTable;
use crate::warehouse::{PreferenceView, QueryDescriptor, QueryExecutor};

/// What starts a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First cycle after startup
    Start,
    /// User interaction; served from cache where entries are live
    Rerun,
    /// Manual refresh; clears the cache first
    RefreshNow,
    /// The auto-refresh interval elapsed
    IntervalElapsed,
    /// Stop the loop
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Running cycles, possibly suspended between them
    Cycling,
    /// Waiting for an external trigger
    Idle,
}

/// Source of triggers for a running loop.
pub trait TriggerSource {
    /// Sleep for `interval`, returning early on an external trigger.
    /// Returns [`Trigger::IntervalElapsed`] when the interval ran out.
    fn suspend(&mut self, interval: Duration) -> Trigger;

    /// Block until an external trigger arrives.
    fn wait(&mut self) -> Trigger;
}

/// Triggers delivered over a channel. A disconnected sender means shutdown.
pub struct ChannelTriggers {
    rx: Receiver<Trigger>,
}

impl ChannelTriggers {
    pub fn new(rx: Receiver<Trigger>) -> Self {
        Self { rx }
    }

    /// A connected sender and trigger source.
    pub fn channel() -> (Sender<Trigger>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl TriggerSource for ChannelTriggers {
    fn suspend(&mut self, interval: Duration) -> Trigger {
        match self.rx.recv_timeout(interval) {
            Ok(trigger) => trigger,
            Err(RecvTimeoutError::Timeout) => Trigger::IntervalElapsed,
            Err(RecvTimeoutError::Disconnected) => Trigger::Shutdown,
        }
    }

    fn wait(&mut self) -> Trigger {
        self.rx.recv().unwrap_or(Trigger::Shutdown)
    }
}

/// Counters over the life of a loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Cycles that produced a frame
    pub cycles: u64,
    /// Cycles aborted by a hard failure
    pub aborted: u64,
    /// Times the loop suspended for the refresh interval
    pub suspensions: u64,
    /// Cache clears requested by manual refreshes
    pub clears: u64,
}

/// How a single cycle ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// A frame was presented with this many warnings
    Presented { warnings: usize },
    /// A hard fetch failure aborted the cycle
    Aborted(DashboardError),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Configuration the cycle ran with
    pub config: DashboardConfig,
    pub outcome: CycleOutcome,
}

/// Drives refresh cycles against a borrowed cache and configuration chain.
pub struct RefreshLoop<'a, E, P> {
    cache: &'a ResultCache,
    executor: E,
    resolver: &'a ConfigResolver,
    presenter: P,
    state: LoopState,
    summary: LoopSummary,
    cycle: u64,
}

impl<'a, E: QueryExecutor, P: Presenter> RefreshLoop<'a, E, P> {
    pub fn new(cache: &'a ResultCache, executor: E, resolver: &'a ConfigResolver, presenter: P) -> Self {
        Self {
            cache,
            executor,
            resolver,
            presenter,
            state: LoopState::Idle,
            summary: LoopSummary::default(),
            cycle: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    /// Run until a [`Trigger::Shutdown`].
    ///
    /// Configuration and presenter errors end the loop and are returned;
    /// fetch failures never do.
    pub fn run(&mut self, triggers: &mut impl TriggerSource) -> Result<LoopSummary> {
        let mut trigger = Trigger::Start;
        while trigger != Trigger::Shutdown {
            self.state = LoopState::Cycling;
            let report = match self.run_cycle(trigger) {
                Ok(report) => report,
                Err(err) => {
                    self.state = LoopState::Idle;
                    return Err(err);
                }
            };

            let refresh = report.config.refresh;
            trigger = match report.outcome {
                CycleOutcome::Presented { .. } if refresh.auto_refresh => {
                    self.summary.suspensions += 1;
                    debug!(interval_secs = refresh.interval.as_secs(), "suspending until next refresh");
                    triggers.suspend(refresh.interval)
                }
                _ => {
                    self.state = LoopState::Idle;
                    triggers.wait()
                }
            };
        }
        self.state = LoopState::Idle;
        info!(
            cycles = self.summary.cycles,
            aborted = self.summary.aborted,
            "refresh loop stopped"
        );
        Ok(self.summary)
    }

    /// Run one cycle for `trigger`.
    pub fn run_cycle(&mut self, trigger: Trigger) -> Result<CycleReport> {
        let config = self.resolver.resolve()?;

        if trigger == Trigger::RefreshNow {
            self.cache.clear();
            self.summary.clears += 1;
        }

        self.cycle += 1;
        info!(cycle = self.cycle, ?trigger, "refresh cycle started");

        let mut warnings = Vec::new();

        let orders_query = QueryDescriptor::LatestOrders {
            limit: config.order_limit,
        };
        let orders_lookup = self.fetch(&orders_query, &config);
        if let Some(err) = hard_failure(&orders_lookup) {
            return Ok(self.abort(config, err));
        }
        warnings.extend(lookup_warning(&orders_query.id(), &orders_lookup));
        let orders_fetch_failed = orders_lookup.failure.is_some();
        let orders_outcome = orders_lookup.outcome;
        let orders = match OrderTable::try_new(orders_lookup.table) {
            Ok(orders) if orders.is_empty() && !orders_fetch_failed => {
                warn!("no orders found upstream");
                warnings.push(Warning::new(
                    orders_query.id(),
                    DashboardError::schema_unavailable("no orders found upstream"),
                ));
                orders
            }
            Ok(orders) => orders,
            Err(err) => {
                warn!(error = %err, "order table rejected");
                warnings.push(Warning::new(orders_query.id(), err));
                OrderTable::empty()
            }
        };

        let mut views = Vec::with_capacity(PreferenceView::ALL.len());
        for view in PreferenceView::ALL {
            let query = QueryDescriptor::View(view);
            let lookup = self.fetch(&query, &config);
            if let Some(err) = hard_failure(&lookup) {
                return Ok(self.abort(config, err));
            }
            warnings.extend(lookup_warning(view.view_name(), &lookup));
            views.push(ViewTable {
                view,
                table: lookup.table,
                outcome: lookup.outcome,
            });
        }

        let frame = DashboardFrame::assemble(
            self.cycle,
            config.clone(),
            orders,
            orders_outcome,
            views,
            warnings,
        );
        let warning_count = frame.warnings.len();
        self.presenter.present(&frame)?;
        self.summary.cycles += 1;
        info!(
            cycle = self.cycle,
            orders = frame.headline.total_orders,
            warnings = warning_count,
            "refresh cycle presented"
        );

        Ok(CycleReport {
            config,
            outcome: CycleOutcome::Presented {
                warnings: warning_count,
            },
        })
    }

    fn fetch(&self, query: &QueryDescriptor, config: &DashboardConfig) -> CacheLookup {
        let executor = &self.executor;
        self.cache
            .get_or_fetch(&query.id(), query.ttl(), || executor.execute(query, &config.warehouse))
    }

    fn abort(&mut self, config: DashboardConfig, err: DashboardError) -> CycleReport {
        error!(cycle = self.cycle, error = %err, "refresh cycle aborted");
        self.presenter.report_error(&err);
        self.summary.aborted += 1;
        CycleReport {
            config,
            outcome: CycleOutcome::Aborted(err),
        }
    }
}

fn hard_failure(lookup: &CacheLookup) -> Option<DashboardError> {
    lookup.failure.as_ref().filter(|err| err.is_hard()).cloned()
}
