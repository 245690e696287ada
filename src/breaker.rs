//! Circuit breaker gating calls to the declination API
//!
//! # States
//! - Closed: normal operation, every attempt is allowed
//! - Open: upstream assumed unhealthy, attempts are skipped until the cooldown ends
//! - HalfOpen: exactly one trial attempt is in flight at a time
//!
//! # State Transitions
//! ```text
//! Closed   -> Open:     consecutive transient failures reach the threshold
//! Open     -> HalfOpen: first check after the cooldown (admits that caller only)
//! HalfOpen -> Closed:   the trial succeeds
//! HalfOpen -> Open:     the trial fails transiently
//! ```
//!
//! Permanent (4xx) failures never move the breaker. All state reads and
//! writes go through one lock so two callers can never both be admitted as
//! the trial; the state file is written after that lock is released.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{write_json_atomic, CacheError};
use crate::data::FailureKind;

/// Default number of consecutive transient failures that opens the breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default time the breaker stays open before admitting a trial
pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

/// Tuning for a `CircuitBreaker`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// Breaker phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerPhase::Closed => write!(f, "CLOSED"),
            BreakerPhase::Open => write!(f, "OPEN"),
            BreakerPhase::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Persisted, observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub phase: BreakerPhase,
    pub consecutive_transient_failures: u32,
    /// When the breaker last opened, as epoch seconds
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub opened_at: Option<DateTime<Utc>>,
}

impl Default for BreakerSnapshot {
    fn default() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_transient_failures: 0,
            opened_at: None,
        }
    }
}

impl BreakerSnapshot {
    /// When an open breaker will admit its next trial
    ///
    /// `None` unless OPEN, or if the instant is not representable.
    pub fn open_until(&self, cooldown: Duration) -> Option<DateTime<Utc>> {
        match self.phase {
            BreakerPhase::Open => self.opened_at?.checked_add_signed(cooldown),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    snapshot: BreakerSnapshot,
    /// Set while the single HalfOpen trial is outstanding
    trial_started_at: Option<DateTime<Utc>>,
    /// Bumped on every persisted transition
    version: u64,
}

impl BreakerState {
    fn stamp(&mut self) -> Pending {
        self.version += 1;
        Pending {
            version: self.version,
            snapshot: self.snapshot,
        }
    }
}

/// A transition waiting to be written to the state file
#[derive(Debug, Clone, Copy)]
struct Pending {
    version: u64,
    snapshot: BreakerSnapshot,
}

/// Process-wide upstream health gate
///
/// Owned explicitly and shared by reference (typically `Arc<CircuitBreaker>`)
/// across lookups. When constructed with a state file, every transition is
/// written there atomically and the last state is restored on startup.
/// File writes happen after the state lock is released, so `check_skip`
/// never waits on disk I/O.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    state_file: Option<PathBuf>,
    /// Version of the last snapshot written to `state_file`
    written: Mutex<u64>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates an in-memory breaker in the CLOSED phase
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
            state_file: None,
            written: Mutex::new(0),
        }
    }

    /// Creates a breaker backed by a state file, restoring any state found there
    ///
    /// An unreadable or corrupt file is logged and ignored; the breaker then
    /// starts CLOSED. A trial that was in flight when the previous process
    /// exited is not restored, so a HALF_OPEN breaker admits a fresh trial.
    pub fn with_state_file(config: BreakerConfig, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match read_snapshot(&path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => BreakerSnapshot::default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable breaker state"
                );
                BreakerSnapshot::default()
            }
        };

        Self {
            config,
            state: Mutex::new(BreakerState {
                snapshot,
                ..Default::default()
            }),
            state_file: Some(path),
            written: Mutex::new(0),
        }
    }

    /// Current state, for observability
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.state.lock().snapshot
    }

    /// When the breaker will admit a trial, if it is currently OPEN
    pub fn open_until(&self) -> Option<DateTime<Utc>> {
        self.snapshot().open_until(self.config.cooldown)
    }

    /// Decide whether a network attempt at `now` must be skipped
    ///
    /// Returns `false` when the caller may proceed. After the cooldown the
    /// first caller flips OPEN to HALF_OPEN and is admitted as the trial;
    /// every other caller is skipped until that trial reports back.
    pub fn check_skip(&self, now: DateTime<Utc>) -> bool {
        let pending = {
            let mut state = self.state.lock();
            match state.snapshot.phase {
                BreakerPhase::Closed => return false,
                BreakerPhase::Open => {
                    let cooled_down = state
                        .snapshot
                        .opened_at
                        .map_or(true, |opened_at| now - opened_at >= self.config.cooldown);
                    if !cooled_down {
                        return true;
                    }
                    state.snapshot.phase = BreakerPhase::HalfOpen;
                    state.trial_started_at = Some(now);
                    tracing::info!("circuit breaker half-open, admitting trial request");
                    state.stamp()
                }
                BreakerPhase::HalfOpen => match state.trial_started_at {
                    // A trial that never reported back (e.g. its caller was dropped)
                    // is abandoned after one more cooldown.
                    Some(started) if now - started < self.config.cooldown => return true,
                    _ => {
                        state.trial_started_at = Some(now);
                        tracing::info!("circuit breaker admitting trial request");
                        return false;
                    }
                },
            }
        };
        self.persist(pending);
        false
    }

    /// Record a failed attempt
    ///
    /// Permanent failures leave the phase and counter untouched; in HALF_OPEN
    /// they only release the trial slot so another caller can probe.
    pub fn record_failure(&self, kind: FailureKind, now: DateTime<Utc>) {
        let pending = {
            let mut state = self.state.lock();
            let before = state.snapshot;

            if kind == FailureKind::Permanent {
                if state.snapshot.phase == BreakerPhase::HalfOpen {
                    state.trial_started_at = None;
                }
                return;
            }

            let threshold = self.config.failure_threshold;
            let snapshot = &mut state.snapshot;
            snapshot.consecutive_transient_failures =
                snapshot.consecutive_transient_failures.saturating_add(1);
            match snapshot.phase {
                BreakerPhase::HalfOpen => {
                    snapshot.phase = BreakerPhase::Open;
                    snapshot.opened_at = Some(now);
                    tracing::info!(
                        failures = snapshot.consecutive_transient_failures,
                        "circuit breaker trial failed, re-opened"
                    );
                }
                BreakerPhase::Closed if snapshot.consecutive_transient_failures >= threshold => {
                    snapshot.phase = BreakerPhase::Open;
                    snapshot.opened_at = Some(now);
                    tracing::info!(
                        failures = snapshot.consecutive_transient_failures,
                        cooldown_secs = self.config.cooldown.num_seconds(),
                        "circuit breaker opened"
                    );
                }
                _ => {}
            }
            state.trial_started_at = None;

            if state.snapshot == before {
                return;
            }
            state.stamp()
        };
        self.persist(pending);
    }

    /// Record a successful attempt, closing the breaker and clearing the counter
    pub fn record_success(&self, _now: DateTime<Utc>) {
        let pending = {
            let mut state = self.state.lock();
            let before = state.snapshot;

            state.snapshot = BreakerSnapshot::default();
            state.trial_started_at = None;

            if before.phase != BreakerPhase::Closed {
                tracing::info!(previous = %before.phase, "circuit breaker closed");
            }
            if state.snapshot == before {
                return;
            }
            state.stamp()
        };
        self.persist(pending);
    }

    /// Return to CLOSED with a zero counter
    pub fn reset(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.snapshot = BreakerSnapshot::default();
            state.trial_started_at = None;
            state.stamp()
        };
        self.persist(pending);
    }

    /// Write a transition to the state file, outside the state lock
    ///
    /// Writers serialize on `written`; a snapshot older than the one already
    /// on disk is dropped, so the file always ends at the latest transition.
    fn persist(&self, pending: Pending) {
        let Some(path) = &self.state_file else {
            return;
        };
        let mut written = self.written.lock();
        if *written >= pending.version {
            return;
        }
        match write_json_atomic(path, &pending.snapshot) {
            Ok(()) => *written = pending.version,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to persist breaker state"
                );
            }
        }
    }
}

/// Read a persisted breaker snapshot, `Ok(None)` if the file does not exist
pub fn read_snapshot(path: &Path) -> Result<Option<BreakerSnapshot>, CacheError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}
