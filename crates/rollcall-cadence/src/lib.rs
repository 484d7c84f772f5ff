//! Fixed-cadence beat scheduler for Rollcall's presenter loop.
//!
//! A presenter does two things on a clock: mint a fresh session every
//! `reissue_every`, and refresh the displayed code every `rotate_every`
//! in between. [`Cadence`] turns both periods into one stream of beats:
//!
//! ```text
//! reissue_every = 30s, rotate_every = 5s  →  6 slots per cycle
//!
//!  t=0      5      10     15     20     25     30     35
//!  Reissue  Rot(1) Rot(2) Rot(3) Rot(4) Rot(5) Reissue Rot(1) ...
//! ```
//!
//! # Modes
//!
//! - Both periods set: the cycle above.
//! - `rotate_every` zero: only `Reissue` beats, every `reissue_every`.
//! - `reissue_every` zero: on-demand issuance; only `Rotate` beats. The
//!   caller issues sessions itself and calls [`Cadence::restart_cycle`].
//! - Both zero: idle. [`Cadence::wait_for_beat`] pends forever.
//!
//! # Integration
//!
//! The cadence sits inside the presenter task's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         beat = cadence.wait_for_beat() => match beat.kind {
//!             BeatKind::Reissue => { issuer.issue().await?; }
//!             BeatKind::Rotate { .. } => { issuer.current_code().await?; }
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a beat fires noticeably late.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissPolicy {
    /// Skip the missed beats and schedule the next one from now.
    ///
    /// If the skipped span crossed a cycle boundary, the late beat is a
    /// `Reissue` so the presenter never shows a session past its window.
    #[default]
    Skip,
    /// Keep the original schedule. Missed beats fire back to back.
    Drop,
}

/// Configuration for a [`Cadence`].
#[derive(Debug, Clone)]
pub struct CadenceConfig {
    /// How often a new session is minted. Zero disables reissue beats.
    ///
    /// Default: 30 seconds, matching the session window.
    pub reissue_every: Duration,

    /// How often the displayed code is refreshed between reissues. Zero
    /// disables rotate beats.
    ///
    /// Default: 5 seconds.
    pub rotate_every: Duration,

    pub policy: MissPolicy,

    /// Random delay (up to this much) before the *first* beat, so that
    /// presenters started together don't all reissue at the same instant.
    pub initial_jitter: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            reissue_every: Duration::from_secs(30),
            rotate_every: Duration::from_secs(5),
            policy: MissPolicy::default(),
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl CadenceConfig {
    /// Shortest period accepted for either beat.
    pub const MIN_PERIOD: Duration = Duration::from_millis(100);

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Cadence::new`]. Rules:
    /// - Non-zero periods are raised to [`Self::MIN_PERIOD`].
    /// - `rotate_every` longer than `reissue_every` is disabled, since it
    ///   would never fire between reissues.
    pub fn validated(mut self) -> Self {
        for period in [&mut self.reissue_every, &mut self.rotate_every] {
            if !period.is_zero() && *period < Self::MIN_PERIOD {
                warn!(
                    ?period,
                    min = ?Self::MIN_PERIOD,
                    "cadence period below minimum, clamping"
                );
                *period = Self::MIN_PERIOD;
            }
        }
        if !self.reissue_every.is_zero() && self.rotate_every >= self.reissue_every {
            debug!("rotate_every >= reissue_every, rotation disabled");
            self.rotate_every = Duration::ZERO;
        }
        self
    }

    /// Number of beats in one reissue cycle (1 when rotation is off).
    ///
    /// A `reissue_every` that isn't a whole multiple of `rotate_every` is
    /// rounded up to the next slot.
    pub fn slots_per_cycle(&self) -> u64 {
        if self.reissue_every.is_zero() || self.rotate_every.is_zero() {
            return 1;
        }
        let slots = self
            .reissue_every
            .as_nanos()
            .div_ceil(self.rotate_every.as_nanos());
        u64::try_from(slots).unwrap_or(u64::MAX)
    }

    /// Interval between consecutive beats, or `None` when idle.
    pub fn beat_period(&self) -> Option<Duration> {
        match (self.reissue_every.is_zero(), self.rotate_every.is_zero()) {
            (true, true) => None,
            (_, false) => Some(self.rotate_every),
            (false, true) => Some(self.reissue_every),
        }
    }
}

// ---------------------------------------------------------------------------
// Beats
// ---------------------------------------------------------------------------

/// What the presenter should do on a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatKind {
    /// Mint a new session.
    Reissue,
    /// Refresh the displayed code. `index` counts slots since the last
    /// reissue (or since the cadence started, in on-demand mode).
    Rotate { index: u32 },
}

/// A beat, returned by [`Cadence::wait_for_beat`].
#[derive(Debug, Clone)]
pub struct Beat {
    /// Monotonically increasing beat number (starts at 1).
    pub beat: u64,
    pub kind: BeatKind,
    /// `true` if the beat fired more than a tenth of a period late.
    pub late: bool,
    /// How many beats were skipped before this one (`Skip` policy only).
    pub skipped: u64,
}

/// Running totals for a [`Cadence`].
///
/// The presenter logs these on every reissue, so a loop that keeps
/// falling behind shows up in the logs as growing `late_beats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CadenceStats {
    pub total_beats: u64,
    pub reissues: u64,
    pub rotations: u64,
    pub late_beats: u64,
    pub skipped_beats: u64,
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// Drives one presenter's reissue/rotate schedule.
pub struct Cadence {
    config: CadenceConfig,
    period: Option<Duration>,
    slots: u64,
    beat_count: u64,
    /// Slot the next beat lands on, counted from the start of the cycle.
    position: u64,
    next_beat: Option<Instant>,
    stats: CadenceStats,
}

impl Cadence {
    /// Create a cadence from config.
    ///
    /// The first beat fires after the initial jitter and is always a
    /// `Reissue` (or the first `Rotate` in on-demand mode).
    pub fn new(config: CadenceConfig) -> Self {
        let config = config.validated();
        let period = config.beat_period();
        let slots = config.slots_per_cycle();

        let max_jitter_us =
            u64::try_from(config.initial_jitter.as_micros()).unwrap_or(u64::MAX);
        let jitter = if max_jitter_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::rng().random_range(0..max_jitter_us))
        };
        let next_beat = period.map(|_| Instant::now() + jitter);

        match period {
            None => debug!("cadence created idle (no beats)"),
            Some(period) => debug!(
                ?period,
                slots,
                policy = ?config.policy,
                ?jitter,
                "cadence created"
            ),
        }

        Self {
            config,
            period,
            slots,
            beat_count: 0,
            position: 0,
            next_beat,
            stats: CadenceStats::default(),
        }
    }

    /// Wait until the next beat is due.
    ///
    /// When idle, this future pends forever. It never resolves
    /// on its own, but `tokio::select!` still processes other branches.
    pub async fn wait_for_beat(&mut self) -> Beat {
        let (next, period) = match (self.next_beat, self.period) {
            (Some(next), Some(period)) => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.beat_count += 1;

        let late_by = now.saturating_duration_since(next);
        let late = late_by > period / 10;
        let mut skipped = 0u64;

        let (kind, next_beat) = match self.config.policy {
            MissPolicy::Skip => {
                if late {
                    skipped = whole_periods(late_by, period);
                    if skipped > 0 {
                        warn!(
                            beat = self.beat_count,
                            skipped,
                            late_ms = late_by.as_secs_f64() * 1000.0,
                            "cadence fell behind, skipping ahead"
                        );
                    }
                }
                let kind = self.advance(skipped);
                (kind, now + period)
            }
            MissPolicy::Drop => {
                if late {
                    warn!(
                        beat = self.beat_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "late beat, keeping original schedule"
                    );
                }
                (self.advance(0), next + period)
            }
        };
        self.next_beat = Some(next_beat);

        self.stats.total_beats += 1;
        self.stats.skipped_beats += skipped;
        if late {
            self.stats.late_beats += 1;
        }
        match kind {
            BeatKind::Reissue => self.stats.reissues += 1,
            BeatKind::Rotate { .. } => self.stats.rotations += 1,
        }

        trace!(beat = self.beat_count, ?kind, late, "beat fired");

        Beat {
            beat: self.beat_count,
            kind,
            late,
            skipped,
        }
    }

    /// Moves past `skipped` missed slots plus the current one and returns
    /// what the current one is.
    fn advance(&mut self, skipped: u64) -> BeatKind {
        let landed = self.position.saturating_add(skipped);

        // On-demand mode has no cycle boundaries to land on.
        if self.config.reissue_every.is_zero() {
            self.position = landed.saturating_add(1);
            return BeatKind::Rotate {
                index: u32::try_from(landed).unwrap_or(u32::MAX),
            };
        }

        // A cycle start somewhere in [position, landed] means a reissue is
        // due, even if the beat that should have carried it was skipped.
        let crosses_cycle = self.position % self.slots == 0
            || landed / self.slots > self.position / self.slots;
        if crosses_cycle {
            self.position = 1;
            BeatKind::Reissue
        } else {
            self.position = landed + 1;
            BeatKind::Rotate {
                index: u32::try_from(landed).unwrap_or(u32::MAX),
            }
        }
    }

    /// Start a new cycle as if a `Reissue` beat had just fired.
    ///
    /// Call this after issuing a session outside the cadence so the
    /// following rotations line up with the new session's window.
    pub fn restart_cycle(&mut self) {
        self.position = 1;
        if let Some(period) = self.period {
            self.next_beat = Some(Instant::now() + period);
        }
        debug!(beat = self.beat_count, "cadence cycle restarted");
    }

    /// Whether this cadence never produces beats.
    pub fn is_idle(&self) -> bool {
        self.period.is_none()
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    pub fn stats(&self) -> &CadenceStats {
        &self.stats
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }
}

fn whole_periods(span: Duration, period: Duration) -> u64 {
    let periods = span.as_nanos() / period.as_nanos().max(1);
    u64::try_from(periods).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_six_slots() {
        let cfg = CadenceConfig::default().validated();
        assert_eq!(cfg.slots_per_cycle(), 6);
        assert_eq!(cfg.beat_period(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_slots_round_up_uneven_periods() {
        let cfg = CadenceConfig {
            reissue_every: Duration::from_secs(30),
            rotate_every: Duration::from_secs(7),
            ..CadenceConfig::default()
        };
        assert_eq!(cfg.slots_per_cycle(), 5);
    }

    #[test]
    fn test_validated_disables_rotation_not_shorter_than_reissue() {
        let cfg = CadenceConfig {
            reissue_every: Duration::from_secs(10),
            rotate_every: Duration::from_secs(10),
            ..CadenceConfig::default()
        }
        .validated();
        assert_eq!(cfg.rotate_every, Duration::ZERO);
        assert_eq!(cfg.slots_per_cycle(), 1);
        assert_eq!(cfg.beat_period(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_validated_raises_tiny_periods() {
        let cfg = CadenceConfig {
            reissue_every: Duration::from_millis(1),
            rotate_every: Duration::ZERO,
            ..CadenceConfig::default()
        }
        .validated();
        assert_eq!(cfg.reissue_every, CadenceConfig::MIN_PERIOD);
        assert_eq!(cfg.rotate_every, Duration::ZERO);
    }

    #[test]
    fn test_beat_period_none_when_both_zero() {
        let cfg = CadenceConfig {
            reissue_every: Duration::ZERO,
            rotate_every: Duration::ZERO,
            ..CadenceConfig::default()
        };
        assert_eq!(cfg.beat_period(), None);
    }

    #[test]
    fn test_whole_periods_truncates() {
        let p = Duration::from_secs(5);
        assert_eq!(whole_periods(Duration::from_secs(4), p), 0);
        assert_eq!(whole_periods(Duration::from_secs(12), p), 2);
    }
}
