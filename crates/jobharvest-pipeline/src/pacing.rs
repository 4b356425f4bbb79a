//! Request pacing.
//!
//! Computes how long to wait before each request. Regular delays stay inside
//! `[min_delay_ms, max_delay_ms]` and drift towards the upper bound as a
//! session grows longer. Every `break_every` requests a rest break is drawn
//! from the separate break bounds instead. Two further waits sit outside the
//! request schedule: a reading pause after a page is served, scaled by its
//! length, and a long cool-off after a blocked page is skipped. The
//! controller only computes durations; callers do the sleeping.

use jobharvest_core::PacingConfig;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Characters per word when estimating reading time.
const CHARS_PER_WORD: f64 = 5.0;

/// Request counts after which delays are biased further upwards.
const SLOWDOWN_TIERS: [(u64, f64); 3] = [(60, 0.5), (40, 0.35), (20, 0.2)];

/// One scheduled wait, tied to the request it precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    /// Zero-based request index this pause precedes
    pub index: u64,
    /// How long to wait before the request
    pub duration: Duration,
    /// Whether this is a periodic rest break rather than a normal delay
    pub rest_break: bool,
}

/// Computes inter-request delays against a shared request counter.
#[derive(Debug)]
pub struct PacingController {
    config: PacingConfig,
    scheduled: AtomicU64,
}

impl PacingController {
    /// Controller with no requests scheduled yet.
    #[must_use]
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            scheduled: AtomicU64::new(0),
        }
    }

    /// Whether request `index` is preceded by a rest break.
    #[must_use]
    pub fn is_rest_break(&self, index: u64) -> bool {
        self.config.break_every > 0 && index > 0 && index % self.config.break_every == 0
    }

    /// Share of the delay range forced towards the maximum at `index`.
    fn fatigue(index: u64) -> f64 {
        SLOWDOWN_TIERS
            .iter()
            .find(|(threshold, _)| index > *threshold)
            .map_or(0.0, |(_, bias)| *bias)
    }

    /// Delay to apply before request `index`.
    #[must_use]
    pub fn wait_before_next_request(&self, index: u64) -> Duration {
        let mut rng = rand::thread_rng();

        if self.is_rest_break(index) {
            let ms = rng.gen_range(self.config.break_min_ms..=self.config.break_max_ms);
            return Duration::from_millis(ms);
        }

        #[allow(clippy::cast_precision_loss)]
        let (min, max) = (
            self.config.min_delay_ms as f64,
            self.config.max_delay_ms as f64,
        );
        let fatigue = Self::fatigue(index);
        let position = fatigue + (1.0 - fatigue) * rng.gen::<f64>();
        let base = min + (max - min) * position;

        let variance = self.config.human_variance_factor;
        let jitter = if variance > 0.0 {
            base * variance * rng.gen_range(-1.0..=1.0)
        } else {
            0.0
        };

        Duration::from_secs_f64((base + jitter).clamp(min, max) / 1000.0)
    }

    /// Claim the next request slot and compute its pause.
    pub fn next_pause(&self) -> Pause {
        let index = self.scheduled.fetch_add(1, Ordering::SeqCst);
        let rest_break = self.is_rest_break(index);
        let duration = self.wait_before_next_request(index);
        if rest_break {
            tracing::info!(
                request = index,
                seconds = duration.as_secs(),
                "Taking a rest break"
            );
        }
        Pause {
            index,
            duration,
            rest_break,
        }
    }

    /// Pause after reading a page of `content_len` characters.
    ///
    /// Scales with the estimated word count and is clamped into
    /// `[reading_min_ms, reading_max_ms]`. Zero when reading pauses are off.
    #[must_use]
    pub fn reading_time(&self, content_len: usize) -> Duration {
        let wpm = self.config.reading_words_per_minute;
        if wpm == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let ms = content_len as f64 / CHARS_PER_WORD / wpm as f64 * 60_000.0;
        #[allow(clippy::cast_precision_loss)]
        let ms = ms.clamp(
            self.config.reading_min_ms as f64,
            self.config.reading_max_ms as f64,
        );
        Duration::from_secs_f64(ms / 1000.0)
    }

    /// Cool-off before the next request after a blocked page was skipped.
    #[must_use]
    pub fn block_cooldown(&self) -> Duration {
        let ms = rand::thread_rng()
            .gen_range(self.config.block_cooldown_min_ms..=self.config.block_cooldown_max_ms);
        Duration::from_millis(ms)
    }

    /// Number of request slots claimed so far.
    pub fn requests_scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::SeqCst)
    }
}
