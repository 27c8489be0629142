//! Rate-Limit Governor
//!
//! Tracks rolling RPM/TPM windows and the provider's daily request ceiling,
//! with safety margins, and paces all concurrent embedding tasks through a
//! single shared instance. Counters are tiny and live behind a plain mutex;
//! FIFO servicing of concurrent callers comes from the fairness of the
//! async acquire queue.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ModelProfile;

/// Shrink applied to the minute windows to leave headroom for estimation error.
const RPM_SAFETY: f64 = 0.9;
const TPM_SAFETY: f64 = 0.9;
/// The daily window gets a tighter margin; blowing it locks the key out for a day.
const RPD_SAFETY: f64 = 0.95;

const WINDOW: Duration = Duration::from_secs(60);

/// Token proxy when no true tokenizer is available. Over-estimation is
/// preferred; TPM is rarely the binding constraint.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

#[derive(Debug, PartialEq)]
pub enum Reservation {
    Granted,
    Wait(Duration),
}

struct Windows {
    window_start: Instant,
    requests_this_minute: u32,
    tokens_this_minute: u64,
    /// Local date string; the daily window resets at local midnight.
    day: String,
    requests_today: u64,
    last_grant_at: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub requests_this_minute: u32,
    pub tokens_this_minute: u64,
    pub requests_today: u64,
    pub rpm_limit: u32,
    pub tpm_limit: u64,
    pub rpd_limit: Option<u32>,
    pub window_seconds_remaining: u64,
}

pub struct RateGovernor {
    rpm_limit: u32,
    tpm_limit: u64,
    rpd_limit: Option<u32>,
    windows: Mutex<Windows>,
    /// Concurrent embedding tasks queue here; tokio mutexes are FIFO-fair,
    /// so the first caller to wait sees the first opening.
    queue: tokio::sync::Mutex<()>,
}

fn local_day() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Duration until the next local midnight.
fn until_local_midnight() -> Duration {
    let now = chrono::Local::now();
    let tomorrow = now.date_naive() + chrono::Days::new(1);
    let midnight = tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    let remaining = midnight - now.naive_local();
    remaining.to_std().unwrap_or(Duration::from_secs(60))
}

impl RateGovernor {
    pub fn new(profile: &ModelProfile) -> Self {
        Self {
            rpm_limit: profile.rpm_limit,
            tpm_limit: profile.tpm_limit,
            rpd_limit: profile.rpd_limit,
            windows: Mutex::new(Windows {
                window_start: Instant::now(),
                requests_this_minute: 0,
                tokens_this_minute: 0,
                day: local_day(),
                requests_today: 0,
                last_grant_at: None,
            }),
            queue: tokio::sync::Mutex::new(()),
        }
    }

    /// Minimum safe gap between successive grants, smoothing bursts across
    /// the minute window.
    fn spacing(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.rpm_limit as f64 * RPM_SAFETY))
    }

    fn roll(&self, w: &mut Windows) {
        let now = Instant::now();
        if now.duration_since(w.window_start) >= WINDOW {
            w.window_start = now;
            w.requests_this_minute = 0;
            w.tokens_this_minute = 0;
        }
        let today = local_day();
        if w.day != today {
            w.day = today;
            w.requests_today = 0;
        }
    }

    /// Non-blocking check. Granted marks the grant instant for spacing;
    /// Wait carries the duration the caller must sleep before retrying.
    pub fn reserve(&self, estimated_tokens: u64) -> Reservation {
        let mut w = self.windows.lock();
        self.roll(&mut w);

        let window_remaining = WINDOW
            .checked_sub(w.window_start.elapsed())
            .unwrap_or(Duration::ZERO);

        let rpm_cap = (self.rpm_limit as f64 * RPM_SAFETY).floor() as u32;
        if w.requests_this_minute + 1 > rpm_cap {
            return Reservation::Wait(window_remaining.max(Duration::from_millis(50)));
        }

        let tpm_cap = (self.tpm_limit as f64 * TPM_SAFETY) as u64;
        if w.tokens_this_minute + estimated_tokens > tpm_cap {
            return Reservation::Wait(window_remaining.max(Duration::from_millis(50)));
        }

        if let Some(rpd) = self.rpd_limit {
            let rpd_cap = (rpd as f64 * RPD_SAFETY).floor() as u64;
            if w.requests_today + 1 > rpd_cap {
                debug!(requests_today = w.requests_today, "daily request ceiling reached");
                return Reservation::Wait(until_local_midnight());
            }
        }

        if let Some(last) = w.last_grant_at {
            let since = last.elapsed();
            let spacing = self.spacing();
            if since < spacing {
                return Reservation::Wait(spacing - since);
            }
        }

        w.last_grant_at = Some(Instant::now());
        Reservation::Granted
    }

    /// Block until a reservation is granted. Callers are serviced in FIFO
    /// order; the wait loop is hidden here.
    pub async fn acquire(&self, estimated_tokens: u64) {
        let _turn = self.queue.lock().await;
        loop {
            match self.reserve(estimated_tokens) {
                Reservation::Granted => return,
                Reservation::Wait(d) => tokio::time::sleep(d).await,
            }
        }
    }

    /// Record a completed request's usage into the current windows.
    pub fn record(&self, actual_tokens: u64) {
        let mut w = self.windows.lock();
        self.roll(&mut w);
        w.requests_this_minute += 1;
        w.tokens_this_minute += actual_tokens;
        w.requests_today += 1;
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        let mut w = self.windows.lock();
        self.roll(&mut w);
        QuotaSnapshot {
            requests_this_minute: w.requests_this_minute,
            tokens_this_minute: w.tokens_this_minute,
            requests_today: w.requests_today,
            rpm_limit: self.rpm_limit,
            tpm_limit: self.tpm_limit,
            rpd_limit: self.rpd_limit,
            window_seconds_remaining: WINDOW
                .checked_sub(w.window_start.elapsed())
                .unwrap_or(Duration::ZERO)
                .as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model_profile;

    fn governor(rpm: u32, tpm: u64, rpd: Option<u32>) -> RateGovernor {
        let mut profile = model_profile("text-embedding-004").unwrap();
        profile.rpm_limit = rpm;
        profile.tpm_limit = tpm;
        profile.rpd_limit = rpd;
        RateGovernor::new(&profile)
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn first_reservation_is_granted() {
        let g = governor(60, 10_000, None);
        assert_eq!(g.reserve(100), Reservation::Granted);
    }

    #[test]
    fn consecutive_grants_are_spaced() {
        let g = governor(60, 10_000, None);
        assert_eq!(g.reserve(10), Reservation::Granted);
        // 60 / (60 * 0.9) ≈ 1.11s spacing; an immediate retry must wait.
        match g.reserve(10) {
            Reservation::Wait(d) => assert!(d > Duration::from_millis(500)),
            Reservation::Granted => panic!("second grant was not spaced"),
        }
    }

    #[test]
    fn rpm_window_blocks_at_safety_margin() {
        let g = governor(60, 1_000_000, None);
        // floor(60 * 0.9) = 54 requests fit in the window.
        for _ in 0..54 {
            g.record(1);
        }
        assert!(matches!(g.reserve(1), Reservation::Wait(_)));
    }

    #[test]
    fn tpm_window_blocks_on_estimated_tokens() {
        let g = governor(10_000, 1000, None);
        g.record(850);
        // 850 + 100 > 1000 * 0.9
        assert!(matches!(g.reserve(100), Reservation::Wait(_)));
    }

    #[test]
    fn daily_ceiling_waits_until_midnight() {
        let g = governor(10_000, 1_000_000, Some(10));
        // floor(10 * 0.95) = 9 requests per day.
        for _ in 0..9 {
            g.record(1);
        }
        match g.reserve(1) {
            Reservation::Wait(d) => assert!(d > Duration::from_secs(1)),
            Reservation::Granted => panic!("daily ceiling not enforced"),
        }
    }

    #[test]
    fn minute_window_resets_after_expiry() {
        let g = governor(60, 1000, None);
        for _ in 0..54 {
            g.record(10);
        }
        {
            let mut w = g.windows.lock();
            w.window_start = Instant::now() - Duration::from_secs(61);
            w.last_grant_at = None;
        }
        assert_eq!(g.reserve(10), Reservation::Granted);
        let snap = g.snapshot();
        assert_eq!(snap.requests_this_minute, 0);
    }

    #[test]
    fn day_rollover_clears_daily_counter() {
        let g = governor(10_000, 1_000_000, Some(10));
        {
            let mut w = g.windows.lock();
            w.day = "2000-01-01".to_string();
            w.requests_today = 9;
        }
        assert_eq!(g.reserve(1), Reservation::Granted);
        assert_eq!(g.snapshot().requests_today, 0);
    }

    #[test]
    fn no_daily_limit_skips_the_check() {
        let g = governor(10_000, 1_000_000, None);
        {
            let mut w = g.windows.lock();
            w.requests_today = 1_000_000;
            w.last_grant_at = None;
        }
        assert_eq!(g.reserve(1), Reservation::Granted);
    }
}
