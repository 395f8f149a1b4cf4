//! Time abstraction so lease expiry and the maintenance pause can be driven
//! deterministically.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wall clock and timer used by the leaser.
pub trait TimeProvider: Send + Sync + 'static {
    /// Current UTC time, used to stamp and age leases.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Pause the maintenance loop for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Real time: chrono for the wall clock, tokio for timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

type SleepHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// Hand-driven clock. `sleep` never waits: it records the requested
/// duration, advances the clock by it, runs the sleep hook (if any) and
/// yields once to the scheduler.
#[derive(Clone)]
pub struct ManualTimeProvider {
    now: Arc<Mutex<DateTime<Utc>>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    on_sleep: Arc<Mutex<Option<SleepHook>>>,
}

impl fmt::Debug for ManualTimeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimeProvider")
            .field("now", &*lock(&self.now))
            .field("sleep_count", &lock(&self.sleeps).len())
            .field("has_sleep_hook", &lock(&self.on_sleep).is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ManualTimeProvider {
    fn default() -> Self {
        Self::new_at(DateTime::<Utc>::default())
    }
}

impl ManualTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            on_sleep: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_utc(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let mut now = lock(&self.now);
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Run `hook` with the requested duration every time the leaser sleeps.
    pub fn on_sleep<F>(&self, hook: F)
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        *lock(&self.on_sleep) = Some(Arc::new(hook));
    }

    /// Every duration passed to `sleep` so far, oldest first.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl TimeProvider for ManualTimeProvider {
    fn utc_now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }

    fn sleep(&self, duration: Duration) -> SleepFuture {
        lock(&self.sleeps).push(duration);
        self.advance(duration);

        let hook = lock(&self.on_sleep).clone();
        if let Some(hook) = hook {
            hook(duration);
        }

        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn manual_sleep_records_and_advances() {
        let clock = ManualTimeProvider::new();
        let start = clock.utc_now();

        clock.sleep(Duration::from_secs(3)).await;
        clock.sleep(Duration::from_millis(500)).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3), Duration::from_millis(500)]
        );
        assert_eq!(
            clock.utc_now() - start,
            chrono::Duration::milliseconds(3_500)
        );
    }

    #[tokio::test]
    async fn sleep_hook_sees_requested_duration() {
        let clock = ManualTimeProvider::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        clock.on_sleep(move |duration| {
            assert_eq!(duration, Duration::from_secs(2));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_utc_overrides_clock() {
        let clock = ManualTimeProvider::new();
        let target = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        clock.set_utc(target);

        assert_eq!(clock.utc_now(), target);
    }

    #[tokio::test]
    async fn system_provider_moves_forward() {
        let provider = SystemTimeProvider;
        let before = provider.utc_now();
        provider.sleep(Duration::from_millis(5)).await;
        assert!(provider.utc_now() >= before);
    }
}
