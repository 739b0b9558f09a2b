//! Proactive token refresh
//!
//! A background task re-evaluates the session on every published change and
//! once per check interval. Each evaluation either cancels, refreshes right
//! away, or arms a single one-shot timer for shortly before expiry. Dropping
//! the [`RefreshScheduler`] aborts the periodic task and any pending timer.

use crate::auth::claims;
use crate::auth::clock::{Clock, SystemClock};
use crate::auth::session::{SessionManager, SessionState};
use crate::configuration::SessionSettings;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What the scheduler needs from a session.
pub trait RefreshTarget: Send + Sync + 'static {
    fn subscribe(&self) -> watch::Receiver<SessionState>;
    fn is_authenticated(&self) -> bool;
    fn access_token(&self) -> Option<String>;
    fn has_refresh_token(&self) -> bool;
    fn trigger_refresh(&self) -> impl Future<Output = ()> + Send;
}

impl RefreshTarget for SessionManager {
    fn subscribe(&self) -> watch::Receiver<SessionState> {
        SessionManager::subscribe(self)
    }

    fn is_authenticated(&self) -> bool {
        SessionManager::is_authenticated(self)
    }

    fn access_token(&self) -> Option<String> {
        SessionManager::access_token(self)
    }

    fn has_refresh_token(&self) -> bool {
        self.tokens().has_refresh_token()
    }

    async fn trigger_refresh(&self) {
        if let Err(e) = self.refresh().await {
            tracing::debug!(error = %e, "Scheduled refresh did not complete");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTiming {
    /// Tokens with less than this left are refreshed immediately.
    pub window: chrono::Duration,
    /// The one-shot fires this long before expiry.
    pub lead: chrono::Duration,
    pub check_interval: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for RefreshTiming {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            window: chrono::Duration::seconds(settings.expiring_soon_window_secs),
            lead: chrono::Duration::seconds(settings.refresh_lead_secs),
            check_interval: Duration::from_secs(settings.check_interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    Idle,
    RefreshNow,
    RefreshIn(Duration),
}

/// Decide what to do for the current session snapshot.
pub fn plan_refresh(
    authenticated: bool,
    has_refresh_token: bool,
    token: Option<&str>,
    now: DateTime<Utc>,
    timing: &RefreshTiming,
) -> RefreshPlan {
    if !authenticated || !has_refresh_token {
        return RefreshPlan::Idle;
    }

    if claims::is_expiring_soon_at(token, timing.window, now) {
        return RefreshPlan::RefreshNow;
    }

    let remaining = match token
        .and_then(claims::decode)
        .and_then(|c| c.millis_until_expiry(now))
    {
        Some(remaining) => remaining,
        None => return RefreshPlan::RefreshNow,
    };

    let delay = remaining.saturating_sub(timing.lead.num_milliseconds());
    if delay <= 0 {
        RefreshPlan::RefreshNow
    } else {
        RefreshPlan::RefreshIn(Duration::from_millis(delay as u64))
    }
}

/// Holds at most one pending timer task.
#[derive(Default)]
struct OneShot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OneShot {
    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `task` after `delay`, aborting whatever was armed before.
    fn arm<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let next = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        if let Some(previous) = self.lock().replace(next) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        if let Some(previous) = self.lock().take() {
            previous.abort();
        }
    }

    fn is_pending(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

#[derive(Default)]
struct Shared {
    one_shot: OneShot,
    refreshing: AtomicBool,
}

// Clears the in-flight flag even if the refresh future is dropped.
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.refreshing.store(false, Ordering::Release);
    }
}

/// Runs a refresh unless one started by the scheduler is still in flight.
async fn run_refresh<T: RefreshTarget>(target: Arc<T>, shared: Arc<Shared>) {
    if shared.refreshing.swap(true, Ordering::AcqRel) {
        tracing::debug!("Refresh already in flight, skipping");
        return;
    }
    let _in_flight = InFlight(Arc::clone(&shared));
    target.trigger_refresh().await;
}

fn evaluate<T: RefreshTarget>(
    target: &Arc<T>,
    shared: &Arc<Shared>,
    clock: &dyn Clock,
    timing: &RefreshTiming,
) {
    let token = target.access_token();
    let plan = plan_refresh(
        target.is_authenticated(),
        target.has_refresh_token(),
        token.as_deref(),
        clock.now(),
        timing,
    );

    match plan {
        RefreshPlan::Idle => shared.one_shot.cancel(),
        RefreshPlan::RefreshNow => {
            shared.one_shot.cancel();
            tracing::debug!("Access token expiring soon, refreshing now");
            tokio::spawn(run_refresh(Arc::clone(target), Arc::clone(shared)));
        }
        RefreshPlan::RefreshIn(delay) => {
            let target = Arc::clone(target);
            let detached = Arc::clone(shared);
            shared.one_shot.arm(delay, async move {
                // Detached: re-arming must not cancel a refresh mid-request.
                tokio::spawn(run_refresh(target, detached));
            });
        }
    }
}

pub struct RefreshScheduler {
    periodic: JoinHandle<()>,
    shared: Arc<Shared>,
}

impl RefreshScheduler {
    pub fn start<T: RefreshTarget>(target: Arc<T>, timing: RefreshTiming) -> Self {
        Self::start_with_clock(target, timing, Arc::new(SystemClock))
    }

    pub fn start_with_clock<T: RefreshTarget>(
        target: Arc<T>,
        timing: RefreshTiming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let mut changes = target.subscribe();
        let loop_shared = Arc::clone(&shared);

        let periodic = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timing.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = changes.changed() => {
                        if changed.is_err() {
                            loop_shared.one_shot.cancel();
                            return;
                        }
                    }
                }
                evaluate(&target, &loop_shared, clock.as_ref(), &timing);
            }
        });

        tracing::debug!(
            check_interval_secs = timing.check_interval.as_secs(),
            "Refresh scheduler started"
        );
        Self { periodic, shared }
    }

    /// Whether a one-shot refresh timer is armed and has not fired yet.
    pub fn has_pending_refresh(&self) -> bool {
        self.shared.one_shot.is_pending()
    }

    pub fn shutdown(self) {}
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.periodic.abort();
        self.shared.one_shot.cancel();
        tracing::debug!("Refresh scheduler stopped");
    }
}
