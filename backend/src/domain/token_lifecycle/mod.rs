//! Keeps one valid LIMS bearer token available for outbound calls.
//!
//! The manager drives the pure [`machine::transition`] function. Each start
//! creates a new instance tagged with a generation number; login, refresh, and
//! timer callbacks carry the generation they were issued under and are
//! dropped if a newer instance has replaced theirs. Resetting after a 401
//! aborts the current instance (cancelling its timers) and starts a fresh
//! one, so no state is ever patched in place.

use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mockable::Clock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::AccessToken;
use crate::domain::ports::{BearerTokenProvider, LimsAuthSource};
use crate::domain::scheduling::Sleeper;

mod machine;

pub use machine::{
    AuthEffect, AuthEvent, AuthState, TokenLifecycleConfig, Transition, refresh_delay, transition,
};

struct Instance {
    generation: u64,
    state: AuthState,
    timers: Vec<JoinHandle<()>>,
}

impl Instance {
    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

struct Shared {
    source: Arc<dyn LimsAuthSource>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    config: TokenLifecycleConfig,
    generations: AtomicU64,
    active: Mutex<Option<Instance>>,
    token_ready: Notify,
}

/// Owner of the LIMS session.
///
/// Cloning yields another handle on the same session.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    shared: Arc<Shared>,
}

impl TokenLifecycleManager {
    /// Build a stopped manager.
    pub fn new(
        source: Arc<dyn LimsAuthSource>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        config: TokenLifecycleConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                clock,
                sleeper,
                config,
                generations: AtomicU64::new(0),
                active: Mutex::new(None),
                token_ready: Notify::new(),
            }),
        }
    }

    /// Start fetching a token. Does nothing if an instance is already running.
    pub fn start(&self) {
        let mut active = self.shared.lock_active();
        let running = active
            .as_ref()
            .is_some_and(|instance| instance.state != AuthState::Aborted);
        if running {
            debug!("token lifecycle already running");
            return;
        }
        Shared::launch(&self.shared, &mut active);
    }

    /// Abort the running instance and cancel its timers.
    pub fn stop(&self) {
        let mut active = self.shared.lock_active();
        if let Some(mut instance) = active.take() {
            instance.cancel_timers();
            info!(generation = instance.generation, "token lifecycle stopped");
        }
    }

    /// Current access token, or `None` while none is held. Never blocks on I/O.
    pub fn token(&self) -> Option<AccessToken> {
        self.shared
            .lock_active()
            .as_ref()
            .and_then(|instance| instance.state.access_token().cloned())
    }

    /// Wait until a token is held and return it.
    ///
    /// Resolves immediately when a token is already available. Callers bound
    /// the wait themselves, since a failing login retries indefinitely.
    pub async fn wait_for_token(&self) -> AccessToken {
        loop {
            let mut notified = pin!(self.shared.token_ready.notified());
            notified.as_mut().enable();
            if let Some(token) = self.token() {
                return token;
            }
            notified.await;
        }
    }

    /// Discard the current token and restart from a fresh login.
    ///
    /// Ignored while the manager is stopped.
    pub fn reset(&self) {
        let mut active = self.shared.lock_active();
        let Some(current) = active.as_ref().map(|instance| instance.generation) else {
            debug!("reset ignored while stopped");
            return;
        };
        self.shared.apply(&mut active, current, AuthEvent::Abort);
        info!(generation = current, "token lifecycle reset");
        Shared::launch(&self.shared, &mut active);
    }

    /// State of the running instance, for diagnostics.
    pub fn state_label(&self) -> &'static str {
        self.shared
            .lock_active()
            .as_ref()
            .map_or("stopped", |instance| instance.state.label())
    }
}

impl BearerTokenProvider for TokenLifecycleManager {
    fn current_token(&self) -> Option<AccessToken> {
        self.token()
    }

    fn report_unauthorized(&self) {
        warn!("LIMS rejected the bearer token; restarting authentication");
        self.reset();
    }
}

impl Shared {
    fn lock_active(&self) -> MutexGuard<'_, Option<Instance>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launch(this: &Arc<Self>, active: &mut Option<Instance>) {
        let generation = this.generations.fetch_add(1, Ordering::SeqCst) + 1;
        *active = Some(Instance {
            generation,
            state: AuthState::Idle,
            timers: Vec::new(),
        });
        info!(generation, "token lifecycle started");
        this.apply_spawning(active, generation, AuthEvent::Start);
    }

    fn dispatch(this: &Arc<Self>, generation: u64, event: AuthEvent) {
        let mut active = this.lock_active();
        this.apply_spawning(&mut active, generation, event);
    }

    /// Apply an event whose effects never spawn work.
    fn apply(&self, active: &mut Option<Instance>, generation: u64, event: AuthEvent) {
        let Some(instance) = active.as_mut() else {
            return;
        };
        if let Some(next) = self.advance(instance, generation, event) {
            for effect in next {
                if effect == AuthEffect::CancelTimers {
                    instance.cancel_timers();
                }
            }
        }
    }

    fn apply_spawning(
        self: &Arc<Self>,
        active: &mut Option<Instance>,
        generation: u64,
        event: AuthEvent,
    ) {
        let Some(instance) = active.as_mut() else {
            debug!(generation, "dropping event for stopped token lifecycle");
            return;
        };
        let Some(effects) = self.advance(instance, generation, event) else {
            return;
        };
        for effect in effects {
            self.perform(instance, effect);
        }
    }

    fn advance(
        &self,
        instance: &mut Instance,
        generation: u64,
        event: AuthEvent,
    ) -> Option<Vec<AuthEffect>> {
        if instance.generation != generation {
            debug!(
                generation,
                active_generation = instance.generation,
                "dropping stale token lifecycle event"
            );
            return None;
        }
        let now = self.clock.utc();
        let from = instance.state.label();
        let Some(Transition { state, effects }) =
            transition(&instance.state, event, now, &self.config)
        else {
            debug!(generation, state = from, "token lifecycle event not applicable");
            return None;
        };
        debug!(generation, from, to = state.label(), "token lifecycle transition");
        instance.state = state;
        if instance.state.access_token().is_some() {
            self.token_ready.notify_waiters();
        }
        Some(effects)
    }

    fn perform(self: &Arc<Self>, instance: &mut Instance, effect: AuthEffect) {
        let generation = instance.generation;
        match effect {
            AuthEffect::Login => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match this.source.login().await {
                        Ok(tokens) => {
                            info!(
                                generation,
                                expires_at = %tokens.expires_at,
                                "LIMS login succeeded"
                            );
                            Self::dispatch(&this, generation, AuthEvent::LoginSucceeded(tokens));
                        }
                        Err(err) => {
                            warn!(generation, error = %err, "LIMS login failed");
                            Self::dispatch(&this, generation, AuthEvent::LoginFailed);
                        }
                    }
                });
            }
            AuthEffect::Refresh(refresh) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match this.source.refresh(&refresh).await {
                        Ok(tokens) => {
                            debug!(
                                generation,
                                expires_at = %tokens.expires_at,
                                "LIMS token refreshed"
                            );
                            Self::dispatch(&this, generation, AuthEvent::RefreshSucceeded(tokens));
                        }
                        Err(err) => {
                            warn!(
                                generation,
                                error = %err,
                                "LIMS token refresh failed; logging in again"
                            );
                            Self::dispatch(&this, generation, AuthEvent::RefreshFailed);
                        }
                    }
                });
            }
            AuthEffect::ScheduleRetry(delay) => {
                debug!(generation, delay_secs = delay.as_secs(), "scheduling login retry");
                self.arm_timer(instance, delay, AuthEvent::RetryElapsed);
            }
            AuthEffect::ScheduleRefresh(delay) => {
                debug!(generation, delay_secs = delay.as_secs(), "scheduling token refresh");
                self.arm_timer(instance, delay, AuthEvent::RefreshDue);
            }
            AuthEffect::CancelTimers => instance.cancel_timers(),
        }
    }

    fn arm_timer(
        self: &Arc<Self>,
        instance: &mut Instance,
        delay: std::time::Duration,
        event: AuthEvent,
    ) {
        instance.timers.retain(|timer| !timer.is_finished());
        let generation = instance.generation;
        let this = Arc::clone(self);
        instance.timers.push(tokio::spawn(async move {
            this.sleeper.sleep(delay).await;
            Self::dispatch(&this, generation, event);
        }));
    }
}
