//! Pure transition function for the token lifecycle.
//!
//! The driver feeds events in and performs the returned effects; nothing here
//! touches timers or the network.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{AccessToken, RefreshToken, TokenPair};

/// Fixed timing policy for the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifecycleConfig {
    /// How long before expiry the access token is refreshed.
    pub refresh_margin: Duration,
    /// Delay between failed login attempts.
    pub retry_delay: Duration,
}

impl Default for TokenLifecycleConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(90),
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// Lifecycle state of one manager instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Not started.
    Idle,
    /// Login in flight or waiting to retry; no token held.
    Fetching,
    /// Token held with a refresh timer armed.
    ActiveScheduled {
        /// Current tokens.
        tokens: TokenPair,
    },
    /// Refresh in flight; the previous access token is still served.
    Refreshing {
        /// Tokens being refreshed.
        tokens: TokenPair,
    },
    /// Terminal for this instance.
    Aborted,
}

impl AuthState {
    /// Access token callers may use in this state.
    pub fn access_token(&self) -> Option<&AccessToken> {
        match self {
            Self::ActiveScheduled { tokens } | Self::Refreshing { tokens } => Some(&tokens.access),
            Self::Idle | Self::Fetching | Self::Aborted => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::ActiveScheduled { .. } => "active_scheduled",
            Self::Refreshing { .. } => "refreshing",
            Self::Aborted => "aborted",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Process start or restart.
    Start,
    /// Login returned tokens.
    LoginSucceeded(TokenPair),
    /// Login failed.
    LoginFailed,
    /// The retry delay elapsed.
    RetryElapsed,
    /// The refresh timer fired.
    RefreshDue,
    /// Refresh returned tokens.
    RefreshSucceeded(TokenPair),
    /// Refresh failed.
    RefreshFailed,
    /// Explicit reset or shutdown.
    Abort,
}

/// Work the driver performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEffect {
    /// Call the login endpoint.
    Login,
    /// Arm a retry timer.
    ScheduleRetry(Duration),
    /// Arm the refresh timer.
    ScheduleRefresh(Duration),
    /// Call the refresh endpoint.
    Refresh(RefreshToken),
    /// Cancel every pending timer of the instance.
    CancelTimers,
}

/// Next state plus the effects to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the event.
    pub state: AuthState,
    /// Effects in the order they should run.
    pub effects: Vec<AuthEffect>,
}

impl Transition {
    fn to(state: AuthState, effects: Vec<AuthEffect>) -> Option<Self> {
        Some(Self { state, effects })
    }
}

/// Delay before refreshing a token expiring at `expires_at`.
///
/// Zero when the token has expired or is already inside the margin.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> Duration {
    (expires_at - now)
        .to_std()
        .map_or(Duration::ZERO, |remaining| remaining.saturating_sub(margin))
}

/// Apply `event` to `state`.
///
/// Returns `None` when the event does not apply to the state, which the
/// driver treats as a stale callback and ignores.
pub fn transition(
    state: &AuthState,
    event: AuthEvent,
    now: DateTime<Utc>,
    config: &TokenLifecycleConfig,
) -> Option<Transition> {
    match (state, event) {
        (AuthState::Aborted, _) => None,
        (_, AuthEvent::Abort) => Transition::to(AuthState::Aborted, vec![AuthEffect::CancelTimers]),
        (AuthState::Idle, AuthEvent::Start) | (AuthState::Fetching, AuthEvent::RetryElapsed) => {
            Transition::to(AuthState::Fetching, vec![AuthEffect::Login])
        }
        (AuthState::Fetching, AuthEvent::LoginFailed) => Transition::to(
            AuthState::Fetching,
            vec![AuthEffect::ScheduleRetry(config.retry_delay)],
        ),
        (AuthState::Fetching, AuthEvent::LoginSucceeded(tokens))
        | (AuthState::Refreshing { .. }, AuthEvent::RefreshSucceeded(tokens)) => {
            let delay = refresh_delay(tokens.expires_at, now, config.refresh_margin);
            Transition::to(
                AuthState::ActiveScheduled { tokens },
                vec![AuthEffect::ScheduleRefresh(delay)],
            )
        }
        (AuthState::ActiveScheduled { tokens }, AuthEvent::RefreshDue) => Transition::to(
            AuthState::Refreshing {
                tokens: tokens.clone(),
            },
            vec![AuthEffect::Refresh(tokens.refresh.clone())],
        ),
        (AuthState::Refreshing { .. }, AuthEvent::RefreshFailed) => {
            Transition::to(AuthState::Fetching, vec![AuthEffect::Login])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 8, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[fixture]
    fn config() -> TokenLifecycleConfig {
        TokenLifecycleConfig::default()
    }

    fn tokens(expires_at: DateTime<Utc>) -> TokenPair {
        TokenPair {
            access: AccessToken::new("access"),
            refresh: RefreshToken::new("refresh"),
            expires_at,
        }
    }

    #[rstest]
    fn start_triggers_login(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        let next = transition(&AuthState::Idle, AuthEvent::Start, now, &config).expect("applies");
        assert_eq!(next.state, AuthState::Fetching);
        assert_eq!(next.effects, vec![AuthEffect::Login]);
    }

    #[rstest]
    fn login_failure_schedules_fixed_retry(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        let next = transition(&AuthState::Fetching, AuthEvent::LoginFailed, now, &config)
            .expect("applies");
        assert_eq!(next.state, AuthState::Fetching);
        assert_eq!(
            next.effects,
            vec![AuthEffect::ScheduleRetry(Duration::from_secs(3))]
        );
    }

    #[rstest]
    fn login_success_arms_refresh_before_expiry(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        let pair = tokens(now + chrono::Duration::minutes(5));
        let next = transition(
            &AuthState::Fetching,
            AuthEvent::LoginSucceeded(pair.clone()),
            now,
            &config,
        )
        .expect("applies");
        assert_eq!(next.state, AuthState::ActiveScheduled { tokens: pair });
        assert_eq!(
            next.effects,
            vec![AuthEffect::ScheduleRefresh(Duration::from_secs(210))]
        );
    }

    #[rstest]
    #[case::already_expired(-30, 0)]
    #[case::inside_margin(60, 0)]
    #[case::at_margin(90, 0)]
    #[case::beyond_margin(100, 10)]
    fn refresh_delay_clamps_to_zero(
        now: DateTime<Utc>,
        #[case] expires_in_secs: i64,
        #[case] expected_secs: u64,
    ) {
        let delay = refresh_delay(
            now + chrono::Duration::seconds(expires_in_secs),
            now,
            Duration::from_secs(90),
        );
        assert_eq!(delay, Duration::from_secs(expected_secs));
    }

    #[rstest]
    fn refresh_keeps_serving_previous_token(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        let pair = tokens(now);
        let active = AuthState::ActiveScheduled {
            tokens: pair.clone(),
        };
        let next = transition(&active, AuthEvent::RefreshDue, now, &config).expect("applies");
        assert_eq!(next.state.access_token(), Some(&pair.access));
        assert_eq!(next.effects, vec![AuthEffect::Refresh(pair.refresh)]);
    }

    #[rstest]
    fn refresh_failure_falls_back_to_login(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        let refreshing = AuthState::Refreshing {
            tokens: tokens(now),
        };
        let next =
            transition(&refreshing, AuthEvent::RefreshFailed, now, &config).expect("applies");
        assert_eq!(next.state, AuthState::Fetching);
        assert!(next.state.access_token().is_none());
        assert_eq!(next.effects, vec![AuthEffect::Login]);
    }

    #[rstest]
    #[case::idle(AuthState::Idle)]
    #[case::fetching(AuthState::Fetching)]
    fn abort_cancels_timers_from_any_live_state(
        now: DateTime<Utc>,
        config: TokenLifecycleConfig,
        #[case] state: AuthState,
    ) {
        let next = transition(&state, AuthEvent::Abort, now, &config).expect("applies");
        assert_eq!(next.state, AuthState::Aborted);
        assert_eq!(next.effects, vec![AuthEffect::CancelTimers]);
    }

    #[rstest]
    fn aborted_instance_ignores_late_results(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        let late = AuthEvent::LoginSucceeded(tokens(now));
        assert!(transition(&AuthState::Aborted, late, now, &config).is_none());
        assert!(transition(&AuthState::Aborted, AuthEvent::Abort, now, &config).is_none());
    }

    #[rstest]
    fn mismatched_events_are_ignored(now: DateTime<Utc>, config: TokenLifecycleConfig) {
        assert!(transition(&AuthState::Fetching, AuthEvent::RefreshDue, now, &config).is_none());
        assert!(transition(&AuthState::Idle, AuthEvent::RetryElapsed, now, &config).is_none());
    }
}
