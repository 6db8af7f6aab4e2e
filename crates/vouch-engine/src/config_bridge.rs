//! Bridges from [`vouch_config::Config`] sections into engine types.
//!
//! The engine takes plain config structs at construction; these helpers do
//! the translation once, at the integration boundary, so the config crate
//! stays free of engine dependencies.

use vouch_config::Config;

use crate::creator::{CreatorConfig, MinApprovals};
use crate::ratelimit::{RateLimitAction, RateLimitConfig};
use crate::review::ReviewConfig;

/// Rate limiter settings from the `[rate_limits]` section.
#[must_use]
pub fn to_rate_limit_config(config: &Config) -> RateLimitConfig {
    RateLimitConfig {
        max_pending_per_session: config.rate_limits.max_pending_per_session,
        max_requests_per_minute: config.rate_limits.max_requests_per_minute,
        action: config
            .rate_limits
            .rate_limit_action
            .parse()
            .unwrap_or(RateLimitAction::Reject),
    }
}

/// Creator settings from `[general]` and `[agents]`.
///
/// The request timeout is configured in seconds but consumed in whole
/// minutes, rounded up; a zero or unrepresentable value falls back to
/// thirty minutes.
#[must_use]
pub fn to_creator_config(config: &Config) -> CreatorConfig {
    let mut timeout_minutes =
        i64::try_from(config.general.request_timeout_secs.div_ceil(60)).unwrap_or(30);
    if timeout_minutes <= 0 {
        timeout_minutes = 30;
    }
    CreatorConfig {
        blocked_agents: config.agents.blocked.clone(),
        request_timeout_minutes: timeout_minutes,
        approval_ttl_minutes: config.general.approval_ttl_mins,
        approval_ttl_critical_minutes: config.general.approval_ttl_critical_mins,
        min_approvals: MinApprovals::default(),
    }
}

/// Review settings from `[general]`.
#[must_use]
pub fn to_review_config(config: &Config) -> ReviewConfig {
    ReviewConfig {
        approval_ttl_minutes: config.general.approval_ttl_mins,
        approval_ttl_critical_minutes: config.general.approval_ttl_critical_mins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_config::{GeneralConfig, RateLimitsConfig};

    fn config_with_action(action: &str) -> Config {
        Config {
            rate_limits: RateLimitsConfig {
                rate_limit_action: action.to_string(),
                ..RateLimitsConfig::default()
            },
            ..Config::default()
        }
    }

    fn config_with_general(general: GeneralConfig) -> Config {
        Config {
            general,
            ..Config::default()
        }
    }

    #[test]
    fn test_rate_limit_action_fallback() {
        let config = config_with_action("explode");
        assert_eq!(to_rate_limit_config(&config).action, RateLimitAction::Reject);

        let config = config_with_action("queue");
        assert_eq!(to_rate_limit_config(&config).action, RateLimitAction::Queue);
    }

    #[test]
    fn test_timeout_seconds_round_up() {
        let config = config_with_general(GeneralConfig {
            request_timeout_secs: 90,
            ..GeneralConfig::default()
        });
        assert_eq!(to_creator_config(&config).request_timeout_minutes, 2);

        let config = config_with_general(GeneralConfig {
            request_timeout_secs: 0,
            ..GeneralConfig::default()
        });
        assert_eq!(to_creator_config(&config).request_timeout_minutes, 30);
    }

    #[test]
    fn test_review_ttls() {
        let config = config_with_general(GeneralConfig {
            approval_ttl_mins: 45,
            approval_ttl_critical_mins: 3,
            ..GeneralConfig::default()
        });
        let rc = to_review_config(&config);
        assert_eq!(rc.approval_ttl_minutes, 45);
        assert_eq!(rc.approval_ttl_critical_minutes, 3);
    }
}
