//! Text and timestamp formatting for list rows.

use chrono::{DateTime, Utc};

/// Truncate to at most `max` characters, appending `...` when there is
/// room for it.
///
/// Operates on characters, not bytes, so multi-byte input never splits.
#[must_use]
pub fn truncate_runes(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max {
        return s.to_string();
    }
    if max > 3 {
        let mut out: String = s.chars().take(max - 3).collect();
        out.push_str("...");
        out
    } else {
        s.chars().take(max).collect()
    }
}

/// Relative-time label for dashboard rows.
///
/// `None` (never seen) renders as `"never"`; anything under a minute is
/// `"just now"`, then `"5m ago"`, `"3h ago"`, `"2d ago"`.
#[must_use]
pub fn format_time_ago(t: Option<DateTime<Utc>>) -> String {
    format_time_ago_at(t, Utc::now())
}

fn format_time_ago_at(t: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(t) = t else {
        return "never".to_string();
    };
    let elapsed = now.signed_duration_since(t);
    let secs = elapsed.num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let mins = elapsed.num_minutes();
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", elapsed.num_days())
}

/// First eight characters of an id.
#[must_use]
pub fn short_id(id: &str) -> &str {
    let mut end = id.len().min(8);
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    &id[..end]
}

/// Liveness buckets for the agents panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    /// Touched the broker within the last five minutes.
    Active,
    /// Quiet for up to thirty minutes.
    Idle,
    /// Quiet longer than that, or never seen.
    Stale,
}

/// Bucket an agent by its last activity time.
#[must_use]
pub fn classify_agent_status(last_active: Option<DateTime<Utc>>) -> AgentStatus {
    let Some(t) = last_active else {
        return AgentStatus::Stale;
    };
    let mins = Utc::now().signed_duration_since(t).num_minutes();
    if mins < 5 {
        AgentStatus::Active
    } else if mins < 30 {
        AgentStatus::Idle
    } else {
        AgentStatus::Stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_truncate_runes() {
        assert_eq!(truncate_runes("hello", 10), "hello");
        assert_eq!(truncate_runes("hello world", 8), "hello...");
        assert_eq!(truncate_runes("hi", 5), "hi");
        assert_eq!(truncate_runes("abc", 0), "");
        assert_eq!(truncate_runes("abcd", 2), "ab");
    }

    #[test]
    fn test_truncate_runes_multibyte() {
        assert_eq!(truncate_runes("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_format_time_ago() {
        let now = Utc::now();
        assert_eq!(format_time_ago_at(None, now), "never");
        assert_eq!(format_time_ago_at(Some(now), now), "just now");
        assert_eq!(format_time_ago_at(Some(now - Duration::minutes(1)), now), "1m ago");
        assert_eq!(format_time_ago_at(Some(now - Duration::minutes(5)), now), "5m ago");
        assert_eq!(format_time_ago_at(Some(now - Duration::hours(1)), now), "1h ago");
        assert_eq!(format_time_ago_at(Some(now - Duration::hours(3)), now), "3h ago");
        assert_eq!(format_time_ago_at(Some(now - Duration::hours(24)), now), "1d ago");
        assert_eq!(format_time_ago_at(Some(now - Duration::hours(72)), now), "3d ago");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("12345678"), "12345678");
        assert_eq!(short_id("123456789"), "12345678");
        assert_eq!(short_id("abcdefghijklmnop"), "abcdefgh");
    }

    #[test]
    fn test_classify_agent_status() {
        assert_eq!(classify_agent_status(None), AgentStatus::Stale);
        assert_eq!(classify_agent_status(Some(Utc::now())), AgentStatus::Active);
        assert_eq!(
            classify_agent_status(Some(Utc::now() - Duration::minutes(10))),
            AgentStatus::Idle
        );
        assert_eq!(
            classify_agent_status(Some(Utc::now() - Duration::hours(1))),
            AgentStatus::Stale
        );
    }
}
