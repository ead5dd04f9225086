use chrono::{DateTime, Utc};

/// Whole minutes elapsed between `at` and `now`.
pub fn age_minutes(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - at).num_minutes()
}

/// Format the age of a timestamp as "just now", "5m ago", "2h ago" or "3d ago".
pub fn age_display(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = age_minutes(at, now);
    if minutes < 1 {
        // Clock skew lands here too
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_age_display_just_now() {
        let now = Utc::now();
        assert_eq!(age_display(now, now), "just now");
        assert_eq!(age_display(now + Duration::minutes(5), now), "just now");
    }

    #[test]
    fn test_age_display_rounding() {
        let now = Utc::now();
        assert_eq!(age_display(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(age_display(now - Duration::minutes(89), now), "1h ago");
        assert_eq!(age_display(now - Duration::minutes(90), now), "2h ago");
        assert_eq!(age_display(now - Duration::hours(36), now), "2d ago");
        assert_eq!(age_display(now - Duration::hours(30), now), "1d ago");
    }
}
