//! Cron expression handling.
//!
//! Plugin schedules are the classic five fields (minute granularity); the
//! heartbeat uses six fields for second granularity. The underlying
//! grammar always carries a seconds field, so five-field expressions are
//! normalized by pinning seconds to zero. Descriptors (`@hourly`, ...)
//! pass through untouched.

use std::str::FromStr;

use rand::Rng;

use crate::error::{SchedulerError, SchedulerResult};

/// Parse a 5-field, 6-field, or descriptor schedule.
pub fn parse_schedule(name: &str, expression: &str) -> SchedulerResult<cron::Schedule> {
    let normalized = normalize(expression);
    cron::Schedule::from_str(&normalized).map_err(|e| SchedulerError::ScheduleInvalid {
        name: name.to_string(),
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn normalize(expression: &str) -> String {
    let expression = expression.trim();
    if expression.starts_with('@') {
        return expression.to_string();
    }
    if expression.split_whitespace().count() == 5 {
        return format!("0 {expression}");
    }
    expression.to_string()
}

/// The heartbeat entry: once a minute, at a fixed second offset.
pub fn heartbeat_expression(offset_seconds: u8) -> String {
    format!("{} * * * * *", offset_seconds % 60)
}

/// Pick the per-process heartbeat offset. Chosen once at agent start so a
/// fleet of agents does not heartbeat in one aligned burst.
pub fn random_heartbeat_offset() -> u8 {
    rand::thread_rng().gen_range(0..60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_field_expressions_are_normalized() {
        parse_schedule("p", "* * * * *").unwrap();
        parse_schedule("p", "*/5 * * * *").unwrap();
        parse_schedule("p", "30 4 * * 1-5").unwrap();
    }

    #[test]
    fn test_six_field_expressions_pass_through() {
        parse_schedule("hb", "17 * * * * *").unwrap();
        parse_schedule("p", "0 */2 * * * *").unwrap();
    }

    #[test]
    fn test_descriptors_pass_through() {
        parse_schedule("p", "@hourly").unwrap();
        parse_schedule("p", "@daily").unwrap();
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_schedule("p", "every minute").is_err());
        assert!(parse_schedule("p", "* * *").is_err());
        assert!(parse_schedule("p", "61 * * * * *").is_err());
    }

    #[test]
    fn test_heartbeat_expression_is_valid() {
        for offset in [0u8, 17, 59] {
            let expression = heartbeat_expression(offset);
            parse_schedule("heartbeat", &expression).unwrap();
        }
        assert_eq!(heartbeat_expression(61), "1 * * * * *");
    }

    #[test]
    fn test_random_offset_is_in_range() {
        for _ in 0..100 {
            assert!(random_heartbeat_offset() < 60);
        }
    }
}
