use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current timestamp in microseconds since the epoch.
pub fn timestamp_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Timestamp rendered as a decimal string, as carried inside tokens.
pub fn timestamp_string() -> String {
    timestamp_micros().to_string()
}

/// Random alphanumeric string, used for activity ids.
pub fn gen_random_str(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let t1 = timestamp_micros();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let t2 = timestamp_micros();
        assert!(t2 > t1);
    }

    #[test]
    fn test_random_str_length_and_charset() {
        let s = gen_random_str(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
