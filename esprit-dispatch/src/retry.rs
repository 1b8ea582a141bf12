/// Backoff delay for retryable failures per spec §4.4 step 3:
/// `min(10, 2 * 2^attempt)` seconds.
pub fn backoff_seconds(attempt: u32) -> f64 {
    let delay = 2.0 * 2f64.powi(attempt as i32);
    delay.min(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped_at_ten_seconds() {
        assert_eq!(backoff_seconds(0), 2.0);
        assert_eq!(backoff_seconds(1), 4.0);
        assert_eq!(backoff_seconds(2), 8.0);
        assert_eq!(backoff_seconds(3), 10.0);
        assert_eq!(backoff_seconds(10), 10.0);
    }
}
