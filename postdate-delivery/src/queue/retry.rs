//! Retry logic with exponential backoff

use rand::Rng;

/// Calculate the delay before the next retry using exponential backoff with
/// jitter.
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `attempt` - The attempt number (1-indexed)
/// * `base_delay_ms` - Base delay in milliseconds (e.g., 1000 for 1 second)
/// * `max_delay_ms` - Maximum delay in milliseconds
/// * `jitter_factor` - Jitter factor (e.g., 0.2 for ±20%)
///
/// # Returns
/// Delay in milliseconds until the retry should run
#[must_use]
pub fn backoff_delay_ms(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> u64 {
    // Calculate exponential backoff: base * 2^(attempt - 1)
    // Use saturating operations to prevent overflow
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        // 2^63 would overflow, use max_delay directly
        max_delay_ms
    } else {
        let multiplier = 1u64 << exponent; // 2^exponent
        base_delay_ms.saturating_mul(multiplier).min(max_delay_ms)
    };

    // Apply jitter: delay * (1 ± jitter_factor)
    // Intentional precision loss and casting for randomization
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    {
        let jitter_range = (delay as f64) * jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        ((delay as f64) + jitter).max(0.0) as u64
    }
}
