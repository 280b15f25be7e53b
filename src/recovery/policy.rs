use serde::Deserialize;
use std::time::Duration;

/// Exponential backoff schedule for bundle retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Delay before the first retry
  pub base_ms: u64,
  /// Multiplier applied per attempt
  pub factor: u32,
  /// Automatic retries before the fallback is shown
  pub max_retries: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      base_ms: 1000,
      factor: 2,
      max_retries: 3,
    }
  }
}

impl RetryPolicy {
  /// Delay before retry number `attempt` (zero-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    let multiplier = u64::from(self.factor).saturating_pow(attempt);
    Duration::from_millis(self.base_ms.saturating_mul(multiplier))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_schedule_is_one_two_four_seconds() {
    let policy = RetryPolicy::default();
    let delays: Vec<u64> = (0..policy.max_retries)
      .map(|n| policy.delay(n).as_millis() as u64)
      .collect();
    assert_eq!(delays, vec![1000, 2000, 4000]);
  }

  #[test]
  fn delay_saturates() {
    let policy = RetryPolicy {
      base_ms: u64::MAX / 2,
      factor: 10,
      max_retries: 3,
    };
    assert_eq!(policy.delay(5), Duration::from_millis(u64::MAX));
  }

  #[test]
  fn partial_yaml_keeps_defaults() {
    let policy: RetryPolicy = serde_yaml::from_str("max_retries: 5").unwrap();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.base_ms, 1000);
  }
}
