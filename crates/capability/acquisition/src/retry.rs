//! 连接重试延时策略。

use std::time::Duration;

/// 重试延时策略抽象。
pub trait RetryPolicy: Send + Sync {
    /// 第 `attempt` 次连续连接失败后（从 1 开始）的等待时长。
    fn delay(&self, attempt: u32) -> Duration;
}

/// 固定延时。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// 指数退避：`initial * factor^(attempt-1)`，不超过 `max`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 { factor } else { 1.0 };
        Self {
            initial,
            max: max.max(initial),
            factor,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_ignores_attempt() {
        let policy = FixedDelay::new(Duration::from_secs(60));
        assert_eq!(policy.delay(1), Duration::from_secs(60));
        assert_eq!(policy.delay(100), Duration::from_secs(60));
    }

    #[test]
    fn exponential_doubles_until_cap() {
        let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10), 2.0);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(10));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn shrinking_factor_is_clamped() {
        let policy = ExponentialBackoff::new(Duration::from_secs(3), Duration::from_secs(1), 0.5);
        assert_eq!(policy.delay(1), Duration::from_secs(3));
        assert_eq!(policy.delay(7), Duration::from_secs(3));
    }
}
