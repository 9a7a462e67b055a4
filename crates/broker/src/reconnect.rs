use qiab_core::config::TickerConfig;
use rand::Rng;
use std::time::Duration;

/// 行情重连退避参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 抖动幅度，单位千分比 (100 = ±10%)
    pub jitter_permille: u64,
    /// 最大连续重连次数 (0 = 不限)
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_permille: 100,
            max_attempts: 0,
        }
    }
}

impl From<&TickerConfig> for ReconnectConfig {
    fn from(config: &TickerConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.reconnect_initial_ms),
            max_delay: Duration::from_millis(config.reconnect_max_ms.max(config.reconnect_initial_ms)),
            max_attempts: config.max_reconnect_attempts,
            ..Self::default()
        }
    }
}

/// # Summary
/// 指数退避 + 随机抖动的重连策略。
///
/// # Invariants
/// - 每次失败后延迟翻倍，封顶 `max_delay`。
/// - 连接成功后必须调用 `reset`，否则下次断线会沿用上一次的退避进度。
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt: 0,
        }
    }

    /// # Summary
    /// 计算下一次重连前的等待时间。
    ///
    /// # Returns
    /// * `Some(Duration)` - 已计入抖动的等待时间
    /// * `None` - 已达到最大重连次数
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);

        let delay = self.jittered(self.current_delay);
        self.current_delay = self
            .current_delay
            .saturating_mul(2)
            .min(self.config.max_delay);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt = 0;
    }

    /// 当前连续失败次数
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn jittered(&self, base: Duration) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let spread = base_ms.saturating_mul(self.config.jitter_permille) / 1000;
        if spread == 0 {
            return base;
        }
        let low = base_ms.saturating_sub(spread).max(1);
        let high = base_ms.saturating_add(spread);
        Duration::from_millis(rand::rng().random_range(low..=high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(initial_ms: u64, max_ms: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter_permille: 0,
            max_attempts,
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut policy = fixed(100, 350, 0);
        let delays: Vec<u128> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 350, 350, 350]);
    }

    #[test]
    fn test_max_attempts_then_reset() {
        let mut policy = fixed(10, 1000, 2);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt(), 2);

        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                ..ReconnectConfig::default()
            });
            let ms = policy.next_delay().unwrap().as_millis();
            assert!((900..=1100).contains(&ms), "delay {ms}ms out of range");
        }
    }

    #[test]
    fn test_from_ticker_config() {
        let ticker = TickerConfig {
            reconnect_initial_ms: 500,
            reconnect_max_ms: 100,
            max_reconnect_attempts: 7,
            ..TickerConfig::default()
        };
        let config = ReconnectConfig::from(&ticker);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 7);
    }
}
