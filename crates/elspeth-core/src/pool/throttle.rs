use super::PoolConfig;
use std::sync::Mutex;

/// The shared AIMD dispatch delay for one [`super::PooledExecutor`] run: one
/// lock per instance, per §5's shared-resource policy.
pub struct AimdThrottle {
    delay_ms: Mutex<u64>,
    min: u64,
    max: u64,
    multiplier: f64,
    recovery_step: u64,
}

impl AimdThrottle {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            delay_ms: Mutex::new(config.min_dispatch_delay_ms),
            min: config.min_dispatch_delay_ms,
            max: config.max_dispatch_delay_ms,
            multiplier: config.backoff_multiplier,
            recovery_step: config.recovery_step_ms,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        *self.delay_ms.lock().unwrap()
    }

    pub fn on_capacity_error(&self) {
        let mut delay = self.delay_ms.lock().unwrap();
        let scaled = (*delay as f64 * self.multiplier).round() as u64;
        *delay = scaled.clamp(self.min, self.max);
    }

    pub fn on_success(&self) {
        let mut delay = self.delay_ms.lock().unwrap();
        *delay = delay.saturating_sub(self.recovery_step).max(self.min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig { min_dispatch_delay_ms: 10, max_dispatch_delay_ms: 1000, backoff_multiplier: 2.0, recovery_step_ms: 5, ..PoolConfig::default() }
    }

    #[test]
    fn capacity_error_multiplies_delay_bounded_by_max() {
        let throttle = AimdThrottle::new(&config());
        throttle.on_capacity_error();
        assert_eq!(throttle.delay_ms(), 20);
        for _ in 0..20 {
            throttle.on_capacity_error();
        }
        assert_eq!(throttle.delay_ms(), 1000);
    }

    #[test]
    fn success_shrinks_delay_bounded_by_min() {
        let throttle = AimdThrottle::new(&config());
        throttle.on_capacity_error();
        throttle.on_capacity_error();
        let before = throttle.delay_ms();
        throttle.on_success();
        assert!(throttle.delay_ms() < before);
        for _ in 0..50 {
            throttle.on_success();
        }
        assert_eq!(throttle.delay_ms(), 10);
    }
}
