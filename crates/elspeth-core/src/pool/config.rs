use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub min_dispatch_delay_ms: u64,
    pub max_dispatch_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub recovery_step_ms: u64,
    pub max_capacity_retry_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            min_dispatch_delay_ms: 0,
            max_dispatch_delay_ms: 5000,
            backoff_multiplier: 2.0,
            recovery_step_ms: 50,
            max_capacity_retry_seconds: 3600,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PoolConfigError {
    #[error("pool_size must be at least 1")]
    PoolSizeZero,
    #[error("min_dispatch_delay_ms must be <= max_dispatch_delay_ms")]
    DelayBoundsInverted,
    #[error("backoff_multiplier must be greater than 1.0")]
    BackoffMultiplierTooSmall,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if self.pool_size == 0 {
            return Err(PoolConfigError::PoolSizeZero);
        }
        if self.min_dispatch_delay_ms > self.max_dispatch_delay_ms {
            return Err(PoolConfigError::DelayBoundsInverted);
        }
        if self.backoff_multiplier <= 1.0 {
            return Err(PoolConfigError::BackoffMultiplierTooSmall);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_pool_size() {
        let config = PoolConfig { pool_size: 0, ..PoolConfig::default() };
        assert_eq!(config.validate(), Err(PoolConfigError::PoolSizeZero));
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let config = PoolConfig { min_dispatch_delay_ms: 10, max_dispatch_delay_ms: 5, ..PoolConfig::default() };
        assert_eq!(config.validate(), Err(PoolConfigError::DelayBoundsInverted));
    }
}
