use crate::ConfigError;

/// Selects which sequencer a ring buffer claims through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerType {
    /// Exactly one thread publishes. Claims are plain stores, no CAS.
    #[default]
    Single,
    /// Any number of threads publish. Claims race on a CAS loop and
    /// visibility is tracked per slot.
    Multi,
}

/// Configuration for a [`RingBuffer`](crate::RingBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of slots; must be a power of two (default: 1024)
    pub buffer_size: usize,
    /// Which sequencer guards the claim path
    pub producer_type: ProducerType,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// The configuration is not validated until it is used to build a ring
    /// buffer; call [`Config::validate`] to check it up front.
    pub const fn new(buffer_size: usize, producer_type: ProducerType) -> Self {
        Self {
            buffer_size,
            producer_type,
        }
    }

    /// Single-producer configuration with the given size.
    pub const fn single_producer(buffer_size: usize) -> Self {
        Self::new(buffer_size, ProducerType::Single)
    }

    /// Multi-producer configuration with the given size.
    pub const fn multi_producer(buffer_size: usize) -> Self {
        Self::new(buffer_size, ProducerType::Multi)
    }

    /// Checks that the buffer size is a positive power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 || !self.buffer_size.is_power_of_two() {
            return Err(ConfigError::InvalidBufferSize {
                size: self.buffer_size,
            });
        }
        Ok(())
    }

    /// Returns the mask for slot indexing.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.buffer_size - 1
    }

    /// Returns `log2(buffer_size)`, the shift that turns a sequence into its lap.
    #[inline]
    pub const fn index_shift(&self) -> u32 {
        self.buffer_size.trailing_zeros()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            producer_type: ProducerType::Single,
        }
    }
}

/// Low latency configuration (1K slots, single producer)
pub const LOW_LATENCY_CONFIG: Config = Config::new(1024, ProducerType::Single);

/// High throughput configuration (64K slots, multiple producers)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(64 * 1024, ProducerType::Multi);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mask(), 1023);
        assert_eq!(config.index_shift(), 10);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        for size in [0usize, 3, 6, 1000, 1023] {
            assert_eq!(
                Config::single_producer(size).validate(),
                Err(ConfigError::InvalidBufferSize { size })
            );
        }
    }

    #[test]
    fn test_accepts_powers_of_two() {
        for bits in 0..16 {
            assert!(Config::multi_producer(1 << bits).validate().is_ok());
        }
    }

    #[test]
    fn test_presets() {
        assert!(LOW_LATENCY_CONFIG.validate().is_ok());
        assert!(HIGH_THROUGHPUT_CONFIG.validate().is_ok());
        assert_eq!(HIGH_THROUGHPUT_CONFIG.producer_type, ProducerType::Multi);
    }
}
