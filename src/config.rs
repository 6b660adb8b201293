/// Configuration for a [`RingFifo`](crate::RingFifo).
///
/// The watermarks are given as fractions of the capacity and rounded to the
/// nearest byte at construction. `high_fraction` controls when a starved
/// consumer resumes; `low_fraction` controls when a blocked producer resumes.
/// `high_fraction = 0.0` wakes the consumer on any byte, `low_fraction = 1.0`
/// wakes the producer on any free slot, so both default to the
/// no-batching behavior.
#[derive(Debug, Clone, Copy)]
pub struct FifoConfig {
    /// Usable ring capacity in bytes.
    pub capacity: usize,
    /// Fill fraction at which a starved consumer resumes.
    pub high_fraction: f64,
    /// Fill fraction at which a blocked producer resumes.
    pub low_fraction: f64,
    /// Alignment of the buffer start address (power of two).
    pub alignment: usize,
}

/// Default ring capacity (64 KiB).
pub const DEFAULT_CAPACITY: usize = 65_536;

/// Default buffer alignment, large enough for direct I/O on common hosts.
pub const DEFAULT_ALIGNMENT: usize = 1 << 14;

impl FifoConfig {
    /// Creates a configuration with the default alignment.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or either fraction is outside `[0, 1]`.
    /// Out-of-range values are programmer errors, not runtime conditions;
    /// the command-line layer validates user input before it gets here.
    pub fn new(capacity: usize, high_fraction: f64, low_fraction: f64) -> Self {
        assert!(capacity >= 1, "ring capacity must be at least one byte");
        assert!(
            (0.0..=1.0).contains(&high_fraction),
            "high watermark fraction {high_fraction} is not in [0, 1]"
        );
        assert!(
            (0.0..=1.0).contains(&low_fraction),
            "low watermark fraction {low_fraction} is not in [0, 1]"
        );

        Self {
            capacity,
            high_fraction,
            low_fraction,
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Overrides the buffer alignment.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        assert!(
            alignment.is_power_of_two(),
            "buffer alignment {alignment} is not a power of two"
        );
        self.alignment = alignment;
        self
    }

    /// The high watermark rounded to the nearest byte.
    #[inline]
    pub fn high_watermark(&self) -> usize {
        Self::fraction_to_bytes(self.capacity, self.high_fraction)
    }

    /// The low watermark rounded to the nearest byte.
    #[inline]
    pub fn low_watermark(&self) -> usize {
        Self::fraction_to_bytes(self.capacity, self.low_fraction)
    }

    fn fraction_to_bytes(capacity: usize, fraction: f64) -> usize {
        (capacity as f64 * fraction).round() as usize
    }
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            high_fraction: 0.0,
            low_fraction: 1.0,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermarks_round_to_nearest_byte() {
        let config = FifoConfig::new(64, 1.0 / 64.0, 63.0 / 64.0);
        assert_eq!(config.high_watermark(), 1);
        assert_eq!(config.low_watermark(), 63);

        // 1000 * 0.333 is 332.99999...; rounding must not truncate
        let config = FifoConfig::new(1000, 0.333, 0.5);
        assert_eq!(config.high_watermark(), 333);
        assert_eq!(config.low_watermark(), 500);
    }

    #[test]
    fn default_disables_batching() {
        let config = FifoConfig::default();
        assert_eq!(config.high_watermark(), 0);
        assert_eq!(config.low_watermark(), config.capacity);
    }

    #[test]
    #[should_panic(expected = "not in [0, 1]")]
    fn fraction_out_of_range_is_rejected() {
        let _ = FifoConfig::new(64, 1.5, 0.5);
    }

    #[test]
    #[should_panic(expected = "at least one byte")]
    fn zero_capacity_is_rejected() {
        let _ = FifoConfig::new(0, 0.0, 1.0);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn alignment_must_be_power_of_two() {
        let _ = FifoConfig::default().with_alignment(3000);
    }
}
