//! Heap configuration parameters.
//!
//! Sizes are tunable per embedding. Defaults suit a runtime hosting a few
//! hundred compiled patterns; tests shrink the spaces to force exhaustion.

/// Configuration for the buffer heap.
///
/// # Example
///
/// ```ignore
/// use beryl_gc::HeapConfig;
///
/// let config = HeapConfig {
///     space_size: 4 * 1024 * 1024, // 4MB per semi-space
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Size of each semi-space in bytes.
    ///
    /// Total heap memory is 2x this value (from-space + to-space). Every
    /// live buffer must fit in one space, so this bounds total adopted
    /// data, not just a single object.
    ///
    /// Default: 1MB
    pub space_size: usize,

    /// Largest single buffer the heap will hand out.
    ///
    /// Foreign size fields feed buffer requests directly; a corrupted
    /// field would otherwise ask for an absurd block. Requests above this
    /// cap fail like exhaustion does.
    ///
    /// Default: 256KB
    pub max_buffer_len: usize,

    /// Verify buffer header tags on space swaps.
    ///
    /// Default: true in debug builds
    pub verify_buffers: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            space_size: 1024 * 1024,    // 1MB per semi-space
            max_buffer_len: 256 * 1024, // 256KB
            verify_buffers: cfg!(debug_assertions),
        }
    }
}

impl HeapConfig {
    /// Configuration with tiny spaces, for tests that must exhaust the heap.
    pub fn small() -> Self {
        Self {
            space_size: 4096,
            max_buffer_len: 1024,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.space_size < 1024 {
            return Err(ConfigError::SpaceTooSmall);
        }
        if self.max_buffer_len == 0 || self.max_buffer_len > u32::MAX as usize {
            return Err(ConfigError::InvalidBufferCap);
        }
        if self.max_buffer_len + crate::buffer::HEADER_SIZE > self.space_size {
            return Err(ConfigError::BufferCapExceedsSpace);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Space size is too small (minimum 1KB).
    SpaceTooSmall,
    /// Buffer cap must be nonzero and fit a 32-bit length field.
    InvalidBufferCap,
    /// Buffer cap plus header must fit in one semi-space.
    BufferCapExceedsSpace,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::SpaceTooSmall => write!(f, "space size must be at least 1KB"),
            ConfigError::InvalidBufferCap => {
                write!(f, "buffer cap must be nonzero and at most 4GB-1")
            }
            ConfigError::BufferCapExceedsSpace => {
                write!(f, "buffer cap plus header must fit in one semi-space")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
