//! Engine configuration.

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether object stores serve `get_all` / `get_all_keys` in one
    /// request. When false, callers are expected to fall back to cursors.
    pub bulk_reads: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { bulk_reads: true }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether bulk reads are supported.
    #[must_use]
    pub const fn bulk_reads(mut self, value: bool) -> Self {
        self.bulk_reads = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        assert!(EngineConfig::default().bulk_reads);
    }

    #[test]
    fn builder_pattern() {
        assert!(!EngineConfig::new().bulk_reads(false).bulk_reads);
    }
}
