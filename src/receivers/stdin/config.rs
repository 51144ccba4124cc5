// SPDX-License-Identifier: Apache-2.0

/// Default maximum length of a single line, terminator excluded
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Upper bound accepted for `max_line_bytes`
pub const MAX_LINE_BYTES_LIMIT: usize = 16 * 1024 * 1024;

/// Configuration for the stdin receiver
#[derive(Debug, Clone)]
pub struct StdinReceiverConfig {
    /// Lines longer than this end ingestion with a stream error.
    pub max_line_bytes: usize,

    /// Whether to attach `host.name` to the resource of every record
    pub include_host_name: bool,

    /// Extra resource attributes attached to every record
    pub resource_attributes: Vec<(String, String)>,
}

impl Default for StdinReceiverConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            include_host_name: true,
            resource_attributes: Vec::new(),
        }
    }
}

impl StdinReceiverConfig {
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn with_host_name(mut self, include_host_name: bool) -> Self {
        self.include_host_name = include_host_name;
        self
    }

    pub fn with_resource_attributes(mut self, attributes: Vec<(String, String)>) -> Self {
        self.resource_attributes = attributes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_line_bytes == 0 {
            return Err("Max line bytes must be at least 1, got 0".to_string());
        }

        if self.max_line_bytes > MAX_LINE_BYTES_LIMIT {
            return Err(format!(
                "Max line bytes {} exceeds limit {}",
                self.max_line_bytes, MAX_LINE_BYTES_LIMIT
            ));
        }

        if let Some((_, value)) = self.resource_attributes.iter().find(|(k, _)| k.is_empty()) {
            return Err(format!(
                "Resource attribute with value {:?} has an empty key",
                value
            ));
        }

        Ok(())
    }
}
