//! Endpoint configuration.
//!
//! Built once through [`ChildConfig::builder`], validated by
//! [`ChildConfigBuilder::build`], and immutable afterwards. Runtime state
//! (handshake state, deadline, identity) lives in the endpoint, never here.

use std::{sync::Arc, time::Duration};

use tether_proto::{MessageCodec, PayloadCodec};

use crate::error::ConfigError;

/// Default time the child waits for the parent's handshake.
pub const DEFAULT_HANDSHAKE_EXPIRY: Duration = Duration::from_millis(5000);

/// Longest handshake expiry limit [`ChildConfigBuilder::build`] accepts.
pub const MAX_HANDSHAKE_EXPIRY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Child endpoint configuration
#[derive(Debug, Clone)]
pub struct ChildConfig {
    handshake_expiry_limit: Duration,
    auto_start: bool,
    codec: MessageCodec,
    origin: Option<String>,
    is_embedded: bool,
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            handshake_expiry_limit: DEFAULT_HANDSHAKE_EXPIRY,
            auto_start: true,
            codec: MessageCodec::default(),
            origin: None,
            is_embedded: false,
        }
    }
}

impl ChildConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ChildConfigBuilder {
        ChildConfigBuilder { config: Self::default() }
    }

    /// How long to wait for the handshake after activation.
    pub fn handshake_expiry_limit(&self) -> Duration {
        self.handshake_expiry_limit
    }

    /// Whether the runtime activates the endpoint as soon as it starts.
    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Codec used for every inbound and outbound message.
    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    /// Origin inbound messages must come from and outbound messages are
    /// scoped to. `None` accepts and targets any origin.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Whether the child is hosted in an embedding frame.
    pub fn is_embedded(&self) -> bool {
        self.is_embedded
    }
}

/// Builder for [`ChildConfig`].
#[derive(Debug, Clone)]
pub struct ChildConfigBuilder {
    config: ChildConfig,
}

impl ChildConfigBuilder {
    /// Set the handshake expiry limit.
    #[must_use]
    pub fn handshake_expiry_limit(mut self, limit: Duration) -> Self {
        self.config.handshake_expiry_limit = limit;
        self
    }

    /// Set whether the endpoint activates automatically.
    #[must_use]
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.config.auto_start = auto_start;
        self
    }

    /// Use a custom payload serializer instead of JSON.
    #[must_use]
    pub fn payload_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.config.codec = MessageCodec::new(codec);
        self
    }

    /// Restrict inbound and outbound messages to one origin.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.origin = Some(origin.into());
        self
    }

    /// Mark the child as hosted in an embedding frame.
    #[must_use]
    pub fn embedded(mut self, is_embedded: bool) -> Self {
        self.config.is_embedded = is_embedded;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<ChildConfig, ConfigError> {
        if self.config.handshake_expiry_limit.is_zero() {
            return Err(ConfigError::ZeroExpiryLimit);
        }
        if self.config.handshake_expiry_limit > MAX_HANDSHAKE_EXPIRY {
            return Err(ConfigError::ExpiryLimitTooLarge(self.config.handshake_expiry_limit));
        }

        if let Some(origin) = &self.config.origin {
            let trimmed = origin.trim();
            if trimmed.is_empty() || trimmed == "*" || trimmed.len() != origin.len() {
                return Err(ConfigError::InvalidOrigin(origin.clone()));
            }
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChildConfig::builder().build().unwrap();
        assert_eq!(config.handshake_expiry_limit(), Duration::from_millis(5000));
        assert!(config.auto_start());
        assert_eq!(config.origin(), None);
        assert!(!config.is_embedded());
    }

    #[test]
    fn builder_sets_fields() {
        let config = ChildConfig::builder()
            .handshake_expiry_limit(Duration::from_millis(250))
            .auto_start(false)
            .origin("https://a.example")
            .embedded(true)
            .build()
            .unwrap();

        assert_eq!(config.handshake_expiry_limit(), Duration::from_millis(250));
        assert!(!config.auto_start());
        assert_eq!(config.origin(), Some("https://a.example"));
        assert!(config.is_embedded());
    }

    #[test]
    fn zero_expiry_rejected() {
        let result = ChildConfig::builder().handshake_expiry_limit(Duration::ZERO).build();
        assert_eq!(result.unwrap_err(), ConfigError::ZeroExpiryLimit);
    }

    #[test]
    fn oversized_expiry_rejected() {
        let result = ChildConfig::builder().handshake_expiry_limit(Duration::MAX).build();
        assert_eq!(result.unwrap_err(), ConfigError::ExpiryLimitTooLarge(Duration::MAX));

        let longest =
            ChildConfig::builder().handshake_expiry_limit(MAX_HANDSHAKE_EXPIRY).build().unwrap();
        assert_eq!(longest.handshake_expiry_limit(), MAX_HANDSHAKE_EXPIRY);
    }

    #[test]
    fn wildcard_and_blank_origins_rejected() {
        for origin in ["", "*", "  ", " https://a.example"] {
            let result = ChildConfig::builder().origin(origin).build();
            assert!(matches!(result, Err(ConfigError::InvalidOrigin(_))), "{origin:?}");
        }
    }
}
