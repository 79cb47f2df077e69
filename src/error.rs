use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Pai.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum PaiError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // Generic fallthrough, wraps anyhow for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Provider errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} API key not configured")]
    Auth { provider: String },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to persist store {path}: {message}")]
    Persist { path: String, message: String },
}

// ─── Transport errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel {channel} connection failed: {message}")]
    Connection { channel: String, message: String },

    #[error("channel {channel} send failed: {message}")]
    Send { channel: String, message: String },
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, PaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = PaiError::Config(ConfigError::Validation("missing telegram token".into()));
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn provider_request_displays_provider_name() {
        let err = PaiError::Provider(ProviderError::Request {
            provider: "openai".into(),
            message: "connection reset".into(),
        });
        assert!(err.to_string().contains("openai"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let pai_err: PaiError = anyhow_err.into();
        assert!(pai_err.to_string().contains("something went wrong"));
    }

    #[test]
    fn store_persist_displays_path() {
        let err = PaiError::Store(StoreError::Persist {
            path: "data/tasks.json".into(),
            message: "disk full".into(),
        });
        assert!(err.to_string().contains("data/tasks.json"));
    }
}
