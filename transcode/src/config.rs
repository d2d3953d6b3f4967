//! Gateway configuration, loaded from TOML.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! upstream = "http://localhost:50051"
//! descriptor_set = "bookstore.pb"
//! request_timeout_ms = 5000
//!
//! [codec]
//! use_proto_names = true
//!
//! [[http.rules]]
//! selector = "bookstore.Bookstore.GetShelf"
//! get = "/v1/shelves/{shelf}"
//! ```
use crate::cli::Cli;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use transcode_core::{CodecOptions, HttpRule, TranscoderOptions};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("No descriptor set configured")]
    MissingDescriptorSet,

    #[error("'body_limit_bytes' must be greater than zero")]
    ZeroBodyLimit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub upstream: String,
    pub descriptor_set: Option<PathBuf>,
    /// Services to expose. Every service of the descriptor set when empty.
    pub services: Vec<String>,
    pub request_timeout_ms: Option<u64>,
    pub body_limit_bytes: usize,
    pub codec: CodecConfig,
    pub http: HttpConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            upstream: "http://127.0.0.1:50051".to_string(),
            descriptor_set: None,
            services: Vec::new(),
            request_timeout_ms: None,
            body_limit_bytes: 4 * 1024 * 1024,
            codec: CodecConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub ignore_unknown_fields: bool,
    pub use_proto_names: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        let options = CodecOptions::default();
        Self {
            ignore_unknown_fields: options.ignore_unknown_fields,
            use_proto_names: options.use_proto_names,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub rules: Vec<HttpRule>,
}

impl GatewayConfig {
    /// Parses a configuration document without validating it.
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `cli.config` when it exists, applies the CLI overrides and validates the result.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(content) => Self::from_toml(&cli.config, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %cli.config.display(), "No configuration file, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: cli.config.clone(),
                    source,
                });
            }
        };

        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(listen) = cli.listen {
            self.listen = listen;
        }
        if let Some(upstream) = &cli.upstream {
            self.upstream = upstream.clone();
        }
        if let Some(descriptor_set) = &cli.descriptor_set {
            self.descriptor_set = Some(descriptor_set.clone());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.descriptor_set.is_none() {
            return Err(ConfigError::MissingDescriptorSet);
        }
        if self.body_limit_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        Ok(())
    }

    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            ignore_unknown_fields: self.codec.ignore_unknown_fields,
            use_proto_names: self.codec.use_proto_names,
        }
    }

    pub fn transcoder_options(&self) -> TranscoderOptions {
        TranscoderOptions {
            codec: self.codec_options(),
            timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }
}
