use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::errors::{GatewayError, Result};
use crate::model::SessionOptions;
use crate::registry::{Backbone, PipelineKey};

/// Request bodies above this are answered with 413.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Image inference gateway for crop, SAR and flood models",
    long_about = None
)]
pub struct Config {
    #[arg(long, env = "AGRI_VISION_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "AGRI_VISION_PORT", default_value_t = 5000)]
    pub port: u16,

    #[arg(
        long,
        env = "AGRI_VISION_VGG16_MODEL",
        default_value = "models/vgg16.onnx",
        value_parser = check_model_path
    )]
    pub vgg16_model: PathBuf,

    #[arg(
        long,
        env = "AGRI_VISION_VIT_MODEL",
        default_value = "models/vit.onnx",
        value_parser = check_model_path
    )]
    pub vit_model: PathBuf,

    #[arg(
        long,
        env = "AGRI_VISION_COLORIZE_MODEL",
        default_value = "models/colorization.onnx",
        value_parser = check_model_path
    )]
    pub colorize_model: PathBuf,

    #[arg(
        long,
        env = "AGRI_VISION_FLOOD_MODEL",
        default_value = "models/flood_segmentation.onnx",
        value_parser = check_model_path
    )]
    pub flood_model: PathBuf,

    /// Accepted bearer tokens, `principal:token` or a bare token.
    #[arg(long, env = "AGRI_VISION_API_TOKENS", value_delimiter = ',', hide_env_values = true)]
    pub api_tokens: Vec<String>,

    #[arg(short, long, env = "AGRI_VISION_DEVICE_ID", default_value_t = 0)]
    pub device_id: i32,

    /// Runtime worker threads, also the number of sessions kept per model.
    #[arg(short, long, env = "AGRI_VISION_WORKERS", default_value_t = 1)]
    pub workers: usize,

    #[arg(long, env = "AGRI_VISION_INTRA_THREADS", default_value_t = 1)]
    pub intra_threads: usize,

    /// Largest accepted request body, multipart or JSON.
    #[arg(long, env = "AGRI_VISION_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "AGRI_VISION_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub fn model_path(&self, key: PipelineKey) -> &Path {
        match key {
            PipelineKey::Classify(Backbone::Vgg16) => &self.vgg16_model,
            PipelineKey::Classify(Backbone::Vit) => &self.vit_model,
            PipelineKey::Colorize => &self.colorize_model,
            PipelineKey::FloodSegment => &self.flood_model,
        }
    }

    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            device_id: self.device_id,
            intra_threads: self.intra_threads,
            pool_size: self.workers,
        }
    }

    /// Startup checks that clap cannot express on its own.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(GatewayError::Configuration {
                message: "workers must be at least 1".to_string(),
            });
        }
        if self.intra_threads == 0 {
            return Err(GatewayError::Configuration {
                message: "intra-threads must be at least 1".to_string(),
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(GatewayError::Configuration {
                message: "max-upload-bytes must be at least 1".to_string(),
            });
        }
        if self.api_tokens.iter().all(|token| token.trim().is_empty()) {
            return Err(GatewayError::Configuration {
                message: "no API tokens configured; every protected endpoint would reject"
                    .to_string(),
            });
        }
        for key in PipelineKey::ALL {
            let path = self.model_path(key);
            if !path.is_file() {
                return Err(GatewayError::FileSystem {
                    path: path.to_path_buf(),
                    operation: format!("locating {key} model"),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "model file does not exist",
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::Configuration {
                message: format!("invalid bind address {}:{}: {e}", self.host, self.port),
            })
    }
}

fn check_model_path(s: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(s);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("onnx") => Ok(path),
        _ => Err(format!("{s} is not an ONNX artifact. Expected a `.onnx` file")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("agri-vision-rs").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--api-tokens", "alice:secret,bob:other"]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.api_tokens, vec!["alice:secret", "bob:other"]);
        assert_eq!(
            config.model_path(PipelineKey::Classify(Backbone::Vit)),
            Path::new("models/vit.onnx")
        );
        assert_eq!(config.bind_address().map(|a| a.port()).ok(), Some(5000));
    }

    #[test]
    fn test_session_options_follow_workers() {
        let config = parse(&["--workers", "4", "--device-id", "1"]);
        let options = config.session_options();
        assert_eq!(options.pool_size, 4);
        assert_eq!(options.device_id, 1);
    }

    #[test]
    fn test_check_model_path() {
        assert!(check_model_path("models/a.onnx").is_ok());
        assert!(check_model_path("models/a.ONNX").is_ok());
        assert!(check_model_path("models/a.h5").is_err());
        assert!(check_model_path("models/a").is_err());
    }

    #[test]
    fn test_validate_rejects_missing_artifacts() {
        let config = parse(&[
            "--api-tokens",
            "secret",
            "--vgg16-model",
            "/nonexistent/vgg16.onnx",
        ]);
        assert!(matches!(
            config.validate(),
            Err(GatewayError::FileSystem { .. })
        ));
    }

    #[test]
    fn test_upload_limit_override() {
        let config = parse(&["--max-upload-bytes", "1048576"]);
        assert_eq!(config.max_upload_bytes, 1024 * 1024);

        let config = parse(&["--api-tokens", "secret", "--max-upload-bytes", "0"]);
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = parse(&["--api-tokens", "secret", "--workers", "0"]);
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Configuration { .. })
        ));
    }
}
