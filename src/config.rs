use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::inference::CROP_CONTEXTS;
use crate::sampler::{SamplerSettings, DEFAULT_SAMPLE_INTERVAL};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/api/detect-disease";
const DEFAULT_SOURCE: &str = "stub://demo";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Default)]
struct ScanConfigFile {
    source: Option<String>,
    inference: Option<InferenceConfigFile>,
    sampler: Option<SamplerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
    language: Option<String>,
    crop: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerConfigFile {
    interval_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Camera platform: `stub://...` or `v4l2`.
    pub source: String,
    pub inference: InferenceSettings,
    pub sampler: SamplerSettings,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub timeout: Duration,
    /// Sent as `X-Language` when set.
    pub language: Option<String>,
    pub crop: Option<String>,
}

impl ScanConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LEAFSCAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScanConfigFile) -> Self {
        let source = file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let inference = file.inference.unwrap_or_default();
        let sampler = file.sampler.unwrap_or_default();
        Self {
            source,
            inference: InferenceSettings {
                endpoint: inference
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                timeout: Duration::from_millis(inference.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
                language: inference.language,
                crop: inference.crop,
            },
            sampler: SamplerSettings {
                interval: sampler
                    .interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_SAMPLE_INTERVAL),
                jpeg_quality: sampler.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("LEAFSCAN_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(endpoint) = std::env::var("LEAFSCAN_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.inference.endpoint = endpoint;
            }
        }
        if let Ok(language) = std::env::var("LEAFSCAN_LANGUAGE") {
            if !language.trim().is_empty() {
                self.inference.language = Some(language);
            }
        }
        if let Ok(crop) = std::env::var("LEAFSCAN_CROP") {
            if !crop.trim().is_empty() {
                self.inference.crop = Some(crop);
            }
        }
        if let Ok(interval) = std::env::var("LEAFSCAN_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("LEAFSCAN_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.sampler.interval = Duration::from_millis(millis);
        }
        if let Ok(quality) = std::env::var("LEAFSCAN_JPEG_QUALITY") {
            self.sampler.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("LEAFSCAN_JPEG_QUALITY must be an integer in 1..=100"))?;
        }
        if let Ok(timeout) = std::env::var("LEAFSCAN_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("LEAFSCAN_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.inference.timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let endpoint = Url::parse(&self.inference.endpoint)
            .map_err(|e| anyhow!("invalid inference endpoint {}: {}", self.inference.endpoint, e))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!("inference endpoint must be http(s)"));
        }
        if self.sampler.interval.is_zero() {
            return Err(anyhow!("sample interval must be greater than zero"));
        }
        if !(1..=100).contains(&self.sampler.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be in 1..=100"));
        }
        if self.inference.timeout.is_zero() {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }

        self.inference.crop = match self.inference.crop.take() {
            Some(crop) => {
                let crop = crop.trim().to_uppercase();
                if !CROP_CONTEXTS.contains(&crop.as_str()) {
                    return Err(anyhow!(
                        "unknown crop context '{}'; expected one of {}",
                        crop,
                        CROP_CONTEXTS.join(", ")
                    ));
                }
                Some(crop)
            }
            None => None,
        };
        self.inference.language = self
            .inference
            .language
            .take()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ScanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
