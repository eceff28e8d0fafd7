use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// ffmpeg invocation used to turn the input into an `image2pipe` MJPEG stream.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Anything ffmpeg accepts after `-i`: a file path, RTSP URL, device...
    pub input: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Pass `-re` so the input is read at its native frame rate.
    #[serde(default)]
    pub realtime: bool,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    /// Optional `-vf` filter graph, e.g. `fps=5,scale=800:600`.
    #[serde(default)]
    pub video_filter: Option<String>,
    #[serde(default = "default_ffmpeg_loglevel")]
    pub loglevel: String,
    /// A JPEG growing past this many bytes without an EOI marker is abandoned.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

/// What the pacing controller does with a frame that arrives while busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// Discard the frame outright.
    #[default]
    Drop,
    /// Park the frame in a single slot, replacing any older parked frame.
    /// The parked frame runs as soon as the in-flight inference finishes.
    Latest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(default)]
    pub policy: DropPolicy,
    /// Capacity of the channel between the frame reader and the controller.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Side length of the average-hash grid.
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,
    /// Hamming distance above which consecutive frames count as a scene change.
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: u32,
    /// Chi-squared histogram distance above which frames count as a scene change.
    #[serde(default = "default_histogram_threshold")]
    pub histogram_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            policy: DropPolicy::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            hash_size: default_hash_size(),
            motion_threshold: default_motion_threshold(),
            histogram_threshold: default_histogram_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.input.trim().is_empty() {
            return Err(ConfigError::Invalid("source.input must not be empty".into()));
        }
        if self.source.max_frame_bytes < 4 {
            return Err(ConfigError::Invalid(
                "source.max_frame_bytes must hold at least the SOI and EOI markers".into(),
            ));
        }
        if self.source.read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("source.read_chunk_bytes must be > 0".into()));
        }
        if self.pacing.channel_capacity == 0 {
            return Err(ConfigError::Invalid("pacing.channel_capacity must be > 0".into()));
        }
        if self.analysis.hash_size == 0 {
            return Err(ConfigError::Invalid("analysis.hash_size must be > 0".into()));
        }
        if !self.analysis.histogram_threshold.is_finite() || self.analysis.histogram_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "analysis.histogram_threshold must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_ffmpeg_path() -> String {
    "ffmpeg".into()
}
fn default_pix_fmt() -> String {
    "yuvj422p".into()
}
fn default_ffmpeg_loglevel() -> String {
    "quiet".into()
}
fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_read_chunk_bytes() -> usize {
    64 * 1024
}
fn default_channel_capacity() -> usize {
    8
}
fn default_hash_size() -> u32 {
    16
}
fn default_motion_threshold() -> u32 {
    26
}
fn default_histogram_threshold() -> f64 {
    0.15
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::parse("[source]\ninput = \"./test.mp4\"\n").unwrap();
        assert_eq!(config.source.input, "./test.mp4");
        assert_eq!(config.source.ffmpeg_path, "ffmpeg");
        assert_eq!(config.source.pix_fmt, "yuvj422p");
        assert!(!config.source.realtime);
        assert!(config.source.video_filter.is_none());
        assert_eq!(config.pacing.policy, DropPolicy::Drop);
        assert_eq!(config.pacing.channel_capacity, 8);
        assert_eq!(config.analysis.hash_size, 16);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn full_config_overrides() {
        let toml = r#"
            [source]
            input = "rtsp://camera/stream"
            realtime = true
            video_filter = "fps=5,scale=800:600"

            [pacing]
            policy = "latest"
            channel_capacity = 2

            [analysis]
            hash_size = 8
            motion_threshold = 10
            histogram_threshold = 0.3

            [logging]
            level = "debug"
        "#;
        let config = Config::parse(toml).unwrap();
        assert!(config.source.realtime);
        assert_eq!(config.source.video_filter.as_deref(), Some("fps=5,scale=800:600"));
        assert_eq!(config.pacing.policy, DropPolicy::Latest);
        assert_eq!(config.pacing.channel_capacity, 2);
        assert_eq!(config.analysis.hash_size, 8);
        assert_eq!(config.analysis.motion_threshold, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unknown_policy_rejected() {
        let toml = "[source]\ninput = \"a.mp4\"\n[pacing]\npolicy = \"queue\"\n";
        assert!(matches!(Config::parse(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_source_rejected() {
        assert!(matches!(Config::parse(""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_capacity_rejected() {
        let toml = "[source]\ninput = \"a.mp4\"\n[pacing]\nchannel_capacity = 0\n";
        assert!(matches!(Config::parse(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(
            Config::parse("[source]\ninput = \"  \"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/frame-pacer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(..)));
    }
}
