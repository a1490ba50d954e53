//! Configuration resolution for swinglab-va
//!
//! Settings resolve ENV → TOML → compiled default, under the data root
//! resolved by `swinglab_common::config`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use swinglab_common::Result;

use crate::services::precheck_client::PrecheckSettings;

const DEFAULT_PORT: u16 = 5841;

/// Raw `[analysis]` table of the service TOML; every field optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisToml {
    pub port: Option<u16>,
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub probe_timeout_secs: Option<u64>,
    pub remux_timeout_secs: Option<u64>,
    pub transcode_timeout_secs: Option<u64>,
    pub precheck_command: Option<Vec<String>>,
    pub precheck_timeout_secs: Option<u64>,
    pub delegate_command: Option<Vec<String>>,
    pub delegate_timeout_secs: Option<u64>,
    pub ball_class_id: Option<i64>,
    pub club_class_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceToml {
    #[serde(default)]
    analysis: AnalysisToml,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Data root; media, prepared cache, and the job store live under it
    pub root: PathBuf,
    pub port: u16,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub probe_timeout: Duration,
    pub remux_timeout: Duration,
    pub transcode_timeout: Duration,
    /// Precheck worker command; None disables the gate
    pub precheck_command: Option<Vec<String>>,
    pub precheck_settings: PrecheckSettings,
    pub precheck_timeout: Duration,
    /// External analysis delegate command; None selects local fallback
    pub delegate_command: Option<Vec<String>>,
    pub delegate_timeout: Duration,
    /// Optional numeric class ids from the upstream detector deployment
    pub ball_class_id: Option<i64>,
    pub club_class_id: Option<i64>,
}

impl AnalysisConfig {
    /// Resolve configuration for a data root
    ///
    /// TOML is read from `<root>/swinglab-va.toml` when present; `SWINGLAB_*`
    /// environment variables override individual TOML values.
    pub fn resolve(root: PathBuf, port_override: Option<u16>) -> Result<Self> {
        let toml_path = root.join("swinglab-va.toml");
        let toml: AnalysisToml = if toml_path.exists() {
            let content = std::fs::read_to_string(&toml_path)?;
            let parsed: ServiceToml = toml::from_str(&content).map_err(|e| {
                swinglab_common::Error::Config(format!(
                    "parse {} failed: {}",
                    toml_path.display(),
                    e
                ))
            })?;
            tracing::info!(path = %toml_path.display(), "service TOML loaded");
            parsed.analysis
        } else {
            AnalysisToml::default()
        };

        let port = port_override
            .or_else(|| env_parse("SWINGLAB_PORT"))
            .or(toml.port)
            .unwrap_or(DEFAULT_PORT);

        let ffmpeg_path = std::env::var("SWINGLAB_FFMPEG")
            .ok()
            .or(toml.ffmpeg_path)
            .unwrap_or_else(|| "ffmpeg".to_string());
        let ffprobe_path = std::env::var("SWINGLAB_FFPROBE")
            .ok()
            .or(toml.ffprobe_path)
            .unwrap_or_else(|| "ffprobe".to_string());

        Ok(Self {
            port,
            ffmpeg_path,
            ffprobe_path,
            probe_timeout: Duration::from_secs(toml.probe_timeout_secs.unwrap_or(10)),
            remux_timeout: Duration::from_secs(toml.remux_timeout_secs.unwrap_or(30)),
            transcode_timeout: Duration::from_secs(toml.transcode_timeout_secs.unwrap_or(120)),
            precheck_command: toml.precheck_command,
            precheck_settings: PrecheckSettings::default(),
            precheck_timeout: Duration::from_secs(toml.precheck_timeout_secs.unwrap_or(10)),
            delegate_command: toml.delegate_command,
            delegate_timeout: Duration::from_secs(toml.delegate_timeout_secs.unwrap_or(60)),
            ball_class_id: toml.ball_class_id,
            club_class_id: toml.club_class_id,
            root,
        })
    }

    /// Uploaded clips
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Prepared-video cache
    pub fn prepared_dir(&self) -> PathBuf {
        self.root.join("prepared")
    }

    /// Job store database
    pub fn database_path(&self) -> PathBuf {
        self.root.join("swinglab.db")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_toml() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AnalysisConfig::resolve(dir.path().to_path_buf(), None).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.ffmpeg_path, "ffmpeg");
        assert_eq!(cfg.probe_timeout, Duration::from_secs(10));
        assert!(cfg.precheck_command.is_none());
        assert!(cfg.delegate_command.is_none());
        assert_eq!(cfg.media_dir(), dir.path().join("media"));
    }

    #[test]
    fn toml_values_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("swinglab-va.toml"),
            r#"
[analysis]
port = 6001
ffmpeg_path = "/usr/local/bin/ffmpeg"
transcode_timeout_secs = 300
precheck_command = ["python3", "precheck_worker.py"]
ball_class_id = 32
"#,
        )
        .unwrap();

        let cfg = AnalysisConfig::resolve(dir.path().to_path_buf(), None).unwrap();
        assert_eq!(cfg.port, 6001);
        assert_eq!(cfg.ffmpeg_path, "/usr/local/bin/ffmpeg");
        assert_eq!(cfg.transcode_timeout, Duration::from_secs(300));
        assert_eq!(
            cfg.precheck_command.as_deref(),
            Some(&["python3".to_string(), "precheck_worker.py".to_string()][..])
        );
        assert_eq!(cfg.ball_class_id, Some(32));
    }

    #[test]
    fn cli_port_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("swinglab-va.toml"),
            "[analysis]\nport = 6001\n",
        )
        .unwrap();
        let cfg = AnalysisConfig::resolve(dir.path().to_path_buf(), Some(7000)).unwrap();
        assert_eq!(cfg.port, 7000);
    }
}
