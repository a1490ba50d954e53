//! Video container preparation
//!
//! **[SVA-PREP-010]** Apple/mobile-native containers are repaired into a
//! standard container before analysis: a codec probe decides whether a fast
//! stream-copy repackage suffices, with a full transcode as the fallback.
//! Prepared outputs are cached by (sanitized stem, source mtime, source
//! size). Every tool invocation is bounded by a timeout and forcibly
//! terminated on expiry.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Container extensions accepted at submission time
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm"];

/// Containers that trigger the repair/transcode step
const REPAIR_EXTENSIONS: &[&str] = &["mov", "m4v", "3gp"];

/// Video codecs a plain stream-copy repackage can carry
const COPY_SAFE_CODECS: &[&str] = &["h264", "hevc"];

/// Error-text indicators of unrecoverable decode/container problems
const DECODE_ERROR_MARKERS: &[&str] = &[
    "moov atom not found",
    "invalid data found",
    "could not find codec parameters",
    "does not contain any stream",
    "no such file or directory",
    "unsupported codec",
    "decoder not found",
    "end of file",
    "error while decoding",
];

/// Video preparation errors
#[derive(Debug, Error)]
pub enum PrepareError {
    /// Source clip missing from the media directory
    #[error("source video not found: {0}")]
    SourceMissing(PathBuf),

    /// Tool exceeded its deadline and was killed
    #[error("{tool} timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    /// Repackage and transcode both failed for non-decode reasons
    #[error("container repair failed: {0}")]
    RepairFailed(String),

    /// Unrecoverable decode/container problem
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// I/O error (file metadata, cache directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrepareError {
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, PrepareError::DecodeFailure(_))
    }
}

/// Scan tool/analysis error text for unrecoverable decode indicators
pub fn is_decode_failure_text(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DECODE_ERROR_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Check whether a filename's extension is an accepted container type
pub fn is_supported_extension(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Prepared clip handed to the analysis stages
#[derive(Debug, Clone)]
pub struct PreparedVideo {
    pub path: PathBuf,
    pub reused_cache: bool,
    pub repaired: bool,
    pub warnings: Vec<String>,
}

/// Codec probe result; any field may be unresolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub duration_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Container repair/probe client
pub struct VideoPreparer {
    ffmpeg_path: String,
    ffprobe_path: String,
    prepared_dir: PathBuf,
    probe_timeout: Duration,
    remux_timeout: Duration,
    transcode_timeout: Duration,
}

impl VideoPreparer {
    pub fn new(
        ffmpeg_path: String,
        ffprobe_path: String,
        prepared_dir: PathBuf,
        probe_timeout: Duration,
        remux_timeout: Duration,
        transcode_timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            prepared_dir,
            probe_timeout,
            remux_timeout,
            transcode_timeout,
        }
    }

    /// Prepare a source clip for analysis
    pub async fn prepare(&self, source: &Path) -> Result<PreparedVideo, PrepareError> {
        if !source.exists() {
            return Err(PrepareError::SourceMissing(source.to_path_buf()));
        }

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        // Standard containers pass through untouched
        if !REPAIR_EXTENSIONS.contains(&ext.as_str()) {
            return Ok(PreparedVideo {
                path: source.to_path_buf(),
                reused_cache: false,
                repaired: false,
                warnings: Vec::new(),
            });
        }

        // Repair tool missing: proceed on the original with a warning
        if !self.ffmpeg_available().await {
            tracing::warn!(
                source = %source.display(),
                "ffmpeg unavailable; analyzing original container"
            );
            return Ok(PreparedVideo {
                path: source.to_path_buf(),
                reused_cache: false,
                repaired: false,
                warnings: vec!["ffmpeg unavailable; analyzed original container".to_string()],
            });
        }

        let cached = self.cache_path(source)?;
        if cached.exists() {
            tracing::debug!(cached = %cached.display(), "prepared video cache hit");
            return Ok(PreparedVideo {
                path: cached,
                reused_cache: true,
                repaired: true,
                warnings: Vec::new(),
            });
        }
        std::fs::create_dir_all(&self.prepared_dir)?;

        // Probe decides whether a stream copy suffices; an inconclusive
        // probe still attempts the cheap repackage first.
        let copy_capable = match self.probe(source).await {
            Ok(info) => info
                .codec_name
                .as_deref()
                .map(|c| COPY_SAFE_CODECS.contains(&c)),
            Err(PrepareError::ToolTimeout { tool, seconds }) => {
                return Err(PrepareError::ToolTimeout { tool, seconds });
            }
            Err(e) => {
                tracing::warn!(error = %e, "codec probe inconclusive");
                None
            }
        };

        if copy_capable != Some(false) {
            match self.remux(source, &cached).await {
                Ok(()) => {
                    return Ok(PreparedVideo {
                        path: cached,
                        reused_cache: false,
                        repaired: true,
                        warnings: Vec::new(),
                    });
                }
                Err(e @ PrepareError::ToolTimeout { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "stream-copy repackage failed, transcoding");
                    let _ = std::fs::remove_file(&cached);
                }
            }
        }

        self.transcode(source, &cached).await?;
        Ok(PreparedVideo {
            path: cached,
            reused_cache: false,
            repaired: true,
            warnings: Vec::new(),
        })
    }

    /// Probe codec name, dimensions, frame rate, and duration
    pub async fn probe(&self, source: &Path) -> Result<ProbeInfo, PrepareError> {
        let src = source.to_string_lossy();
        let output = run_tool(
            &self.ffprobe_path,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_name,width,height,avg_frame_rate",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
                src.as_ref(),
            ],
            self.probe_timeout,
            "ffprobe",
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if is_decode_failure_text(&stderr) {
                return Err(PrepareError::DecodeFailure(stderr));
            }
            return Err(PrepareError::RepairFailed(format!(
                "ffprobe exit {:?}: {}",
                output.status.code(),
                stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_json(&stdout)
            .ok_or_else(|| PrepareError::RepairFailed("unparseable ffprobe output".to_string()))
    }

    /// Fast container-only repackage (stream copy)
    async fn remux(&self, source: &Path, dest: &Path) -> Result<(), PrepareError> {
        let src = source.to_string_lossy();
        let dst = dest.to_string_lossy();
        let output = run_tool(
            &self.ffmpeg_path,
            &[
                "-y",
                "-i",
                src.as_ref(),
                "-c",
                "copy",
                "-movflags",
                "+faststart",
                dst.as_ref(),
            ],
            self.remux_timeout,
            "ffmpeg remux",
        )
        .await?;
        check_tool_output(output)
    }

    /// Full re-encode with a compatible video/audio codec pair
    async fn transcode(&self, source: &Path, dest: &Path) -> Result<(), PrepareError> {
        let src = source.to_string_lossy();
        let dst = dest.to_string_lossy();
        let output = run_tool(
            &self.ffmpeg_path,
            &[
                "-y",
                "-i",
                src.as_ref(),
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "23",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
                dst.as_ref(),
            ],
            self.transcode_timeout,
            "ffmpeg transcode",
        )
        .await?;
        check_tool_output(output)
    }

    async fn ffmpeg_available(&self) -> bool {
        run_tool(
            &self.ffmpeg_path,
            &["-version"],
            Duration::from_secs(5),
            "ffmpeg",
        )
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
    }

    /// Cache key: sanitized stem + digest of (stem, mtime, size)
    fn cache_path(&self, source: &Path) -> Result<PathBuf, PrepareError> {
        let meta = std::fs::metadata(source)?;
        let mtime = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let size = meta.len();

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip");
        let sanitized: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}|{}", sanitized, mtime, size));
        let digest = hex_prefix(&hasher.finalize(), 8);

        Ok(self.prepared_dir.join(format!("{}-{}.mp4", sanitized, digest)))
    }
}

fn check_tool_output(output: std::process::Output) -> Result<(), PrepareError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if is_decode_failure_text(&stderr) {
        Err(PrepareError::DecodeFailure(stderr))
    } else {
        Err(PrepareError::RepairFailed(format!(
            "exit {:?}: {}",
            output.status.code(),
            stderr
        )))
    }
}

/// Run an external tool with a deadline; the child is killed when the
/// deadline elapses (`kill_on_drop`)
async fn run_tool(
    program: &str,
    args: &[&str],
    timeout: Duration,
    tool: &str,
) -> Result<std::process::Output, PrepareError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(PrepareError::ToolTimeout {
            tool: tool.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

fn parse_probe_json(raw: &str) -> Option<ProbeInfo> {
    let parsed: FfprobeOutput = serde_json::from_str(raw).ok()?;
    let stream = parsed.streams.into_iter().next();
    let (codec_name, width, height, fps) = match stream {
        Some(s) => (
            s.codec_name,
            s.width,
            s.height,
            s.avg_frame_rate.as_deref().and_then(parse_frame_rate),
        ),
        None => (None, None, None, None),
    };
    let duration_sec = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Some(ProbeInfo {
        codec_name,
        width,
        height,
        fps,
        duration_sec,
    })
}

/// ffprobe frame rates arrive as rationals ("30000/1001") or plain numbers
fn parse_frame_rate(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        let fps = num / den;
        return (fps.is_finite() && fps > 0.0).then_some(fps);
    }
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f > 0.0)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn preparer(prepared_dir: PathBuf) -> VideoPreparer {
        VideoPreparer::new(
            "ffmpeg".to_string(),
            "ffprobe".to_string(),
            prepared_dir,
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn decode_failure_markers_match_case_insensitively() {
        assert!(is_decode_failure_text("moov atom not found"));
        assert!(is_decode_failure_text(
            "Error: Invalid data found when processing input"
        ));
        assert!(is_decode_failure_text("Could not find codec parameters"));
        assert!(is_decode_failure_text("file does not contain any stream"));
        assert!(!is_decode_failure_text("Connection reset by peer"));
        assert!(!is_decode_failure_text(""));
    }

    #[test]
    fn supported_extension_check() {
        assert!(is_supported_extension("swing.mp4"));
        assert!(is_supported_extension("SWING.MOV"));
        assert!(is_supported_extension("clip.webm"));
        assert!(!is_supported_extension("notes.txt"));
        assert!(!is_supported_extension("noextension"));
    }

    #[tokio::test]
    async fn standard_container_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("swing.mp4");
        std::fs::File::create(&src).unwrap();

        let prepared = preparer(dir.path().join("prepared"))
            .prepare(&src)
            .await
            .unwrap();
        assert_eq!(prepared.path, src);
        assert!(!prepared.repaired);
        assert!(!prepared.reused_cache);
        assert!(prepared.warnings.is_empty());
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = preparer(dir.path().to_path_buf())
            .prepare(&dir.path().join("absent.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::SourceMissing(_)));
    }

    #[test]
    fn cache_key_tracks_size_and_stem() {
        let dir = tempfile::tempdir().unwrap();
        let p = preparer(dir.path().join("prepared"));

        let src = dir.path().join("my swing (1).mov");
        let mut f = std::fs::File::create(&src).unwrap();
        f.write_all(b"abc").unwrap();
        drop(f);

        let first = p.cache_path(&src).unwrap();
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        // Sanitized stem, digest suffix, mp4 container
        assert!(name.starts_with("my_swing__1_-"));
        assert!(name.ends_with(".mp4"));

        // Same metadata: same key
        assert_eq!(first, p.cache_path(&src).unwrap());

        // Changed size: changed key
        let mut f = std::fs::OpenOptions::new().append(true).open(&src).unwrap();
        f.write_all(b"defg").unwrap();
        drop(f);
        assert_ne!(first, p.cache_path(&src).unwrap());
    }

    #[test]
    fn probe_json_parses_rational_frame_rate() {
        let raw = r#"{
            "streams": [
                {"codec_name": "hevc", "width": 1920, "height": 1080,
                 "avg_frame_rate": "30000/1001"}
            ],
            "format": {"duration": "2.336000"}
        }"#;
        let info = parse_probe_json(raw).unwrap();
        assert_eq!(info.codec_name.as_deref(), Some("hevc"));
        assert_eq!(info.width, Some(1920));
        assert!((info.fps.unwrap() - 29.97).abs() < 0.01);
        assert!((info.duration_sec.unwrap() - 2.336).abs() < 1e-9);
    }

    #[test]
    fn probe_json_tolerates_missing_sections() {
        let info = parse_probe_json(r#"{"streams": []}"#).unwrap();
        assert_eq!(info, ProbeInfo::default());
        assert!(parse_probe_json("not json").is_none());
    }

    #[test]
    fn frame_rate_variants() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("60"), Some(60.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }
}
