use super::errors::{Result, TranscodingError};
use crate::models::Resolution;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// EncoderDriver spawns ffmpeg for one (input, resolution) pair, producing a
/// segmented HLS rendition, and reports percent progress parsed from the
/// encoder's machine-readable output.
///
/// This is the only place the service touches an external program.
pub struct EncoderDriver {
    binary: String,
    segment_seconds: u32,
}

impl EncoderDriver {
    pub fn new(segment_seconds: u32) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            segment_seconds,
        }
    }

    #[cfg(test)]
    pub fn with_binary(binary: String, segment_seconds: u32) -> Self {
        Self {
            binary,
            segment_seconds,
        }
    }

    /// Builds the full encoder argument vector for one rendition.
    pub fn build_args(&self, input: &Path, output_dir: &Path, resolution: Resolution) -> Vec<String> {
        let (width, height) = resolution.dimensions();
        let bitrate = resolution.bitrate_kbps();
        let bufsize = resolution.bufsize_kbps();
        let segment_template = output_dir.join("segment_%03d.ts");
        let playlist = output_dir.join("playlist.m3u8");

        vec![
            "-i".into(),
            input.to_string_lossy().into_owned(),
            // Scale into the target box, then pad to the exact dimensions so
            // the aspect ratio of the source is preserved.
            "-vf".into(),
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
                w = width,
                h = height
            ),
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            "23".into(),
            "-b:v".into(),
            format!("{}k", bitrate),
            "-maxrate".into(),
            format!("{}k", bitrate),
            "-bufsize".into(),
            format!("{}k", bufsize),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-ar".into(),
            "44100".into(),
            "-ac".into(),
            "2".into(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            self.segment_seconds.to_string(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            segment_template.to_string_lossy().into_owned(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
            "-y".into(),
            playlist.to_string_lossy().into_owned(),
        ]
    }

    /// Runs the encoder to completion. `on_progress` fires for every parsed
    /// progress line with the current percent (capped at 99 while running),
    /// and once more with 100 after a clean exit. Resolves with the playlist
    /// path on success.
    pub async fn run<F>(
        &self,
        input: &Path,
        output_dir: &Path,
        resolution: Resolution,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(u8) + Send,
    {
        let args = self.build_args(input, output_dir, resolution);
        debug!(resolution = %resolution, "Spawning encoder: {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TranscodingError::EncoderUnavailable(format!(
                    "failed to spawn {}: {}",
                    self.binary, e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscodingError::EncoderUnavailable("no stdout pipe".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscodingError::EncoderUnavailable("no stderr pipe".into()))?;

        // The duration banner arrives on stderr while progress arrives on
        // stdout; the stderr reader shares what it learns, and keeps the
        // last lines around for error reporting.
        let duration_seconds: Arc<Mutex<Option<f64>>> = Arc::new(Mutex::new(None));
        let stderr_tail: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let duration_writer = duration_seconds.clone();
        let tail_writer = stderr_tail.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if duration_writer.lock().expect("duration lock").is_none() {
                    if let Some(seconds) = parse_duration_banner(&line) {
                        *duration_writer.lock().expect("duration lock") = Some(seconds);
                    }
                }
                let mut tail = tail_writer.lock().expect("tail lock");
                tail.push(line);
                if tail.len() > 20 {
                    tail.remove(0);
                }
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(current_seconds) = parse_out_time_line(&line) {
                let duration = *duration_seconds.lock().expect("duration lock");
                match duration {
                    Some(total) if total > 0.0 => {
                        on_progress(running_percent(current_seconds, total));
                    }
                    _ => {
                        // Banner not seen yet; skip rather than guess.
                    }
                }
            }
        }

        let status = child.wait().await?;
        let _ = stderr_task.await;

        if status.success() {
            on_progress(100);
            Ok(output_dir.join("playlist.m3u8"))
        } else {
            let code = status.code().unwrap_or(-1);
            let detail = stderr_tail
                .lock()
                .expect("tail lock")
                .join("\n");
            warn!(resolution = %resolution, code = code, "Encoder failed");
            Err(TranscodingError::EncoderFailed { code, detail })
        }
    }
}

/// Parses the stderr banner line `  Duration: HH:MM:SS.cc, ...` into seconds.
pub fn parse_duration_banner(line: &str) -> Option<f64> {
    let re = Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2})\.(\d{2})").ok()?;
    let caps = re.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let centis: f64 = caps[4].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0)
}

/// Parses a stdout `out_time_ms=<microseconds>` progress line into seconds.
pub fn parse_out_time_line(line: &str) -> Option<f64> {
    let value = line.strip_prefix("out_time_ms=")?.trim();
    let micros: u64 = value.parse().ok()?;
    Some(micros as f64 / 1_000_000.0)
}

/// Percent while the encoder is still running, capped at 99.
pub fn running_percent(current_seconds: f64, duration_seconds: f64) -> u8 {
    let percent = (current_seconds / duration_seconds * 100.0).min(99.0);
    percent.max(0.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_banner() {
        let line = "  Duration: 00:01:30.50, start: 0.000000, bitrate: 1205 kb/s";
        assert_eq!(parse_duration_banner(line), Some(90.5));

        let line = "  Duration: 01:02:03.04, start: 0.000000";
        let parsed = parse_duration_banner(line).unwrap();
        assert!((parsed - 3723.04).abs() < 1e-9);

        assert_eq!(parse_duration_banner("frame=  100 fps= 25"), None);
        assert_eq!(parse_duration_banner("Duration: N/A"), None);
    }

    #[test]
    fn test_parse_out_time_line() {
        assert_eq!(parse_out_time_line("out_time_ms=45000000"), Some(45.0));
        assert_eq!(parse_out_time_line("out_time_ms=500000"), Some(0.5));
        assert_eq!(parse_out_time_line("out_time=00:00:45.000000"), None);
        assert_eq!(parse_out_time_line("progress=continue"), None);
        assert_eq!(parse_out_time_line("out_time_ms=garbage"), None);
    }

    #[test]
    fn test_running_percent_caps_at_99() {
        assert_eq!(running_percent(0.0, 100.0), 0);
        assert_eq!(running_percent(45.0, 100.0), 45);
        assert_eq!(running_percent(100.0, 100.0), 99);
        assert_eq!(running_percent(250.0, 100.0), 99);
    }

    #[test]
    fn test_build_args_shape() {
        let driver = EncoderDriver::new(4);
        let args = driver.build_args(
            Path::new("/tmp/in.mp4"),
            Path::new("/tmp/out/medium"),
            Resolution::Medium,
        );

        let joined = args.join(" ");
        assert!(joined.contains("-i /tmp/in.mp4"));
        assert!(joined.contains(
            "scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2"
        ));
        assert!(joined.contains("-crf 23"));
        assert!(joined.contains("-b:v 2500k"));
        assert!(joined.contains("-maxrate 2500k"));
        assert!(joined.contains("-bufsize 5000k"));
        assert!(joined.contains("-b:a 128k"));
        assert!(joined.contains("-ar 44100"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-f hls"));
        assert!(joined.contains("-hls_time 4"));
        assert!(joined.contains("-hls_list_size 0"));
        assert!(joined.contains("segment_%03d.ts"));
        assert!(joined.contains("-progress pipe:1"));
        assert!(joined.contains("-nostats"));
        assert!(joined.contains("-y"));
        assert!(joined.ends_with("/tmp/out/medium/playlist.m3u8"));
    }

    #[test]
    fn test_build_args_per_resolution_bitrates() {
        let driver = EncoderDriver::new(4);
        for (resolution, bitrate, bufsize) in [
            (Resolution::Low, "800k", "1600k"),
            (Resolution::Medium, "2500k", "5000k"),
            (Resolution::High, "5000k", "10000k"),
        ] {
            let args = driver.build_args(Path::new("in.mp4"), Path::new("out"), resolution);
            let joined = args.join(" ");
            assert!(joined.contains(&format!("-b:v {}", bitrate)));
            assert!(joined.contains(&format!("-bufsize {}", bufsize)));
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_encoder_unavailable() {
        let driver = EncoderDriver::with_binary("definitely-not-a-real-encoder".into(), 4);
        let result = driver
            .run(
                Path::new("/tmp/in.mp4"),
                Path::new("/tmp/out"),
                Resolution::Low,
                |_| {},
            )
            .await;
        assert!(matches!(
            result,
            Err(TranscodingError::EncoderUnavailable(_))
        ));
    }
}
