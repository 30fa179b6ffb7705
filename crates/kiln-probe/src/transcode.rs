use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use kiln_core::TagMap;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warning,
    Error,
}

impl LogLevel {
    fn as_arg(self) -> &'static str {
        match self {
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// One audio-track transcode request, matching the argument-vector contract of
/// §6: `-v {warning|error} -nostdin -y -i <src> <user-params…> [-ss <start> -t
/// <dur>] [-vn] -map 0 [-map -0:i …] -sn -map_metadata -1 -metadata k=v … -f
/// <container> <dst>`.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub container: String,
    pub params: Vec<String>,
    pub start: Option<Duration>,
    pub duration: Option<Duration>,
    pub exclude_video: bool,
    pub excluded_stream_indices: Vec<usize>,
    pub tags: TagMap,
    pub log_level: LogLevel,
}

pub struct Transcoder {
    tool: &'static str,
}

impl Default for Transcoder {
    fn default() -> Self {
        Transcoder { tool: "ffmpeg" }
    }
}

impl Transcoder {
    pub fn with_tool(tool: &'static str) -> Self {
        Transcoder { tool }
    }

    fn build_args(&self, req: &TranscodeRequest) -> Vec<String> {
        let mut args = vec![
            "-v".to_string(),
            req.log_level.as_arg().to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            req.src.display().to_string(),
        ];

        args.extend(req.params.iter().cloned());

        if let Some(start) = req.start {
            args.push("-ss".to_string());
            args.push(format_timestamp(start));
        }
        if let Some(duration) = req.duration {
            args.push("-t".to_string());
            args.push(format_timestamp(duration));
        }
        if req.exclude_video {
            args.push("-vn".to_string());
        }

        args.push("-map".to_string());
        args.push("0".to_string());
        for index in &req.excluded_stream_indices {
            args.push("-map".to_string());
            args.push(format!("-0:{index}"));
        }

        args.push("-sn".to_string());
        args.push("-map_metadata".to_string());
        args.push("-1".to_string());

        for (key, value) in &req.tags.0 {
            args.push("-metadata".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push("-f".to_string());
        args.push(req.container.clone());
        args.push(req.dst.display().to_string());
        args
    }

    pub async fn run(&self, req: &TranscodeRequest) -> Result<(), ProbeError> {
        let args = self.build_args(req);
        let status = Command::new(self.tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| ProbeError::Spawn {
                tool: self.tool,
                source,
            })?;

        if !status.success() {
            return Err(ProbeError::NonZeroExit {
                tool: self.tool,
                status,
                stderr_tail: String::new(),
            });
        }
        Ok(())
    }

    /// Extracts a single stream (an embedded, image-like video stream — a
    /// "cover") into its own file, copying the codec rather than re-encoding
    /// (§4.5 step 4: "asking the transcoder to extract each video-type stream
    /// whose codec is image-like").
    pub async fn extract_stream(
        &self,
        src: &Path,
        stream_index: usize,
        dst: &Path,
    ) -> Result<(), ProbeError> {
        let status = Command::new(self.tool)
            .args([
                "-v",
                "warning",
                "-nostdin",
                "-y",
                "-i",
            ])
            .arg(src)
            .args(["-map", &format!("0:{stream_index}"), "-an", "-vcodec", "copy"])
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| ProbeError::Spawn {
                tool: self.tool,
                source,
            })?;

        if !status.success() {
            return Err(ProbeError::NonZeroExit {
                tool: self.tool,
                status,
                stderr_tail: String::new(),
            });
        }
        Ok(())
    }

    /// Drives a cover-art write through ffmpeg: `-i - -f <format> <params> <dst>`,
    /// piping `bytes` into stdin. Used when the output cover has transcode
    /// parameters attached (§4.6 "Cover transfer").
    pub async fn write_cover(
        &self,
        bytes: &[u8],
        format: &str,
        params: &[String],
        dst: &Path,
    ) -> Result<(), ProbeError> {
        let mut args: Vec<String> = vec!["-i".to_string(), "-".to_string()];
        args.push("-f".to_string());
        args.push(format.to_string());
        args.extend(params.iter().cloned());
        args.push(dst.display().to_string());

        let mut child = Command::new(self.tool)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                tool: self.tool,
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| ProbeError::Spawn {
            tool: self.tool,
            source: std::io::Error::other("failed to open ffmpeg stdin"),
        })?;
        stdin.write_all(bytes).await?;
        drop(stdin);

        let status = child.wait().await?;
        if !status.success() {
            return Err(ProbeError::NonZeroExit {
                tool: self.tool,
                status,
                stderr_tail: String::new(),
            });
        }
        Ok(())
    }
}

/// `HH:MM:SS.mmm` at millisecond precision, used for `-ss`/`-t` and for cue-sheet
/// disc-split time points (§6).
pub fn format_timestamp(d: Duration) -> String {
    let total_ms = d.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_timestamp() {
        assert_eq!(format_timestamp(Duration::from_millis(6 * 60_000 + 40_360)), "00:06:40.360");
        assert_eq!(format_timestamp(Duration::from_millis(0)), "00:00:00.000");
    }

    #[test]
    fn builds_copy_args() {
        let req = TranscodeRequest {
            src: PathBuf::from("/in.flac"),
            dst: PathBuf::from("/out.mp3"),
            container: "mp3".to_string(),
            params: vec!["-c:a".to_string(), "copy".to_string()],
            start: None,
            duration: None,
            exclude_video: true,
            excluded_stream_indices: vec![1],
            tags: TagMap::new(),
            log_level: LogLevel::Warning,
        };
        let args = Transcoder::default().build_args(&req);
        assert_eq!(args[0], "-v");
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.windows(2).any(|w| w == ["-map", "-0:1"]));
        assert_eq!(args.last().unwrap(), "/out.mp3");
    }
}
