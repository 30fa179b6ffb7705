use std::path::Path;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;

use crate::error::ProbeError;

/// Permissive parse of the probe subprocess's `format`/`streams` JSON (§6): unknown
/// fields are ignored, so this is kept as raw `serde_json::Value` rather than a
/// strict struct — the analyzer reads only the handful of fields it needs.
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    pub format: Value,
    pub streams: Value,
}

impl ProbeOutput {
    /// Index of the first stream whose `codec_type` is `"audio"`, if any.
    pub fn first_audio_stream_index(&self) -> Option<usize> {
        self.streams.as_array()?.iter().position(|stream| {
            stream
                .get("codec_type")
                .and_then(Value::as_str)
                .map(|ty| ty == "audio")
                .unwrap_or(false)
        })
    }

    pub fn stream_codec_type(&self, index: usize) -> Option<&str> {
        self.streams
            .as_array()?
            .get(index)?
            .get("codec_type")?
            .as_str()
    }

    pub fn bitrate_bps(&self) -> u64 {
        self.format
            .get("bit_rate")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0)
    }
}

/// Builder for the probe subprocess invocation, mirroring the trait-object-backend
/// injection shape used elsewhere in this stack: a `tool` name is configurable so
/// tests can point at a stub binary instead of a real `ffprobe`.
pub struct Prober {
    tool: &'static str,
}

impl Default for Prober {
    fn default() -> Self {
        Prober { tool: "ffprobe" }
    }
}

impl Prober {
    pub fn with_tool(tool: &'static str) -> Self {
        Prober { tool }
    }

    pub async fn probe(&self, path: &Path) -> Result<ProbeOutput, ProbeError> {
        let output = Command::new(self.tool)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                tool: self.tool,
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::NonZeroExit {
                tool: self.tool,
                status: output.status,
                stderr_tail: tail(&output.stderr),
            });
        }

        let parsed: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Malformed(self.tool, e.to_string()))?;

        let format = parsed.get("format").cloned().unwrap_or(Value::Null);
        let streams = parsed
            .get("streams")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));

        Ok(ProbeOutput { format, streams })
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let from = lines.len().saturating_sub(10);
    lines[from..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_audio_stream_index_skips_video() {
        let out = ProbeOutput {
            format: Value::Null,
            streams: serde_json::json!([
                {"codec_type": "video"},
                {"codec_type": "audio"},
            ]),
        };
        assert_eq!(out.first_audio_stream_index(), Some(1));
    }

    #[test]
    fn no_audio_stream_is_none() {
        let out = ProbeOutput {
            format: Value::Null,
            streams: serde_json::json!([{"codec_type": "video"}]),
        };
        assert_eq!(out.first_audio_stream_index(), None);
    }
}
