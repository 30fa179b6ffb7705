use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub duration_secs: u32,
    pub fingerprint: String,
}

pub struct FingerprintTool {
    tool: &'static str,
}

impl Default for FingerprintTool {
    fn default() -> Self {
        FingerprintTool { tool: "fpcalc" }
    }
}

impl FingerprintTool {
    pub fn with_tool(tool: &'static str) -> Self {
        FingerprintTool { tool }
    }

    pub async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ProbeError> {
        let output = Command::new(self.tool)
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
                stderr_tail: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_fpcalc_output(&text, self.tool)
    }
}

/// Locates the `DURATION=` and `FINGERPRINT=` key prefixes on successive lines
/// (§6), ignoring any other output.
fn parse_fpcalc_output(text: &str, tool: &'static str) -> Result<Fingerprint, ProbeError> {
    let mut duration_secs = None;
    let mut fingerprint = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("DURATION=") {
            duration_secs = rest.trim().parse::<u32>().ok();
        } else if let Some(rest) = line.strip_prefix("FINGERPRINT=") {
            fingerprint = Some(rest.trim().to_string());
        }
    }

    match (duration_secs, fingerprint) {
        (Some(duration_secs), Some(fingerprint)) => Ok(Fingerprint {
            duration_secs,
            fingerprint,
        }),
        _ => Err(ProbeError::Malformed(tool, text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_and_fingerprint_lines() {
        let text = "DURATION=204\nFINGERPRINT=AQAAjUk...\n";
        let parsed = parse_fpcalc_output(text, "fpcalc").unwrap();
        assert_eq!(parsed.duration_secs, 204);
        assert_eq!(parsed.fingerprint, "AQAAjUk...");
    }

    #[test]
    fn missing_fingerprint_is_malformed() {
        let text = "DURATION=204\n";
        assert!(parse_fpcalc_output(text, "fpcalc").is_err());
    }
}
