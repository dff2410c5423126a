//! A reply bridge backed by an external program.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use inkterm_core::ReplyBridge;

/// Runs `program args... <line>` once per command line and replies with its stdout.
pub struct ProgramBridge {
    program: String,
    args: Vec<String>,
}

impl ProgramBridge {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl ReplyBridge for ProgramBridge {
    fn name(&self) -> &str {
        &self.program
    }

    async fn connect(&self) -> Result<(), String> {
        let path = find_program(&self.program).await?;
        log::info!("bridge program resolved to {path}");
        Ok(())
    }

    async fn request(&self, line: &str) -> Result<Value, String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(line)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                first_line(&stderr)
            ));
        }

        Ok(Value::String(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}

/// Locate `program` on PATH.
async fn find_program(program: &str) -> Result<String, String> {
    let output = Command::new("which")
        .arg(program)
        .output()
        .await
        .map_err(|e| format!("failed to search for {program}: {e}"))?;

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || path.is_empty() {
        return Err(format!("{program} not found on PATH"));
    }
    Ok(path)
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_returns_stdout() {
        let bridge = ProgramBridge::new("echo", vec!["-n".to_string()]);
        bridge.connect().await.unwrap();
        let reply = bridge.request("hello there").await.unwrap();
        assert_eq!(reply, Value::String("hello there".to_string()));
    }

    #[tokio::test]
    async fn test_failing_program_reports_stderr() {
        let bridge = ProgramBridge::new(
            "sh",
            vec!["-c".to_string(), "echo broken >&2; exit 4".to_string()],
        );
        let err = bridge.request("ignored").await.unwrap_err();
        assert!(err.contains("broken"), "{err}");
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_connect() {
        let bridge = ProgramBridge::new("definitely-not-a-real-program-xyz", Vec::new());
        assert!(bridge.connect().await.is_err());
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("  one \ntwo"), "one");
        assert_eq!(first_line(""), "");
    }
}
