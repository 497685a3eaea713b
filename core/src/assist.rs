//! Boundary to the fix assistant. The engine only produces the request; the
//! response is handed back to the caller untouched.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AssistantConfig;
use crate::error::VerifyError;

/// Text the user asked to have fixed, with the field it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixRequest {
    pub snippet: String,
    /// Dotted field path; empty when unknown.
    #[serde(default)]
    pub path: String,
}

/// Assistant reply. `payload` is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixResponse {
    pub status: String,
    #[serde(default)]
    pub payload: Value,
}

pub trait FixAssistant {
    fn request_fix(&self, request: &FixRequest) -> Result<FixResponse, VerifyError>;
}

/// Runs an external program: request JSON on stdin, response JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandAssistant {
    program: String,
    args: Vec<String>,
}

impl CommandAssistant {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Option<Self> {
        let program = config.command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        Some(Self::new(program, config.args.clone()))
    }
}

impl FixAssistant for CommandAssistant {
    fn request_fix(&self, request: &FixRequest) -> Result<FixResponse, VerifyError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| VerifyError::Assistant(format!("cannot encode request: {e}")))?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| VerifyError::Assistant(format!("cannot start `{}`: {e}", self.program)))?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&body),
            None => Ok(()),
        };
        // Always reap the child, even when it closed stdin early.
        let output = child.wait_with_output()?;
        match written {
            Err(err) if err.kind() != ErrorKind::BrokenPipe => Err(err.into()),
            _ => Ok(parse_response(&output.stdout)),
        }
    }
}

fn parse_response(stdout: &[u8]) -> FixResponse {
    match serde_json::from_slice::<FixResponse>(stdout) {
        Ok(response) => response,
        Err(err) => FixResponse {
            status: "error".into(),
            payload: Value::String(format!("unreadable assistant reply: {err}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_both_fields() {
        let request = FixRequest {
            snippet: "zeta".into(),
            path: String::new(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"snippet": "zeta", "path": ""})
        );
    }

    #[test]
    fn non_json_reply_becomes_error_status() {
        let response = parse_response(b"not json");
        assert_eq!(response.status, "error");
        let ok = parse_response(br#"{"status": "success", "payload": {"fixed": "x"}}"#);
        assert_eq!(ok.status, "success");
        assert_eq!(ok.payload["fixed"], "x");
    }

    #[test]
    fn blank_command_disables_assistant() {
        let cfg = AssistantConfig {
            command: Some("  ".into()),
            args: Vec::new(),
        };
        assert!(CommandAssistant::from_config(&cfg).is_none());
        assert!(CommandAssistant::from_config(&AssistantConfig::default()).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn command_assistant_round_trips_through_a_process() {
        let assistant = CommandAssistant::new(
            "sh",
            vec![
                "-c".into(),
                r#"cat >/dev/null; printf '{"status":"success","payload":1}'"#.into(),
            ],
        );
        let request = FixRequest {
            snippet: "word".into(),
            path: "content".into(),
        };
        let response = assistant.request_fix(&request).unwrap();
        assert_eq!(response.status, "success");
        assert_eq!(response.payload, json!(1));
    }

    #[cfg(unix)]
    #[test]
    fn assistant_ignoring_stdin_still_answers() {
        let assistant = CommandAssistant::new(
            "sh",
            vec![
                "-c".into(),
                r#"exec 0<&-; printf '{"status":"skipped"}'"#.into(),
            ],
        );
        let request = FixRequest {
            snippet: "x".repeat(1 << 20),
            path: "content".into(),
        };
        let response = assistant.request_fix(&request).unwrap();
        assert_eq!(response.status, "skipped");
    }
}
