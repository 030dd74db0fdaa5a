//! Conversion engine hosted by a helper process.
//!
//! The helper speaks line-delimited JSON on stdin/stdout. Each request is
//! one object tagged by `op`:
//!
//! ```text
//! -> {"op":"attach"}
//! <- {"ok":true}
//! -> {"op":"set_option","option":"INPUT_FILE","value":"C:/scans/a.dcm"}
//! <- {"ok":true}
//! -> {"op":"execute"}
//! <- {"ok":true,"value":0}
//! -> {"op":"finished"}
//! <- {"ok":true,"value":false}
//! ```
//!
//! A refused operation answers `{"ok":false,"error":"..."}`. A bridge that
//! stops answering within the response timeout, closes its output, or writes
//! something unparseable is killed; the next `attach` starts a fresh one.
//! The same happens when a caller drops an exchange before its reply was
//! read, since the late reply would be taken as the answer to the next
//! request.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use dcm2stl_core::config::engine::EngineConfig;
use dcm2stl_core::traits::engine::{ConversionEngine, EngineOption};
use dcm2stl_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::ConversionError;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    Attach,
    Detach,
    SetOption { option: EngineOption, value: &'a str },
    GetOption { option: EngineOption },
    Execute,
    Finished,
}

impl BridgeRequest<'_> {
    fn op(&self) -> &'static str {
        match self {
            Self::Attach => "attach",
            Self::Detach => "detach",
            Self::SetOption { .. } => "set_option",
            Self::GetOption { .. } => "get_option",
            Self::Execute => "execute",
            Self::Finished => "finished",
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Engine reached through a helper process.
#[derive(Debug)]
pub struct BridgeEngine {
    command: PathBuf,
    args: Vec<String>,
    response_timeout: Duration,
    process: Option<BridgeProcess>,
    /// Set while a request is written but its reply not yet read.
    awaiting_reply: bool,
}

impl BridgeEngine {
    /// Create an engine; the helper is started on the first `attach`.
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>, response_timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            response_timeout,
            process: None,
            awaiting_reply: false,
        }
    }

    /// Create an engine from configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            &config.bridge_command,
            config.bridge_args.clone(),
            Duration::from_secs(config.response_timeout_seconds),
        )
    }

    /// Whether a helper process is currently running.
    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(p) => matches!(p.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn spawn(&self) -> Result<BridgeProcess, ConversionError> {
        let mut cmd = Command::new(&self.command);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(bridge = %self.command.display(), "Spawning engine bridge");

        let spawn_error = |reason: String| ConversionError::BridgeSpawn {
            command: self.command.clone(),
            reason,
        };
        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not captured".to_string()))?;

        info!(bridge = %self.command.display(), pid = ?child.id(), "Engine bridge started");
        Ok(BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Send one request and read its response.
    ///
    /// Transport failures drop (and so kill) the helper. A refusal leaves it
    /// running.
    async fn exchange(&mut self, request: BridgeRequest<'_>) -> AppResult<serde_json::Value> {
        let op = request.op();
        if self.awaiting_reply {
            return Err(self.fail(op, "previous exchange was abandoned mid-reply"));
        }
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| AppError::engine("engine bridge is not running"))?;

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        self.awaiting_reply = true;
        let io = async {
            process.stdin.write_all(line.as_bytes()).await?;
            process.stdin.flush().await?;
            process.stdout.next_line().await
        };

        let outcome = tokio::time::timeout(self.response_timeout, io).await;
        self.awaiting_reply = false;
        let reply = match outcome {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => return Err(self.fail(op, "bridge closed its output")),
            Ok(Err(e)) => return Err(self.fail(op, &e.to_string())),
            Err(_) => {
                let reason = format!("no response within {:?}", self.response_timeout);
                return Err(self.fail(op, &reason));
            }
        };

        let response: BridgeResponse = match serde_json::from_str(&reply) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(op, &format!("malformed response: {e}"))),
        };

        if response.ok {
            Ok(response.value)
        } else {
            let error = response
                .error
                .unwrap_or_else(|| "operation refused".to_string());
            Err(AppError::engine(format!("bridge refused {op}: {error}")))
        }
    }

    fn fail(&mut self, op: &str, reason: &str) -> AppError {
        warn!(op, reason, "Engine bridge failed; stopping it");
        self.process = None;
        self.awaiting_reply = false;
        AppError::engine(format!("bridge {op} failed: {reason}"))
    }
}

#[async_trait]
impl ConversionEngine for BridgeEngine {
    async fn attach(&mut self) -> AppResult<()> {
        if self.awaiting_reply {
            warn!("Engine bridge has an unread reply; restarting it");
            self.process = None;
            self.awaiting_reply = false;
        }
        if !self.is_running() {
            self.process = Some(self.spawn()?);
        }
        self.exchange(BridgeRequest::Attach).await?;
        Ok(())
    }

    async fn detach(&mut self) -> AppResult<()> {
        if self.process.is_none() {
            return Ok(());
        }
        let result = self.exchange(BridgeRequest::Detach).await.map(|_| ());

        if let Some(mut process) = self.process.take() {
            drop(process.stdin);
            match tokio::time::timeout(self.response_timeout, process.child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "Engine bridge exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for engine bridge"),
                Err(_) => {
                    warn!("Engine bridge did not exit after detach; killing it");
                    if let Err(e) = process.child.kill().await {
                        warn!(error = %e, "Failed to kill engine bridge");
                    }
                }
            }
        }
        result
    }

    async fn set_option(&mut self, option: EngineOption, value: &str) -> AppResult<()> {
        self.exchange(BridgeRequest::SetOption { option, value })
            .await?;
        Ok(())
    }

    async fn get_option(&mut self, option: EngineOption) -> AppResult<String> {
        match self.exchange(BridgeRequest::GetOption { option }).await? {
            serde_json::Value::String(value) => Ok(value),
            other => Err(AppError::engine(format!(
                "bridge returned non-string value for {option}: {other}"
            ))),
        }
    }

    async fn execute(&mut self) -> AppResult<i32> {
        let value = self.exchange(BridgeRequest::Execute).await?;
        value
            .as_i64()
            .and_then(|code| i32::try_from(code).ok())
            .ok_or_else(|| {
                AppError::engine(format!("bridge returned invalid status code: {value}"))
            })
    }

    async fn is_finished(&mut self) -> AppResult<bool> {
        let value = self.exchange(BridgeRequest::Finished).await?;
        value
            .as_bool()
            .ok_or_else(|| {
                AppError::engine(format!("bridge returned invalid finished flag: {value}"))
            })
    }
}
