//! Issues one conversion request against an attached session.

use dcm2stl_core::traits::engine::{ConversionEngine, EngineOption};
use tracing::{debug, warn};

use crate::catalog::EngineStatus;
use crate::error::ConversionError;
use crate::models::ConversionRequest;
use crate::session::EngineSession;

/// Result of a single execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Decoded engine status.
    pub status: EngineStatus,
    /// Raw code returned by the engine; `None` when the status was inferred.
    pub code: Option<i32>,
    /// Set when the call failed in transport and the status was inferred.
    pub transport_error: Option<String>,
}

/// Sets the per-call file options and starts the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionExecutor;

impl ConversionExecutor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self
    }

    /// Start converting `request` and return the engine's status immediately.
    ///
    /// The conversion may still be running when this returns. A transport
    /// failure (the connection broke mid-call) is reported as
    /// [`EngineStatus::SessionDetached`], which the caller handles exactly like
    /// an engine-reported detachment, with no raw code attached.
    pub async fn execute<E: ConversionEngine>(
        &self,
        session: &mut EngineSession<E>,
        request: &ConversionRequest,
    ) -> Result<Execution, ConversionError> {
        if !session.is_attached() {
            return Err(ConversionError::NotAttached);
        }

        let input = request.input().to_string_lossy();
        let output = request.output().to_string_lossy();

        let engine = session.engine_mut();
        let result = async {
            engine.set_option(EngineOption::InputFile, &input).await?;
            engine.set_option(EngineOption::OutputFile, &output).await?;
            engine.execute().await
        }
        .await;

        match result {
            Ok(code) => {
                let status = EngineStatus::from_code(code);
                debug!(
                    request = %request,
                    status_code = code,
                    status = %status,
                    "Engine execute returned"
                );
                if status == EngineStatus::SessionDetached {
                    session.mark_detached();
                }
                Ok(Execution {
                    status,
                    code: Some(code),
                    transport_error: None,
                })
            }
            Err(e) => {
                warn!(
                    request = %request,
                    error = %e,
                    "Engine call failed, treating session as detached"
                );
                session.mark_detached();
                Ok(Execution {
                    status: EngineStatus::SessionDetached,
                    code: None,
                    transport_error: Some(e.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormatPair;
    use async_trait::async_trait;
    use dcm2stl_core::{AppError, AppResult};
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    struct ScriptEngine {
        codes: VecDeque<AppResult<i32>>,
        files: Vec<(EngineOption, String)>,
    }

    #[async_trait]
    impl ConversionEngine for ScriptEngine {
        async fn attach(&mut self) -> AppResult<()> {
            Ok(())
        }

        async fn detach(&mut self) -> AppResult<()> {
            Ok(())
        }

        async fn set_option(&mut self, option: EngineOption, value: &str) -> AppResult<()> {
            self.files.push((option, value.to_string()));
            Ok(())
        }

        async fn get_option(&mut self, _option: EngineOption) -> AppResult<String> {
            Ok(String::new())
        }

        async fn execute(&mut self) -> AppResult<i32> {
            self.codes.pop_front().unwrap_or(Ok(0))
        }

        async fn is_finished(&mut self) -> AppResult<bool> {
            Ok(true)
        }
    }

    async fn session_with(codes: Vec<AppResult<i32>>) -> EngineSession<ScriptEngine> {
        let engine = ScriptEngine {
            codes: codes.into(),
            files: Vec::new(),
        };
        EngineSession::open(engine, FormatPair::default())
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn test_execute_sets_file_options() {
        let mut session = session_with(vec![Ok(0)]).await;
        let request = ConversionRequest::new("/in/a.dcm", "/in/a.stl");
        let exec = ConversionExecutor::new()
            .execute(&mut session, &request)
            .await
            .expect("execute");
        assert_eq!(exec.status, EngineStatus::Success);
        assert_eq!(exec.code, Some(0));
        assert!(exec.transport_error.is_none());

        let files = &session.engine_mut().files;
        assert!(files.contains(&(EngineOption::InputFile, "/in/a.dcm".to_string())));
        assert!(files.contains(&(EngineOption::OutputFile, "/in/a.stl".to_string())));
    }

    #[tokio::test]
    async fn test_detached_status_marks_session() {
        let mut session = session_with(vec![Ok(7)]).await;
        let request = ConversionRequest::new("a.dcm", "a.stl");
        let exec = ConversionExecutor::new()
            .execute(&mut session, &request)
            .await
            .expect("execute");
        assert_eq!(exec.status, EngineStatus::SessionDetached);
        assert_eq!(exec.code, Some(7));
        assert!(!session.is_attached());
    }

    #[tokio::test]
    async fn test_transport_failure_reads_as_detached() {
        let mut session = session_with(vec![Err(AppError::engine("pipe closed"))]).await;
        let request = ConversionRequest::new("a.dcm", "a.stl");
        let exec = ConversionExecutor::new()
            .execute(&mut session, &request)
            .await
            .expect("execute");
        assert_eq!(exec.status, EngineStatus::SessionDetached);
        assert_eq!(exec.code, None);
        assert!(exec.transport_error.is_some_and(|e| e.contains("pipe closed")));
        assert!(!session.is_attached());
    }

    #[tokio::test]
    async fn test_execute_requires_attached_session() {
        let mut session = session_with(vec![]).await;
        session.detach().await;
        let request = ConversionRequest::new("a.dcm", "a.stl");
        let err = ConversionExecutor::new()
            .execute(&mut session, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::NotAttached));
    }
}
