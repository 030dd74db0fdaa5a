//! Lifecycle of one connection to the conversion engine.
//!
//! An [`EngineSession`] is created by attaching, owns its engine exclusively,
//! and is released with [`EngineSession::detach`]. The batch driver calls
//! `detach` on every exit path, including panics inside the batch loop.

use std::fmt;

use dcm2stl_core::traits::engine::{ConversionEngine, EngineOption};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConversionError;
use crate::models::FormatPair;

/// Attach state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No live connection.
    Detached,
    /// Connected and configured with the batch formats.
    Attached,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "detached"),
            Self::Attached => write!(f, "attached"),
        }
    }
}

/// One attached, configured connection to the engine.
#[derive(Debug)]
pub struct EngineSession<E: ConversionEngine> {
    engine: E,
    formats: FormatPair,
    state: SessionState,
    attach_count: u32,
}

impl<E: ConversionEngine> EngineSession<E> {
    /// Attach to the engine and apply the batch formats.
    ///
    /// Fails with [`ConversionError::EngineUnavailable`] if the engine cannot
    /// be reached. Without a session no request can make progress.
    pub async fn open(engine: E, formats: FormatPair) -> Result<Self, ConversionError> {
        let mut session = Self {
            engine,
            formats,
            state: SessionState::Detached,
            attach_count: 0,
        };
        session.attach().await?;
        Ok(session)
    }

    /// (Re)establish the connection and re-assert the format configuration.
    ///
    /// Safe to call while already attached.
    pub async fn attach(&mut self) -> Result<(), ConversionError> {
        let result = self.attach_and_configure().await;
        match result {
            Ok(()) => {
                self.state = SessionState::Attached;
                self.attach_count += 1;
                debug!(
                    attach_count = self.attach_count,
                    input_format = %self.formats.input,
                    output_format = %self.formats.output,
                    "Engine session attached"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Detached;
                warn!(error = %e, "Engine attach failed");
                Err(ConversionError::EngineUnavailable {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn attach_and_configure(&mut self) -> dcm2stl_core::AppResult<()> {
        self.engine.attach().await?;
        self.engine
            .set_option(EngineOption::InputFormat, &self.formats.input)
            .await?;
        self.engine
            .set_option(EngineOption::OutputFormat, &self.formats.output)
            .await?;
        Ok(())
    }

    /// Cheap probe: read back the input format.
    ///
    /// Any failure, or a value that does not match the batch configuration,
    /// counts as unhealthy. Never returns an error.
    pub async fn is_healthy(&mut self) -> bool {
        if self.state == SessionState::Detached {
            return false;
        }
        match self.engine.get_option(EngineOption::InputFormat).await {
            Ok(value) if value == self.formats.input => true,
            Ok(value) => {
                debug!(
                    expected = %self.formats.input,
                    actual = %value,
                    "Engine session reports unexpected input format"
                );
                false
            }
            Err(e) => {
                debug!(error = %e, "Engine health probe failed");
                false
            }
        }
    }

    /// Release the connection. Safe to call repeatedly; errors are logged.
    pub async fn detach(&mut self) {
        if self.state == SessionState::Detached {
            return;
        }
        if let Err(e) = self.engine.detach().await {
            warn!(error = %e, "Engine detach failed; treating session as released");
        }
        self.state = SessionState::Detached;
        info!(attach_count = self.attach_count, "Engine session detached");
    }

    /// Mark the session as lost after the engine reported a detachment.
    pub(crate) fn mark_detached(&mut self) {
        self.state = SessionState::Detached;
    }

    /// Current attach state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is attached.
    pub fn is_attached(&self) -> bool {
        self.state == SessionState::Attached
    }

    /// Number of successful attaches, including the initial one.
    pub fn attach_count(&self) -> u32 {
        self.attach_count
    }

    /// The batch format configuration.
    pub fn formats(&self) -> &FormatPair {
        &self.formats
    }

    /// Exclusive access to the engine for request-scoped calls.
    pub(crate) fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Consume the session, returning the engine.
    ///
    /// The session should be detached first; an attached engine is returned
    /// as-is and the caller becomes responsible for releasing it.
    pub fn into_engine(self) -> E {
        if self.state == SessionState::Attached {
            warn!("Engine returned from a session that is still attached");
        }
        self.engine
    }
}
