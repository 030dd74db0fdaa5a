//! Control protocol of the external conversion engine.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// Keys of the engine's option store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineOption {
    /// Batch-level source format, set once after attach.
    InputFormat,
    /// Batch-level target format, set once after attach.
    OutputFormat,
    /// Per-call input file.
    InputFile,
    /// Per-call output file.
    OutputFile,
}

impl EngineOption {
    /// The option name as the engine spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputFormat => "INPUT_FORMAT",
            Self::OutputFormat => "OUTPUT_FORMAT",
            Self::InputFile => "INPUT_FILE",
            Self::OutputFile => "OUTPUT_FILE",
        }
    }
}

impl fmt::Display for EngineOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stateful, single-connection conversion engine.
///
/// The engine holds one mutable option surface per connection, so every
/// method takes `&mut self`: a connection can never be driven by two callers
/// at once. `execute` returning does not mean the conversion is complete;
/// callers poll [`ConversionEngine::is_finished`].
#[async_trait]
pub trait ConversionEngine: Send + fmt::Debug {
    /// Establish or refresh the connection. Idempotent.
    async fn attach(&mut self) -> AppResult<()>;

    /// Release the connection.
    async fn detach(&mut self) -> AppResult<()>;

    /// Write a value into the option store.
    async fn set_option(&mut self, option: EngineOption, value: &str) -> AppResult<()>;

    /// Read a value back from the option store.
    async fn get_option(&mut self, option: EngineOption) -> AppResult<String>;

    /// Start a conversion with the current options; returns the raw status code.
    async fn execute(&mut self) -> AppResult<i32>;

    /// Whether the most recently started conversion has finished.
    async fn is_finished(&mut self) -> AppResult<bool>;
}

#[async_trait]
impl<E: ConversionEngine + ?Sized> ConversionEngine for Box<E> {
    async fn attach(&mut self) -> AppResult<()> {
        (**self).attach().await
    }

    async fn detach(&mut self) -> AppResult<()> {
        (**self).detach().await
    }

    async fn set_option(&mut self, option: EngineOption, value: &str) -> AppResult<()> {
        (**self).set_option(option, value).await
    }

    async fn get_option(&mut self, option: EngineOption) -> AppResult<String> {
        (**self).get_option(option).await
    }

    async fn execute(&mut self) -> AppResult<i32> {
        (**self).execute().await
    }

    async fn is_finished(&mut self) -> AppResult<bool> {
        (**self).is_finished().await
    }
}
