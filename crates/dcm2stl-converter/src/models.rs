//! Domain models: requests, error kinds, and per-request outcomes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::EngineStatus;
use crate::error::ConversionError;

/// Batch-level format configuration applied to a session after attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPair {
    /// Source format name (`INPUT_FORMAT`).
    pub input: String,
    /// Target format name (`OUTPUT_FORMAT`).
    pub output: String,
}

impl FormatPair {
    /// Create a format pair.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

impl Default for FormatPair {
    fn default() -> Self {
        Self::new("3Shape", "STL")
    }
}

/// One conversion to perform: an input scan and the mesh path to write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionRequest {
    input: PathBuf,
    output: PathBuf,
}

impl ConversionRequest {
    /// Create a request with an explicit output path.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Create a request whose output sits next to the input with the
    /// extension replaced.
    pub fn for_input(
        input: impl Into<PathBuf>,
        output_extension: &str,
    ) -> Result<Self, ConversionError> {
        let input = input.into();
        if input.file_stem().is_none() {
            return Err(ConversionError::InvalidRequest {
                path: input,
                reason: "path has no file name".to_string(),
            });
        }
        let output = input.with_extension(output_extension);
        if output == input {
            return Err(ConversionError::InvalidRequest {
                path: input,
                reason: "output path would overwrite the input".to_string(),
            });
        }
        Ok(Self { input, output })
    }

    /// Input scan path.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Output mesh path.
    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl fmt::Display for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.input.display(), self.output.display())
    }
}

/// Why a request did not produce a confirmed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum ErrorKind {
    /// Engine status 1.
    GeneralError,
    /// Engine status 2.
    InvalidInputFile,
    /// Engine status 3.
    InvalidOutputFile,
    /// Engine status 4.
    ConversionFailed,
    /// Engine status 5.
    UnsupportedFormat,
    /// Engine status 6.
    FileNotFound,
    /// Engine status 7, after the single retry (or a failed reattach).
    SessionDetached,
    /// Engine status 99.
    UnknownError,
    /// Any status outside the documented table.
    Undocumented(i32),
    /// The completion signal never arrived within the poll bound.
    PollTimeout,
    /// The engine reported success but the output never appeared.
    OutputNotObserved,
}

impl ErrorKind {
    /// Map an engine status to the error it represents; `None` for success.
    pub fn from_status(status: EngineStatus) -> Option<Self> {
        match status {
            EngineStatus::Success => None,
            EngineStatus::GeneralError => Some(Self::GeneralError),
            EngineStatus::InvalidInputFile => Some(Self::InvalidInputFile),
            EngineStatus::InvalidOutputFile => Some(Self::InvalidOutputFile),
            EngineStatus::ConversionFailed => Some(Self::ConversionFailed),
            EngineStatus::UnsupportedFormat => Some(Self::UnsupportedFormat),
            EngineStatus::FileNotFound => Some(Self::FileNotFound),
            EngineStatus::SessionDetached => Some(Self::SessionDetached),
            EngineStatus::UnknownError => Some(Self::UnknownError),
            EngineStatus::Undocumented(code) => Some(Self::Undocumented(code)),
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PollTimeout => "The engine did not signal completion in time",
            Self::OutputNotObserved => "The engine reported success but no output file appeared",
            Self::GeneralError => EngineStatus::GeneralError.description(),
            Self::InvalidInputFile => EngineStatus::InvalidInputFile.description(),
            Self::InvalidOutputFile => EngineStatus::InvalidOutputFile.description(),
            Self::ConversionFailed => EngineStatus::ConversionFailed.description(),
            Self::UnsupportedFormat => EngineStatus::UnsupportedFormat.description(),
            Self::FileNotFound => EngineStatus::FileNotFound.description(),
            Self::SessionDetached => EngineStatus::SessionDetached.description(),
            Self::UnknownError => EngineStatus::UnknownError.description(),
            Self::Undocumented(code) => EngineStatus::Undocumented(*code).description(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneralError => write!(f, "GeneralError"),
            Self::InvalidInputFile => write!(f, "InvalidInputFile"),
            Self::InvalidOutputFile => write!(f, "InvalidOutputFile"),
            Self::ConversionFailed => write!(f, "ConversionFailed"),
            Self::UnsupportedFormat => write!(f, "UnsupportedFormat"),
            Self::FileNotFound => write!(f, "FileNotFound"),
            Self::SessionDetached => write!(f, "SessionDetached"),
            Self::UnknownError => write!(f, "UnknownError"),
            Self::Undocumented(code) => write!(f, "Undocumented({code})"),
            Self::PollTimeout => write!(f, "PollTimeout"),
            Self::OutputNotObserved => write!(f, "OutputNotObserved"),
        }
    }
}

/// Terminal record of how one request was resolved.
///
/// Outcomes are created once by the batch driver and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    /// Position of the request in the submitted batch.
    pub sequence: usize,
    /// The request this outcome belongs to.
    pub request: ConversionRequest,
    /// Status code of the last execute call; `None` if execute never ran.
    pub status_code: Option<i32>,
    /// Failure kind; `None` means the output was converted and confirmed.
    pub error_kind: Option<ErrorKind>,
    /// Whether a second execute was issued after a detach.
    pub retried: bool,
    /// Whether the output file was observed on disk.
    pub output_confirmed: bool,
    /// Number of completion polls performed.
    pub polls: u32,
    /// Number of output existence checks performed.
    pub verify_checks: u32,
    /// Wall-clock time spent on the request.
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub elapsed: Duration,
    /// Extra context, e.g. why a reattach failed.
    pub note: Option<String>,
}

impl ConversionOutcome {
    /// Whether the request converted and its output was confirmed.
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none() && self.output_confirmed
    }

    /// Short label for display.
    pub fn label(&self) -> String {
        match self.error_kind {
            None => "converted".to_string(),
            Some(ErrorKind::OutputNotObserved) => "not observed".to_string(),
            Some(kind) => format!("failed: {kind}"),
        }
    }
}

/// Serialize a Duration as milliseconds.
pub(crate) fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Deserialize a Duration from milliseconds.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis: u64 = Deserialize::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}
