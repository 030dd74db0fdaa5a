//! Shared test helpers: a scripted engine and a scripted output probe.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dcm2stl_converter::{BatchDriver, ConversionRequest, FormatPair, OutputProbe};
use dcm2stl_core::config::BatchConfig;
use dcm2stl_core::traits::engine::{ConversionEngine, EngineOption};
use dcm2stl_core::{AppError, AppResult};
use tokio_util::sync::CancellationToken;

/// A control-protocol call observed by the fake engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Attach,
    Detach,
    SetOption(EngineOption, String),
    GetOption(EngineOption),
    Execute,
    Finished,
}

/// What the fake engine does and what it has seen.
#[derive(Debug, Default)]
pub struct Script {
    /// Results of successive attaches; missing entries succeed.
    pub attaches: VecDeque<bool>,
    /// Status codes of successive executes; missing entries return 0.
    pub codes: VecDeque<i32>,
    /// `finished` turns true on this read after each execute; never if `None`.
    pub finish_after: Option<u32>,
    /// Value reported for `INPUT_FORMAT` instead of the configured one.
    pub reported_format: Option<String>,
    /// Panic inside this execute (1-based).
    pub panic_on_execute: Option<u32>,
    /// Cancel this token during this execute (1-based).
    pub cancel_on_execute: Option<(u32, CancellationToken)>,
    /// Executes (1-based) whose call breaks in transport instead of returning a code.
    pub broken_executes: Vec<u32>,

    pub calls: Vec<Call>,
    pub(crate) reads_since_execute: u32,
    pub(crate) executes: u32,
    pub(crate) input_format: String,
}

/// Fake engine whose behaviour is scripted and whose calls are recorded.
///
/// Clones share state, so a test can keep a handle after giving the engine
/// to the driver.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<Script>>,
}

impl FakeEngine {
    pub fn new(script: Script) -> Self {
        Self {
            state: Arc::new(Mutex::new(script)),
        }
    }

    /// Engine that returns the given codes and finishes after one poll.
    pub fn with_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self::new(Script {
            codes: codes.into_iter().collect(),
            finish_after: Some(1),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().expect("lock").calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn executes(&self) -> usize {
        self.count(&Call::Execute)
    }

    pub fn attaches(&self) -> usize {
        self.count(&Call::Attach)
    }

    pub fn detaches(&self) -> usize {
        self.count(&Call::Detach)
    }

    pub fn finished_reads(&self) -> usize {
        self.count(&Call::Finished)
    }

    /// Input files passed to execute, in order.
    pub fn input_files(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetOption(EngineOption::InputFile, v) => Some(v),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ConversionEngine for FakeEngine {
    async fn attach(&mut self) -> AppResult<()> {
        let mut s = self.state.lock().expect("lock");
        s.calls.push(Call::Attach);
        if s.attaches.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(AppError::engine("engine not registered"))
        }
    }

    async fn detach(&mut self) -> AppResult<()> {
        self.state.lock().expect("lock").calls.push(Call::Detach);
        Ok(())
    }

    async fn set_option(&mut self, option: EngineOption, value: &str) -> AppResult<()> {
        let mut s = self.state.lock().expect("lock");
        s.calls.push(Call::SetOption(option, value.to_string()));
        if option == EngineOption::InputFormat {
            s.input_format = value.to_string();
        }
        Ok(())
    }

    async fn get_option(&mut self, option: EngineOption) -> AppResult<String> {
        let mut s = self.state.lock().expect("lock");
        s.calls.push(Call::GetOption(option));
        Ok(s.reported_format
            .clone()
            .unwrap_or_else(|| s.input_format.clone()))
    }

    async fn execute(&mut self) -> AppResult<i32> {
        let (code, panic_now, broken) = {
            let mut s = self.state.lock().expect("lock");
            s.calls.push(Call::Execute);
            s.executes += 1;
            s.reads_since_execute = 0;
            let n = s.executes;
            if let Some((at, token)) = &s.cancel_on_execute {
                if *at == n {
                    token.cancel();
                }
            }
            (
                s.codes.pop_front().unwrap_or(0),
                s.panic_on_execute == Some(n),
                s.broken_executes.contains(&n),
            )
        };
        if panic_now {
            panic!("engine crashed");
        }
        if broken {
            return Err(AppError::engine("bridge execute failed: pipe closed"));
        }
        Ok(code)
    }

    async fn is_finished(&mut self) -> AppResult<bool> {
        let mut s = self.state.lock().expect("lock");
        s.calls.push(Call::Finished);
        s.reads_since_execute += 1;
        Ok(s.finish_after.is_some_and(|n| s.reads_since_execute >= n))
    }
}

/// When a scripted output becomes visible.
#[derive(Debug, Clone, Copy)]
pub enum Visibility {
    Immediately,
    AfterChecks(u32),
    Never,
}

/// Output probe with scripted visibility; counts checks per batch.
#[derive(Debug)]
pub struct FakeProbe {
    visibility: Visibility,
    checks: AtomicU32,
    checks_for_path: Mutex<Vec<PathBuf>>,
}

impl FakeProbe {
    pub fn new(visibility: Visibility) -> Arc<Self> {
        Arc::new(Self {
            visibility,
            checks: AtomicU32::new(0),
            checks_for_path: Mutex::new(Vec::new()),
        })
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn checked_paths(&self) -> Vec<PathBuf> {
        self.checks_for_path.lock().expect("lock").clone()
    }
}

#[async_trait]
impl OutputProbe for FakeProbe {
    async fn exists(&self, path: &Path) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let mut paths = self.checks_for_path.lock().expect("lock");
        paths.push(path.to_path_buf());
        let for_path = paths.iter().filter(|p| p.as_path() == path).count() as u32;
        match self.visibility {
            Visibility::Immediately => true,
            Visibility::AfterChecks(n) => for_path >= n,
            Visibility::Never => false,
        }
    }
}

/// Default batch timing: 25 ms polls for up to 30 s, 5 re-checks 200 ms apart.
pub fn batch_config() -> BatchConfig {
    BatchConfig::default()
}

pub fn driver(config: BatchConfig, probe: Arc<FakeProbe>) -> BatchDriver {
    BatchDriver::new(config, FormatPair::default()).with_probe(probe)
}

pub fn requests(n: usize) -> Vec<ConversionRequest> {
    (0..n)
        .map(|i| {
            ConversionRequest::new(
                format!("/scans/case{i:03}/PreparationScan.dcm"),
                format!("/scans/case{i:03}/PreparationScan.stl"),
            )
        })
        .collect()
}
