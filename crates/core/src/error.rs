//! Error types for every fallible engine operation.
//!
//! None of these are fatal to the poll loop: the scheduler logs them and
//! moves on to the next rule or action.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture failed: {0}")]
    Failed(String),

    #[error("pixel ({x}, {y}) is outside the captured frame")]
    OutOfFrame { x: i32, y: i32 },

    #[error("region {w}x{h} is empty")]
    EmptyRegion { w: i32, h: i32 },
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("input injection failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("no snapshot available for image detection")]
    NoSnapshot,
}

pub type MatchResult = Result<Option<crate::detector::Hit>, DetectError>;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("malformed coordinates '{payload}', expected \"x, y\"")]
    BadPayload { payload: String },
}

pub type ActionResult = Result<(), ActionError>;

/// Problems turning a persisted record into a validated rule.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unknown action type '{0}'")]
    UnknownAction(String),

    #[error("unknown match method '{0}'")]
    UnknownMethod(String),

    #[error("invalid color '{0}', expected \"r, g, b\"")]
    BadColor(String),

    #[error("invalid value '{value}' for {field}")]
    BadNumber { field: &'static str, value: String },

    #[error("threshold {0} is outside [0, 1]")]
    ThresholdRange(f32),

    #[error("coordinate ({x}, {y}) is negative")]
    NegativeCoordinate { x: i32, y: i32 },

    #[error("empty image path")]
    EmptyPath,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rule '{name}': {source}")]
    Record {
        name: String,
        #[source]
        source: RecordError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no rules to run")]
    NoRules,

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("rules cannot be edited while the scheduler is running")]
    Running,

    #[error("scheduler worker panicked")]
    WorkerPanicked,
}
