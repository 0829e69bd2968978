//! Shared utilities for campaign-assist integration tests.
//!
//! - `ScriptedAnalysisService` replays canned service responses
//! - `RecordingStore` records every update applied to the SQLite store
//! - `TestHarness` wires both into an `AnalysisWorkflow`

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{form, TestHarness};
