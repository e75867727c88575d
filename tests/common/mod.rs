//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across integration test files.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use courtside::adapters::transports::FixtureTransport;
use courtside::domain::models::{CopyBrief, CostModel, RoleTable, TraceContext};
use courtside::services::AgentInvoker;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Initialize a test-writer subscriber. Safe to call more than once.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn invoker(transport: Arc<FixtureTransport>) -> Arc<AgentInvoker> {
    Arc::new(AgentInvoker::new(transport, RoleTable::default(), CostModel::default()))
}

pub fn invoker_with_roles(transport: Arc<FixtureTransport>, roles: RoleTable) -> Arc<AgentInvoker> {
    Arc::new(AgentInvoker::new(transport, roles, CostModel::default()))
}

pub fn trace(run_id: &str) -> TraceContext {
    TraceContext::new("test-job", run_id, "start")
}

pub fn brief() -> CopyBrief {
    CopyBrief {
        brief: "Family-owned plumbing company serving Austin since 1998".to_string(),
        ..CopyBrief::default()
    }
}

/// A repository with the given files, each holding a small TypeScript body.
pub fn repo_with(files: &[&str]) -> TempDir {
    let dir = temp_dir();
    for file in files {
        let path = dir.path().join(file);
        fs::create_dir_all(path.parent().expect("file has a parent")).expect("create parent");
        fs::write(&path, format!("// {file}\nexport {{}};\n")).expect("write file");
    }
    dir
}

/// A failure report that passes preflight against `repo_with(&["server/routes.ts"])`.
pub fn failure_report() -> Value {
    json!({
        "failureType": "typecheck",
        "stopReasonReported": "tests_failed",
        "errorMessage": "server/routes.ts(12,5): error TS2304: Cannot find name 'formatPrice'.",
        "logs": "pnpm typecheck exited with code 2",
        "targets": ["server/routes.ts"],
        "testCommands": ["pnpm typecheck"]
    })
}

/// Shared in-memory sink for captured log output.
#[derive(Clone, Default)]
pub struct LogSink(Arc<Mutex<Vec<u8>>>);

impl LogSink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log sink lock")).into_owned()
    }
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log sink lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route all events of the current thread into the returned sink while the
/// guard lives. Use with current-thread runtimes.
pub fn capture_logs() -> (LogSink, tracing::subscriber::DefaultGuard) {
    let sink = LogSink::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::TRACE)
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(move || writer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (sink, guard)
}
