//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net` inside `async fn`.
//!
//! Blocking calls in plain functions are acceptable: config loading and PID
//! file handling run before the runtime starts, and socket setup is a
//! one-off at bind time.

use architectural_enforcement::{assert_clean, scan_workspace, FnKind};

/// Test that async functions do not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_functions() {
    let violations = scan_workspace(|ctx| {
        if ctx.enclosing_fn() != Some(FnKind::Async) {
            return None;
        }
        let code = ctx.code.replace("tokio::fs::", "").replace("tokio::net::", "");

        if code.contains("std::fs::") || code.contains(" fs::") || code.contains("(fs::") {
            return Some("Blocking file I/O in async fn");
        }
        if code.contains("std::net::") {
            return Some("Blocking network I/O in async fn");
        }
        if code.contains("std::process::Command") {
            return Some("Blocking process I/O in async fn");
        }
        if code.contains("std::io::stdin()") {
            return Some("Blocking stdin in async fn");
        }
        None
    });

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O calls found in async functions!");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read().await, tokio::fs::write().await");
        eprintln!("  - tokio::net::UnixStream::connect().await");
        eprintln!("  - or move the call into a plain fn that runs before the runtime");
    }
    assert_clean("blocking I/O", &violations);
}

/// The blocking HTTP client is never acceptable
#[test]
fn test_no_blocking_http_client() {
    let violations =
        scan_workspace(|ctx| ctx.code.contains("reqwest::blocking").then_some("Blocking HTTP client"));
    assert_clean("blocking HTTP", &violations);
}
