//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Nothing in the
//! poll lifecycle waits on a timer: rate limits are reported to the caller,
//! never slept through, and the daemon's accept loop uses an accept timeout.
//!
//! **Exceptions**: test code

use architectural_enforcement::{assert_clean, scan_workspace};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_workspace(|ctx| {
        (ctx.code.contains("::sleep(") || ctx.code.contains(".sleep(") || ctx.code.contains("sleep_until("))
            .then_some("Sleep call")
    });

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code!");
        eprintln!("\n✅ Instead:");
        eprintln!("  - Return PlatformError::RateLimited and let the caller decide");
        eprintln!("  - Use tokio::time::timeout() around the awaited I/O");
    }
    assert_clean("sleep", &violations);
}

/// Retries hide platform failures from the requester
#[test]
fn test_no_retry_loops_in_core() {
    let violations = scan_workspace(|ctx| {
        let code = ctx.code.to_ascii_lowercase();
        (code.contains("retry(") || code.contains("backoff")).then_some("Retry logic")
    });
    assert_clean("retry", &violations);
}
