//! Integration Test: Global State and Panic Prohibition
//!
//! **Policy**: Polls live in an explicit `PollRegistry` handed to the
//! services that need it. Production code MUST NOT keep mutable state in
//! statics, and MUST report failures as errors rather than panicking.

use architectural_enforcement::{assert_clean, scan_workspace};

/// No `static mut`, lazy statics or lock-wrapped statics
#[test]
fn test_no_global_mutable_state() {
    let violations = scan_workspace(|ctx| {
        let code = ctx.code.trim_start();
        if code.contains("static mut ") {
            return Some("static mut");
        }
        if code.contains("lazy_static!") || code.contains("thread_local!") {
            return Some("Lazy global");
        }
        let is_static = code.starts_with("static ") || code.starts_with("pub static ");
        let holds_state = ["Mutex<", "RwLock<", "OnceLock<", "OnceCell<", "Lazy<", "RefCell<"]
            .iter()
            .any(|ty| code.contains(ty));
        (is_static && holds_state).then_some("Global mutable static")
    });
    assert_clean("global state", &violations);
}

/// Errors propagate with `?`; `unwrap`/`expect` belong in tests only
#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan_workspace(|ctx| {
        (ctx.code.contains(".unwrap()") || ctx.code.contains(".expect(")).then_some("unwrap/expect")
    });
    assert_clean("unwrap", &violations);
}
