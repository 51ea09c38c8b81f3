//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the brain MUST NOT sleep. Turns wait on the
//! producer channel, a fragment timeout, or the emotion deadline
//! (`sleep_until` on a computed instant); periodic work uses
//! `tokio::time::interval`.
//! **Exceptions**: test code

use architectural_enforcement::find_violations;

const PRODUCTION_DIRS: [&str; 2] = ["brain/core/src", "brain/daemon/src"];

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("thread::sleep")
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| find_violations(dir, is_sleep_call))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ ACCEPTABLE waits:");
        eprintln!("  - tokio::time::timeout around channel or socket reads");
        eprintln!("  - tokio::time::sleep_until on a turn deadline");
        eprintln!("  - tokio::time::interval for periodic sweeps");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_detector_flags_sleep_but_not_deadlines() {
    assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
    assert!(is_sleep_call("    std::thread::sleep(d);"));
    assert!(!is_sleep_call("    () = sleep_until(deadline), if !closed => None,"));
}
