//! Integration Test: Sleep Prohibition
//!
//! **Policy**: The framework core MUST NOT call sleep methods outside tests.
//! Work that has to happen later is posted to a scheduler or awaits a
//! signal; it never waits on a timer.
//!
//! The demo host is exempt: its view models simulate slow work.

use architectural_enforcement::{production_lines, rust_sources, SourceLine};

/// Directories whose production code is checked
const CHECKED: &[&str] = &["caliburn/core/src"];

#[test]
fn test_no_sleep_in_core() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in framework code!\n");
        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }
        eprintln!("\n✅ Instead:");
        eprintln!("  - Post the work to a Scheduler");
        eprintln!("  - Await a Notify, channel or Operation");

        panic!(
            "\nFound {} sleep violation(s) in framework code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_core_sources_are_scanned() {
    // An empty scan would make the prohibition vacuous
    assert!(!rust_sources("caliburn/core/src").is_empty());
}

fn find_sleep_violations() -> Vec<SourceLine> {
    CHECKED
        .iter()
        .flat_map(|dir| rust_sources(dir))
        .flat_map(|file| production_lines(&file))
        .filter(|line| line.code.contains("::sleep(") || line.code.contains(".sleep("))
        .collect()
}
