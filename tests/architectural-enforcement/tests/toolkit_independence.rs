//! Integration Test: Toolkit Independence
//!
//! **Policy**: The framework core knows views only through `ViewAdapter`.
//! It MUST NOT depend on a UI toolkit or terminal crate, and its code MUST
//! NOT name one.

use architectural_enforcement::{declared_dependencies, production_lines, rust_sources};

/// Crates that would tie the core to one presentation technology
const FORBIDDEN: &[&str] = &[
    "ratatui",
    "crossterm",
    "termion",
    "gtk",
    "gtk4",
    "winit",
    "egui",
    "eframe",
    "iced",
    "slint",
    "tauri",
    "windows",
];

#[test]
fn test_core_has_no_toolkit_dependencies() {
    let declared = declared_dependencies("caliburn/core/Cargo.toml");
    let violations: Vec<&String> = declared
        .iter()
        .filter(|name| FORBIDDEN.contains(&name.as_str()))
        .collect();

    assert!(
        violations.is_empty(),
        "caliburn-core depends on toolkit crates: {:?}",
        violations
    );
}

#[test]
fn test_core_code_does_not_import_toolkits() {
    let violations: Vec<String> = rust_sources("caliburn/core/src")
        .iter()
        .flat_map(|file| production_lines(file))
        .filter(|line| {
            FORBIDDEN
                .iter()
                .any(|name| line.code.contains(&format!("use {name}::")))
        })
        .map(|line| line.to_string())
        .collect();

    assert!(
        violations.is_empty(),
        "toolkit imports in caliburn-core:\n{}",
        violations.join("\n")
    );
}
