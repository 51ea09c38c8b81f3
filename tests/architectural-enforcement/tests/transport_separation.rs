//! Integration Test: Transport Separation
//!
//! **Policy**: `brain-core` knows faces only as channels. WebSocket handling
//! lives in `brain-daemon`; the core must neither import nor depend on a
//! WebSocket crate.

use std::fs;

use architectural_enforcement::{find_violations, workspace_root};

const TRANSPORT_CRATES: [&str; 2] = ["tokio_tungstenite", "tungstenite"];

#[test]
fn test_core_source_has_no_websocket_imports() {
    let violations = find_violations("brain/core/src", |code| {
        TRANSPORT_CRATES.iter().any(|name| code.contains(name))
    });

    assert!(
        violations.is_empty(),
        "brain-core must stay transport-agnostic:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_manifest_has_no_websocket_dependency() {
    let manifest = fs::read_to_string(workspace_root().join("brain/core/Cargo.toml"))
        .expect("brain/core/Cargo.toml is readable");

    for name in ["tokio-tungstenite", "tungstenite"] {
        assert!(
            !manifest
                .lines()
                .any(|line| line.trim_start().starts_with(name)),
            "brain-core must not depend on {name}"
        );
    }
}

#[test]
fn test_daemon_owns_the_transport() {
    let manifest = fs::read_to_string(workspace_root().join("brain/daemon/Cargo.toml"))
        .expect("brain/daemon/Cargo.toml is readable");
    assert!(manifest.contains("tokio-tungstenite"));
}
