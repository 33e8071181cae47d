//! Dependency gating of the root manifest
//!
//! Run with: cargo test --test manifest_integration

const MANIFEST: &str = include_str!("../Cargo.toml");

/// The `[dependencies]` line declaring `name`
fn dependency_line(name: &str) -> Option<&'static str> {
    let prefix = format!("{} =", name);
    MANIFEST
        .split("[dependencies]")
        .nth(1)?
        .split("\n[")
        .next()?
        .lines()
        .find(|line| line.trim_start().starts_with(&prefix))
}

#[test]
fn test_binary_only_dependencies_are_optional() {
    for name in ["anyhow", "dotenvy", "tracing-subscriber", "clap", "colored", "rustyline"] {
        let line = dependency_line(name).unwrap_or_else(|| panic!("{} is not declared", name));
        assert!(line.contains("optional = true"), "{} is not optional: {}", name, line);
        assert!(
            MANIFEST.contains(&format!("\"dep:{}\"", name)),
            "{} is not enabled by a feature",
            name
        );
    }
}

#[test]
fn test_library_dependencies_stay_unconditional() {
    for name in ["tracing", "thiserror", "tokio", "serde"] {
        let line = dependency_line(name).unwrap_or_else(|| panic!("{} is not declared", name));
        assert!(!line.contains("optional"), "{} should not be optional", name);
    }
}
