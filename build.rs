// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=BARCODE_SCANNER_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = std::env::var("BARCODE_SCANNER_VERSION").unwrap_or_else(|_| git_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version from `git describe`, falling back to the crate version
///
/// - "0.1.0" on a tag becomes "0.1.0-abcdef1"
/// - "0.1.0-5-gabcdef1" after a tag becomes "0.1.0-dirty-abcdef1"
fn git_version() -> String {
    let Some(described) = git(&["describe", "--tags", "--always", "--match", "v*"]) else {
        return env!("CARGO_PKG_VERSION").to_string();
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        let hash = parts[0].strip_prefix('g').unwrap_or(parts[0]);
        return format!("{}-dirty-{}", parts[2], hash);
    }

    if !described.contains('.') {
        // No tags yet: describe printed a bare commit hash
        return format!("{}-{}", env!("CARGO_PKG_VERSION"), described);
    }

    match git(&["rev-parse", "--short", "HEAD"]) {
        Some(hash) => format!("{}-{}", described, hash),
        None => described.to_string(),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
