// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=CAMERA_SESSION_VERSION");

    // Packagers can pin the reported version without a git checkout
    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match std::env::var("CAMERA_SESSION_VERSION") {
        Ok(v) => v,
        Err(_) => match git_commit() {
            Some(commit) => format!("{}-{}", pkg_version, commit),
            None => pkg_version,
        },
    };

    println!("cargo::rustc-env=SESSION_BUILD_VERSION={}", version);
}

fn git_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
