use std::path::Path;
use std::process::Command;

/// Exposes `SLOTWISE_BUILD_SHA` for `slotwise --version`.
///
/// Packagers building outside a git checkout can set the variable themselves.
fn main() {
    println!("cargo:rerun-if-env-changed=SLOTWISE_BUILD_SHA");

    if let Ok(sha) = std::env::var("SLOTWISE_BUILD_SHA") {
        println!("cargo:rustc-env=SLOTWISE_BUILD_SHA={sha}");
        return;
    }

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let repo_root = Path::new(&manifest_dir).join("..");

    let head = repo_root.join(".git").join("HEAD");
    if head.exists() {
        println!("cargo:rerun-if-changed={}", head.display());
    }

    let git = |args: &[&str]| {
        Command::new("git")
            .arg("-C")
            .arg(&repo_root)
            .args(args)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    };

    let sha = match git(&["rev-parse", "--short", "HEAD"]).filter(|s| !s.is_empty()) {
        Some(sha) => {
            let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).is_some_and(|s| !s.is_empty());
            if dirty { format!("{sha}-dirty") } else { sha }
        }
        None => "unknown".to_string(),
    };

    println!("cargo:rustc-env=SLOTWISE_BUILD_SHA={sha}");
}
