use std::process::Command;

fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git").args(args).output().ok()
}

fn main() {
    let is_release = git(&["describe", "--exact-match", "--tags", "HEAD"])
        .map(|o| o.status.success())
        .unwrap_or(false);

    // Development builds report `-dev.<short hash>` after the crate version
    let suffix = if is_release {
        String::new()
    } else {
        let hash = git(&["rev-parse", "--short", "HEAD"])
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!("-dev.{}", hash)
    };
    println!("cargo:rustc-env=QORCH_VERSION_SUFFIX={}", suffix);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
