use std::process::Command;

/// Run a git subcommand, returning trimmed stdout on success
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// True when the work tree or the index differs from HEAD
fn is_dirty() -> bool {
    ["diff", "diff --cached"].iter().any(|cmd| {
        let mut args: Vec<&str> = cmd.split(' ').collect();
        args.push("--quiet");
        Command::new("git")
            .args(&args)
            .status()
            .map(|s| !s.success())
            .unwrap_or(false)
    })
}

fn main() {
    // Release pipelines without a .git directory can stamp the build directly
    let version = std::env::var("LEDGER_GIT_HASH").ok().or_else(|| {
        git(&["rev-parse", "--short", "HEAD"]).map(|hash| {
            if is_dirty() {
                format!("{hash}-dirty")
            } else {
                hash
            }
        })
    });

    println!(
        "cargo:rustc-env=GIT_HASH={}",
        version.unwrap_or_else(|| "unknown".to_string())
    );
    println!("cargo:rerun-if-env-changed=LEDGER_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
