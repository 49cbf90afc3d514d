use std::process::Command;

fn git_value(env_key: &str, args: &[&str]) -> Option<String> {
    // Docker builds have no .git directory and pass the values in instead.
    std::env::var(env_key)
        .ok()
        .filter(|s| !s.is_empty() && s != "unknown")
        .or_else(|| {
            Command::new("git")
                .args(args)
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        })
}

fn main() {
    println!("cargo:rerun-if-env-changed=TASKDESK_GIT_COMMIT");
    println!("cargo:rerun-if-env-changed=TASKDESK_GIT_BRANCH");

    if let Some(commit) = git_value("TASKDESK_GIT_COMMIT", &["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=TASKDESK_GIT_COMMIT={}", commit);
    }

    if let Some(branch) = git_value("TASKDESK_GIT_BRANCH", &["rev-parse", "--abbrev-ref", "HEAD"])
    {
        println!("cargo:rustc-env=TASKDESK_GIT_BRANCH={}", branch);
    }

    // Build timestamp (ISO 8601 format)
    if let Ok(output) = Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        && output.status.success()
    {
        let timestamp = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=TASKDESK_BUILD_TIMESTAMP={}", timestamp);
    }
}
