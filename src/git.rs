//! Git branch helpers. Purely informational for the UI layer; the session
//! lifecycle never depends on these, and failures are reported inline
//! without touching core state.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, Clone, Serialize)]
pub struct GitProbe {
    pub git_available: bool,
    pub is_repo: bool,
    pub user_configured: bool,
}

async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.first().copied().unwrap_or(""),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Probe whether git is usable in `dir`: installed, inside a work tree,
/// with a configured user.
pub async fn probe(dir: &Path) -> GitProbe {
    let git_available = Command::new("git")
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);

    if !git_available {
        return GitProbe {
            git_available: false,
            is_repo: false,
            user_configured: false,
        };
    }

    let is_repo = git(dir, &["rev-parse", "--is-inside-work-tree"])
        .await
        .map(|out| out.trim() == "true")
        .unwrap_or(false);
    let user_configured = git(dir, &["config", "user.name"])
        .await
        .map(|out| !out.trim().is_empty())
        .unwrap_or(false);

    GitProbe {
        git_available,
        is_repo,
        user_configured,
    }
}

pub async fn list_branches(dir: &Path) -> Result<Vec<String>> {
    let out = git(dir, &["branch", "--list", "--format=%(refname:short)"]).await?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

pub async fn branch_exists(dir: &Path, name: &str) -> Result<bool> {
    Ok(list_branches(dir).await?.iter().any(|b| b == name))
}

pub async fn create_branch(dir: &Path, name: &str) -> Result<()> {
    git(dir, &["branch", name]).await?;
    Ok(())
}
