use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use directories::BaseDirs;

/// Overrides the stored-token location; mostly useful for scripts and tests.
pub const SESSION_FILE_ENV: &str = "FARMLINK_SESSION_FILE";

pub fn session_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SESSION_FILE_ENV) {
        return PathBuf::from(path);
    }
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("farmlink").join("session.token"))
        .unwrap_or_else(|| PathBuf::from("./session.token"))
}

pub fn login(token: &str) -> Result<()> {
    let path = session_path();
    save_token(&path, token)?;
    println!("Session token saved to {}", path.display());
    Ok(())
}

pub fn logout() -> Result<()> {
    let path = session_path();
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove session token {}", path.display()))?;
        println!("Removed session token at {}", path.display());
    } else {
        println!("No session token found at {}", path.display());
    }
    Ok(())
}

/// Picks the explicit token when given, else the stored one.
pub fn resolve_token(explicit: Option<String>) -> Result<String> {
    match explicit.filter(|token| !token.trim().is_empty()) {
        Some(token) => Ok(token),
        None => load_token(&session_path()).context(
            "no session token; pass --token, set FARMLINK_TOKEN or run `farmlink session login`",
        ),
    }
}

pub fn save_token(path: &Path, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        bail!("session token must not be empty");
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create session directory {}", parent.display()))?;
    }
    fs::write(path, token)
        .with_context(|| format!("failed to write session token at {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("failed to set session token permissions")?;
    }
    Ok(())
}

pub fn load_token(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("session token not found at {}", path.display());
    }
    let token = fs::read_to_string(path)
        .with_context(|| format!("failed to read session token {}", path.display()))?;
    let token = token.trim();
    if token.is_empty() {
        bail!("session token at {} is empty", path.display());
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.token");
        save_token(&path, "  token-u1\n").unwrap();
        assert_eq!(load_token(&path).unwrap(), "token-u1");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn blank_tokens_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.token");
        assert!(save_token(&path, "   ").is_err());
        assert!(load_token(&path).is_err());

        fs::write(&path, "\n").unwrap();
        assert!(load_token(&path).is_err());
    }

    #[test]
    fn explicit_token_wins() {
        assert_eq!(resolve_token(Some("token-u2".into())).unwrap(), "token-u2");
    }
}
