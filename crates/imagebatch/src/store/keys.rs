use std::path::{Path, PathBuf};

use crate::error::ImageBatchError;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// The vendor API key, kept in a dotenv-style file.
///
/// Writes touch only the `GEMINI_API_KEY` line; every other line of the
/// file is kept byte for byte. Unreadable or malformed lines are treated
/// as absent, so a damaged file reads as "no key" rather than an error.
#[derive(Clone, Debug)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Option<String> {
        self.read_entries()
            .into_iter()
            .find(|(k, _)| k == API_KEY_VAR)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&self, api_key: &str) -> anyhow::Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ImageBatchError::InvalidApiKey("Invalid API key".to_string()).into());
        }
        // Gemini keys start with "AI"
        if !api_key.starts_with("AI") {
            return Err(
                ImageBatchError::InvalidApiKey("Invalid Gemini API key format".to_string()).into(),
            );
        }

        let entry = format!("{API_KEY_VAR}={api_key}");
        let mut lines = Vec::new();
        let mut replaced = false;
        for line in self.read_lines()? {
            if !is_key_line(&line) {
                lines.push(line);
            } else if !replaced {
                lines.push(entry.clone());
                replaced = true;
            }
        }
        if !replaced {
            lines.push(entry);
        }
        self.write_lines(&lines)
    }

    pub fn delete(&self) -> anyhow::Result<()> {
        let mut lines = self.read_lines()?;
        lines.retain(|line| !is_key_line(line));
        self.write_lines(&lines)
    }

    /// The stored key with only its first and last four characters visible.
    pub fn masked(&self) -> Option<String> {
        self.get().map(|k| mask_secret(&k))
    }

    fn read_entries(&self) -> Vec<(String, String)> {
        match dotenvy::from_path_iter(&self.path) {
            Ok(iter) => iter.filter_map(Result::ok).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read_lines(&self) -> anyhow::Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_lines(&self, lines: &[String]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// `GEMINI_API_KEY=...`, optionally behind `export`.
fn is_key_line(line: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    line.strip_prefix(API_KEY_VAR)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// `AIzaSyABCDEFGH1234` -> `AIza...1234`. Secrets of eight characters or
/// fewer are hidden entirely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
