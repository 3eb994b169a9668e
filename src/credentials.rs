/// API key storage.
///
/// The key lives as a single line in a plain file. Anything shorter than
/// `MIN_KEY_LEN` characters is treated as "no key on file".

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

use crate::logging::Stage;
use crate::model::{MeetupError, Result};

pub const MIN_KEY_LEN: usize = 5;

/// Where the key used for this run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    File,
    Prompt,
}

/// Reads the stored key. A missing file or an implausibly short key is `None`.
pub fn read_stored_key(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let key = content.trim();
            Ok((key.len() >= MIN_KEY_LEN).then(|| key.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `key` to `path`, replacing any previous content.
pub fn store_key(path: &Path, key: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, key.trim())?;
    debug!(stage = %Stage::System, path = %path.display(), "Stored API key");
    Ok(())
}

/// Picks the key for this run: environment first, then the file, then the
/// prompt. A prompted key is persisted for next time.
pub fn resolve_api_key<F>(
    path: &Path,
    env_key: Option<String>,
    prompt: F,
) -> Result<(String, KeySource)>
where
    F: FnOnce() -> Result<String>,
{
    if let Some(key) = env_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        info!(stage = %Stage::System, "Using API key from environment");
        return Ok((key, KeySource::Environment));
    }

    if let Some(key) = read_stored_key(path)? {
        info!(stage = %Stage::System, "***User API key is on file.***");
        return Ok((key, KeySource::File));
    }

    let key = prompt()?.trim().to_string();
    if key.len() < MIN_KEY_LEN {
        return Err(MeetupError::Config(format!(
            "API key must be at least {} characters",
            MIN_KEY_LEN
        )));
    }
    store_key(path, &key)?;
    Ok((key, KeySource::Prompt))
}
