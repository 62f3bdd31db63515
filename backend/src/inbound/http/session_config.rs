//! Session signing-key loading.
//!
//! Key material is read from a file, derived into an Actix [`Key`] and wiped
//! from memory. A generated key is only accepted in debug builds or when
//! explicitly allowed, because it invalidates every session on restart.

use std::path::{Path, PathBuf};

use actix_web::cookie::{Key, SameSite};
use tracing::warn;
use zeroize::Zeroize;

const SESSION_KEY_DEFAULT_PATH: &str = "/var/run/secrets/session_key";
const SESSION_KEY_MIN_LEN: usize = 64;
/// Shortest input `Key::derive_from` accepts.
const DERIVE_MIN_LEN: usize = 32;

/// Build mode for session configuration validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Debug builds tolerate missing keys with a warning.
    Debug,
    /// Release builds require a readable key of sufficient length.
    Release,
}

impl BuildMode {
    /// Determine the build mode from `cfg!(debug_assertions)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use web_form::inbound::http::session_config::BuildMode;
    ///
    /// let mode = BuildMode::from_debug_assertions();
    /// assert_eq!(mode == BuildMode::Debug, cfg!(debug_assertions));
    /// ```
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// `Lax` while developing, `Strict` otherwise.
    #[must_use]
    pub fn same_site(self) -> SameSite {
        if self.is_debug() {
            SameSite::Lax
        } else {
            SameSite::Strict
        }
    }
}

/// Errors raised while loading the session key.
#[derive(thiserror::Error, Debug)]
pub enum SessionConfigError {
    /// Reading the session key file failed.
    #[error("failed to read session key at {}: {source}", .path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The session key file exists but is too short for release builds.
    #[error("session key at {} too short: need >= {min_len} bytes, got {length}", .path.display())]
    KeyTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
}

/// Load the signing key from `path` (or the default secret mount).
///
/// # Examples
///
/// ```rust
/// use web_form::inbound::http::session_config::{session_key, BuildMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let key_path = std::env::temp_dir().join("web_form_session_key_example");
/// std::fs::write(&key_path, vec![b'a'; 64])?;
///
/// let key = session_key(Some(&key_path), false, BuildMode::Release)?;
/// assert_eq!(key.master().len(), 64);
///
/// std::fs::remove_file(&key_path)?;
/// # Ok(())
/// # }
/// ```
pub fn session_key(
    path: Option<&Path>,
    allow_ephemeral: bool,
    mode: BuildMode,
) -> Result<Key, SessionConfigError> {
    let path = path.map_or_else(|| PathBuf::from(SESSION_KEY_DEFAULT_PATH), Path::to_path_buf);

    match std::fs::read(&path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            let min_len = match mode {
                BuildMode::Release => SESSION_KEY_MIN_LEN,
                BuildMode::Debug => DERIVE_MIN_LEN,
            };
            if length < min_len {
                bytes.zeroize();
                return Err(SessionConfigError::KeyTooShort {
                    path,
                    length,
                    min_len,
                });
            }
            let key = Key::derive_from(&bytes);
            bytes.zeroize();
            Ok(key)
        }
        Err(error) => {
            if mode.is_debug() || allow_ephemeral {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "using temporary session key (dev only)"
                );
                Ok(Key::generate())
            } else {
                Err(SessionConfigError::KeyRead {
                    path,
                    source: error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Session key loading across build modes.

    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn key_file(len: usize) -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("session_key");
        std::fs::write(&path, vec![b'k'; len]).expect("write key");
        (dir, path)
    }

    #[rstest]
    #[case(BuildMode::Debug)]
    #[case(BuildMode::Release)]
    fn derives_key_from_file(#[case] mode: BuildMode) {
        let (_dir, path) = key_file(64);
        let first = session_key(Some(&path), false, mode).expect("key loads");
        let second = session_key(Some(&path), false, mode).expect("key loads");
        assert_eq!(first.master(), second.master());
    }

    #[test]
    fn release_rejects_short_keys() {
        let (_dir, path) = key_file(40);
        let err = session_key(Some(&path), false, BuildMode::Release)
            .err()
            .expect("short key");
        assert!(matches!(err, SessionConfigError::KeyTooShort { length: 40, .. }));
    }

    #[test]
    fn debug_accepts_shorter_keys() {
        let (_dir, path) = key_file(40);
        assert!(session_key(Some(&path), false, BuildMode::Debug).is_ok());
    }

    #[test]
    fn keys_below_derivation_minimum_are_rejected() {
        let (_dir, path) = key_file(16);
        let err = session_key(Some(&path), true, BuildMode::Debug)
            .err()
            .expect("too short");
        assert!(matches!(err, SessionConfigError::KeyTooShort { min_len: 32, .. }));
    }

    #[rstest]
    #[case(BuildMode::Debug, false, true)]
    #[case(BuildMode::Release, true, true)]
    #[case(BuildMode::Release, false, false)]
    fn missing_key_needs_permission(
        #[case] mode: BuildMode,
        #[case] allow_ephemeral: bool,
        #[case] accepted: bool,
    ) {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("absent");
        let result = session_key(Some(&missing), allow_ephemeral, mode);
        assert_eq!(result.is_ok(), accepted);
    }

    #[rstest]
    #[case(BuildMode::Debug, SameSite::Lax)]
    #[case(BuildMode::Release, SameSite::Strict)]
    fn same_site_follows_build_mode(#[case] mode: BuildMode, #[case] expected: SameSite) {
        assert_eq!(mode.same_site(), expected);
    }
}
