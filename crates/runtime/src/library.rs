//! Locating the platform-specific native library.
//!
//! Failing to find the library is a startup error: callers are expected to
//! resolve it once, before any other use of the binding.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the library path explicitly.
pub const LIBRARY_ENV: &str = "FRIDA_HOST_LIBRARY";

/// File name of the native library for the running platform.
pub fn library_file_name() -> Result<&'static str> {
	if cfg!(target_os = "macos") {
		Ok("libfrida-host.dylib")
	} else if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
		Ok("libfrida-host-x86_64.so")
	} else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
		Ok("libfrida-host-arm64.so")
	} else {
		Err(Error::Library(format!(
			"unsupported platform {}-{}",
			std::env::consts::OS,
			std::env::consts::ARCH
		)))
	}
}

/// Finds the native library.
///
/// Search order: `explicit`, then `$FRIDA_HOST_LIBRARY`, then the directory
/// of the running executable, then the system library directories. An
/// explicit or environment-supplied path that does not exist is an error
/// rather than a reason to keep searching.
pub fn locate_library(explicit: Option<&Path>) -> Result<PathBuf> {
	let env = std::env::var_os(LIBRARY_ENV).map(PathBuf::from);
	let mut dirs = Vec::new();
	if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
		dirs.push(dir);
	}
	dirs.push(PathBuf::from("/usr/local/lib"));
	dirs.push(PathBuf::from("/usr/lib"));
	locate_in(explicit, env.as_deref(), &dirs, library_file_name()?)
}

fn locate_in(explicit: Option<&Path>, env: Option<&Path>, dirs: &[PathBuf], file_name: &str) -> Result<PathBuf> {
	if let Some(path) = explicit {
		return existing(path, "library path");
	}
	if let Some(path) = env {
		return existing(path, LIBRARY_ENV);
	}
	for dir in dirs {
		let candidate = dir.join(file_name);
		tracing::trace!(candidate = %candidate.display(), "Probing for native library");
		if candidate.is_file() {
			tracing::debug!(path = %candidate.display(), "Found native library");
			return Ok(candidate);
		}
	}
	Err(Error::Library(format!(
		"could not find {file_name}; set {LIBRARY_ENV} or pass an explicit path"
	)))
}

fn existing(path: &Path, source: &str) -> Result<PathBuf> {
	if path.is_file() {
		return Ok(path.to_path_buf());
	}
	Err(Error::Library(format!("{source} does not exist: {}", path.display())))
}

#[cfg(test)]
mod tests {
	use super::*;

	const NAME: &str = "libfrida-host-test.so";

	#[test]
	fn test_explicit_path_wins() {
		let dir = tempfile::tempdir().unwrap();
		let explicit = dir.path().join("custom.so");
		std::fs::write(&explicit, b"").unwrap();
		std::fs::write(dir.path().join(NAME), b"").unwrap();

		let found = locate_in(Some(&explicit), None, &[dir.path().to_path_buf()], NAME).unwrap();
		assert_eq!(found, explicit);
	}

	#[test]
	fn test_missing_explicit_path_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(NAME), b"").unwrap();
		let missing = dir.path().join("nope.so");

		let err = locate_in(Some(&missing), None, &[dir.path().to_path_buf()], NAME).unwrap_err();
		assert!(matches!(err, Error::Library(_)));
	}

	#[test]
	fn test_env_path_before_search_dirs() {
		let dir = tempfile::tempdir().unwrap();
		let env = dir.path().join("from-env.so");
		std::fs::write(&env, b"").unwrap();
		std::fs::write(dir.path().join(NAME), b"").unwrap();

		let found = locate_in(None, Some(&env), &[dir.path().to_path_buf()], NAME).unwrap();
		assert_eq!(found, env);
	}

	#[test]
	fn test_search_dirs_in_order() {
		let first = tempfile::tempdir().unwrap();
		let second = tempfile::tempdir().unwrap();
		std::fs::write(second.path().join(NAME), b"").unwrap();

		let dirs = [first.path().to_path_buf(), second.path().to_path_buf()];
		let found = locate_in(None, None, &dirs, NAME).unwrap();
		assert_eq!(found, second.path().join(NAME));

		std::fs::write(first.path().join(NAME), b"").unwrap();
		let found = locate_in(None, None, &dirs, NAME).unwrap();
		assert_eq!(found, first.path().join(NAME));
	}

	#[test]
	fn test_not_found_anywhere() {
		let dir = tempfile::tempdir().unwrap();
		let err = locate_in(None, None, &[dir.path().to_path_buf()], NAME).unwrap_err();
		assert!(err.to_string().contains(LIBRARY_ENV));
	}

	#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
	#[test]
	fn test_linux_x86_64_file_name() {
		assert_eq!(library_file_name().unwrap(), "libfrida-host-x86_64.so");
	}
}
