//! Locating the `pvm-sandbox` executable.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub const SANDBOX_BINARY_NAME: &str = "pvm-sandbox";
pub const SANDBOX_PATH_ENV: &str = "PVM_SANDBOX_PATH";

/// Resolve the sandbox executable from the process environment.
#[must_use]
pub fn resolve_sandbox_path() -> PathBuf {
    resolve_with(
        env::var_os(SANDBOX_PATH_ENV),
        env::var_os("PATH"),
        env::current_exe().ok(),
    )
}

/// Lookup order: explicit override, `PATH`, the directory of `current_exe`
/// and its parent, then the bare name.
///
/// An explicit override is returned even if it does not exist, so spawn
/// errors name the configured path.
#[must_use]
pub fn resolve_with(override_path: Option<OsString>, path_var: Option<OsString>, current_exe: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        debug!(path = %Path::new(&path).display(), "sandbox path from {SANDBOX_PATH_ENV}");
        return PathBuf::from(path);
    }

    let from_path = path_var
        .iter()
        .flat_map(env::split_paths)
        .map(|dir| dir.join(SANDBOX_BINARY_NAME));
    let beside_exe = current_exe
        .as_deref()
        .and_then(Path::parent)
        .into_iter()
        .flat_map(|dir| [Some(dir), dir.parent()])
        .flatten()
        .map(|dir| dir.join(SANDBOX_BINARY_NAME));

    if let Some(found) = from_path.chain(beside_exe).find(|candidate| is_executable(candidate)) {
        debug!(path = %found.display(), "resolved sandbox executable");
        return found;
    }
    warn!("{SANDBOX_BINARY_NAME} not found, falling back to the bare name");
    PathBuf::from(SANDBOX_BINARY_NAME)
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn install(dir: &Path, mode: u32) -> PathBuf {
        let path = dir.join(SANDBOX_BINARY_NAME);
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn override_wins() {
        let resolved = resolve_with(Some("/opt/custom/sandbox".into()), None, None);
        assert_eq!(resolved, PathBuf::from("/opt/custom/sandbox"));
        // empty override is ignored
        assert_eq!(resolve_with(Some(OsString::new()), None, None), PathBuf::from(SANDBOX_BINARY_NAME));
    }

    #[test]
    fn searches_path_entries_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let expected = install(second.path(), 0o755);
        // not executable: skipped
        install(first.path(), 0o644);
        let path_var = env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(resolve_with(None, Some(path_var), None), expected);
    }

    #[test]
    fn falls_back_to_the_executable_directory_and_its_parent() {
        let root = tempfile::tempdir().unwrap();
        let deps = root.path().join("deps");
        fs::create_dir(&deps).unwrap();
        let exe = deps.join("integration-test");

        let in_parent = install(root.path(), 0o755);
        assert_eq!(resolve_with(None, None, Some(exe.clone())), in_parent);

        let beside = install(&deps, 0o755);
        assert_eq!(resolve_with(None, None, Some(exe)), beside);
    }

    #[test]
    fn bare_name_when_nothing_matches() {
        let empty = tempfile::tempdir().unwrap();
        let path_var = env::join_paths([empty.path()]).unwrap();
        assert_eq!(
            resolve_with(None, Some(path_var), Some(empty.path().join("exe"))),
            PathBuf::from(SANDBOX_BINARY_NAME)
        );
    }
}
