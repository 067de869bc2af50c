//! Host environment seen by the engine client
//!
//! The home directory is resolved once at construction and environment
//! variables are read through a lookup function, so tests can substitute both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable that switches the engine into CI mode
pub const CI_ENV_VAR: &str = "CI";

type LookupFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Read-only view of the host: home directory and environment variables
#[derive(Clone)]
pub struct HostEnv {
    home: Option<PathBuf>,
    lookup: Arc<LookupFn>,
}

impl HostEnv {
    /// Snapshot the current process: home directory via `directories`,
    /// variables via `std::env`
    pub fn from_process() -> Self {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        if home.is_none() {
            tracing::debug!("Could not resolve home directory");
        }
        Self {
            home,
            lookup: Arc::new(|key: &str| std::env::var(key).ok()),
        }
    }

    /// Build an environment from fixed values
    pub fn with_vars(home: Option<PathBuf>, vars: HashMap<String, String>) -> Self {
        Self {
            home,
            lookup: Arc::new(move |key: &str| vars.get(key).cloned()),
        }
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    /// True when `CI=true`
    pub fn is_ci(&self) -> bool {
        self.var(CI_ENV_VAR).as_deref() == Some("true")
    }

    /// Resolve an executable against `PATH`. Names containing a path
    /// separator are checked directly. On unix a match needs an execute bit.
    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        let path_var = self.var("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let path = dir.join(name);
            if is_executable(&path) {
                return Some(path);
            }
            #[cfg(windows)]
            {
                let exe = dir.join(format!("{}.exe", name));
                if is_executable(&exe) {
                    return Some(exe);
                }
            }
        }
        None
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

impl std::fmt::Debug for HostEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEnv")
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> HostEnv {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HostEnv::with_vars(Some(PathBuf::from("/home/test")), vars)
    }

    #[test]
    fn test_ci_flag() {
        assert!(env(&[("CI", "true")]).is_ci());
        assert!(!env(&[("CI", "1")]).is_ci());
        assert!(!env(&[]).is_ci());
    }

    #[test]
    fn test_home_is_fixed() {
        assert_eq!(env(&[]).home(), Some(Path::new("/home/test")));
        assert!(HostEnv::with_vars(None, HashMap::new()).home().is_none());
    }

    fn write_file(path: &Path, mode: u32) {
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = mode;
    }

    #[test]
    fn test_find_executable_on_path() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("docker"), 0o755);
        let path = tmp.path().to_string_lossy().to_string();

        let host = env(&[("PATH", path.as_str())]);
        assert_eq!(
            host.find_executable("docker"),
            Some(tmp.path().join("docker"))
        );
        assert!(host.find_executable("podman").is_none());
    }

    #[test]
    fn test_find_executable_without_path() {
        assert!(env(&[]).find_executable("docker").is_none());
        assert!(env(&[("PATH", "")]).find_executable("docker").is_none());
    }

    #[test]
    fn test_find_executable_ignores_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("docker")).unwrap();
        let path = tmp.path().to_string_lossy().to_string();
        assert!(env(&[("PATH", path.as_str())]).find_executable("docker").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_skips_non_executable() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_file(&first.path().join("docker"), 0o644);
        write_file(&second.path().join("docker"), 0o755);

        let path = std::env::join_paths([first.path(), second.path()]).unwrap();
        let path = path.to_string_lossy().to_string();
        assert_eq!(
            env(&[("PATH", path.as_str())]).find_executable("docker"),
            Some(second.path().join("docker"))
        );

        let only_plain = first.path().to_string_lossy().to_string();
        assert!(env(&[("PATH", only_plain.as_str())])
            .find_executable("docker")
            .is_none());
    }
}
