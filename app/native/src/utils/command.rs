use std::env;
use std::path::{Path, PathBuf};

/// Resolve the absolute path to an executable binary.
///
/// Absolute (or `./`-relative) paths are checked in place. Bare names are
/// searched for in:
/// 1. Any directory listed in `BACKDROP_EXTRA_PATHS` (colon-separated).
/// 2. The current process `PATH`.
/// 3. Common Linux install locations (`/usr/local/bin`, `/usr/bin`, `~/.local/bin`, `~/.cargo/bin`).
///
/// # Errors
///
/// Returns a descriptive reason when the binary is missing or not executable.
pub fn resolve_binary(binary: &str) -> Result<PathBuf, String> {
    if binary.is_empty() {
        return Err("Binary name cannot be empty".to_string());
    }

    let candidate = Path::new(binary);
    if candidate.is_absolute() || binary.contains('/') {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(format!("Binary at {} is not executable", candidate.display()))
        };
    }

    let mut search_paths = Vec::new();

    if let Ok(extra) = env::var("BACKDROP_EXTRA_PATHS") {
        search_paths.extend(extra.split(':').map(PathBuf::from));
    }

    if let Some(path_var) = env::var_os("PATH") {
        search_paths.extend(env::split_paths(&path_var));
    }

    search_paths.extend([PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")]);

    if let Some(home) = dirs::home_dir() {
        search_paths.push(home.join(".local/bin"));
        search_paths.push(home.join(".cargo/bin"));
    }

    search_paths
        .into_iter()
        .filter(|directory| !directory.as_os_str().is_empty())
        .map(|directory| directory.join(binary))
        .find(|path| is_executable(path))
        .ok_or_else(|| format!("Unable to locate executable '{binary}' in known search paths"))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}
