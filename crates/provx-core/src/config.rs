use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::home_dir;

pub const PROFILE_DIRS_ENV: &str = "PROVX_PROFILE_DIRS";
pub const INDEX_PATH_ENV: &str = "PROVX_INDEX_PATH";

const INDEX_FILE_NAME: &str = "Provisioning Profiles.index";
const APP_DIR: &str = "provx";

#[derive(Clone, Debug, Default)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, OsString>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars_os()
                .filter_map(|(key, value)| key.into_string().ok().map(|key| (key, value)))
                .collect(),
        }
    }

    /// Non-empty value of `key`.
    pub(crate) fn var_os(&self, key: &str) -> Option<&OsString> {
        self.vars.get(key).filter(|value| !value.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), OsString::from(*v)))
            .collect();
        Self { vars }
    }
}

/// A resolved path and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Where profiles are read from and where the index is kept.
#[derive(Debug, Clone)]
pub struct Config {
    profile_directories: Vec<Location>,
    index: Location,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture(), home_dir().as_deref())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, home: Option<&Path>) -> Result<Self> {
        let overridden: Vec<PathBuf> = snapshot
            .var_os(PROFILE_DIRS_ENV)
            .map(|value| {
                env::split_paths(value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let profile_directories = if overridden.is_empty() {
            default_profile_directories(snapshot, home)
        } else {
            overridden
                .into_iter()
                .map(|path| {
                    Ok(Location {
                        path: absolutize(path)?,
                        source: PROFILE_DIRS_ENV,
                    })
                })
                .collect::<Result<_>>()?
        };

        let index = match snapshot.var_os(INDEX_PATH_ENV) {
            Some(path) => Location {
                path: absolutize(PathBuf::from(path))?,
                source: INDEX_PATH_ENV,
            },
            None => default_index_location(snapshot, home),
        };

        Ok(Self {
            profile_directories,
            index,
        })
    }

    /// A configuration with explicit paths, bypassing the environment.
    pub fn new(profile_directories: Vec<PathBuf>, index_path: PathBuf) -> Self {
        Self {
            profile_directories: profile_directories
                .into_iter()
                .map(|path| Location {
                    path,
                    source: "explicit",
                })
                .collect(),
            index: Location {
                path: index_path,
                source: "explicit",
            },
        }
    }

    pub fn with_profile_directories(
        mut self,
        directories: Vec<PathBuf>,
        source: &'static str,
    ) -> Result<Self> {
        self.profile_directories = directories
            .into_iter()
            .map(|path| {
                Ok(Location {
                    path: absolutize(path)?,
                    source,
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn with_index_path(mut self, path: PathBuf, source: &'static str) -> Result<Self> {
        self.index = Location {
            path: absolutize(path)?,
            source,
        };
        Ok(self)
    }

    pub fn profile_directories(&self) -> &[Location] {
        &self.profile_directories
    }

    pub fn directory_paths(&self) -> Vec<PathBuf> {
        self.profile_directories
            .iter()
            .map(|location| location.path.clone())
            .collect()
    }

    pub fn index(&self) -> &Location {
        &self.index
    }

    pub fn index_path(&self) -> &Path {
        &self.index.path
    }
}

#[cfg(not(target_os = "windows"))]
fn default_profile_directories(_snapshot: &EnvSnapshot, home: Option<&Path>) -> Vec<Location> {
    let Some(home) = home else {
        return Vec::new();
    };
    let library = home.join("Library");
    vec![
        Location {
            path: library
                .join("Developer")
                .join("Xcode")
                .join("UserData")
                .join("Provisioning Profiles"),
            source: "~/Library/Developer/Xcode",
        },
        Location {
            path: library.join("MobileDevice").join("Provisioning Profiles"),
            source: "~/Library/MobileDevice",
        },
    ]
}

#[cfg(target_os = "windows")]
fn default_profile_directories(snapshot: &EnvSnapshot, home: Option<&Path>) -> Vec<Location> {
    windows_local_app_data(snapshot, home)
        .map(|(base, source)| Location {
            path: base.join(APP_DIR).join("Provisioning").join("Profiles"),
            source,
        })
        .into_iter()
        .collect()
}

#[cfg(target_os = "macos")]
fn default_index_location(_snapshot: &EnvSnapshot, home: Option<&Path>) -> Location {
    match home {
        Some(home) => Location {
            path: home
                .join("Library")
                .join("Caches")
                .join(APP_DIR)
                .join(INDEX_FILE_NAME),
            source: "~/Library/Caches",
        },
        None => temp_index_location(),
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn default_index_location(snapshot: &EnvSnapshot, home: Option<&Path>) -> Location {
    if let Some(xdg) = snapshot.var_os("XDG_CACHE_HOME") {
        let base = PathBuf::from(xdg);
        if base.is_absolute() {
            return Location {
                path: base.join(APP_DIR).join(INDEX_FILE_NAME),
                source: "XDG_CACHE_HOME",
            };
        }
    }
    match home {
        Some(home) => Location {
            path: home.join(".cache").join(APP_DIR).join(INDEX_FILE_NAME),
            source: "~/.cache",
        },
        None => temp_index_location(),
    }
}

#[cfg(target_os = "windows")]
fn default_index_location(snapshot: &EnvSnapshot, home: Option<&Path>) -> Location {
    match windows_local_app_data(snapshot, home) {
        Some((base, source)) => Location {
            path: base.join(APP_DIR).join(INDEX_FILE_NAME),
            source,
        },
        None => temp_index_location(),
    }
}

#[cfg(target_os = "windows")]
fn windows_local_app_data(
    snapshot: &EnvSnapshot,
    home: Option<&Path>,
) -> Option<(PathBuf, &'static str)> {
    if let Some(local) = snapshot.var_os("LOCALAPPDATA") {
        return Some((PathBuf::from(local), "LOCALAPPDATA"));
    }
    if let Some(user_profile) = snapshot.var_os("USERPROFILE") {
        return Some((
            PathBuf::from(user_profile).join("AppData").join("Local"),
            "USERPROFILE",
        ));
    }
    home.map(|home| (home.join("AppData").join("Local"), "home/AppData/Local"))
}

fn temp_index_location() -> Location {
    Location {
        path: env::temp_dir().join(APP_DIR).join(INDEX_FILE_NAME),
        source: "temp dir",
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir().context("failed to read the current directory")?;
        Ok(cwd.join(path))
    }
}
