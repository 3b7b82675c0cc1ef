use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Extension shared by iOS and tvOS profiles.
pub const MOBILE_PROFILE_EXTENSION: &str = "mobileprovision";
/// Extension used by macOS profiles.
pub const DESKTOP_PROFILE_EXTENSION: &str = "provisionprofile";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Ios,
    TvOs,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::MacOs, Platform::Ios, Platform::TvOs];

    /// Canonical name, also used by the index file format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::MacOs => "MacOS",
            Platform::Ios => "iOS",
            Platform::TvOs => "tvOS",
        }
    }

    /// Inverse of [`Platform::as_str`]. Exact match only.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|platform| platform.as_str() == name)
    }

    /// Maps an entry of a profile's `Platform` array.
    #[must_use]
    pub fn from_document_name(name: &str) -> Option<Self> {
        match name {
            "OSX" => Some(Platform::MacOs),
            "iOS" => Some(Platform::Ios),
            "tvOS" => Some(Platform::TvOs),
            _ => None,
        }
    }

    /// Extension (without the dot) of profile files targeting this platform.
    #[must_use]
    pub fn file_extension(self) -> &'static str {
        match self {
            Platform::MacOs => DESKTOP_PROFILE_EXTENSION,
            Platform::Ios | Platform::TvOs => MOBILE_PROFILE_EXTENSION,
        }
    }

    /// Platform assumed for a profile file whose document has no `Platform` array.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension.eq_ignore_ascii_case(DESKTOP_PROFILE_EXTENSION) {
            Some(Platform::MacOs)
        } else if extension.eq_ignore_ascii_case(MOBILE_PROFILE_EXTENSION) {
            Some(Platform::Ios)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}' (expected ios, tvos or macos)")]
pub struct ParsePlatformError(String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "tvos" => Ok(Platform::TvOs),
            "macos" | "osx" => Ok(Platform::MacOs),
            _ => Err(ParsePlatformError(value.to_string())),
        }
    }
}

/// Whether `path` carries one of the two profile extensions.
#[must_use]
pub fn is_profile_path(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext == MOBILE_PROFILE_EXTENSION || ext == DESKTOP_PROFILE_EXTENSION)
}
