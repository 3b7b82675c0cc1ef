use std::fmt;
use std::str::FromStr;

bitflags::bitflags! {
    /// Intended audience of a profile.
    ///
    /// The empty set is [`DistributionType::ANY`], which only makes sense as a
    /// query value: it accepts every profile.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DistributionType: u32 {
        const DEVELOPMENT = 1 << 0;
        const AD_HOC = 1 << 1;
        const IN_HOUSE = 1 << 2;
        const APP_STORE = 1 << 3;
    }
}

pub const AUTOMATIC_APP_STORE: &str = "Automatic:AppStore";
pub const AUTOMATIC_IN_HOUSE: &str = "Automatic:InHouse";
pub const AUTOMATIC_AD_HOC: &str = "Automatic:AdHoc";

const FLAG_NAMES: [(DistributionType, &str); 4] = [
    (DistributionType::DEVELOPMENT, "Development"),
    (DistributionType::AD_HOC, "AdHoc"),
    (DistributionType::IN_HOUSE, "InHouse"),
    (DistributionType::APP_STORE, "AppStore"),
];

const ANY_NAME: &str = "Any";

impl DistributionType {
    pub const ANY: Self = Self::empty();

    #[must_use]
    pub fn is_any(self) -> bool {
        self.is_empty()
    }

    /// Whether a profile classified as `candidate` satisfies this requested type.
    ///
    /// `ANY` is zero, so intersecting with it would reject everything; it is
    /// answered before any bit arithmetic happens.
    #[must_use]
    pub fn accepts(self, candidate: DistributionType) -> bool {
        if self.is_any() {
            return true;
        }
        self.intersects(candidate)
    }

    /// Canonical `|`-joined flag names, `Any` for the empty set.
    #[must_use]
    pub fn to_canonical(self) -> String {
        if self.is_any() {
            return ANY_NAME.to_string();
        }
        FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Inverse of [`DistributionType::to_canonical`].
    #[must_use]
    pub fn from_canonical(value: &str) -> Option<Self> {
        if value == ANY_NAME {
            return Some(Self::ANY);
        }
        let mut flags = Self::empty();
        for part in value.split('|') {
            let (flag, _) = FLAG_NAMES.iter().find(|(_, name)| *name == part)?;
            flags |= *flag;
        }
        Some(flags)
    }
}

impl fmt::Display for DistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown distribution type '{0}'")]
pub struct ParseDistributionError(String);

impl FromStr for DistributionType {
    type Err = ParseDistributionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::empty();
        for part in value.split([',', '|']) {
            let normalized = part.trim().to_ascii_lowercase().replace(['-', '_'], "");
            flags |= match normalized.as_str() {
                "any" => Self::ANY,
                "development" | "dev" => Self::DEVELOPMENT,
                "adhoc" => Self::AD_HOC,
                "inhouse" | "enterprise" => Self::IN_HOUSE,
                "appstore" => Self::APP_STORE,
                _ => return Err(ParseDistributionError(value.to_string())),
            };
        }
        Ok(flags)
    }
}

/// Distribution implied by one of the automatic-signing sentinel names.
#[must_use]
pub fn automatic_distribution(name: &str) -> Option<DistributionType> {
    match name {
        AUTOMATIC_APP_STORE => Some(DistributionType::APP_STORE),
        AUTOMATIC_IN_HOUSE => Some(DistributionType::IN_HOUSE),
        AUTOMATIC_AD_HOC => Some(DistributionType::AD_HOC),
        _ => None,
    }
}
