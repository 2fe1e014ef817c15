use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Syntax ceiling for emitted code.
///
/// Ordered: a module whose syntax requires a level above the target's ceiling
/// cannot be emitted for that target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlatformLevel {
    /// ECMAScript 2015 (ES6)
    ES2015,
    ES2016,
    ES2017,
    ES2018,
    ES2019,
    /// ECMAScript 2020 (default, matches the "modules" baseline)
    #[default]
    ES2020,
    ES2021,
    ES2022,
    ES2023,
    ES2024,
    /// No ceiling
    ESNext,
}

impl PlatformLevel {
    pub const ALL: [PlatformLevel; 11] = [
        PlatformLevel::ES2015,
        PlatformLevel::ES2016,
        PlatformLevel::ES2017,
        PlatformLevel::ES2018,
        PlatformLevel::ES2019,
        PlatformLevel::ES2020,
        PlatformLevel::ES2021,
        PlatformLevel::ES2022,
        PlatformLevel::ES2023,
        PlatformLevel::ES2024,
        PlatformLevel::ESNext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformLevel::ES2015 => "es2015",
            PlatformLevel::ES2016 => "es2016",
            PlatformLevel::ES2017 => "es2017",
            PlatformLevel::ES2018 => "es2018",
            PlatformLevel::ES2019 => "es2019",
            PlatformLevel::ES2020 => "es2020",
            PlatformLevel::ES2021 => "es2021",
            PlatformLevel::ES2022 => "es2022",
            PlatformLevel::ES2023 => "es2023",
            PlatformLevel::ES2024 => "es2024",
            PlatformLevel::ESNext => "esnext",
        }
    }
}

impl fmt::Display for PlatformLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let normalized = match lower.as_str() {
            "es6" => "es2015",
            "latest" => "esnext",
            other => other,
        };
        PlatformLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| format!("unknown platform level: {s}"))
    }
}

/// Source loader applied to a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
    Vue,
    Json,
}

impl Loader {
    /// Default loader for a file extension (without the dot).
    pub fn for_extension(ext: &str) -> Option<Self> {
        match ext {
            "js" | "mjs" | "cjs" => Some(Loader::Js),
            "jsx" => Some(Loader::Jsx),
            "ts" | "mts" | "cts" => Some(Loader::Ts),
            "tsx" => Some(Loader::Tsx),
            "vue" => Some(Loader::Vue),
            "json" => Some(Loader::Json),
            _ => None,
        }
    }

    /// Whether sources handled by this loader may contain JSX syntax.
    pub fn allows_jsx(&self) -> bool {
        matches!(self, Loader::Jsx | Loader::Tsx)
    }
}
