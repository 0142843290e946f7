use serde::{Deserialize, Serialize};
use std::fmt;

/// A single heating controller's measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Preheat,
    Main,
    Rib,
}

impl Zone {
    /// Canonical cycle order: preheat, main, rib.
    pub const CANONICAL_ORDER: [Zone; 3] = [Zone::Preheat, Zone::Main, Zone::Rib];

    pub const fn as_str(self) -> &'static str {
        match self {
            Zone::Preheat => "preheat",
            Zone::Main => "main",
            Zone::Rib => "rib",
        }
    }

    /// Position of this zone in `CANONICAL_ORDER`.
    pub const fn canonical_index(self) -> usize {
        match self {
            Zone::Preheat => 0,
            Zone::Main => 1,
            Zone::Rib => 2,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
