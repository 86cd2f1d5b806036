use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target optimization framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Oemof,
    Pypsa,
    Fine,
    Calliope,
}

impl Framework {
    pub const ALL: [Framework; 4] = [
        Framework::Oemof,
        Framework::Pypsa,
        Framework::Fine,
        Framework::Calliope,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Framework::Oemof => "oemof",
            Framework::Pypsa => "pypsa",
            Framework::Fine => "fine",
            Framework::Calliope => "calliope",
        }
    }

    /// Whether the framework fails on chains that can never carry energy.
    pub fn needs_pruning(self) -> bool {
        matches!(self, Framework::Fine | Framework::Calliope)
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oemof" => Ok(Framework::Oemof),
            "pypsa" => Ok(Framework::Pypsa),
            "fine" => Ok(Framework::Fine),
            "calliope" => Ok(Framework::Calliope),
            other => Err(format!("unknown framework '{other}'")),
        }
    }
}
