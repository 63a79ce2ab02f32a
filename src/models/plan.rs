use serde::{Deserialize, Serialize};

/// The closed set of subscription tiers.
///
/// Plan pricing and duration live in [`crate::config::PlanTable`], not here:
/// an unrecognized plan is a deserialization error, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Daily,
    Weekly,
    Monthly,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Daily => "daily",
            Plan::Weekly => "weekly",
            Plan::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Plan::Daily),
            "weekly" => Ok(Plan::Weekly),
            "monthly" => Ok(Plan::Monthly),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
