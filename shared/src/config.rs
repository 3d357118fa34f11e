use crate::error::ConfigError;
use crate::plans::{Plan, PlanSet};

const DEFAULT_TABLE_NAME: &str = "stadion-resources";
const DEFAULT_BUCKET_NAME: &str = "stadion-plans";
const DEFAULT_PLAN_SIZES: &str = "2000x1414,2000x1414,2000x1414";

#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub bucket_name: String,
    pub plans: PlanSet,
    /// Account created when the user collection is empty.
    pub bootstrap_admin: Option<(String, String)>,
    /// Accept the acting username from a plain request header when no
    /// authorizer claim is present. Local development only.
    pub trust_user_header: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let plan_sizes = lookup("PLAN_SIZES").unwrap_or_else(|| DEFAULT_PLAN_SIZES.to_string());

        let bootstrap_admin = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        };

        Ok(Self {
            table_name: lookup("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            bucket_name: lookup("BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET_NAME.to_string()),
            plans: parse_plan_sizes(&plan_sizes)?,
            bootstrap_admin,
            trust_user_header: lookup("TRUST_USER_HEADER")
                .is_some_and(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes")),
        })
    }
}

/// Parse `"2000x1414,1600x1200"` into a plan set.
fn parse_plan_sizes(raw: &str) -> Result<PlanSet, ConfigError> {
    let plans = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|size| {
            let invalid = || ConfigError::InvalidPlanSize {
                var: "PLAN_SIZES",
                value: size.to_string(),
            };
            let (w, h) = size.split_once(['x', 'X']).ok_or_else(invalid)?;
            let width: u32 = w.trim().parse().map_err(|_| invalid())?;
            let height: u32 = h.trim().parse().map_err(|_| invalid())?;
            if width == 0 || height == 0 {
                return Err(invalid());
            }
            Ok(Plan { width, height })
        })
        .collect::<Result<Vec<_>, _>>()?;

    PlanSet::new(plans).ok_or(ConfigError::NoPlans("PLAN_SIZES"))
}
