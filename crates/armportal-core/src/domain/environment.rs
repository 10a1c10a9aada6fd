//! Deployment environments and the fixed promotion chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{FieldError, PortalError};

/// A deployment environment. Promotion runs dev → qa → staging → prod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Qa,
    Staging,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Qa,
        Environment::Staging,
        Environment::Prod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Qa => "qa",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }

    /// Next environment in the chain; `None` for prod.
    pub fn next(&self) -> Option<Environment> {
        match self {
            Environment::Dev => Some(Environment::Qa),
            Environment::Qa => Some(Environment::Staging),
            Environment::Staging => Some(Environment::Prod),
            Environment::Prod => None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.next().is_none()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Environment::Dev => "Development",
            Environment::Qa => "QA",
            Environment::Staging => "Staging",
            Environment::Prod => "Production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "qa" => Ok(Environment::Qa),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(PortalError::validation(
                format!("Unknown environment: {other}"),
                vec![FieldError::new(
                    "environment",
                    "Environment must be one of: dev, qa, staging, prod",
                )],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_linear_and_ends_at_prod() {
        assert_eq!(Environment::Dev.next(), Some(Environment::Qa));
        assert_eq!(Environment::Qa.next(), Some(Environment::Staging));
        assert_eq!(Environment::Staging.next(), Some(Environment::Prod));
        assert_eq!(Environment::Prod.next(), None);
        assert!(Environment::Prod.is_final());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("QA".parse::<Environment>().unwrap(), Environment::Qa);
        assert!("production".parse::<Environment>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&Environment::Staging).unwrap();
        assert_eq!(json, "\"staging\"");
    }
}
