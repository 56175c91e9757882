use log::warn;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// An authorisation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    GroupAdmin,
    User,
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum RoleError {
    #[error("unknown role '{0}'")]
    Unknown(String),
}

impl FromStr for Role {
    type Err = RoleError;

    // Accepts every spelling the identity provider has used for each role
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .trim_start_matches("ROLE_")
            .trim_start_matches("role_")
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();

        match normalised.as_str() {
            "ADMIN" | "ADMINISTRATOR" => Ok(Role::Admin),
            "GROUPADMIN" | "GROUPADMINISTRATOR" => Ok(Role::GroupAdmin),
            "USER" | "MEMBER" => Ok(Role::User),
            _ => Err(RoleError::Unknown(s.to_owned())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "ADMIN"),
            Role::GroupAdmin => write!(f, "GROUPADMIN"),
            Role::User => write!(f, "USER"),
        }
    }
}

impl Role {
    /// Whether holding this role satisfies a requirement for `required`
    pub fn satisfies(&self, required: Role) -> bool {
        match (*self, required) {
            (Role::Admin, _) => true,
            (Role::GroupAdmin, Role::GroupAdmin) | (Role::GroupAdmin, Role::User) => true,
            (Role::User, Role::User) => true,
            _ => false,
        }
    }
}

/// Parse a list of role strings, skipping (and logging) any that are unknown.
pub fn parse_roles<I, S>(roles: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    roles
        .into_iter()
        .filter_map(|r| match r.as_ref().parse() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!("ignoring role: {}", e);
                None
            }
        })
        .collect()
}

/// True when `required` is empty or any user role satisfies any required role
pub fn has_access(user_roles: &[Role], required: &[Role]) -> bool {
    required.is_empty()
        || user_roles
            .iter()
            .any(|have| required.iter().any(|need| have.satisfies(*need)))
}
