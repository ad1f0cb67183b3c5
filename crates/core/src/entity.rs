//! Closed catalogs of modules and entity kinds.
//!
//! The platform addresses modules and entities by name at its HTTP edges, but
//! inside the integration core both catalogs are closed enums: an unknown
//! module or entity kind is rejected when it enters the system, not when an
//! event referencing it is finally processed.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{EntityId, UserId};

/// A bounded domain module of the platform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Users,
    Projects,
    Leads,
    EmailMarketing,
    Social,
    Ads,
    Workflows,
    Universe,
    Analytics,
}

impl Module {
    pub const ALL: [Module; 9] = [
        Module::Users,
        Module::Projects,
        Module::Leads,
        Module::EmailMarketing,
        Module::Social,
        Module::Ads,
        Module::Workflows,
        Module::Universe,
        Module::Analytics,
    ];

    /// Stable snake_case name (used in logs and CLI arguments).
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Users => "users",
            Module::Projects => "projects",
            Module::Leads => "leads",
            Module::EmailMarketing => "email_marketing",
            Module::Social => "social",
            Module::Ads => "ads",
            Module::Workflows => "workflows",
            Module::Universe => "universe",
            Module::Analytics => "analytics",
        }
    }
}

impl core::fmt::Display for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DomainError::unknown_name(format!("module: {s}")))
    }
}

/// Kind of business entity a cross-module reference points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Project,
    Lead,
    EmailCampaign,
    EmailList,
    Post,
    SocialAccount,
    AdCampaign,
    Workflow,
    UniverseInstance,
    AnalyticsMetric,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        EntityKind::User,
        EntityKind::Project,
        EntityKind::Lead,
        EntityKind::EmailCampaign,
        EntityKind::EmailList,
        EntityKind::Post,
        EntityKind::SocialAccount,
        EntityKind::AdCampaign,
        EntityKind::Workflow,
        EntityKind::UniverseInstance,
        EntityKind::AnalyticsMetric,
    ];

    /// The module that owns entities of this kind.
    pub fn module(&self) -> Module {
        match self {
            EntityKind::User => Module::Users,
            EntityKind::Project => Module::Projects,
            EntityKind::Lead => Module::Leads,
            EntityKind::EmailCampaign | EntityKind::EmailList => Module::EmailMarketing,
            EntityKind::Post | EntityKind::SocialAccount => Module::Social,
            EntityKind::AdCampaign => Module::Ads,
            EntityKind::Workflow => Module::Workflows,
            EntityKind::UniverseInstance => Module::Universe,
            EntityKind::AnalyticsMetric => Module::Analytics,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Project => "project",
            EntityKind::Lead => "lead",
            EntityKind::EmailCampaign => "email_campaign",
            EntityKind::EmailList => "email_list",
            EntityKind::Post => "post",
            EntityKind::SocialAccount => "social_account",
            EntityKind::AdCampaign => "ad_campaign",
            EntityKind::Workflow => "workflow",
            EntityKind::UniverseInstance => "universe_instance",
            EntityKind::AnalyticsMetric => "analytics_metric",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed reference to one entity in one module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    /// Reference to a user, converting the typed `UserId`.
    pub fn user(id: UserId) -> Self {
        Self {
            kind: EntityKind::User,
            id: EntityId::from_uuid(*id.as_uuid()),
        }
    }

    pub fn module(&self) -> Module {
        self.kind.module()
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_round_trip() {
        for m in Module::ALL {
            assert_eq!(m.as_str().parse::<Module>().unwrap(), m);
        }
    }

    #[test]
    fn unknown_module_is_rejected() {
        let err = "billing".parse::<Module>().unwrap_err();
        assert!(matches!(err, DomainError::UnknownName(_)));
    }

    #[test]
    fn entity_kinds_map_to_owning_modules() {
        assert_eq!(EntityKind::Lead.module(), Module::Leads);
        assert_eq!(EntityKind::EmailList.module(), Module::EmailMarketing);
        assert_eq!(EntityKind::SocialAccount.module(), Module::Social);
    }
}
