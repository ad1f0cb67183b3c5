use core::str::FromStr;

use serde::{Deserialize, Serialize};

use leadstack_core::DomainError;

/// Closed catalog of cross-module validation rules.
///
/// Rules are an enum, not string names: a request naming an unknown rule is
/// rejected at the edge where the name is parsed, never deep inside an event
/// handler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// A user may act on a project only if associated with it.
    UserProjectAssociation,
    /// A lead may be converted only while linked to a live project.
    LeadConversion,
    /// A post may be scheduled only on a connected social account.
    PostSocialAssociation,
    /// An email campaign may be sent only with at least one recipient list.
    EmailCampaignSending,
    /// A workflow may execute only if it still exists.
    WorkflowExecution,
    /// An entity may be deleted only when nothing depends on it.
    EntityDeletion,
    /// An entity may be updated only while it exists.
    EntityUpdate,
}

impl ValidationRule {
    pub const ALL: [ValidationRule; 7] = [
        ValidationRule::UserProjectAssociation,
        ValidationRule::LeadConversion,
        ValidationRule::PostSocialAssociation,
        ValidationRule::EmailCampaignSending,
        ValidationRule::WorkflowExecution,
        ValidationRule::EntityDeletion,
        ValidationRule::EntityUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationRule::UserProjectAssociation => "user_project_association",
            ValidationRule::LeadConversion => "lead_conversion",
            ValidationRule::PostSocialAssociation => "post_social_association",
            ValidationRule::EmailCampaignSending => "email_campaign_sending",
            ValidationRule::WorkflowExecution => "workflow_execution",
            ValidationRule::EntityDeletion => "entity_deletion",
            ValidationRule::EntityUpdate => "entity_update",
        }
    }
}

impl core::fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationRule {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValidationRule::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::unknown_name(format!("validation rule: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_round_trip() {
        for rule in ValidationRule::ALL {
            assert_eq!(rule.as_str().parse::<ValidationRule>().unwrap(), rule);
        }
    }

    #[test]
    fn unknown_rule_is_rejected_at_parse_time() {
        let err = "campaign_budget".parse::<ValidationRule>().unwrap_err();
        assert!(matches!(err, DomainError::UnknownName(_)));
    }
}
