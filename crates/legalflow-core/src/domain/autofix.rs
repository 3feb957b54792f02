//! Patch codes and autofix outcomes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Message returned for a patch code outside the catalogue.
pub const PATCH_NOT_FOUND: &str = "Patch não encontrado";

/// The closed set of corrective actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchCode {
    #[serde(rename = "API_SEED")]
    ApiSeed,
    #[serde(rename = "STRIPE_SEED")]
    StripeSeed,
    #[serde(rename = "journey_triggers_fix")]
    JourneyTriggersFix,
    #[serde(rename = "inbox_publications_fix")]
    InboxPublicationsFix,
    #[serde(rename = "process_movements_sync")]
    ProcessMovementsSync,
    #[serde(rename = "stripe_mirror_fix")]
    StripeMirrorFix,
    #[serde(rename = "crm_data_fix")]
    CrmDataFix,
    #[serde(rename = "rls_basic_setup")]
    RlsBasicSetup,
}

impl PatchCode {
    pub const ALL: [PatchCode; 8] = [
        PatchCode::ApiSeed,
        PatchCode::StripeSeed,
        PatchCode::JourneyTriggersFix,
        PatchCode::InboxPublicationsFix,
        PatchCode::ProcessMovementsSync,
        PatchCode::StripeMirrorFix,
        PatchCode::CrmDataFix,
        PatchCode::RlsBasicSetup,
    ];

    /// The wire identifier, matched by exact string equality.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiSeed => "API_SEED",
            Self::StripeSeed => "STRIPE_SEED",
            Self::JourneyTriggersFix => "journey_triggers_fix",
            Self::InboxPublicationsFix => "inbox_publications_fix",
            Self::ProcessMovementsSync => "process_movements_sync",
            Self::StripeMirrorFix => "stripe_mirror_fix",
            Self::CrmDataFix => "crm_data_fix",
            Self::RlsBasicSetup => "rls_basic_setup",
        }
    }

    /// Audit module the patch belongs to.
    pub fn module(self) -> &'static str {
        match self {
            Self::ApiSeed => "api-library",
            Self::StripeSeed | Self::StripeMirrorFix => "stripe",
            Self::JourneyTriggersFix => "jornadas",
            Self::InboxPublicationsFix => "inbox-legal",
            Self::ProcessMovementsSync => "processos",
            Self::CrmDataFix => "crm",
            Self::RlsBasicSetup => "rls",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ApiSeed => "Seed the API library catalogue (legalflow.seed_api_library)",
            Self::StripeSeed => "Seed Stripe products and prices (legalflow.seed_stripe_data)",
            Self::JourneyTriggersFix => "Backfill empty trigger rules on stage types",
            Self::InboxPublicationsFix => "Acknowledge inbox publication checks",
            Self::ProcessMovementsSync => "Acknowledge process movement sync",
            Self::StripeMirrorFix => "Acknowledge Stripe mirror checks",
            Self::CrmDataFix => "Acknowledge CRM data checks",
            Self::RlsBasicSetup => "Acknowledge basic RLS setup",
        }
    }

    /// Whether the patch actually touches the backend.
    pub fn is_placeholder(self) -> bool {
        !matches!(
            self,
            Self::ApiSeed | Self::StripeSeed | Self::JourneyTriggersFix
        )
    }
}

impl std::fmt::Display for PatchCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a string is not in the patch catalogue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown patch code: {0}")]
pub struct UnknownPatch(pub String);

impl FromStr for PatchCode {
    type Err = UnknownPatch;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownPatch(s.to_string()))
    }
}

/// Outcome of one autofix invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutofixResult {
    pub success: bool,
    pub message: String,
    pub changes: Vec<String>,
    pub errors: Vec<String>,
}

impl AutofixResult {
    pub fn succeeded(message: impl Into<String>, changes: Vec<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            changes,
            errors: Vec::new(),
        }
    }

    /// A failure always carries at least one error line.
    pub fn failed(message: impl Into<String>, mut errors: Vec<String>) -> Self {
        let message = message.into();
        if errors.is_empty() {
            errors.push(message.clone());
        }
        Self {
            success: false,
            message,
            changes: Vec::new(),
            errors,
        }
    }

    pub fn not_found(code: &str) -> Self {
        Self::failed(PATCH_NOT_FOUND, vec![UnknownPatch(code.to_string()).to_string()])
    }
}
