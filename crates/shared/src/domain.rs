use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stage::StageId;

/// Store-assigned, opaque lead identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A lead as held by the store and mirrored in the board cache.
///
/// `stage` is kept as the raw id string: records written by other tools may
/// carry ids outside the registry, and those must survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub stage: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub property_preferences: Map<String, Value>,
}

impl Lead {
    pub fn stage_id(&self) -> Option<StageId> {
        StageId::parse(&self.stage)
    }

    pub fn is_in_stage(&self, stage: StageId) -> bool {
        self.stage == stage.as_str()
    }

    /// Copy of this record moved to `stage`; every other field is kept.
    pub fn with_stage(&self, stage: StageId) -> Lead {
        Lead {
            stage: stage.as_str().to_string(),
            ..self.clone()
        }
    }

    pub fn source_kind(&self) -> LeadSource {
        LeadSource::classify(self.source.as_deref())
    }
}

/// A lead before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub stage: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub property_preferences: Map<String, Value>,
}

impl NewLead {
    pub fn into_lead(self, id: LeadId) -> Lead {
        Lead {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            source: self.source,
            stage: self.stage,
            created_at: self.created_at,
            last_contact: self.last_contact,
            notes: self.notes,
            property_preferences: self.property_preferences,
        }
    }
}

/// Known lead sources. Free text that matches none of them is `Other`;
/// a missing or blank source is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    Social,
    Phone,
    Email,
    Other,
    Unknown,
}

impl LeadSource {
    pub const KNOWN: [LeadSource; 5] = [
        LeadSource::Website,
        LeadSource::Referral,
        LeadSource::Social,
        LeadSource::Phone,
        LeadSource::Email,
    ];

    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return LeadSource::Unknown;
        };
        match raw.to_ascii_lowercase().as_str() {
            "website" | "web" => LeadSource::Website,
            "referral" => LeadSource::Referral,
            "social" | "social media" => LeadSource::Social,
            "phone" | "phone call" => LeadSource::Phone,
            "email" | "e-mail" => LeadSource::Email,
            _ => LeadSource::Other,
        }
    }

    /// Value stored in `Lead::source` for a form selection.
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            LeadSource::Website => Some("website"),
            LeadSource::Referral => Some("referral"),
            LeadSource::Social => Some("social"),
            LeadSource::Phone => Some("phone"),
            LeadSource::Email => Some("email"),
            LeadSource::Other | LeadSource::Unknown => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LeadSource::Website => "Website",
            LeadSource::Referral => "Referral",
            LeadSource::Social => "Social Media",
            LeadSource::Phone => "Phone Call",
            LeadSource::Email => "Email",
            LeadSource::Other => "Other",
            LeadSource::Unknown => "Unknown",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            LeadSource::Website => "Globe",
            LeadSource::Referral => "Users",
            LeadSource::Social => "Share2",
            LeadSource::Phone => "Phone",
            LeadSource::Email => "Mail",
            LeadSource::Other | LeadSource::Unknown => "User",
        }
    }
}
