use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use shared::{
    domain::{LeadSource, NewLead},
    error::ValidationError,
    stage::StageId,
};

/// Values entered in the add-lead form. Kept by the caller across a failed
/// submit so the user can retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub notes: String,
}

impl LeadForm {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::required("name"));
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::required("email"));
        }
        Ok(())
    }

    /// Builds the record handed to the store: stage `inquiry`, both
    /// timestamps at `now`, empty preferences.
    pub fn to_new_lead(&self, now: DateTime<Utc>) -> Result<NewLead, ValidationError> {
        self.validate()?;
        Ok(NewLead {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: non_blank(&self.phone),
            source: non_blank(&self.source).map(|raw| {
                LeadSource::classify(Some(&raw))
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or(raw)
            }),
            stage: StageId::Inquiry.as_str().to_string(),
            created_at: now,
            last_contact: Some(now),
            notes: non_blank(&self.notes).into_iter().collect(),
            property_preferences: Map::new(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
