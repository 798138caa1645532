//! Claim records and the in-progress form they are authored through.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

pub const LOSS_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ClaimId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Auto,
    Property,
    Health,
    Theft,
    Fire,
    Other,
}

impl ClaimType {
    pub const ALL: [ClaimType; 6] = [
        ClaimType::Auto,
        ClaimType::Property,
        ClaimType::Health,
        ClaimType::Theft,
        ClaimType::Fire,
        ClaimType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Auto => "auto",
            ClaimType::Property => "property",
            ClaimType::Health => "health",
            ClaimType::Theft => "theft",
            ClaimType::Fire => "fire",
            ClaimType::Other => "other",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ClaimType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownClaimType(s.to_string()))
    }
}

/// Every field a user or the assistant can fill in on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimField {
    ClientName,
    CarrierName,
    PolicyNumber,
    AddressOfLoss,
    City,
    State,
    ZipCode,
    #[serde(alias = "created_at")]
    LossDate,
    Photos,
    InternalNotes,
    SpecialInstructions,
}

impl ClaimField {
    pub const ALL: [ClaimField; 11] = [
        ClaimField::ClientName,
        ClaimField::CarrierName,
        ClaimField::PolicyNumber,
        ClaimField::AddressOfLoss,
        ClaimField::City,
        ClaimField::State,
        ClaimField::ZipCode,
        ClaimField::LossDate,
        ClaimField::Photos,
        ClaimField::InternalNotes,
        ClaimField::SpecialInstructions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimField::ClientName => "client_name",
            ClaimField::CarrierName => "carrier_name",
            ClaimField::PolicyNumber => "policy_number",
            ClaimField::AddressOfLoss => "address_of_loss",
            ClaimField::City => "city",
            ClaimField::State => "state",
            ClaimField::ZipCode => "zip_code",
            ClaimField::LossDate => "loss_date",
            ClaimField::Photos => "photos",
            ClaimField::InternalNotes => "internal_notes",
            ClaimField::SpecialInstructions => "special_instructions",
        }
    }

    pub fn section(&self) -> FormSection {
        match self {
            ClaimField::ClientName
            | ClaimField::CarrierName
            | ClaimField::PolicyNumber
            | ClaimField::LossDate => FormSection::Information,
            ClaimField::AddressOfLoss
            | ClaimField::City
            | ClaimField::State
            | ClaimField::ZipCode => FormSection::Property,
            ClaimField::Photos => FormSection::Photos,
            ClaimField::InternalNotes | ClaimField::SpecialInstructions => FormSection::Notes,
        }
    }

    /// Photos are attached as references, everything else is typed text.
    pub fn is_text(&self) -> bool {
        !matches!(self, ClaimField::Photos)
    }
}

impl fmt::Display for ClaimField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        let normalized = match key {
            "clientName" => "client_name",
            "carrierName" => "carrier_name",
            "policyNumber" => "policy_number",
            "addressOfLoss" => "address_of_loss",
            "zipCode" => "zip_code",
            "created_at" | "createdAt" | "lossDate" => "loss_date",
            "internalNotes" => "internal_notes",
            "specialInstructions" => "special_instructions",
            other => other,
        };
        ClaimField::ALL
            .into_iter()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownField(key.to_string()))
    }
}

/// Steps of the multi-step claim form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormSection {
    #[default]
    Information,
    Property,
    Photos,
    Notes,
}

impl FormSection {
    pub const ALL: [FormSection; 4] = [
        FormSection::Information,
        FormSection::Property,
        FormSection::Photos,
        FormSection::Notes,
    ];

    pub fn fields(&self) -> impl Iterator<Item = ClaimField> + '_ {
        ClaimField::ALL.into_iter().filter(move |f| f.section() == *self)
    }
}

/// Reference to an already uploaded photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub url: String,
    #[serde(default, alias = "publicId", skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl PhotoRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            public_id: None,
            caption: None,
        }
    }
}

/// A persisted insurance claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claim_type: ClaimType,
    pub client_name: Option<String>,
    pub carrier_name: Option<String>,
    pub policy_number: Option<String>,
    pub address_of_loss: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    #[serde(alias = "created_at")]
    pub loss_date: Option<NaiveDate>,
    #[serde(default)]
    pub photos: Vec<PhotoRef>,
    pub internal_notes: Option<String>,
    pub special_instructions: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable in-progress claim, exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimFormData {
    pub id: ClaimId,
    #[serde(alias = "claimType")]
    pub claim_type: ClaimType,
    #[serde(alias = "clientName")]
    pub client_name: String,
    #[serde(alias = "carrierName")]
    pub carrier_name: String,
    #[serde(alias = "policyNumber")]
    pub policy_number: String,
    #[serde(alias = "addressOfLoss")]
    pub address_of_loss: String,
    pub city: String,
    pub state: String,
    #[serde(alias = "zipCode")]
    pub zip_code: String,
    #[serde(alias = "created_at", alias = "createdAt", alias = "lossDate")]
    pub loss_date: String,
    pub photos: Vec<PhotoRef>,
    #[serde(alias = "internalNotes")]
    pub internal_notes: String,
    #[serde(alias = "specialInstructions")]
    pub special_instructions: String,
    /// UI-only: which form step the user is on.
    #[serde(alias = "currentSection")]
    pub current_section: FormSection,
}

impl Default for ClaimFormData {
    fn default() -> Self {
        Self::new(ClaimType::Other)
    }
}

impl ClaimFormData {
    pub fn new(claim_type: ClaimType) -> Self {
        Self {
            id: ClaimId::new(),
            claim_type,
            client_name: String::new(),
            carrier_name: String::new(),
            policy_number: String::new(),
            address_of_loss: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            loss_date: String::new(),
            photos: Vec::new(),
            internal_notes: String::new(),
            special_instructions: String::new(),
            current_section: FormSection::default(),
        }
    }

    pub fn from_claim(claim: &Claim) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            id: claim.id,
            claim_type: claim.claim_type,
            client_name: text(&claim.client_name),
            carrier_name: text(&claim.carrier_name),
            policy_number: text(&claim.policy_number),
            address_of_loss: text(&claim.address_of_loss),
            city: text(&claim.city),
            state: text(&claim.state),
            zip_code: text(&claim.zip_code),
            loss_date: claim
                .loss_date
                .map(|d| d.format(LOSS_DATE_FORMAT).to_string())
                .unwrap_or_default(),
            photos: claim.photos.clone(),
            internal_notes: text(&claim.internal_notes),
            special_instructions: text(&claim.special_instructions),
            current_section: FormSection::default(),
        }
    }

    /// Raw text of a field; `None` for photos.
    pub fn text(&self, field: ClaimField) -> Option<&str> {
        let value = match field {
            ClaimField::ClientName => &self.client_name,
            ClaimField::CarrierName => &self.carrier_name,
            ClaimField::PolicyNumber => &self.policy_number,
            ClaimField::AddressOfLoss => &self.address_of_loss,
            ClaimField::City => &self.city,
            ClaimField::State => &self.state,
            ClaimField::ZipCode => &self.zip_code,
            ClaimField::LossDate => &self.loss_date,
            ClaimField::InternalNotes => &self.internal_notes,
            ClaimField::SpecialInstructions => &self.special_instructions,
            ClaimField::Photos => return None,
        };
        Some(value.as_str())
    }

    pub fn set_text(
        &mut self,
        field: ClaimField,
        value: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let slot = match field {
            ClaimField::ClientName => &mut self.client_name,
            ClaimField::CarrierName => &mut self.carrier_name,
            ClaimField::PolicyNumber => &mut self.policy_number,
            ClaimField::AddressOfLoss => &mut self.address_of_loss,
            ClaimField::City => &mut self.city,
            ClaimField::State => &mut self.state,
            ClaimField::ZipCode => &mut self.zip_code,
            ClaimField::LossDate => &mut self.loss_date,
            ClaimField::InternalNotes => &mut self.internal_notes,
            ClaimField::SpecialInstructions => &mut self.special_instructions,
            ClaimField::Photos => {
                return Err(ValidationError::invalid_format(
                    field,
                    "photos are attached as references, not typed",
                ));
            }
        };
        *slot = value.into();
        Ok(())
    }

    /// Non-empty after trimming; photos count when at least one is attached.
    pub fn is_present(&self, field: ClaimField) -> bool {
        match self.text(field) {
            Some(text) => !text.trim().is_empty(),
            None => !self.photos.is_empty(),
        }
    }

    pub fn to_claim(&self) -> Result<Claim, ValidationError> {
        let opt = |v: &str| {
            let trimmed = v.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        let loss_date = match opt(&self.loss_date) {
            Some(raw) => Some(NaiveDate::parse_from_str(&raw, LOSS_DATE_FORMAT).map_err(|_| {
                ValidationError::invalid_format(ClaimField::LossDate, "expected YYYY-MM-DD")
            })?),
            None => None,
        };

        Ok(Claim {
            id: self.id,
            claim_type: self.claim_type,
            client_name: opt(&self.client_name),
            carrier_name: opt(&self.carrier_name),
            policy_number: opt(&self.policy_number),
            address_of_loss: opt(&self.address_of_loss),
            city: opt(&self.city),
            state: opt(&self.state),
            zip_code: opt(&self.zip_code),
            loss_date,
            photos: self.photos.clone(),
            internal_notes: opt(&self.internal_notes),
            special_instructions: opt(&self.special_instructions),
            updated_at: Utc::now(),
        })
    }
}
