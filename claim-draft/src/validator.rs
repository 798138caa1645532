//! Field Validator: which fields a claim type requires, and whether they are filled in well.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::claim::{ClaimField, ClaimFormData, ClaimType, FormSection, LOSS_DATE_FORMAT};
use crate::error::ValidationError;

static ZIP_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("zip code pattern is valid"));
static POLICY_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-/ ]*$").expect("policy number pattern is valid")
});
static STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z .]*$").expect("state pattern is valid"));

/// Required fields per claim type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRules {
    required: HashMap<ClaimType, BTreeSet<ClaimField>>,
}

impl Default for FieldRules {
    fn default() -> Self {
        use ClaimField::*;

        Self::empty()
            .require(
                ClaimType::Auto,
                [ClientName, CarrierName, PolicyNumber, LossDate],
            )
            .require(ClaimType::Property, [AddressOfLoss, City, State, ZipCode])
            .require(ClaimType::Health, [ClientName, CarrierName, PolicyNumber])
            .require(
                ClaimType::Theft,
                [ClientName, PolicyNumber, AddressOfLoss, LossDate],
            )
            .require(
                ClaimType::Fire,
                [PolicyNumber, AddressOfLoss, City, State, ZipCode, Photos],
            )
            .require(ClaimType::Other, [ClientName])
    }
}

impl FieldRules {
    /// A table in which no claim type requires anything.
    pub fn empty() -> Self {
        Self {
            required: HashMap::new(),
        }
    }

    /// Replace the required set for `claim_type`.
    pub fn require(
        mut self,
        claim_type: ClaimType,
        fields: impl IntoIterator<Item = ClaimField>,
    ) -> Self {
        self.required
            .insert(claim_type, fields.into_iter().collect());
        self
    }

    pub fn required_fields(&self, claim_type: ClaimType) -> impl Iterator<Item = ClaimField> + '_ {
        self.required
            .get(&claim_type)
            .into_iter()
            .flat_map(|fields| fields.iter().copied())
    }

    pub fn is_required(&self, claim_type: ClaimType, field: ClaimField) -> bool {
        self.required
            .get(&claim_type)
            .is_some_and(|fields| fields.contains(&field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStatus {
    pub required: bool,
    pub present: bool,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub completed: usize,
    pub required: usize,
}

impl SectionProgress {
    pub fn is_complete(&self) -> bool {
        self.completed == self.required
    }
}

/// Outcome of validating one form against the rules for its claim type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub claim_type: ClaimType,
    pub fields: BTreeMap<ClaimField, FieldStatus>,
    pub is_complete: bool,
    #[serde(skip)]
    problems: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn status(&self, field: ClaimField) -> Option<FieldStatus> {
        self.fields.get(&field).copied()
    }

    pub fn required_total(&self) -> usize {
        self.fields.values().filter(|s| s.required).count()
    }

    pub fn required_completed(&self) -> usize {
        self.fields
            .values()
            .filter(|s| s.required && s.valid)
            .count()
    }

    /// Required fields that still block drafting, in field order.
    pub fn missing(&self) -> Vec<ClaimField> {
        self.fields
            .iter()
            .filter(|(_, s)| s.required && !s.valid)
            .map(|(field, _)| *field)
            .collect()
    }

    /// Per-field problems suitable for inline display.
    pub fn errors(&self) -> &[ValidationError] {
        &self.problems
    }

    pub fn section_progress(&self, section: FormSection) -> SectionProgress {
        let statuses = section
            .fields()
            .filter_map(|f| self.fields.get(&f))
            .filter(|s| s.required);
        let (completed, required) = statuses.fold((0, 0), |(done, total), s| {
            (done + usize::from(s.valid), total + 1)
        });
        SectionProgress {
            completed,
            required,
        }
    }
}

/// Validate `form` against the required-field table for its claim type.
pub fn validate(form: &ClaimFormData, rules: &FieldRules) -> ValidationReport {
    let mut fields = BTreeMap::new();
    let mut problems = Vec::new();

    for field in ClaimField::ALL {
        let required = rules.is_required(form.claim_type, field);
        let present = form.is_present(field);
        let format_problem = if present {
            check_format(form, field)
        } else {
            None
        };
        let valid = present && format_problem.is_none();

        match format_problem {
            Some(reason) => problems.push(ValidationError::invalid_format(field, reason)),
            None if required && !present => problems.push(ValidationError::empty_field(field)),
            None => {}
        }

        fields.insert(
            field,
            FieldStatus {
                required,
                present,
                valid,
            },
        );
    }

    let is_complete = fields.values().all(|s| !s.required || s.valid);

    ValidationReport {
        claim_type: form.claim_type,
        fields,
        is_complete,
        problems,
    }
}

fn check_format(form: &ClaimFormData, field: ClaimField) -> Option<&'static str> {
    if field == ClaimField::Photos {
        return form
            .photos
            .iter()
            .any(|p| p.url.trim().is_empty())
            .then_some("every photo needs an uploaded url");
    }

    let value = form.text(field)?.trim();
    match field {
        ClaimField::ZipCode if !ZIP_CODE.is_match(value) => {
            Some("expected a 5-digit zip code, optionally followed by -1234")
        }
        ClaimField::PolicyNumber if !POLICY_NUMBER.is_match(value) => {
            Some("policy numbers use letters, digits, spaces, '-' and '/'")
        }
        ClaimField::State if !STATE.is_match(value) => {
            Some("expected a state code or name")
        }
        ClaimField::LossDate if NaiveDate::parse_from_str(value, LOSS_DATE_FORMAT).is_err() => {
            Some("expected a date as YYYY-MM-DD")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::PhotoRef;

    fn property_form() -> ClaimFormData {
        let mut form = ClaimFormData::new(ClaimType::Property);
        form.set_text(ClaimField::AddressOfLoss, "12 Elm St").unwrap();
        form.set_text(ClaimField::City, "Springfield").unwrap();
        form.set_text(ClaimField::State, "IL").unwrap();
        form.set_text(ClaimField::ZipCode, "62701").unwrap();
        form
    }

    #[test]
    fn test_complete_property_claim() {
        let report = validate(&property_form(), &FieldRules::default());
        assert!(report.is_complete);
        assert!(report.missing().is_empty());
        assert!(report.errors().is_empty());
        assert_eq!(report.required_total(), 4);
        assert_eq!(report.required_completed(), 4);
    }

    #[test]
    fn test_property_does_not_require_client_name() {
        let report = validate(&property_form(), &FieldRules::default());
        let status = report.status(ClaimField::ClientName).unwrap();
        assert!(!status.required);
        assert!(!status.present);
    }

    #[test]
    fn test_auto_does_not_require_address() {
        let rules = FieldRules::default();
        assert!(!rules.is_required(ClaimType::Auto, ClaimField::AddressOfLoss));
        assert!(rules.is_required(ClaimType::Auto, ClaimField::PolicyNumber));
    }

    #[test]
    fn test_bad_zip_is_present_but_invalid() {
        let mut form = property_form();
        form.set_text(ClaimField::ZipCode, "627").unwrap();

        let report = validate(&form, &FieldRules::default());
        let zip = report.status(ClaimField::ZipCode).unwrap();
        assert!(zip.present);
        assert!(!zip.valid);
        assert!(!report.is_complete);
        assert_eq!(report.missing(), vec![ClaimField::ZipCode]);
        assert_eq!(report.errors()[0].field(), Some(ClaimField::ZipCode));
    }

    #[test]
    fn test_zip_plus_four_is_valid() {
        let mut form = property_form();
        form.set_text(ClaimField::ZipCode, "62701-1234").unwrap();
        assert!(validate(&form, &FieldRules::default()).is_complete);
    }

    #[test]
    fn test_missing_required_field_reported_as_empty() {
        let form = ClaimFormData::new(ClaimType::Health);
        let report = validate(&form, &FieldRules::default());
        assert_eq!(
            report.missing(),
            vec![
                ClaimField::ClientName,
                ClaimField::CarrierName,
                ClaimField::PolicyNumber
            ]
        );
        assert!(
            report
                .errors()
                .iter()
                .all(|e| matches!(e, ValidationError::EmptyField { .. }))
        );
    }

    #[test]
    fn test_malformed_optional_field_is_flagged_but_not_blocking() {
        let mut form = property_form();
        form.set_text(ClaimField::LossDate, "03/09/2024").unwrap();

        let report = validate(&form, &FieldRules::default());
        assert!(report.is_complete);
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.errors()[0].field(), Some(ClaimField::LossDate));
    }

    #[test]
    fn test_policy_number_format() {
        let mut form = ClaimFormData::new(ClaimType::Health);
        form.set_text(ClaimField::PolicyNumber, "HX-2291/B").unwrap();
        let report = validate(&form, &FieldRules::default());
        assert!(report.status(ClaimField::PolicyNumber).unwrap().valid);

        form.set_text(ClaimField::PolicyNumber, "#!").unwrap();
        let report = validate(&form, &FieldRules::default());
        assert!(!report.status(ClaimField::PolicyNumber).unwrap().valid);
    }

    #[test]
    fn test_fire_requires_photos_with_urls() {
        let mut form = property_form();
        form.claim_type = ClaimType::Fire;
        form.set_text(ClaimField::PolicyNumber, "FP-1001").unwrap();

        let report = validate(&form, &FieldRules::default());
        assert_eq!(report.missing(), vec![ClaimField::Photos]);

        form.photos.push(PhotoRef::new(" "));
        let report = validate(&form, &FieldRules::default());
        assert!(report.status(ClaimField::Photos).unwrap().present);
        assert!(!report.is_complete);

        form.photos[0].url = "https://img.example/kitchen.jpg".to_string();
        assert!(validate(&form, &FieldRules::default()).is_complete);
    }

    #[test]
    fn test_section_progress() {
        let mut form = ClaimFormData::new(ClaimType::Theft);
        form.set_text(ClaimField::ClientName, "Dana").unwrap();
        let report = validate(&form, &FieldRules::default());

        let info = report.section_progress(FormSection::Information);
        assert_eq!(info.required, 3);
        assert_eq!(info.completed, 1);
        let property = report.section_progress(FormSection::Property);
        assert_eq!(property.required, 1);
        assert!(!property.is_complete());
        assert!(report.section_progress(FormSection::Notes).is_complete());
    }

    #[test]
    fn test_custom_rules_replace_defaults() {
        let rules = FieldRules::default().require(ClaimType::Other, []);
        let report = validate(&ClaimFormData::new(ClaimType::Other), &rules);
        assert!(report.is_complete);
        assert_eq!(report.required_total(), 0);
    }
}
