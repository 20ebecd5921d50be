use crate::domain::DomainKey;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Registrant data published by the registry. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDetails {
    pub owner: Option<String>,
    pub document_id: Option<String>,
    pub registration_date: Option<String>,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Registered(RegistrationDetails),
}

impl Availability {
    pub fn status(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Registered(_) => "registered",
        }
    }

    pub fn details(&self) -> Option<&RegistrationDetails> {
        match self {
            Availability::Available => None,
            Availability::Registered(details) => Some(details),
        }
    }
}

/// One completed registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub availability: Availability,
    /// When the fetch completed. Orders competing writes in the store.
    pub checked_at: DateTime<Utc>,
}

impl LookupResult {
    pub fn new(availability: Availability, checked_at: DateTime<Utc>) -> Self {
        Self {
            availability,
            checked_at,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.availability, Availability::Registered(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub key: DomainKey,
    pub result: LookupResult,
}

/// JSON body served by `/check/{domain}` and each `/history` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResponse {
    pub domain: String,
    pub zone: String,
    pub status: String,
    pub details: serde_json::Value,
    pub check_date: String,
}

impl DomainResponse {
    pub fn new(key: &DomainKey, result: &LookupResult) -> Self {
        let details = match result.availability.details() {
            Some(details) => serde_json::json!(details),
            None => serde_json::json!({}),
        };

        Self {
            domain: key.label().to_string(),
            zone: key.zone().to_string(),
            status: result.availability.status().to_string(),
            details,
            check_date: result.checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl From<&HistoryRecord> for DomainResponse {
    fn from(record: &HistoryRecord) -> Self {
        Self::new(&record.key, &record.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Zone;
    use chrono::TimeZone;

    #[test]
    fn test_available_response_has_empty_details() {
        let key = DomainKey::new("nonexistent-xyz", Zone::OrgAr).unwrap();
        let checked_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let response = DomainResponse::new(&key, &LookupResult::new(Availability::Available, checked_at));

        assert_eq!(response.status, "available");
        assert_eq!(response.zone, ".org.ar");
        assert_eq!(response.details, serde_json::json!({}));
        assert_eq!(response.check_date, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_registered_response_keeps_missing_fields_as_null() {
        let key = DomainKey::new("google", Zone::ComAr).unwrap();
        let details = RegistrationDetails {
            owner: Some("Google Argentina S.R.L.".to_string()),
            ..Default::default()
        };
        let result = LookupResult::new(Availability::Registered(details), Utc::now());
        let response = DomainResponse::new(&key, &result);

        assert_eq!(response.status, "registered");
        assert_eq!(response.details["owner"], "Google Argentina S.R.L.");
        assert!(response.details["expiration_date"].is_null());
    }
}
