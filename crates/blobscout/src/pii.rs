//! PII classification of columns.
//!
//! Two local signals are combined by union: keywords in the column name and
//! value shapes in the captured sample values. An optional external entity
//! recognizer is only asked about columns where both local signals came up
//! empty, so it can add findings but never hide one.

use crate::error::Result;
use crate::schema::{Extraction, MAX_INFERENCE_VALUES};
use async_trait::async_trait;
use blobscout_protocol::{DataClassification, PiiType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Substring of a lowercased column name -> category.
const KEYWORDS: &[(&str, PiiType)] = &[
    ("email", PiiType::Email),
    ("e-mail", PiiType::Email),
    ("e_mail", PiiType::Email),
    ("phone", PiiType::Phone),
    ("mobile", PiiType::Phone),
    ("ssn", PiiType::Ssn),
    ("social_security", PiiType::Ssn),
    ("credit_card", PiiType::CreditCard),
    ("creditcard", PiiType::CreditCard),
    ("card_number", PiiType::CreditCard),
    ("cardnumber", PiiType::CreditCard),
    ("first_name", PiiType::Name),
    ("last_name", PiiType::Name),
    ("full_name", PiiType::Name),
    ("firstname", PiiType::Name),
    ("lastname", PiiType::Name),
    ("fullname", PiiType::Name),
    ("surname", PiiType::Name),
    ("address", PiiType::Address),
    ("street", PiiType::Address),
    ("postal", PiiType::Address),
    ("zip", PiiType::Address),
    ("date_of_birth", PiiType::DateOfBirth),
    ("birth_date", PiiType::DateOfBirth),
    ("birthdate", PiiType::DateOfBirth),
    ("dob", PiiType::DateOfBirth),
    ("ip_addr", PiiType::Ip),
    ("ipaddress", PiiType::Ip),
    ("ipv4", PiiType::Ip),
    ("passport", PiiType::Passport),
    ("driver_license", PiiType::DriverLicense),
    ("drivers_license", PiiType::DriverLicense),
    ("license_number", PiiType::DriverLicense),
    ("bank_account", PiiType::BankAccount),
    ("account_number", PiiType::BankAccount),
    ("iban", PiiType::BankAccount),
];

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern")
});
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\+\d{1,3}[\s.-]?)?(\(\d{3}\)|\d{3})[\s.-]?\d{3}[\s.-]\d{4}$").expect("phone pattern")
});
static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").expect("ssn pattern"));
static CARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d[ -]?){12,18}\d$").expect("card pattern"));
static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("ipv4 pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PiiFinding {
    pub detected: bool,
    pub types: BTreeSet<PiiType>,
}

impl PiiFinding {
    fn from_types(types: BTreeSet<PiiType>) -> Self {
        Self {
            detected: !types.is_empty(),
            types,
        }
    }
}

/// Local classification of one column: name keywords plus value shapes.
pub fn classify<S: AsRef<str>>(column_name: &str, sample_values: &[S]) -> PiiFinding {
    let mut types = keyword_types(column_name);
    types.extend(value_types(sample_values));
    PiiFinding::from_types(types)
}

fn keyword_types(column_name: &str) -> BTreeSet<PiiType> {
    let lower = column_name.trim().to_ascii_lowercase();
    KEYWORDS
        .iter()
        .filter(|(keyword, _)| lower.contains(keyword))
        .map(|(_, pii)| pii.clone())
        .collect()
}

fn value_types<S: AsRef<str>>(values: &[S]) -> BTreeSet<PiiType> {
    let mut types = BTreeSet::new();
    for value in values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .take(MAX_INFERENCE_VALUES)
    {
        if EMAIL.is_match(value) {
            types.insert(PiiType::Email);
        }
        if SSN.is_match(value) {
            types.insert(PiiType::Ssn);
        } else if PHONE.is_match(value) {
            types.insert(PiiType::Phone);
        }
        if CARD.is_match(value) && luhn_valid(value) {
            types.insert(PiiType::CreditCard);
        }
        if is_ipv4(value) {
            types.insert(PiiType::Ip);
        }
    }
    types
}

fn luhn_valid(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn is_ipv4(value: &str) -> bool {
    IPV4.captures(value).map_or(false, |caps| {
        (1..=4).all(|i| caps[i].parse::<u16>().map_or(false, |octet| octet <= 255))
    })
}

/// Record sensitivity from the union of PII types found.
pub fn data_classification<'a, I>(types: I) -> DataClassification
where
    I: IntoIterator<Item = &'a PiiType>,
{
    let mut classification = DataClassification::Internal;
    for pii in types {
        if pii.is_highly_sensitive() {
            return DataClassification::Confidential;
        }
        classification = DataClassification::Restricted;
    }
    classification
}

/// Map an entity category reported by a recognizer onto a PII type.
pub fn category_to_pii(category: &str) -> PiiType {
    match category.trim().to_ascii_lowercase().as_str() {
        "email" => PiiType::Email,
        "phonenumber" | "phone" => PiiType::Phone,
        "ussocialsecuritynumber" | "ssn" => PiiType::Ssn,
        "creditcardnumber" | "credit_card" => PiiType::CreditCard,
        "person" | "name" => PiiType::Name,
        "address" => PiiType::Address,
        "dateofbirth" | "date_of_birth" => PiiType::DateOfBirth,
        "ipaddress" | "ip" => PiiType::Ip,
        "passportnumber" | "uspassportnumber" | "passport" => PiiType::Passport,
        "driverlicense" | "usdriverslicensenumber" | "driver_license" => PiiType::DriverLicense,
        "bankaccount" | "usbankaccountnumber" | "bank_account" => PiiType::BankAccount,
        other => PiiType::Other(other.to_string()),
    }
}

/// External entity recognition service, asked about a column name.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Entity categories found in `text` (for example `Email`, `Person`).
    async fn recognize(&self, text: &str) -> Result<Vec<String>>;
}

/// Classifier with an optional injected recognizer.
#[derive(Clone, Default)]
pub struct PiiClassifier {
    recognizer: Option<Arc<dyn EntityRecognizer>>,
    call_timeout: Option<Duration>,
}

impl PiiClassifier {
    /// Keyword and pattern matching only.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn with_recognizer(recognizer: Arc<dyn EntityRecognizer>, call_timeout: Duration) -> Self {
        Self {
            recognizer: Some(recognizer),
            call_timeout: Some(call_timeout),
        }
    }

    pub async fn classify_column<S: AsRef<str>>(&self, column_name: &str, sample_values: &[S]) -> PiiFinding {
        let local = classify(column_name, sample_values);
        if local.detected {
            return local;
        }
        let Some(recognizer) = &self.recognizer else {
            return local;
        };

        let call = recognizer.recognize(column_name);
        let result = match self.call_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(recognizer = recognizer.name(), column = column_name, "Entity recognizer timed out");
                    return local;
                }
            },
            None => call.await,
        };

        match result {
            Ok(categories) if !categories.is_empty() => {
                debug!(recognizer = recognizer.name(), column = column_name, ?categories, "Entity recognizer found PII");
                PiiFinding::from_types(categories.iter().map(|c| category_to_pii(c)).collect())
            }
            Ok(_) => local,
            Err(e) => {
                warn!(recognizer = recognizer.name(), column = column_name, error = %e, "Entity recognizer unavailable");
                local
            }
        }
    }

    /// Annotate every column of an extraction in place.
    pub async fn classify_schema(&self, extraction: &mut Extraction) {
        for index in 0..extraction.schema.columns.len() {
            let name = extraction.schema.columns[index].name.clone();
            let finding = self.classify_column(&name, extraction.values_for(index)).await;
            let column = &mut extraction.schema.columns[index];
            column.pii_detected = finding.detected;
            column.pii_types = finding.types;
        }
    }
}
