//! Emergency contacts and phone number handling.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{self, collections, DocumentStore};

/// A ten-digit Indian mobile number.
static MOBILE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[6-9]\d{9}$").expect("valid mobile number pattern"));

/// Number of digits in a local mobile number.
const LOCAL_DIGITS: usize = 10;

/// Reduce user input to at most ten local digits.
///
/// Separators are dropped and a leading `91` country code on a twelve-digit
/// number is removed.
#[must_use]
pub fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == LOCAL_DIGITS + 2 && digits.starts_with("91") {
        return digits[2..].to_string();
    }
    digits.chars().take(LOCAL_DIGITS).collect()
}

/// Validate a phone number and return its ten local digits.
///
/// # Errors
///
/// Returns [`Error::InvalidContact`] unless the input, after stripping
/// separators, is ten digits starting with 6 to 9.
pub fn validate_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if MOBILE_NUMBER.is_match(&digits) {
        Ok(digits)
    } else {
        Err(Error::invalid_contact(format!(
            "phone number must be 10 digits starting with 6-9, got {raw:?}"
        )))
    }
}

/// Put `number` in international form with `country_prefix`.
///
/// Numbers that already start with the prefix are returned unchanged.
#[must_use]
pub fn normalize_phone(number: &str, country_prefix: &str) -> String {
    if number.starts_with(country_prefix) {
        return number.to_string();
    }
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    format!("{country_prefix}{digits}")
}

/// A person to notify when the user triggers an SOS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Unique within the owner's list.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ten local digits.
    #[serde(rename = "phone")]
    pub phone_digits: String,
    /// Relationship to the user, free text.
    #[serde(default)]
    pub relationship: String,
}

/// Fields supplied when adding or editing a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    /// Display name.
    pub name: String,
    /// Phone number in any common format.
    pub phone: String,
    /// Relationship to the user.
    pub relationship: String,
}

impl ContactDetails {
    fn into_contact(self, id: String) -> Result<EmergencyContact> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_contact("name must not be empty"));
        }
        Ok(EmergencyContact {
            id,
            name: name.to_string(),
            phone_digits: validate_phone(&format_phone(&self.phone))?,
            relationship: self.relationship.trim().to_string(),
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContactList {
    #[serde(default)]
    contacts: Vec<EmergencyContact>,
}

/// Load a user's contacts in list order. A missing document means none.
///
/// # Errors
///
/// Returns an error if the read fails or the document is malformed.
pub async fn load_contacts(
    store: &dyn DocumentStore,
    owner_id: &str,
) -> Result<Vec<EmergencyContact>> {
    let list: Option<ContactList> =
        store::load(store, collections::EMERGENCY_CONTACTS, owner_id).await?;
    Ok(list.unwrap_or_default().contacts)
}

/// One user's ordered contact list.
///
/// Every mutation reads the current list, applies the change and writes the
/// whole list back.
#[derive(Debug, Clone)]
pub struct ContactBook {
    store: Arc<dyn DocumentStore>,
    owner_id: String,
}

impl ContactBook {
    /// Open the contact book of `owner_id`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
        }
    }

    /// The owner of this book.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// All contacts in list order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn list(&self) -> Result<Vec<EmergencyContact>> {
        load_contacts(self.store.as_ref(), &self.owner_id).await
    }

    /// Look up one contact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no contact has this id.
    pub async fn get(&self, id: &str) -> Result<EmergencyContact> {
        self.list()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("contact", id))
    }

    /// Add a contact with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContact`] on a bad name or phone number.
    pub async fn add(&self, details: ContactDetails) -> Result<EmergencyContact> {
        self.insert(details.into_contact(Uuid::new_v4().to_string())?)
            .await
    }

    /// Append a contact that already carries an id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateContact`] if the id is taken, or
    /// [`Error::InvalidContact`] if the phone number is invalid.
    pub async fn insert(&self, mut contact: EmergencyContact) -> Result<EmergencyContact> {
        contact.phone_digits = validate_phone(&contact.phone_digits)?;

        let mut contacts = self.list().await?;
        if contacts.iter().any(|c| c.id == contact.id) {
            return Err(Error::DuplicateContact { id: contact.id });
        }
        contacts.push(contact.clone());
        self.write(contacts).await?;

        info!(owner = %self.owner_id, id = %contact.id, "emergency contact added");
        Ok(contact)
    }

    /// Replace the details of an existing contact, keeping its id and
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id or
    /// [`Error::InvalidContact`] for invalid details.
    pub async fn update(&self, id: &str, details: ContactDetails) -> Result<EmergencyContact> {
        let updated = details.into_contact(id.to_string())?;

        let mut contacts = self.list().await?;
        let slot = contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("contact", id))?;
        *slot = updated.clone();
        self.write(contacts).await?;

        debug!(owner = %self.owner_id, id, "emergency contact updated");
        Ok(updated)
    }

    /// Remove a contact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn delete(&self, id: &str) -> Result<EmergencyContact> {
        let mut contacts = self.list().await?;
        let index = contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::not_found("contact", id))?;
        let removed = contacts.remove(index);
        self.write(contacts).await?;

        info!(owner = %self.owner_id, id, "emergency contact removed");
        Ok(removed)
    }

    async fn write(&self, contacts: Vec<EmergencyContact>) -> Result<()> {
        let document = store::to_document(&ContactList { contacts })?;
        self.store
            .set(collections::EMERGENCY_CONTACTS, &self.owner_id, document, true)
            .await
            .map_err(|e| Error::persistence(collections::EMERGENCY_CONTACTS, &self.owner_id, e))
    }
}
