//! User profile documents.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, collections, DocumentStore};

/// Personal details included in emergency messages.
///
/// Every field is optional; the profile is read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Name shown to contacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The user's own phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Blood group, e.g. "O+".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    /// Home address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl UserProfile {
    /// Load a profile; a missing document yields an empty profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the document is malformed.
    pub async fn load(store: &dyn DocumentStore, user_id: &str) -> Result<Self> {
        Ok(store::load(store, collections::USER_PROFILES, user_id)
            .await?
            .unwrap_or_default())
    }

    /// Write this profile for `user_id`, merging with any stored fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save(&self, store: &dyn DocumentStore, user_id: &str) -> Result<()> {
        store
            .set(
                collections::USER_PROFILES,
                user_id,
                store::to_document(self)?,
                true,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[tokio::test]
    async fn test_missing_profile_is_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(
            UserProfile::load(&store, "nobody").await.unwrap(),
            UserProfile::default()
        );
    }

    #[tokio::test]
    async fn test_save_merges_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        UserProfile {
            display_name: Some("Asha".to_string()),
            blood_group: Some("O+".to_string()),
            ..UserProfile::default()
        }
        .save(&store, "u1")
        .await
        .unwrap();
        UserProfile {
            phone_number: Some("9876543210".to_string()),
            ..UserProfile::default()
        }
        .save(&store, "u1")
        .await
        .unwrap();

        let profile = UserProfile::load(&store, "u1").await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Asha"));
        assert_eq!(profile.phone_number.as_deref(), Some("9876543210"));
        assert!(profile.address.is_none());
    }

    #[test]
    fn test_profile_field_names() {
        let json = serde_json::json!({"displayName": "Asha", "bloodGroup": "B-"});
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.blood_group.as_deref(), Some("B-"));
    }
}
