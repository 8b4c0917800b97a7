//! Emergency message template.

use crate::geo::Coordinate;
use crate::profile::UserProfile;

const MISSING: &str = "N/A";

/// Render the text sent to every contact of one trigger.
#[must_use]
pub fn compose_message(profile: &UserProfile, location: &Coordinate, map_link_base: &str) -> String {
    let field = |value: &Option<String>| -> String {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(MISSING)
            .to_string()
    };
    let name = field(&profile.display_name);
    let subject = if name == MISSING {
        "Emergency Contact"
    } else {
        name.as_str()
    };

    [
        "Safety Alert:".to_string(),
        format!("{subject} requires assistance."),
        String::new(),
        "Contact Information:".to_string(),
        format!("Name: {name}"),
        format!("Phone: {}", field(&profile.phone_number)),
        format!("Blood Group: {}", field(&profile.blood_group)),
        format!("Address: {}", field(&profile.address)),
        String::new(),
        "Current Location:".to_string(),
        location.map_link(map_link_base),
        String::new(),
        "Please respond immediately.".to_string(),
    ]
    .join("\n")
}
