//! Push notification handling
//!
//! Builds a displayable notification from a push payload and routes
//! notification clicks to an application view. Stateless event-response
//! logic; the runtime owns the actual display surface.

use serde::{Deserialize, Serialize};

/// Default notification title when the payload has none
const DEFAULT_TITLE: &str = "Deskline";

/// Default notification body when the payload has none
const DEFAULT_BODY: &str = "You have a new update.";

/// View opened when the user picks the open action
const OPEN_TARGET: &str = "/dashboard";

/// Decoded push payload; both fields are optional on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Notification title
    #[serde(default)]
    pub title: Option<String>,
    /// Notification body
    #[serde(default)]
    pub body: Option<String>,
}

impl PushPayload {
    /// Parse a raw push message body; an unparseable payload yields the
    /// defaults rather than a dropped notification.
    pub fn parse(raw: &[u8]) -> Self {
        serde_json::from_slice(raw).unwrap_or_default()
    }
}

/// An action button attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Action identifier reported back on click
    pub action: String,
    /// Button label
    pub title: String,
}

/// A notification ready for the runtime to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Title line
    pub title: String,
    /// Body text
    pub body: String,
    /// The fixed action set
    pub actions: Vec<NotificationAction>,
}

/// Build the notification for a push event
pub fn on_push(payload: &PushPayload) -> Notification {
    Notification {
        title: payload
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        body: payload
            .body
            .clone()
            .unwrap_or_else(|| DEFAULT_BODY.to_string()),
        actions: vec![
            NotificationAction {
                action: "open".to_string(),
                title: "Open".to_string(),
            },
            NotificationAction {
                action: "dismiss".to_string(),
                title: "Dismiss".to_string(),
            },
        ],
    }
}

/// Resolve a notification click to the view that should be opened.
///
/// Returns `None` when the click should only close the notification.
pub fn on_notification_click(action: &str) -> Option<String> {
    match action {
        "open" => Some(OPEN_TARGET.to_string()),
        _ => None,
    }
}
