use chrono::{DateTime, Utc};

/// A listing entry discovered on an index page.
///
/// Only `uri` is guaranteed to be set when the item comes off a listing
/// page; detail fetching fills in the rest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    /// Detail page URI. Identifies the item across crawls.
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub torrent_url: Option<String>,
    #[serde(default)]
    pub magnet_uri: Option<String>,
    /// Site-specific fields (team, publisher, file list, ...).
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl Item {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: None,
            publish_time: None,
            torrent_url: None,
            magnet_uri: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
