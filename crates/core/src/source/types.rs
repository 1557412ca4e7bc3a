use serde::{Deserialize, Serialize};

/// What the upstream knows about one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub author_id: String,
    pub author_name: String,
    /// Opaque handle passed back to stream lookup.
    pub stream_ref: String,
}

/// A downloadable media location and the headers the host expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLocation {
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl StreamLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
