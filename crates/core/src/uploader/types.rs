use serde::{Deserialize, Serialize};

/// Where a finished track should end up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub save_to_collection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
}

impl UploadTarget {
    /// The collection to add the track to, if any.
    pub fn collection(&self) -> Option<i64> {
        if self.save_to_collection {
            self.collection_id
        } else {
            None
        }
    }
}

/// What the destination did with a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub track_id: String,
    pub md5: String,
    /// False when the destination already held identical content.
    pub transferred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
}
