//! Binary payload container for resources

use serde::{Deserialize, Serialize};

/// A binary body together with its MD5 hash and size
///
/// Sync chunks carry only `body_hash` and `size` for resource payloads;
/// the body itself arrives with the full-data download. ENEX import fills
/// all three fields from the decoded base64 data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_hash: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
}

impl Data {
    /// Builds a `Data` from a raw body, computing hash and size
    pub fn from_body(body: Vec<u8>) -> Self {
        let digest = md5::compute(&body);
        Self {
            size: Some(body.len() as i32),
            body_hash: Some(digest.0.to_vec()),
            body: Some(body),
        }
    }
}
