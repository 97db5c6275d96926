use serde::Deserialize;

/// Result of `photos.getWallUploadServer`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub upload_url: String,
}

/// Transient descriptor returned by the upload host; only valid until saved.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    pub server: i64,
    pub photo: String,
    pub hash: String,
}

impl UploadDescriptor {
    /// The upload host answers with an empty photo list when it rejects the file.
    pub fn is_rejected(&self) -> bool {
        let photo = self.photo.trim();
        photo.is_empty() || photo == "[]"
    }
}

/// Durable photo record returned by `photos.saveWallPhoto`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SavedPhoto {
    pub id: i64,
    pub owner_id: i64,
}

/// One entry of the postponed-posts listing.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: i64,
    #[serde(default)]
    pub date: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct PostListing {
    pub items: Vec<PostSummary>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CreatedPost {
    pub post_id: i64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorBody {
    pub error_code: i64,
    pub error_msg: String,
}
