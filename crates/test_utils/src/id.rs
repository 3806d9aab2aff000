//! Test utilities associated with ids.

use pinhold_api::BlobId;

/// Create a random blob id.
pub fn random_blob_id() -> BlobId {
    BlobId::from(format!(
        "blob{:016x}{:016x}",
        rand::random::<u64>(),
        rand::random::<u64>()
    ))
}

/// Create a list of distinct random blob ids.
pub fn create_blob_id_list(num_blobs: usize) -> Vec<BlobId> {
    let mut blobs = Vec::new();
    for _ in 0..num_blobs {
        blobs.push(random_blob_id());
    }
    blobs
}
