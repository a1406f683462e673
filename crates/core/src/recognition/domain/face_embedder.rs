use crate::recognition::domain::face_embedding::FaceEmbedding;

/// Domain interface for turning a head crop into an embedding.
///
/// `Send + Sync` because the video worker and the directory monitor share
/// one instance behind an `Arc`.
pub trait FaceEmbedder: Send + Sync {
    fn embed(
        &self,
        rgb_data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<FaceEmbedding, Box<dyn std::error::Error>>;
}
