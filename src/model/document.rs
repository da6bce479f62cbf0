use serde::Serialize;

/// A searchable unit produced by a [`Mapper`](crate::map::Mapper).
///
/// The pipeline is generic over the document type; it only needs the key and
/// the JSON form used for batch sizing and upload.
pub trait IndexDocument: Serialize + Send + Sync + 'static {
    fn key(&self) -> &str;
}
