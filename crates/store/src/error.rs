#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("collection {collection}: documents must be JSON objects")]
    NotAnObject { collection: String },

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),
}

impl From<StoreError> for sp_domain::Error {
    fn from(e: StoreError) -> Self {
        sp_domain::Error::Store(e.to_string())
    }
}
