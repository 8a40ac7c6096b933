#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("write failed, nothing committed: {0}")]
    Write(String),

    /// A batch write failed after some records landed. `committed` lists the
    /// chunk ids that are durably stored so the caller can roll them back.
    #[error("write failed after committing {} record(s): {reason}", committed.len())]
    PartialWrite {
        committed: Vec<String>,
        reason: String,
    },

    #[error("search failed: {0}")]
    Search(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
