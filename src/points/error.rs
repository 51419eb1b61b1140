/// Error types for points/ledger operations.
///
/// These rarely reach the HTTP edge: points handlers translate every failure
/// into a 200 response with `success:false` so the UI flow never breaks.
#[derive(Debug, thiserror::Error)]
pub enum PointsError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("No member identity key supplied")]
    NoIdentity,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<sqlx::Error> for PointsError {
    fn from(err: sqlx::Error) -> Self {
        PointsError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for PointsError {
    fn from(err: serde_json::Error) -> Self {
        PointsError::InvalidPayload(err.to_string())
    }
}
