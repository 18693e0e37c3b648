use serde::Deserialize;

use crate::api::ApiError;

/// The `{ success, data }` wrapper most backend endpoints respond with.
///
/// The pipeline does not enforce this shape; callers opt in by decoding
/// into it.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap `data`, turning `success: false` into an error.
    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::InvalidResponse(
                self.message
                    .unwrap_or_else(|| "request reported failure".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::InvalidResponse("response has no data field".to_string()))
    }
}
