use thiserror::Error;

#[derive(Error, Debug)]
pub enum EsiError {
    #[error("transport error talking to ESI: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("ESI returned permission denied (403)")]
    PermissionDenied,

    #[error("ESI returned an error status: {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to decode an ESI response body: {0}")]
    Decode(#[from] reqwest::Error),

    #[error("OAuth token exchange failed: {0}")]
    Auth(String),
}
