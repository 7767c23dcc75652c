pub mod client;
pub mod error;
pub mod retry;
pub mod session;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, HealthReport};
pub use error::{error_detail, ApiError};
pub use retry::{Backoff, RetryPolicy};
pub use session::{SessionManager, SessionPhase};
pub use status::{ClientStatus, StatusBoard};
pub use transport::{
    ApiRequest, ApiResponse, BodyStream, FilePart, HttpTransport, Method, RequestBody, Transport,
};
