//! HTTP request/response plumbing
//!
//! - [`envelope`]: single-use request descriptions and query encoding
//! - [`response`]: classification of raw responses into [`AuthError`](crate::error::AuthError) kinds
//! - [`transport`]: the wire seam and its `reqwest` implementation

pub mod envelope;
pub mod response;
pub mod transport;

pub use envelope::{
    build_query_string, HttpMethod, HttpRequest, RequestEnvelope, DEFAULT_MAX_RETRY_COUNT,
    OAUTH_TOKEN_PARAM,
};
pub use response::{classify_body, is_successful, ResponseEnvelope};
pub use transport::{
    send_cancellable, HttpTransport, RawResponse, ReqwestTransport, ReqwestTransportBuilder,
};
