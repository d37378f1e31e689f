//! Core Infrastructure
//!
//! HTTP transport shared by every API call.

pub mod transport;

pub use transport::{
    create_mock_transport, create_transport, HttpMethod, HttpRequest, HttpResponse,
    HttpTransport, MockHttpTransport, ReqwestHttpTransport, DEFAULT_MAX_RESPONSE_SIZE,
};
