//! Client side: a [`Source`](crate::model::Source) speaking the resource protocol.

pub mod source;
pub mod transport;

pub use source::RemoteSource;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, RouterTransport, Transport};
