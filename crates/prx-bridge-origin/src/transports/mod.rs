pub mod http;

pub use http::HttpOriginTransport;
