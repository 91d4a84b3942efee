pub mod config;
pub mod error;
pub mod proxy;
pub mod traits;
pub mod transports;
pub mod types;

pub use config::*;
pub use error::OriginError;
pub use proxy::BackendProxy;
pub use traits::*;
pub use transports::HttpOriginTransport;
pub use types::*;
