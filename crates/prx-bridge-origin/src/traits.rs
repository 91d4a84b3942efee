use async_trait::async_trait;

use crate::error::OriginError;
use crate::types::{OriginReply, OriginRequest};

/// Delivers one raw call to the origin and returns whatever it answered.
///
/// Implementations report transport failures only; status and body
/// interpretation belongs to [`crate::BackendProxy`].
#[async_trait]
pub trait OriginTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, request: OriginRequest) -> Result<OriginReply, OriginError>;
}
