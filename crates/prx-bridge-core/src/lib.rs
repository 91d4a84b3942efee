pub mod profile;
pub mod protocol;
pub mod translate;

pub use profile::ClientProfile;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use translate::{reshape_result, translate_request, ToolShape, Translation};
