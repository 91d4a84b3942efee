pub mod config;
pub mod heartbeat;
pub mod race;
pub mod registry;
pub mod server;
pub mod session;
pub mod stream;

pub use config::BridgeConfig;
pub use registry::SessionRegistry;
pub use server::BridgeServer;
pub use session::{
    SessionActor, SessionError, SessionHeaders, SessionKey, SessionSettings, SubmitOutcome,
};
pub use stream::{Connection, Frame, FrameStream, StreamError};
