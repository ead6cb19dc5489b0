//! Push channel: protocol, dispatch, and session binding

pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod session;

pub use dispatcher::Dispatcher;
pub use protocol::{Command, DrawInstruction, MessageKind, OutboundFrame};
pub use registry::{ChannelHandle, ChannelKey, ChannelRegistry};
pub use session::{cookie_value, session_correlation_id, AttachRequest, SessionTracking};
