// Session module - Session lifecycle, channel registry and error translation
pub mod registry;
pub mod session;
pub mod state;
pub mod translate;

pub use registry::{Channel, ChannelDirection, ChannelRegistry};
pub use session::{Session, StartOptions, TeardownReport};
pub use state::{SessionState, StateTracker};
pub use translate::{translate, CallSite, SessionError};
