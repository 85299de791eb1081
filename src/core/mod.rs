// Core module - Driver seam, session and task dispatch
pub mod dispatch;
pub mod driver;
pub mod session;
pub mod stream;
