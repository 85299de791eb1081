// Stream module - Continuous reading of up channels
pub mod reader;
pub mod throughput;

pub use reader::ChannelReader;
pub use throughput::ThroughputMeter;
