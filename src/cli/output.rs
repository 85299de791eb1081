use crate::cli::args::{DataFormat, OutputFormat};
use crate::core::session::registry::Channel;
use crate::domain::config::RttComConfig;
use base64::Engine;
use serde_json;
use std::io::{self, Write};
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_channels(&self, channels: &[Channel]) -> Result<(), OutputError>;
    fn write_data(&self, channel_index: u32, data: &[u8], format: DataFormat) -> Result<(), OutputError>;
    fn write_config(&self, config: &RttComConfig) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::RttComError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Render bytes in the requested data format
pub fn encode_data(data: &[u8], format: DataFormat) -> String {
    match format {
        DataFormat::Text => String::from_utf8_lossy(data).into_owned(),
        DataFormat::Hex => hex::encode(data),
        DataFormat::Base64 => base64::engine::general_purpose::STANDARD.encode(data),
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
    quiet: bool,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quiet: false,
        }
    }

    /// Suppress informational messages; data and errors are still written
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_channels(&self, channels: &[Channel]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for channel in channels {
                    println!(
                        "{} {}: {} ({} bytes)",
                        channel.direction, channel.index, channel.name, channel.buffer_size
                    );
                }
            }
            OutputFormat::Json => {
                let output = serde_json::to_string_pretty(channels)?;
                println!("{}", output);
            }
            OutputFormat::Table => {
                if !channels.is_empty() {
                    let table_data: Vec<ChannelTableRow> = channels.iter().map(ChannelTableRow::from).collect();
                    let table = Table::new(table_data);
                    println!("{}", table);
                }
            }
            OutputFormat::Csv => {
                println!("direction,index,name,buffer_size");
                for channel in channels {
                    println!("{},{},{},{}",
                        channel.direction,
                        channel.index,
                        channel.name,
                        channel.buffer_size
                    );
                }
            }
        }
        Ok(())
    }

    fn write_data(&self, channel_index: u32, data: &[u8], format: DataFormat) -> Result<(), OutputError> {
        let encoded = encode_data(data, format);
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "channel": channel_index,
                    "bytes": data.len(),
                    "format": format.to_string(),
                    "data": encoded,
                });
                println!("{}", serde_json::to_string(&output)?);
            }
            OutputFormat::Csv => {
                println!("{},{},{}", channel_index, data.len(), encoded);
            }
            _ => {
                let mut stdout = io::stdout().lock();
                match format {
                    // raw text is streamed as is
                    DataFormat::Text => write!(stdout, "{}", encoded)?,
                    _ => writeln!(stdout, "{}", encoded)?,
                }
                stdout.flush()?;
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &RttComConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("RttCom Configuration:");
                println!("  Log level: {}", config.global.log_level);
                println!("  Worker threads: {}", config.global.worker_threads);
                println!("  Read chunk size: {}", config.global.read_chunk_size);
                println!("  Poll interval: {}ms", config.global.poll_interval_ms);
                println!("  Discovery: {} polls, {}us apart",
                    config.discovery.max_polls,
                    config.discovery.poll_interval_us
                );

                if !config.probes.is_empty() {
                    println!("  Probes:");
                    for probe in &config.probes {
                        let desc = if probe.description.is_empty() { "No description" } else { &probe.description };
                        println!("    {} ({}): {}", probe.name, probe.serial_number, desc);
                    }
                }
            }
            OutputFormat::Json => {
                let output = serde_json::to_string_pretty(config)?;
                println!("{}", output);
            }
            OutputFormat::Table => {
                if !config.probes.is_empty() {
                    let table_data: Vec<ProbeTableRow> = config.probes.iter().map(ProbeTableRow::from).collect();
                    let table = Table::new(table_data);
                    println!("{}", table);
                }
            }
            OutputFormat::Csv => {
                println!("name,serial_number,up_channel,down_channel,description");
                for probe in &config.probes {
                    println!("{},{},{},{},{}",
                        probe.name,
                        probe.serial_number,
                        probe.up_channel,
                        probe.down_channel,
                        probe.description
                    );
                }
            }
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        if self.quiet {
            return Ok(());
        }
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

/// Table row for a discovered channel
#[derive(Tabled)]
struct ChannelTableRow {
    direction: String,
    index: u32,
    name: String,
    buffer: u32,
}

impl From<&Channel> for ChannelTableRow {
    fn from(channel: &Channel) -> Self {
        Self {
            direction: channel.direction.to_string(),
            index: channel.index,
            name: channel.name.clone(),
            buffer: channel.buffer_size,
        }
    }
}

/// Table row for a probe profile
#[derive(Tabled)]
struct ProbeTableRow {
    name: String,
    serial: u32,
    up: u32,
    down: u32,
    description: String,
}

impl From<&crate::domain::config::ProbeProfile> for ProbeTableRow {
    fn from(probe: &crate::domain::config::ProbeProfile) -> Self {
        Self {
            name: probe.name.clone(),
            serial: probe.serial_number,
            up: probe.up_channel,
            down: probe.down_channel,
            description: probe.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::registry::ChannelDirection;

    #[test]
    fn test_encode_data() {
        assert_eq!(encode_data(b"hi", DataFormat::Text), "hi");
        assert_eq!(encode_data(&[0xde, 0xad], DataFormat::Hex), "dead");
        assert_eq!(encode_data(b"hi", DataFormat::Base64), "aGk=");
    }

    #[test]
    fn test_channel_table_row() {
        let channel = Channel::new(1, ChannelDirection::Up, "Log", 256);
        let row = ChannelTableRow::from(&channel);
        assert_eq!(row.direction, "up");
        assert_eq!(row.buffer, 256);
        let table = Table::new(vec![row]).to_string();
        assert!(table.contains("Log"));
    }
}
