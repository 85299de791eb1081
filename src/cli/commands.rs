use crate::cli::args::{
    Args, Command, ConfigCommand, DataFormat, MonitorArgs, ProbeArgs, ReadArgs, WriteArgs,
};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::dispatch::RttClient;
use crate::core::session::{Channel, Session, StartOptions};
use crate::core::stream::{ChannelReader, ThroughputMeter};
use crate::domain::config::{ProbeProfile, RttComConfig};
use crate::domain::error::{RttComError, RttComResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::simulated::SimulatedBackend;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Execute CLI command
pub async fn execute_command(
    args: Args,
    config_manager: &ConfigManager,
    config: RttComConfig,
) -> RttComResult<()> {
    let writer = ConsoleWriter::new(args.output).quiet(args.quiet);

    match args.command {
        Command::Channels(probe) => execute_channels(probe, &writer, &config).await,
        Command::Read(read_args) => execute_read(read_args, &writer, &config).await,
        Command::Write(write_args) => execute_write(write_args, &writer, &config).await,
        Command::Monitor(monitor_args) => execute_monitor(monitor_args, &writer, &config).await,
        Command::Config(config_args) => {
            execute_config_command(config_args.command, &writer, &config, config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("rttcom {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

/// Session bound to one probe for the duration of a command
struct ProbeSession<'a> {
    client: RttClient,
    profile: Option<&'a ProbeProfile>,
    down: Vec<Channel>,
    up: Vec<Channel>,
}

impl<'a> ProbeSession<'a> {
    async fn open(probe: &ProbeArgs, config: &'a RttComConfig) -> RttComResult<ProbeSession<'a>> {
        let (serial_number, profile) = resolve_probe(probe, config)?;
        let backend = SimulatedBackend::from_config(&config.simulator);
        let mut client = RttClient::new(Session::new(Box::new(backend), config.discovery));

        let options = StartOptions {
            reset_on_start: !probe.no_reset,
            max_polls: probe.max_polls,
            poll_interval_us: probe.poll_interval_us,
        };
        info!("Connecting to probe {}", serial_number);
        let (down, up) = client.start(serial_number, &options).await?;

        Ok(ProbeSession {
            client,
            profile,
            down,
            up,
        })
    }

    fn up_channel(&self, explicit: Option<u32>) -> u32 {
        explicit
            .or(self.profile.map(|p| p.up_channel))
            .unwrap_or(0)
    }

    fn down_channel(&self, explicit: Option<u32>) -> u32 {
        explicit
            .or(self.profile.map(|p| p.down_channel))
            .unwrap_or(0)
    }

    async fn close(mut self) -> RttComResult<()> {
        self.client.stop().await?;
        self.client.close().await
    }
}

fn resolve_probe<'a>(
    probe: &ProbeArgs,
    config: &'a RttComConfig,
) -> RttComResult<(u32, Option<&'a ProbeProfile>)> {
    if let Some(serial_number) = probe.serial {
        return Ok((serial_number, None));
    }

    let profile = match &probe.profile {
        Some(name) => config
            .find_profile(name)
            .ok_or_else(|| RttComError::InvalidInput(format!("Unknown probe profile '{}'", name)))?,
        None => match config.probes.as_slice() {
            [only] => only,
            _ => {
                return Err(RttComError::InvalidInput(
                    "Select a probe with --serial or --profile".to_string(),
                ))
            }
        },
    };
    debug!("Using probe profile '{}'", profile.name);
    Ok((profile.serial_number, Some(profile)))
}

async fn execute_channels(
    probe: ProbeArgs,
    writer: &ConsoleWriter,
    config: &RttComConfig,
) -> RttComResult<()> {
    let session = ProbeSession::open(&probe, config).await?;
    let channels: Vec<Channel> = session.down.iter().chain(&session.up).cloned().collect();
    writer.write_channels(&channels)?;
    session.close().await
}

async fn execute_read(
    args: ReadArgs,
    writer: &ConsoleWriter,
    config: &RttComConfig,
) -> RttComResult<()> {
    let mut session = ProbeSession::open(&args.probe, config).await?;
    let channel = session.up_channel(args.channel);
    let max = args.max.unwrap_or(config.global.read_chunk_size);

    let data = session.client.read(channel, max).await?;
    writer.write_data(channel, &data, args.format)?;
    session.close().await
}

async fn execute_write(
    args: WriteArgs,
    writer: &ConsoleWriter,
    config: &RttComConfig,
) -> RttComResult<()> {
    let data = parse_data(&args.data, args.format)?;
    let mut session = ProbeSession::open(&args.probe, config).await?;
    let channel = session.down_channel(args.channel);

    let written = session.client.write(channel, &data).await?;
    writer.write_message(&format!(
        "Wrote {} of {} bytes to down channel {}",
        written,
        data.len(),
        channel
    ))?;
    session.close().await
}

async fn execute_monitor(
    args: MonitorArgs,
    writer: &ConsoleWriter,
    config: &RttComConfig,
) -> RttComResult<()> {
    let mut session = ProbeSession::open(&args.probe, config).await?;
    let channel = session.up_channel(args.channel);
    let mut reader = ChannelReader::new(
        channel,
        config.global.read_chunk_size,
        Duration::from_millis(config.global.poll_interval_ms),
    );

    writer.write_message(&format!(
        "Monitoring up channel {} (Press Ctrl+C to stop)",
        channel
    ))?;
    monitor_until(
        &mut session.client,
        &mut reader,
        writer,
        &args,
        tokio::signal::ctrl_c(),
    )
    .await?;

    info!("Monitor received {} bytes", reader.total_bytes());
    session.close().await
}

/// Print chunks from `reader` until the deadline passes or `stop` resolves
///
/// `stop` is polled across the whole run, so a signal that arrives while a
/// chunk is being printed still ends the loop.
async fn monitor_until<S: Future>(
    client: &mut RttClient,
    reader: &mut ChannelReader,
    writer: &ConsoleWriter,
    args: &MonitorArgs,
    stop: S,
) -> RttComResult<()> {
    let started = Instant::now();
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));
    let mut meter = ThroughputMeter::new(Duration::from_secs(1), started);
    // wake up regularly to honour the deadline and report throughput
    let slice = Duration::from_millis(200);
    tokio::pin!(stop);

    loop {
        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                slice.min(deadline - now)
            }
            None => slice,
        };

        tokio::select! {
            biased;
            _ = &mut stop => break,
            chunk = reader.next_chunk_timeout(client, wait) => {
                if let Some(chunk) = chunk? {
                    meter.record(chunk.len());
                    writer.write_data(reader.channel_index(), &chunk, args.format)?;
                }
            }
        }

        if let Some(rate) = meter.tick(Instant::now()) {
            if args.throughput {
                writer.write_message(&format!("{:.0} bytes/s", rate))?;
            }
        }
    }
    Ok(())
}

fn execute_config_command(
    command: ConfigCommand,
    writer: &ConsoleWriter,
    config: &RttComConfig,
    config_manager: &ConfigManager,
) -> RttComResult<()> {
    match command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            if global {
                let global_path = config_manager.get_global_config_path_ref();
                config_manager.save_config_to_path(global_path, &RttComConfig::default())?;
                writer.write_message(&format!("Global configuration initialized at '{}'", global_path.display()))?;
            } else {
                let dir: PathBuf = match dir {
                    Some(dir) => dir.into(),
                    None => std::env::current_dir()?,
                };
                let path = config_manager.init_project_config(&dir)?;
                writer.write_message(&format!("Project configuration initialized at '{}'", path.display()))?;
            }
            Ok(())
        }
        ConfigCommand::Path => {
            writer.write_message(&format!(
                "global: {}",
                config_manager.get_global_config_path_ref().display()
            ))?;
            match config_manager.get_project_config_path() {
                Some(path) => writer.write_message(&format!("project: {}", path.display()))?,
                None => writer.write_message("project: none")?,
            }
            Ok(())
        }
    }
}

fn parse_data(data: &str, format: DataFormat) -> RttComResult<Vec<u8>> {
    match format {
        DataFormat::Text => Ok(data.as_bytes().to_vec()),
        DataFormat::Hex => {
            let cleaned = data.replace(' ', "").replace('\n', "");
            hex::decode(&cleaned)
                .map_err(|e| RttComError::InvalidInput(format!("Invalid hex data: {}", e)))
        }
        DataFormat::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.decode(data)
                .map_err(|e| RttComError::InvalidInput(format!("Invalid base64 data: {}", e)))
        }
    }
}
