// RttCom - RTT communication tool for debug-probe-attached targets
use anyhow::Context;
use clap::Parser;
use rttcom::cli::{execute_command, Args};
use rttcom::infrastructure::{config::ConfigManager, logging::init_logging};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new()?;
    let config = match &args.config {
        Some(config_path) => config_manager.load_config_from_path(config_path.as_ref())?,
        None => config_manager.load_config()?,
    };

    if !args.quiet {
        init_logging(&config.global.log_level, args.verbose)
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    }

    // driver calls block; they run on the blocking pool
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.global.worker_threads)
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(execute_command(args, &config_manager, config))?;
    Ok(())
}
