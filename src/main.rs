use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use ott_proxy::config::{CommandLineConf, Config};
use ott_proxy::{HostServices, Proxy};

#[cfg(unix)]
use tokio::signal::unix::{signal as unix_signal, SignalKind};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let args = CommandLineConf::parse();

    let config = Config::try_from(args)?;

    init_logging(config.verbose);

    info!(target: "ottproxy", "ott-proxy v{}", VERSION);
    debug!(target: "ottproxy", "{:?}", config);

    let mut proxy = Proxy::new(config.proxy_options(), HostServices::new(config.settings.clone()));
    proxy.start().context("Proxy cannot run without a listening port")?;

    if let Some(address) = proxy.proxy_address() {
        println!("{}", address);
    }

    let signal_name = wait_for_shutdown_signal()?;
    debug!(target: "ottproxy", "{} received, stopping proxy", signal_name);

    proxy.stop();

    Ok(())
}

fn init_logging(verbosity: log::LevelFilter) -> log::LevelFilter {
    fern::Dispatch::new().
        format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        }).
        // by default only accept warning messages from libraries so we don't spam
        level(log::LevelFilter::Warn).
        // but accept Info and Debug and Trace for our app.
        level_for("ottproxy", verbosity).
        chain(std::io::stdout()).
        apply().
            expect("Failed to configure logging.");

    verbosity
}

/// Blocks until SIGINT or SIGTERM (Ctrl+C on Windows).
fn wait_for_shutdown_signal() -> Result<&'static str> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    runtime.block_on(async {
        #[cfg(unix)]
        {
            let mut sigterm = unix_signal(SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;

            let signal_name = tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to wait for SIGINT")?;
                    "SIGINT"
                }
                _ = sigterm.recv() => "SIGTERM",
            };
            Ok::<_, anyhow::Error>(signal_name)
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to install Ctrl+C handler")?;
            Ok::<_, anyhow::Error>("Ctrl+C")
        }
    })
}
