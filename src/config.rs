use anyhow::{Context, Result};
use std::{fs, path::PathBuf, time};

use clap::{ArgAction, Parser};
use serde::Deserialize;

use crate::host::{HostSettings, DEFAULT_PLATFORM_ID};
use crate::proxy::{ProxyOptions, DEFAULT_PORT, DEFAULT_STREAM_TIMEOUT, HOST};

/// Loopback proxy fixing DASH manifests and signing DRM license requests for a media player.
#[derive(Parser, Debug, Default)]
#[clap(author, version, about, long_about = None)]
pub struct CommandLineConf {
    /// TOML config file.
    #[clap(short, long, value_name = "/path/to/config.toml", conflicts_with_all(&["port", "platform_id", "delete_ec3_audio", "delete_mp4a_audio", "fix_languages", "no_system_proxy", "stream_timeout"]))]
    pub config: Option<PathBuf>,

    /// Preferred port on 127.0.0.1. An ephemeral port is used if it cannot be bound.
    #[clap(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Platform identifier selecting the upstream user agent.
    #[clap(long, value_name = "ID")]
    pub platform_id: Option<String>,

    /// Remove ec-3 (Dolby Digital Plus) audio tracks from manifests.
    #[clap(long)]
    pub delete_ec3_audio: bool,

    /// Remove mp4a (AAC) audio tracks from manifests.
    #[clap(long)]
    pub delete_mp4a_audio: bool,

    /// Normalise track language codes in manifests.
    #[clap(long)]
    pub fix_languages: bool,

    /// Ignore HTTP(S)_PROXY environment variables for upstream requests.
    #[clap(long)]
    pub no_system_proxy: bool,

    /// Read/write timeout for player connections, in seconds.
    #[clap(long, value_name = "SECONDS")]
    pub stream_timeout: Option<u64>,

    /// Verbosity level. The more v, the more verbose.
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Deserialize, Default)]
struct RawConfig {
    port: Option<u16>,
    platform_id: Option<String>,
    delete_ec3_audio: Option<bool>,
    delete_mp4a_audio: Option<bool>,
    fix_languages: Option<bool>,
    system_proxy: Option<bool>,
    stream_timeout: Option<u64>,
    verbose: Option<u8>,
}

#[derive(Debug)]
pub struct Config {
    pub preferred_port: u16,
    pub settings: HostSettings,
    pub system_proxy: bool,
    pub stream_timeout: time::Duration,
    pub verbose: log::LevelFilter,
}

impl Config {
    pub fn proxy_options(&self) -> ProxyOptions {
        ProxyOptions {
            host: HOST,
            preferred_port: self.preferred_port,
            system_proxy: self.system_proxy,
            stream_timeout: self.stream_timeout,
        }
    }
}

impl TryFrom<CommandLineConf> for Config {
    type Error = anyhow::Error;

    fn try_from(conf: CommandLineConf) -> std::result::Result<Self, Self::Error> {
        get_config(conf)
    }
}

fn get_config(args: CommandLineConf) -> Result<Config> {
    let config_as_file = args
        .config
        .map(|file| fs::read_to_string(file).context("Could not open/read config file."))
        .transpose()?;

    let raw = match config_as_file {
        Some(config_file) => toml::from_str(&config_file).context("failed to parse config file.")?,
        None => RawConfig {
            port: args.port,
            platform_id: args.platform_id,
            delete_ec3_audio: Some(args.delete_ec3_audio),
            delete_mp4a_audio: Some(args.delete_mp4a_audio),
            fix_languages: Some(args.fix_languages),
            system_proxy: Some(!args.no_system_proxy),
            stream_timeout: args.stream_timeout,
            verbose: Some(args.verbose),
        },
    };

    Ok(resolve(raw))
}

fn resolve(raw: RawConfig) -> Config {
    let verbose = raw.verbose.map_or(log::LevelFilter::Warn, |v| match v {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    });

    let settings = HostSettings {
        delete_ec3_audio: raw.delete_ec3_audio.unwrap_or(false),
        delete_mp4a_audio: raw.delete_mp4a_audio.unwrap_or(false),
        fix_languages: raw.fix_languages.unwrap_or(false),
        platform_id: raw
            .platform_id
            .unwrap_or_else(|| DEFAULT_PLATFORM_ID.to_string())
            .to_lowercase(),
    };

    let stream_timeout = raw
        .stream_timeout
        .map(time::Duration::from_secs)
        .unwrap_or(DEFAULT_STREAM_TIMEOUT);

    Config {
        preferred_port: raw.port.unwrap_or(DEFAULT_PORT),
        settings,
        system_proxy: raw.system_proxy.unwrap_or(true),
        stream_timeout,
        verbose,
    }
}
