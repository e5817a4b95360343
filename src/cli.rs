//! CLI definitions for the lanbeacon command-line interface.

use std::net::Ipv4Addr;

use clap::{Parser, ValueEnum};

/// Announce a service on the local network via multicast UDP
#[derive(Parser)]
#[command(name = "lanbeacon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The port of the advertised service
    #[arg(short = 'p', long, default_value_t = 25565)]
    pub port: u16,

    /// The MOTD to display to discovering clients
    #[arg(short = 'm', long, default_value = "")]
    pub motd: String,

    /// Seconds between announcements
    #[arg(short = 'i', long, default_value_t = 5)]
    pub interval: u64,

    /// Local IPv4 address of the host network; auto-detected when omitted
    #[arg(short = 'a', long)]
    pub address: Option<Ipv4Addr>,

    /// Restrict address auto-detection to a single network interface
    #[arg(long, conflicts_with = "address")]
    pub interface: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, short = 'L', default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}
