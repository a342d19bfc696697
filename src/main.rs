use std::{path::PathBuf, str::FromStr};

use argp::FromArgs;
use supports_color::Stream;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub mod cmd;
pub mod meta;
pub mod symbols;
pub mod util;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(()),
        })
    }
}

fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    LogLevel::from_str(value).map_err(|_| format!("Invalid log level '{value}'"))
}

#[derive(FromArgs, Debug)]
/// Replaces placeholder symbol names in listings, decompiled sources and stack dumps.
struct TopLevel {
    #[argp(positional)]
    /// path to script.json
    script: PathBuf,
    #[argp(positional)]
    /// path to stringliteral.json
    string_literals: PathBuf,
    #[argp(positional)]
    /// .lst, .c or .txt file, or a directory containing them
    target: PathBuf,
    #[argp(option, short = 'o')]
    /// output path (single file targets only)
    output: Option<PathBuf>,
    #[argp(option, short = 'q')]
    /// print all symbols for an address or function name
    query: Vec<String>,
    #[argp(option, short = 'L', from_str_fn(parse_log_level))]
    /// minimum logging level (error, warn, info, debug, trace)
    log_level: Option<LogLevel>,
    #[argp(switch)]
    /// disable color output
    no_color: bool,
}

fn main() {
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);

    let use_colors = !args.no_color
        && supports_color::on(Stream::Stderr).is_some()
        && enable_ansi_support::enable_ansi_support().is_ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(use_colors)
        .with_target(false)
        .without_time();
    if let Some(level) = args.log_level {
        builder
            .with_max_level(match level {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            })
            .init();
    } else {
        builder
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    }

    let result = cmd::compile::run(cmd::compile::ProcessOptions {
        script: args.script,
        string_literals: args.string_literals,
        target: args.target,
        output: args.output,
        queries: args.query,
    });
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}
