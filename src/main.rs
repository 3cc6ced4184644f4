use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clamd_client::{
    clamd::{ClamdClient, ClamdClientImpl, ClamdConnection, ScanResult, ScanVerdict},
    config::Config,
    error::{Error, Result},
};

const EXIT_CLEAN: u8 = 0;
const EXIT_FOUND: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[derive(Debug)]
pub struct Args {
    config_path: Option<PathBuf>,
    connection: Option<ClamdConnection>,
    log_level: Option<String>,
    connect_timeout_ms: Option<u64>,
    base_timeout_ms: Option<u64>,
    scan_timeout_ms: Option<u64>,
    action: Action,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Ping,
    Version,
    Commands,
    Reload,
    Shutdown,
    Scan(Vec<String>),
}

pub async fn build_client(args: &Args, config: Option<&Config>) -> Result<ClamdClientImpl> {
    let mut client = match (&args.connection, config) {
        (Some(connection), Some(config)) => ClamdClientImpl::from_connection(connection)
            .await?
            .with_timeouts(config.timeouts)
            .with_read_failure_policy(config.upload.on_read_error),
        (Some(connection), None) => ClamdClientImpl::from_connection(connection).await?,
        (None, Some(config)) => ClamdClientImpl::from_config(config).await?,
        (None, None) => {
            return Err(Error::Config(
                "No clamd endpoint given; use --socket, --host or a config file".to_string(),
            ))
        }
    };

    if let Some(ms) = args.connect_timeout_ms {
        client.set_connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.base_timeout_ms {
        client.set_base_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.scan_timeout_ms {
        client.set_scan_timeout(Duration::from_millis(ms));
    }

    Ok(client)
}

pub async fn load_config_from_args(args: &Args) -> Result<Option<Config>> {
    if let Some(config_path) = &args.config_path {
        return Config::load(config_path).await.map(Some);
    }
    if args.connection.is_some() {
        return Ok(None);
    }
    Config::load_from_default_locations().await.map(Some)
}

/// Runs one action and returns the process exit status.
pub async fn run_action(client: &dyn ClamdClient, action: &Action) -> Result<u8> {
    match action {
        Action::Ping => {
            client.ping().await?;
            println!("PONG");
        }
        Action::Version => println!("{}", client.version().await?),
        Action::Commands => {
            let info = client.version_commands().await?;
            println!("{}", info.version);
            for command in &info.commands {
                println!("  {}", command);
            }
        }
        Action::Reload => {
            client.reload().await?;
            println!("RELOADING");
        }
        Action::Shutdown => {
            client.shutdown().await?;
            println!("Shutdown requested");
        }
        Action::Scan(targets) => return scan_targets(client, targets).await,
    }
    Ok(EXIT_CLEAN)
}

async fn scan_targets(client: &dyn ClamdClient, targets: &[String]) -> Result<u8> {
    let mut verdicts = Vec::with_capacity(targets.len());

    for target in targets {
        let source: Box<dyn AsyncRead + Unpin + Send> = if target == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(target).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Cannot open {}: {}", target, e),
                ))
            })?;
            Box::new(file)
        };

        let result = client.scan_stream(source).await?;
        println!("{}", render_result(target, &result));
        verdicts.push(result.verdict());
    }

    Ok(exit_status(&verdicts))
}

fn render_result(target: &str, result: &ScanResult) -> String {
    serde_json::json!({ "target": target, "result": result }).to_string()
}

/// A detection outranks a scan error, as in clamdscan.
fn exit_status(verdicts: &[ScanVerdict]) -> u8 {
    if verdicts.contains(&ScanVerdict::Found) {
        EXIT_FOUND
    } else if verdicts.contains(&ScanVerdict::Error) {
        EXIT_ERROR
    } else {
        EXIT_CLEAN
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = parse_args(cli().get_matches());

    match run(args).await {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            eprintln!("clamd-client: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(args: Args) -> Result<u8> {
    let config = load_config_from_args(&args).await?;

    let log_level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&log_level)?;

    let client = build_client(&args, config.as_ref()).await?;
    info!("Using clamd at {}", client.endpoint());

    run_action(&client, &args.action).await
}

fn cli() -> Command {
    Command::new("clamd-client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Talk to a clamd daemon: liveness, version, reload, shutdown and stream scans")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .num_args(1),
        )
        .arg(
            Arg::new("socket")
                .short('s')
                .long("socket")
                .value_name("PATH")
                .help("clamd Unix domain socket")
                .conflicts_with("host")
                .num_args(1),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("clamd TCP host")
                .num_args(1),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("clamd TCP port")
                .default_value("3310")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .num_args(1),
        )
        .arg(timeout_arg("connect-timeout", "Connect timeout in milliseconds"))
        .arg(timeout_arg("base-timeout", "Command timeout in milliseconds"))
        .arg(timeout_arg("scan-timeout", "Scan reply timeout in milliseconds"))
        .subcommand(Command::new("ping").about("Check that clamd answers PING"))
        .subcommand(Command::new("version").about("Print the clamd version"))
        .subcommand(Command::new("commands").about("Print the version and supported commands"))
        .subcommand(Command::new("reload").about("Reload the signature database"))
        .subcommand(Command::new("shutdown").about("Ask clamd to shut down"))
        .subcommand(
            Command::new("scan")
                .about("Scan files through INSTREAM ('-' reads stdin)")
                .arg(
                    Arg::new("files")
                        .value_name("FILE")
                        .required(true)
                        .num_args(1..)
                        .action(ArgAction::Append),
                ),
        )
}

fn timeout_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("MS")
        .help(help)
        .value_parser(clap::value_parser!(u64))
        .num_args(1)
}

fn parse_args(matches: ArgMatches) -> Args {
    let connection = if let Some(path) = matches.get_one::<String>("socket") {
        Some(ClamdConnection::Unix { path: path.clone() })
    } else {
        matches
            .get_one::<String>("host")
            .map(|host| ClamdConnection::Tcp {
                host: host.clone(),
                port: matches.get_one::<u16>("port").copied().unwrap_or(3310),
            })
    };

    let action = match matches.subcommand() {
        Some(("version", _)) => Action::Version,
        Some(("commands", _)) => Action::Commands,
        Some(("reload", _)) => Action::Reload,
        Some(("shutdown", _)) => Action::Shutdown,
        Some(("scan", sub)) => Action::Scan(
            sub.get_many::<String>("files")
                .map(|files| files.cloned().collect())
                .unwrap_or_default(),
        ),
        _ => Action::Ping,
    };

    Args {
        config_path: matches.get_one::<String>("config").map(PathBuf::from),
        connection,
        log_level: matches.get_one::<String>("log-level").cloned(),
        connect_timeout_ms: matches.get_one::<u64>("connect-timeout").copied(),
        base_timeout_ms: matches.get_one::<u64>("base-timeout").copied(),
        scan_timeout_ms: matches.get_one::<u64>("scan-timeout").copied(),
        action,
    }
}

fn parse_level(log_level: &str) -> Result<Level> {
    match log_level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(Error::Config(format!("Invalid log level: {}", log_level))),
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let level = parse_level(log_level)?;

    let directive = format!("clamd_client={}", level)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;
    let env_filter = EnvFilter::from_default_env().add_directive(directive);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    Ok(())
}
