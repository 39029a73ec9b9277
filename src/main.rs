use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::{info, warn};
use std::process;

use osprobe::{
    config::FingerprintConfig,
    network::socket::ensure_privileged,
    output::{OutputConfig, OutputFormat, OutputManager},
    FingerprintDatabase, OsDetectionEngine, RawProbeTransport,
};

fn build_cli() -> Command {
    Command::new("osprobe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Active TCP/IP stack fingerprinting against a signature database")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("IPv4 address of the host to fingerprint")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("TCP port to probe (should be open)")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("FILE")
                .help("Signature database file"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Per-probe reply timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("delay")
                .long("delay")
                .value_name("MS")
                .help("Delay before each probe is sent, in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("source-port")
                .long("source-port")
                .value_name("PORT")
                .help("Use specific source port for probes")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("top")
                .short('n')
                .long("top")
                .value_name("COUNT")
                .help("Number of ranked matches to report")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Output format (text, json)")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Write output to file"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Load configuration from TOML file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
}

/// File config (explicit or `~/.osprobe.toml`) with command line overrides on top
fn resolve_config(matches: &ArgMatches) -> anyhow::Result<FingerprintConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => FingerprintConfig::from_toml_file(path)
            .with_context(|| format!("loading config file {}", path))?,
        None => FingerprintConfig::load_default_config(),
    };

    if let Some(target) = matches.get_one::<String>("target") {
        config.target = target.clone();
    }
    if let Some(&port) = matches.get_one::<u16>("port") {
        config = config.with_port(port);
    }
    if let Some(database) = matches.get_one::<String>("database") {
        config = config.with_database(database);
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config = config.with_timeout(timeout);
    }
    if let Some(&delay) = matches.get_one::<u64>("delay") {
        config = config.with_send_delay(delay);
    }
    if let Some(&port) = matches.get_one::<u16>("source-port") {
        config = config.with_source_port(port);
    }
    if let Some(&top) = matches.get_one::<usize>("top") {
        config = config.with_top_matches(top);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if matches.get_flag("no-color") {
        colored::control::set_override(false);
    }

    let config = match resolve_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "[!] Error:".bright_red(), e);
            process::exit(1);
        }
    };

    if let Err(e) = ensure_privileged() {
        eprintln!("{} {} (run with sudo)", "[!] Error:".bright_red(), e);
        process::exit(1);
    }

    let database = match FingerprintDatabase::load(&config.database) {
        Ok(db) => db,
        Err(e) => {
            warn!(
                "Could not load signature database {}: {}; continuing with behavioral analysis only",
                config.database.display(),
                e
            );
            FingerprintDatabase::default()
        }
    };

    let target = config.target_ip()?;
    let transport = RawProbeTransport::from_config(&config).context("preparing probe transport")?;
    info!(
        "Fingerprinting {}:{} from {}",
        target,
        config.port,
        transport.source_ip()
    );

    let engine = OsDetectionEngine::new(transport, database).with_top_matches(config.top_matches);
    let report = engine.run().await;

    let format = matches
        .get_one::<String>("output-format")
        .map(|s| s.parse::<OutputFormat>())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or(OutputFormat::Text);
    let output = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<String>("output-file").cloned(),
        colored: !matches.get_flag("no-color"),
    });
    output
        .write_report(target, config.port, &report)
        .context("writing report")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let matches = build_cli().get_matches_from([
            "osprobe", "10.1.2.3", "-p", "22", "--timeout", "800", "--delay", "10", "-n", "5",
        ]);
        let config = resolve_config(&matches).unwrap();
        assert_eq!(config.target, "10.1.2.3");
        assert_eq!(config.port, 22);
        assert_eq!(config.probe_timeout_ms, 800);
        assert_eq!(config.send_delay_ms, 10);
        assert_eq!(config.top_matches, 5);
    }

    #[test]
    fn test_cli_rejects_invalid_target() {
        let matches = build_cli().get_matches_from(["osprobe", "not-an-ip"]);
        assert!(resolve_config(&matches).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }
}
