//! SensorLink batch runner
//!
//! Sends every sample of a CSV file to the inference board and writes the
//! predictions to a results CSV.
//!
//! Usage:
//!   sensorlink [OPTIONS] --input SAMPLES.csv
//!
//! Options:
//!   --port PORT         Serial port or tcp://host:port
//!   --baud RATE         Baud rate (default: 115200)
//!   --config FILE       JSON config; flags override its values
//!   --input FILE        Samples CSV
//!   --output FILE       Results CSV (default: predictions_results.csv)
//!   --deadline-ms MS    Time allowed for each reply (default: 3000)
//!   --json              Also print each result as a JSON line on stdout
//!   --list-ports        List serial ports and exit
//!   --demo              Talk to a simulated device instead of hardware
//!
//! Logging follows RUST_LOG (default: info).

use anyhow::{bail, Context, Result};
use sensorlink_core::batch::{read_samples, run_batch, write_results};
use sensorlink_core::config::RunnerConfig;
use sensorlink_core::demo::SimulatedDevice;
use sensorlink_core::protocol::{list_ports, Session, SessionConfig};
use sensorlink_core::VERSION;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    port: Option<String>,
    baud: Option<u32>,
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    deadline_ms: Option<u64>,
    json: bool,
    list_ports: bool,
    demo: bool,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> Result<String> {
            i += 1;
            args.get(i)
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };
        match flag {
            "--port" | "-p" => parsed.port = Some(value()?),
            "--baud" | "-b" => {
                let v = value()?;
                parsed.baud = Some(v.parse().with_context(|| format!("bad baud rate '{}'", v))?);
            }
            "--config" | "-c" => parsed.config = Some(value()?.into()),
            "--input" | "-i" => parsed.input = Some(value()?.into()),
            "--output" | "-o" => parsed.output = Some(value()?.into()),
            "--deadline-ms" | "-t" => {
                let v = value()?;
                parsed.deadline_ms = Some(v.parse().with_context(|| format!("bad deadline '{}'", v))?);
            }
            "--json" => parsed.json = true,
            "--list-ports" | "-l" => parsed.list_ports = true,
            "--demo" => parsed.demo = true,
            "--help" | "-h" => parsed.help = true,
            other => bail!("unknown argument '{}' (try --help)", other),
        }
        i += 1;
    }

    Ok(parsed)
}

fn print_help() {
    println!("SensorLink batch runner v{}", VERSION);
    println!();
    println!("Usage: sensorlink [OPTIONS] --input SAMPLES.csv");
    println!();
    println!("Options:");
    println!("  -p, --port PORT         Serial port or tcp://host:port");
    println!("  -b, --baud RATE         Baud rate (default: 115200)");
    println!("  -c, --config FILE       JSON config; flags override its values");
    println!("  -i, --input FILE        Samples CSV");
    println!("  -o, --output FILE       Results CSV (default: predictions_results.csv)");
    println!("  -t, --deadline-ms MS    Time allowed for each reply (default: 3000)");
    println!("      --json              Also print each result as a JSON line");
    println!("  -l, --list-ports        List serial ports and exit");
    println!("      --demo              Use a simulated device");
    println!("  -h, --help              Show this help");
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    println!("Available ports:");
    for port in ports {
        println!("  {}", port.description());
    }
}

/// Config file first, then flags on top
fn build_config(args: &Args) -> Result<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunnerConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(input) = &args.input {
        config.input_path = Some(input.clone());
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if let Some(deadline) = args.deadline_ms {
        config.response_deadline_ms = deadline;
    }
    config.validate()?;
    Ok(config)
}

fn open_session(config: &RunnerConfig, demo: bool) -> Result<Session> {
    if demo {
        let session_config = SessionConfig {
            address: "demo".to_string(),
            settle_delay: Duration::ZERO,
            banner_wait: Duration::ZERO,
            ..config.session_config()
        };
        return Ok(Session::attach(Box::new(SimulatedDevice::new()), &session_config)?);
    }

    if config.port.is_empty() {
        print_ports();
        bail!("no port given (use --port or a config file)");
    }

    tracing::info!("Connecting to {}...", config.port);
    match Session::open(&config.session_config()) {
        Ok(session) => Ok(session),
        Err(e) => {
            eprintln!("Error opening {}: {}", config.port, e);
            if e.is_connection_error() {
                print_ports();
            }
            Err(e).with_context(|| format!("connecting to {}", config.port))
        }
    }
}

fn run(args: Args) -> Result<()> {
    if args.help {
        print_help();
        return Ok(());
    }
    if args.list_ports {
        print_ports();
        return Ok(());
    }

    let config = build_config(&args)?;
    let input = config
        .input_path
        .clone()
        .context("no input file given (use --input or input_path in the config)")?;

    let samples =
        read_samples(&input).with_context(|| format!("reading samples from {}", input.display()))?;
    tracing::info!("Loaded {} samples from {}", samples.len(), input.display());

    let mut session = open_session(&config, args.demo)?;
    tracing::info!("Connected to {}", session.address());

    let json = args.json;
    let results = run_batch(&mut session, &samples, &config.batch_options(), |row| {
        if json {
            match serde_json::to_string(row) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode result {}: {}", row.sample_id, e),
            }
        }
    });

    let (tx, rx, _, _) = session.get_counters();
    tracing::debug!("Transferred {} bytes out, {} bytes in", tx, rx);
    session.close();

    write_results(&config.output_path, &results)
        .with_context(|| format!("writing results to {}", config.output_path.display()))?;

    let succeeded = results.iter().filter(|r| r.success).count();
    println!(
        "Results saved to {} ({}/{} samples succeeded)",
        config.output_path.display(),
        succeeded,
        results.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    run(parse_args(&args)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sensorlink")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&[
            "--port",
            "/dev/ttyACM0",
            "-b",
            "9600",
            "--input",
            "samples.csv",
            "--deadline-ms",
            "1500",
            "--json",
        ]))
        .unwrap();
        assert_eq!(parsed.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(parsed.baud, Some(9600));
        assert_eq!(parsed.input, Some(PathBuf::from("samples.csv")));
        assert_eq!(parsed.deadline_ms, Some(1500));
        assert!(parsed.json);
        assert!(!parsed.demo);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--port"])).is_err());
        assert!(parse_args(&args(&["--baud", "fast"])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let parsed = parse_args(&args(&["-p", "tcp://127.0.0.1:7000", "-t", "250"])).unwrap();
        let config = build_config(&parsed).unwrap();
        assert_eq!(config.port, "tcp://127.0.0.1:7000");
        assert_eq!(config.response_deadline_ms, 250);
        assert_eq!(config.baud_rate, 115200);
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let parsed = parse_args(&args(&["-t", "0"])).unwrap();
        assert!(build_config(&parsed).is_err());
    }
}
