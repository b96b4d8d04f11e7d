//! Runs one measurement on a B1500A and prints the series as CSV on stdout
//!
//! Subcommands:
//! - `identify`: print the instrument identification string
//! - `sweep`: bidirectional staircase sweep at the switching compliance
//! - `sample`: constant-bias current sampling, optionally as a forming run at the forming compliance

use std::path::PathBuf;

use anyhow::{ bail, Context, Result };
use arcs_smu::{
    B1500a, SweepSpec, SampleSpec, Volt, Second,
    config::{ SmuConfig, ConnectionKind },
};
use clap::{ Parser, Subcommand };
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use tokio_serial::SerialPortBuilderExt;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt, EnvFilter };

#[derive(Parser, Debug)]
#[command(name = "smu-measure")]
#[command(about = "Run a sweep or sampling measurement on a B1500A source-measure unit")]
#[command(version)]
struct Args
{
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command
{
    /// Print the instrument identification string
    Identify,

    /// Bidirectional staircase sweep, start to +end then start to -end
    Sweep
    {
        /// Turning point of the positive pass in volts
        #[arg(short, long, allow_negative_numbers = true)]
        end: f64,

        /// Start voltage of both passes in volts
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        start: f64,

        /// Steps per pass
        #[arg(short, long, default_value = "101")]
        points: u32,

        /// Sweep rate in volts per second
        #[arg(short, long, default_value = "0.2")]
        ramp_rate: f64,
    },

    /// Current sampling at constant bias
    Sample
    {
        /// Bias voltage in volts
        #[arg(short, long, allow_negative_numbers = true)]
        bias: f64,

        /// Interval between samples in seconds
        #[arg(short, long, default_value = "0.05")]
        timestep: f64,

        /// Number of samples
        #[arg(short, long, default_value = "200")]
        points: u32,

        /// Stop on compliance and use the forming compliance limit
        #[arg(long)]
        forming: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()>
{
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arcs_smu=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SmuConfig::load(path)?,
        None => SmuConfig::default(),
    };
    let line_ending = config.connection.line_ending()?;

    match config.connection.kind {
        ConnectionKind::Serial => {
            tracing::info!("Opening {} at {} baud", config.connection.path, config.connection.baud_rate);
            let stream = tokio_serial::new(&config.connection.path, config.connection.baud_rate)
                .open_native_async()
                .with_context(|| format!("Failed to open serial port {}", config.connection.path))?;
            run(B1500a::with_line_ending(line_ending, stream), &config, args.command).await
        },
        ConnectionKind::Tcp => {
            tracing::info!("Connecting to {}", config.connection.address);
            let stream = tokio::net::TcpStream::connect(&config.connection.address)
                .await
                .with_context(|| format!("Failed to connect to {}", config.connection.address))?;
            run(B1500a::with_line_ending(line_ending, stream), &config, args.command).await
        },
    }
}

async fn run<T>(mut smu: B1500a<T>, config: &SmuConfig, command: Command) -> Result<()>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    let id = smu.identify().await?;
    tracing::info!("Connected to {}", id);

    if let Command::Identify = command {
        println!("{}", id);
        return Ok(());
    }

    if !id.contains("B1500") {
        bail!("Expected a B1500 family instrument, found {:?}", id);
    }

    smu.assign_channels(&config.channels.assignments).await?;

    let stdout = std::io::stdout();

    match command {
        Command::Identify => Ok(()),
        Command::Sweep { end, start, points, ramp_rate } => {
            let channels = config.switching_channels();
            let spec = SweepSpec::new()
                .start(Volt::from_f64_base(start))
                .end(Volt::from_f64_base(end))
                .points(points)
                .ramp_rate(ramp_rate)
                .compliance(channels.compliance);

            let data = smu.run_sweep(&channels, &spec).await?;
            data.write_csv(stdout.lock())?;
            Ok(())
        },
        Command::Sample { bias, timestep, points, forming } => {
            let channels = if forming { config.forming_channels() } else { config.switching_channels() };
            let spec = SampleSpec::new()
                .bias(Volt::from_f64_base(bias))
                .timestep(Second::from_f64_base(timestep))
                .points(points)
                .compliance(channels.compliance);

            let data = if forming {
                smu.run_forming(&channels, &spec).await?
            }
            else {
                smu.run_sample(&channels, &spec).await?
            };

            if data.compliance_abort {
                tracing::warn!("Forming stopped on compliance after {} samples", data.len());
            }

            data.write_csv(stdout.lock())?;
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests
{
    use super::{ Args, Command };
    use clap::Parser;

    #[test]
    fn negative_sweep_voltages()
    {
        let args = Args::try_parse_from(["smu-measure", "sweep", "--end", "-1.0", "--start", "-0.5"]).unwrap();
        match args.command {
            Command::Sweep { end, start, points, .. } => {
                assert_eq!(end, -1.0);
                assert_eq!(start, -0.5);
                assert_eq!(points, 101);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn negative_sample_bias()
    {
        let args = Args::try_parse_from(["smu-measure", "sample", "-b", "-0.5", "--forming"]).unwrap();
        match args.command {
            Command::Sample { bias, forming, .. } => {
                assert_eq!(bias, -0.5);
                assert!(forming);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }
}
