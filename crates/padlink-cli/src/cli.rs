//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use padlink_core::PadlinkConfig;
use tracing::warn;

use crate::inspect::{decode_payload, decrypt_packet, parse_hex, parse_key_material, InputError};
use crate::output::{OutputFormat, OutputFormatter};
use crate::simulate::{SimulateError, Simulation};
use crate::ExitCode;

/// padlink - secure pairing and telemetry tools for BLE pads
#[derive(Parser, Debug)]
#[command(name = "padlink")]
#[command(version, about = "padlink - secure pairing and telemetry tools for BLE pads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json or quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Protocol-level tracing (every packet and event)
    #[arg(
        long,
        global = true,
        env = "PADLINK_DEBUG",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "PADLINK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pair with simulated pads and stream their button events
    Simulate(SimulateArgs),
    /// Decrypt one captured packet with known key material
    Decrypt(DecryptArgs),
    /// Decode a button-status payload (without the opcode byte)
    Decode(DecodeArgs),
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of pads (1 or 2)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub pads: u8,

    /// Buttons to press and release on each pad
    #[arg(long, default_value_t = 6)]
    pub presses: usize,

    /// Handshake timeout override in milliseconds
    #[arg(long)]
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct DecryptArgs {
    /// 36 bytes of key material as hex (AES key followed by nonce prefix)
    #[arg(long)]
    pub key: String,

    /// Packet as hex: counter, ciphertext, tag
    #[arg(long)]
    pub packet: String,
}

#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Payload as hex
    #[arg(long)]
    pub payload: String,
}

impl Cli {
    /// CLI flags override config values.
    pub async fn execute_with_config(self, mut config: PadlinkConfig) -> anyhow::Result<ExitCode> {
        if self.debug {
            config.debug = true;
        }
        let output = OutputFormatter::new(self.output, self.verbose);

        match self.command {
            Commands::Simulate(args) => args.execute(&output, config).await,
            Commands::Decrypt(args) => Ok(args.execute(&output)),
            Commands::Decode(args) => Ok(args.execute(&output)),
        }
    }
}

impl SimulateArgs {
    pub async fn execute(self, output: &OutputFormatter, mut config: PadlinkConfig) -> anyhow::Result<ExitCode> {
        if let Some(ms) = self.handshake_timeout_ms {
            config.handshake_timeout_ms = ms;
        }
        if let Err(e) = config.validate() {
            print_line(&output.format_error(&e, ExitCode::InvalidInput, "simulate"));
            return Ok(ExitCode::InvalidInput);
        }

        output.progress(&format!("pairing {} simulated pad(s)", self.pads));
        let simulation = Simulation::new(config, usize::from(self.pads));

        let result = tokio::select! {
            result = simulation.run(self.presses, |event| {
                if let Some(line) = output.format_event(event) {
                    println!("{line}");
                }
            }) => Some(result),
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, disconnecting");
                None
            }
        };

        simulation.shutdown().await;

        match result {
            Some(Ok(summary)) => {
                print_line(&output.format_summary(&summary));
                Ok(ExitCode::Success)
            }
            Some(Err(e)) => {
                let code = match &e {
                    SimulateError::Manager(err) => ExitCode::for_manager_error(err),
                    SimulateError::EventsMissing { .. } => ExitCode::ConnectionFailed,
                };
                print_line(&output.format_error(&e, code, "simulate"));
                Ok(code)
            }
            None => Ok(ExitCode::GeneralError),
        }
    }
}

impl DecryptArgs {
    pub fn execute(self, output: &OutputFormatter) -> ExitCode {
        let report = parse_key_material(&self.key).and_then(|key| {
            let packet = parse_hex(&self.packet)?;
            decrypt_packet(&key, &packet)
        });

        match report {
            Ok(report) => {
                print_line(&output.format_decrypt(&report));
                if report.authentic {
                    ExitCode::Success
                } else {
                    ExitCode::AuthenticationFailed
                }
            }
            Err(e) => input_failure(output, &e, "decrypt"),
        }
    }
}

impl DecodeArgs {
    pub fn execute(self, output: &OutputFormatter) -> ExitCode {
        match parse_hex(&self.payload) {
            Ok(payload) => {
                print_line(&output.format_decode(&decode_payload(&payload)));
                ExitCode::Success
            }
            Err(e) => input_failure(output, &e, "decode"),
        }
    }
}

fn input_failure(output: &OutputFormatter, err: &InputError, command: &str) -> ExitCode {
    print_line(&output.format_error(err, ExitCode::InvalidInput, command));
    ExitCode::InvalidInput
}

fn print_line(text: &str) {
    if !text.is_empty() {
        println!("{text}");
    }
}
