//! CLI utilities for the calculator.
//!
//! The command line shapes shared by the `calculator_server` and `calculator_client`
//! binaries, and the scripted demonstration the client runs.
use std::{error::Error, io::Write, net::SocketAddr};

use clap::Parser;

use crate::protocol::{
    CalculatorClient, ClientError, DEFAULT_ADDRESS, ServerStrategy, WireEncoding,
};

/// Serve the calculator until interrupted.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct ServerArgs {
    /// Listen for new connections at address
    #[arg(long, default_value_t = DEFAULT_ADDRESS)]
    pub address: SocketAddr,
    /// Serve connections on a pool of this many workers instead of one at a time
    #[arg(long)]
    pub workers: Option<usize>,
    /// Wire encoding; clients must use the same one
    #[arg(long, value_enum, default_value_t = WireEncoding::Fixed)]
    pub encoding: WireEncoding,
}

impl ServerArgs {
    pub fn strategy(&self) -> ServerStrategy {
        match self.workers {
            Some(workers) => ServerStrategy::ThreadPool(workers),
            None => ServerStrategy::Simple,
        }
    }
}

/// Run the calculator demonstration against a server.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct ClientArgs {
    /// Address of the calculator server
    #[arg(long, default_value_t = DEFAULT_ADDRESS)]
    pub address: SocketAddr,
    /// Wire encoding; must match the server
    #[arg(long, value_enum, default_value_t = WireEncoding::Fixed)]
    pub encoding: WireEncoding,
}

/// Issues each operation once, printing the results to `writer`, and finishes with a
/// division by zero to show the error path.
pub fn run_demo<W: Write>(
    client: &mut CalculatorClient,
    mut writer: W,
) -> Result<(), Box<dyn Error>> {
    writeln!(writer, "1+2 = {}", client.add(1, 2)?)?;
    writeln!(writer, "2-1 = {}", client.subtract(2, 1)?)?;
    writeln!(writer, "2*3 = {}", client.multiply(2, 3)?)?;
    writeln!(writer, "4/2 = {}", client.divide(4, 2)?)?;

    match client.divide(4, 0) {
        Err(ClientError::DivisionByZero) => writeln!(writer, "Caught DivisionByZero")?,
        Ok(value) => return Err(format!("4/0 unexpectedly returned {value}").into()),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
