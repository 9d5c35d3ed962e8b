use std::{error::Error, io};

use calculator::{CalculatorClient, cli::ClientArgs, cli::run_demo};
use clap::Parser;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = ClientArgs::parse();
    let mut client = CalculatorClient::builder()
        .with_address(cli.address)
        .with_encoding(cli.encoding)
        .build()?;

    run_demo(&mut client, io::stdout().lock())?;
    client.close();
    Ok(())
}
