use std::error::Error;

use calculator::{ServerBuilder, cli::ServerArgs};
use clap::Parser;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = ServerArgs::parse();
    let mut server = ServerBuilder::default()
        .with_address(cli.address)
        .with_strategy(cli.strategy())
        .with_encoding(cli.encoding)
        .build()?;

    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || handle.shutdown())?;

    println!("Running the CalculatorService (Press CTRL-C to stop)...");
    let served = server.serve();
    server.stop();

    served?;
    Ok(())
}
