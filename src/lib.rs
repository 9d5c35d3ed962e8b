pub mod cli;
pub mod handler;
pub mod protocol;

pub use handler::{Calculator, CalculatorHandler, DivisionByZero};
pub use protocol::{
    CalculatorClient, CalculatorServer, ClientBuilder, ClientError, ServerBuilder, ServerError,
    ServerStrategy,
};
