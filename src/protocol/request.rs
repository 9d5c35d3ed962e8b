use bincode::{Decode, Encode};

use crate::handler::Calculator;

use super::Response;

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum Request {
    Add { first: i32, second: i32 },
    Subtract { minuend: i32, subtrahend: i32 },
    Multiply { first: i32, second: i32 },
    Divide { dividend: i32, divisor: i32 },
    CloseConnection,
}

impl Request {
    /// Runs the requested operation against `handler`.
    ///
    /// `CloseConnection` never reaches the handler and is acknowledged directly.
    pub fn evaluate(self, handler: &dyn Calculator) -> Response {
        match self {
            Request::Add { first, second } => Response::Value(handler.add(first, second)),
            Request::Subtract {
                minuend,
                subtrahend,
            } => Response::Value(handler.subtract(minuend, subtrahend)),
            Request::Multiply { first, second } => {
                Response::Value(handler.multiply(first, second))
            }
            Request::Divide { dividend, divisor } => match handler.divide(dividend, divisor) {
                Ok(value) => Response::Value(value),
                Err(_) => Response::DivisionByZero,
            },
            Request::CloseConnection => Response::ConnectionClosed,
        }
    }
}
