use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum Response {
    Value(i32),
    DivisionByZero,
    ConnectionClosed,
}
