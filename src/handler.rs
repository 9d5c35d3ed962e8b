//! Arithmetic handler.
//!
//! The [`Calculator`] trait is the service interface the server dispatches to. The
//! built-in [`CalculatorHandler`] holds no state and can be shared between any number
//! of connections without synchronization.
//!
//! All operations work on `i32` and wrap on overflow instead of panicking, so every
//! request a client can send has a well-defined answer. The only failure is dividing
//! by zero.
use thiserror::Error;

/// Raised when a division is requested with a divisor of zero.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("division by zero")]
pub struct DivisionByZero;

/// Operations offered by the calculator service.
pub trait Calculator: Send + Sync {
    fn add(&self, first: i32, second: i32) -> i32;

    fn subtract(&self, minuend: i32, subtrahend: i32) -> i32;

    fn multiply(&self, first: i32, second: i32) -> i32;

    /// Integer division truncating toward zero.
    fn divide(&self, dividend: i32, divisor: i32) -> Result<i32, DivisionByZero>;
}

/// Default stateless [`Calculator`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalculatorHandler;

impl Calculator for CalculatorHandler {
    fn add(&self, first: i32, second: i32) -> i32 {
        first.wrapping_add(second)
    }

    fn subtract(&self, minuend: i32, subtrahend: i32) -> i32 {
        minuend.wrapping_sub(subtrahend)
    }

    fn multiply(&self, first: i32, second: i32) -> i32 {
        first.wrapping_mul(second)
    }

    fn divide(&self, dividend: i32, divisor: i32) -> Result<i32, DivisionByZero> {
        if divisor == 0 {
            return Err(DivisionByZero);
        }
        // i32::MIN / -1 is the only overflowing case; it wraps to i32::MIN.
        Ok(dividend.wrapping_div(divisor))
    }
}
