//! A `no_std` driver for Trinamic stepper motor drivers.
//!
//! This crate provides a hardware-agnostic interface to configure and control
//! TMC stepper drivers, primarily targeting the TMC2209 over UART. It is built
//! upon the `embedded-hal` traits and can be tested with `embedded-hal-mock`.
//!
//! ## Features
//! - `tmc2209`: Enables implementation for the TMC2209 driver.
//! - `tmc2208`: Enables implementation for the TMC2208 driver.
//! - `std`: Required for running host-based tests.

#![no_std]

#[cfg(feature = "tmc2209")]
pub mod tmc2209;

#[cfg(feature = "tmc2208")]
pub mod tmc2208;

/// Represents errors that can occur while interacting with a TMC driver.
#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// An error occurred during serial communication (UART/SPI).
    Serial(E),
    /// The CRC checksum in a received message was invalid.
    InvalidCrc,
    /// The operation is not supported by the driver variant.
    NotSupported,
}
