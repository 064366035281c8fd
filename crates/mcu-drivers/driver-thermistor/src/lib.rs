//! A `no_std` library for converting NTC thermistor ADC readings to temperature.
//!
//! Provides two common conversion methods:
//! 1.  **Lookup Table:** Uses linear interpolation between points in a pre-defined table.
//! 2.  **Polynomial:** Calculates temperature using polynomial coefficients (e.g., from Steinhart-Hart).
//!
//! ## Features
//! - `fixed`: Enables conversions using fixed-point numbers via the `fixed` crate.
//! - `std`: Required for running host-based tests.

#![no_std]

use num_traits::{float::Float, identities::One};

/// Defines the conversion strategy for the thermistor.
pub enum ConversionMode<'a, T> {
    /// A table of (ADC reading, Temperature) pairs. Must be sorted by ADC reading.
    Table(&'a [(u16, T)]),
    /// Polynomial coefficients in ascending order (c0, c1, c2, ...).
    Polynomial(&'a [T]),
}

/// Represents an NTC thermistor.
pub struct NtcThermistor<'a, T: Copy> {
    mode: ConversionMode<'a, T>,
}

impl<'a, T: Float + One + Copy> NtcThermistor<'a, T> {
    /// Creates a new thermistor instance with the given conversion mode.
    pub fn new(mode: ConversionMode<'a, T>) -> Self {
        Self { mode }
    }

    /// Converts an ADC reading to a temperature value.
    ///
    /// Returns `None` if the ADC reading is out of the bounds of a lookup table.
    pub fn temperature(&self, adc_reading: u16) -> Option<T> {
        match self.mode {
            ConversionMode::Table(table) => self.temp_from_table(adc_reading, table),
            ConversionMode::Polynomial(coeffs) => self.temp_from_poly(adc_reading, coeffs),
        }
    }

    /// Calculates temperature from a lookup table using linear interpolation.
    fn temp_from_table(&self, adc_reading: u16, table: &[(u16, T)]) -> Option<T> {
        if table.is_empty() {
            return None;
        }

        // Find the position in the table.
        let pos = table.binary_search_by_key(&adc_reading, |(adc, _)| *adc);

        match pos {
            // Exact match
            Ok(index) => Some(table[index].1),
            // No exact match, need to interpolate
            Err(index) => {
                if index == 0 || index >= table.len() {
                    // Out of bounds
                    None
                } else {
                    // Interpolate between (index-1) and (index)
                    let (adc1, temp1) = table[index - 1];
                    let (adc2, temp2) = table[index];

                    let adc1_t = T::from(adc1).unwrap();
                    let adc2_t = T::from(adc2).unwrap();
                    let reading_t = T::from(adc_reading).unwrap();

                    let t = (reading_t - adc1_t) / (adc2_t - adc1_t);
                    let temp = temp1 + t * (temp2 - temp1);
                    Some(temp)
                }
            }
        }
    }

    /// Calculates temperature from polynomial coefficients.
    fn temp_from_poly(&self, adc_reading: u16, coeffs: &[T]) -> Option<T> {
        let x = T::from(adc_reading).unwrap();
        let mut temp = T::zero();
        let mut x_pow = T::one();

        for &coeff in coeffs {
            temp = temp + coeff * x_pow;
            x_pow = x_pow * x;
        }
        Some(temp)
    }
}
