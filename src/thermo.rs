//! Thermodynamic telemetry rows.
//!
//! Rows go out as `tracing` events on the `md_drive::thermo` target so they
//! can be filtered or silenced independently of the rest of the log.

use std::fmt;
use tracing::info;

pub const HEADER: &str =
    "      Step        Temp      PotEng      KinEng      TotEng       Press         Pxx         Pyy         Pzz      Volume";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermoRow {
    pub step: u64,
    pub temperature: f64,
    pub potential: f64,
    pub kinetic: f64,
    /// Diagonal of the pressure tensor.
    pub pressure: [f64; 3],
    pub volume: f64,
}

impl ThermoRow {
    pub fn total_energy(&self) -> f64 {
        self.potential + self.kinetic
    }

    /// Scalar pressure, the mean of the diagonal.
    pub fn mean_pressure(&self) -> f64 {
        (self.pressure[0] + self.pressure[1] + self.pressure[2]) / 3.0
    }
}

impl fmt::Display for ThermoRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10} {:>11.5} {:>11.5} {:>11.5} {:>11.5} {:>11.5} {:>11.5} {:>11.5} {:>11.5} {:>11.4}",
            self.step,
            self.temperature,
            self.potential,
            self.kinetic,
            self.total_energy(),
            self.mean_pressure(),
            self.pressure[0],
            self.pressure[1],
            self.pressure[2],
            self.volume
        )
    }
}

/// Emits the header once, then one event per row.
#[derive(Debug, Default)]
pub struct ThermoLog {
    header_written: bool,
    rows: u64,
}

impl ThermoLog {
    pub fn emit(&mut self, row: &ThermoRow) {
        if !self.header_written {
            info!(target: "md_drive::thermo", "{}", HEADER);
            self.header_written = true;
        }
        info!(target: "md_drive::thermo", "{}", row);
        self.rows += 1;
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_columns_line_up_with_header() {
        let row = ThermoRow {
            step: 1000,
            temperature: 0.5,
            potential: -1.25,
            kinetic: 0.75,
            pressure: [1.0, 2.0, 3.0],
            volume: 1000.0,
        };
        let line = row.to_string();
        assert_eq!(line.len(), HEADER.len());
        let columns: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(columns[0], "1000");
        assert_eq!(columns[4], "-0.50000");
        assert_eq!(columns[5], "2.00000");
    }

    #[test]
    fn log_counts_rows() {
        let mut log = ThermoLog::default();
        let row = ThermoRow {
            step: 0,
            temperature: 0.0,
            potential: 0.0,
            kinetic: 0.0,
            pressure: [0.0; 3],
            volume: 1.0,
        };
        log.emit(&row);
        log.emit(&row);
        assert_eq!(log.rows(), 2);
    }
}
