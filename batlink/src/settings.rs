//! Test plan configuration uploaded to the device.

use crate::error::{Error, Result};

/// Parameters for one battery test plan.
///
/// A device stores four plan slots; [`TestConfig::plan_index`] selects
/// which slot an upload targets. Values are validated host-side before
/// any serial I/O so an out-of-range plan never reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestConfig {
    /// Target plan slot, 1 through 4.
    pub plan_index: u8,
    /// Discharge current in milliamps, 0 through 500.
    pub current_ma: u16,
    /// Sampling interval in minutes, 0 through 1000.
    pub sample_rate_min: u16,
    /// Test duration in hours, 0 through 1000.
    pub duration_hours: u16,
    /// Lower temperature limit in degrees Celsius, -40 through 85.
    pub min_temp_c: i16,
    /// Upper temperature limit in degrees Celsius, -40 through 85.
    pub max_temp_c: i16,
}

impl TestConfig {
    /// Check every field against its device-supported range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.plan_index) {
            return Err(Error::InvalidConfig(format!(
                "plan index {} out of range 1-4",
                self.plan_index
            )));
        }
        if self.current_ma > 500 {
            return Err(Error::InvalidConfig(format!(
                "current {} mA out of range 0-500",
                self.current_ma
            )));
        }
        if self.sample_rate_min > 1000 {
            return Err(Error::InvalidConfig(format!(
                "sample rate {} min out of range 0-1000",
                self.sample_rate_min
            )));
        }
        if self.duration_hours > 1000 {
            return Err(Error::InvalidConfig(format!(
                "duration {} h out of range 0-1000",
                self.duration_hours
            )));
        }
        for (label, temp) in [("min temp", self.min_temp_c), ("max temp", self.max_temp_c)] {
            if !(-40..=85).contains(&temp) {
                return Err(Error::InvalidConfig(format!(
                    "{label} {temp} C out of range -40 to 85"
                )));
            }
        }
        if self.min_temp_c >= self.max_temp_c {
            return Err(Error::InvalidConfig(format!(
                "min temp {} C must be below max temp {} C",
                self.min_temp_c, self.max_temp_c
            )));
        }
        Ok(())
    }

    /// Render the CSV body the device firmware parses.
    ///
    /// The format is fixed: a header line, a newline, one value line,
    /// and no trailing newline.
    #[must_use]
    pub fn csv_body(&self) -> String {
        format!(
            "current,sample rate,duration,min temp,max temp\n{},{},{},{},{}",
            self.current_ma,
            self.sample_rate_min,
            self.duration_hours,
            self.min_temp_c,
            self.max_temp_c
        )
    }

    /// Filename the device expects for this plan slot.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("setting_{}.csv", self.plan_index)
    }
}
