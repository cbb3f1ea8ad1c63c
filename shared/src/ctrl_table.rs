//! Controller parameter table.
//!
//! Holds the tunable gains and test-mode stepping parameters. Loads are
//! staged: incoming JSON is applied over a copy of the live values so a
//! partial file only changes the fields it names. The very first load must
//! supply every field; until then the table stays unloaded.
//!
//! Table file format:
//! ```json
//! {
//!    "survey-fan-pwm": 1200,
//!    "pos-gain": 1.0,
//!    "rate-gain": 0.5,
//!    "test-steps": 4,
//!    "test-time-in-step": 2
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

/// Name written into table dumps.
pub const CTRL_TABLE_NAME: &str = "Table Sat Control";

/// Number of fields a complete table file carries.
pub const CTRL_TABLE_FIELD_COUNT: usize = 5;

/// Errors from table load and dump.
#[derive(Error, Debug)]
pub enum TableError {
    /// Reading or writing the table file failed.
    #[error("Table IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The table text is not valid JSON for the table fields.
    #[error("Table JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A load that must be complete named too few fields.
    #[error("Table has never been loaded and new table only contains {loaded} of {expected} data objects")]
    Incomplete { loaded: usize, expected: usize },
}

/// Live parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CtrlTableData {
    /// Fan B PWM used to spin the table during survey
    pub survey_fan_pwm: u16,
    pub pos_gain: f64,
    pub rate_gain: f64,
    /// Number of PWM levels in the test-mode staircase
    pub test_steps: u16,
    /// Seconds spent on each test-mode level
    pub test_time_in_step: u16,
}

/// Staging form of a table file; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct CtrlTableLoad {
    survey_fan_pwm: Option<u16>,
    pos_gain: Option<f64>,
    rate_gain: Option<f64>,
    test_steps: Option<u16>,
    test_time_in_step: Option<u16>,
}

impl CtrlTableLoad {
    /// Apply present fields over `data`, returning how many were present.
    fn apply(self, data: &mut CtrlTableData) -> usize {
        fn set<T>(field: &mut T, value: Option<T>) -> usize {
            match value {
                Some(v) => {
                    *field = v;
                    1
                }
                None => 0,
            }
        }

        set(&mut data.survey_fan_pwm, self.survey_fan_pwm)
            + set(&mut data.pos_gain, self.pos_gain)
            + set(&mut data.rate_gain, self.rate_gain)
            + set(&mut data.test_steps, self.test_steps)
            + set(&mut data.test_time_in_step, self.test_time_in_step)
    }
}

/// Outcome of the most recent load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    #[default]
    Undefined,
    Valid,
    Invalid,
}

#[derive(Serialize)]
struct CtrlTableDump<'a> {
    #[serde(rename = "app-name")]
    app_name: &'a str,
    #[serde(rename = "tbl-name")]
    tbl_name: &'a str,
    description: String,
    #[serde(flatten)]
    data: &'a CtrlTableData,
}

/// Controller parameter table with load bookkeeping.
#[derive(Debug, Clone)]
pub struct CtrlTable {
    app_name: String,
    data: CtrlTableData,
    loaded: bool,
    last_load_status: LoadStatus,
    last_load_count: usize,
}

impl CtrlTable {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            data: CtrlTableData::default(),
            loaded: false,
            last_load_status: LoadStatus::Undefined,
            last_load_count: 0,
        }
    }

    pub fn data(&self) -> &CtrlTableData {
        &self.data
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn last_load_status(&self) -> LoadStatus {
        self.last_load_status
    }

    pub fn last_load_count(&self) -> usize {
        self.last_load_count
    }

    /// Load table values from JSON text.
    ///
    /// Returns the number of fields applied. On error the live values are
    /// untouched.
    pub fn load(&mut self, json: &str) -> Result<usize, TableError> {
        let result = self.stage(json);
        match &result {
            Ok(count) => {
                self.loaded = true;
                self.last_load_status = LoadStatus::Valid;
                debug!("Successfully loaded {count} JSON objects");
            }
            Err(e) => {
                self.last_load_status = LoadStatus::Invalid;
                error!("Table load rejected: {e}");
            }
        }
        result
    }

    fn stage(&mut self, json: &str) -> Result<usize, TableError> {
        let incoming: CtrlTableLoad = serde_json::from_str(json)?;

        let mut staged = self.data;
        let count = incoming.apply(&mut staged);

        if !self.loaded && count != CTRL_TABLE_FIELD_COUNT {
            return Err(TableError::Incomplete {
                loaded: count,
                expected: CTRL_TABLE_FIELD_COUNT,
            });
        }

        self.data = staged;
        self.last_load_count = count;
        Ok(count)
    }

    /// Load table values from a JSON file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, TableError> {
        let json = fs::read_to_string(path).map_err(|e| {
            self.last_load_status = LoadStatus::Invalid;
            error!("Error reading table file '{}': {e}", path.display());
            e
        })?;
        self.load(&json)
    }

    /// Write the live values as JSON, with an identifying header.
    pub fn dump<W: Write>(&self, mut writer: W) -> Result<(), TableError> {
        let dump = CtrlTableDump {
            app_name: &self.app_name,
            tbl_name: CTRL_TABLE_NAME,
            description: format!(
                "Table dumped at {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
            ),
            data: &self.data,
        };
        serde_json::to_writer_pretty(&mut writer, &dump)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Dump the table to a file, replacing any existing file.
    pub fn dump_file(&self, path: &Path) -> Result<(), TableError> {
        let result = fs::File::create(path)
            .map_err(TableError::from)
            .and_then(|file| self.dump(std::io::BufWriter::new(file)));

        match &result {
            Ok(()) => debug!("Successfully created dump file {}", path.display()),
            Err(e) => error!("Error creating dump file '{}': {e}", path.display()),
        }
        result
    }

    /// Replace both gains directly, bypassing the load path.
    pub fn set_gains(&mut self, pos_gain: f64, rate_gain: f64) {
        info!(
            "Position gain changed from {} to {}; rate gain changed from {} to {}",
            self.data.pos_gain, pos_gain, self.data.rate_gain, rate_gain
        );
        self.data.pos_gain = pos_gain;
        self.data.rate_gain = rate_gain;
    }

    /// Clear the load status bookkeeping (not the loaded flag).
    pub fn reset_status(&mut self) {
        self.last_load_status = LoadStatus::Undefined;
        self.last_load_count = 0;
    }
}
