//! Database conversion adapter
//!
//! Paired master/cross-reference database files are converted for the
//! destination operating system by an external utility (`crunchmf`). The
//! adapter reduces every outcome to a boolean: the caller skips the pair on
//! failure and moves on, it never aborts the run.

use std::process::Command;

use tracing::{debug, error};

/// Exit code the conversion utility uses for a failed run
const CONVERSION_FAILED: i32 = 1;

/// One-shot conversion of a database pair addressed by its path stem
pub trait Converter {
    /// Convert `<input_stem>.{mst,xrf}` into `<output_stem>.{mst,xrf}`.
    /// Returns `false` on any failure, including the tool being absent.
    fn convert(&self, input_stem: &str, output_stem: &str) -> bool;
}

/// Runs the external `crunchmf` utility
pub struct MasterConverter {
    tool_dir: Option<String>,
}

impl MasterConverter {
    /// `tool_dir` is the directory holding the conversion utilities; when
    /// `None` the tool is resolved from the ambient PATH.
    pub fn new(tool_dir: Option<String>) -> Self {
        Self { tool_dir }
    }

    fn command(&self) -> String {
        match &self.tool_dir {
            Some(dir) => format!("{}/crunchmf", crate::config::trim_path(dir)),
            None => "crunchmf".to_string(),
        }
    }
}

impl Converter for MasterConverter {
    fn convert(&self, input_stem: &str, output_stem: &str) -> bool {
        debug!("running database conversion for {}", input_stem);

        let command = self.command();
        debug!("running: {} {} {}", command, input_stem, output_stem);

        let status = match Command::new(&command)
            .arg(input_stem)
            .arg(output_stem)
            .status()
        {
            Ok(status) => status,
            Err(_) => {
                error!(
                    "error while running crunchmf, check if the command is available \
                     on the syspath or the tool directory was correctly configured"
                );
                return false;
            }
        };

        match status.code() {
            Some(0) => {
                debug!("conversion done for {}", input_stem);
                true
            }
            Some(CONVERSION_FAILED) => {
                error!("conversion did not work for {}", input_stem);
                false
            }
            _ => {
                error!("conversion ended abnormally for {}", input_stem);
                false
            }
        }
    }
}
