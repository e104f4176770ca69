//! Process exit codes.
//!
//! Values follow `<sysexits.h>` where one fits. Scripts driving
//! `hahmon-edit` can tell these apart:
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | success                                                   |
//! | 1    | nothing changed: duplicate key, unknown key, store exists |
//! | 64   | bad invocation                                            |
//! | 65   | several records share a key that must be unique           |
//! | 70   | internal error                                            |
//! | 74   | the store could not be opened, read or written            |
//! | 78   | bad configuration                                         |

use std::process::Termination;

/// Exit status of `hahmon-edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// The command did what was asked.
    Success = 0,

    /// The command was valid but the store was left as it was.
    Status = 1,

    /// The command line was malformed. (`EX_USAGE`)
    Usage = 64,

    /// The stored data violates key uniqueness. (`EX_DATAERR`)
    DataError = 65,

    /// An internal error, such as failing to encode output. (`EX_SOFTWARE`)
    Software = 70,

    /// The store or standard output failed. (`EX_IOERR`)
    IoError = 74,

    /// The configuration file or environment is invalid. (`EX_CONFIG`)
    ConfigError = 78,
}

impl ExitCode {
    /// Returns the integer value of the exit code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Allows `ExitCode` to be returned from `main`.
impl Termination for ExitCode {
    fn report(self) -> std::process::ExitCode {
        self.code().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_sysexits_values() {
        let codes = [
            ExitCode::Success,
            ExitCode::Status,
            ExitCode::Usage,
            ExitCode::DataError,
            ExitCode::Software,
            ExitCode::IoError,
            ExitCode::ConfigError,
        ]
        .map(ExitCode::code);
        assert_eq!(codes, [0, 1, 64, 65, 70, 74, 78]);
    }
}
