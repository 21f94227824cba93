//! # Session management
//!
//! Every run of an executable gets its own timestamped session directory
//! under the software root, holding the log file and anything else the run
//! produces. The moment the session is created becomes the session epoch,
//! the zero point for the elapsed-time values used by the logger and the
//! script interpreter.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Timestamp format used in session directory names, sortable and free of
/// characters that upset filesystems.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Paths of the current session.
#[derive(Clone)]
pub struct Session {
    /// Directory all of this session's outputs live under
    pub session_root: PathBuf,

    /// Where the logger writes this session's log
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while setting up a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (TARSUS_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("The session epoch is already set, was a second session created? ({0})")]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Begin a new session for the named executable.
    ///
    /// Creates `<sessions_dir>/<exec_name>_<timestamp>` under the software
    /// root and sets the session epoch. Only one session may exist per
    /// process.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let timestamp = SESSION_EPOCH
            .get()
            .ok_or(SessionError::CannotGetEpoch)?
            .format(TIMESTAMP_FORMAT);

        let mut session_root =
            crate::host::get_tarsus_sw_root().map_err(|_| SessionError::SwRootNotSet)?;
        session_root.push(sessions_dir);
        session_root.push(format!("{}_{}", exec_name, timestamp));

        fs::create_dir_all(&session_root).map_err(SessionError::CannotCreateDir)?;

        let mut log_file_path = session_root.clone();
        log_file_path.push(format!("{}.log", exec_name));

        Ok(Session {
            session_root,
            log_file_path,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds elapsed since the session epoch.
///
/// # Panics
/// - Panics if no [`Session`] has been created, since creating one is what
///   sets the epoch.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(epoch) => {
            let elapsed = Utc::now() - *epoch;
            time::duration_to_seconds(elapsed).unwrap_or(std::f64::NAN)
        }
        None => panic!("No session epoch, was a session created?"),
    }
}

/// The timestamp the running session started at.
///
/// # Panics
/// - Panics if no [`Session`] has been created, since creating one is what
///   sets the epoch.
pub fn get_epoch() -> &'static DateTime<Utc> {
    match SESSION_EPOCH.get() {
        Some(epoch) => epoch,
        None => panic!("No session epoch, was a session created?"),
    }
}
