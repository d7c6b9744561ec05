//! Host control interface: command grammar and dispatch.
//!
//! The UART shell feeds complete lines into [`parse_line`] and executes the
//! resulting [`Command`] with [`dispatch`]. Replies are process-style: a
//! text body plus an integer exit code, `0` on success and negative error
//! families otherwise (`-6` for usage errors; the rest come from
//! [`CaptureError::exit_code`]).

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use heapless::String;
use platform::profile::CaptureMode;
use platform::sample_source::SampleSource;
use storage::store::RecordingStore;

use crate::error::CaptureError;
use crate::queue::CaptureQueue;
use crate::recorder::{CaptureState, Recorder};

/// Exit code for malformed input.
pub const EXIT_USAGE: i32 = -6;

/// Reply buffer capacity. Status is the largest reply.
pub const REPLY_CAP: usize = 192;

/// A parsed shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `start` — begin a capture session.
    Start,
    /// `stop` — end the session and commit the file.
    Stop,
    /// `reset` — force the recorder back to idle.
    Reset,
    /// `status` — report state, bytes, filename, queue depth.
    Status,
    /// `set_mode {stereo|tdm}` — switch the capture profile.
    SetMode(CaptureMode),
    /// `measure_clock` — report the observed external sample clock.
    MeasureClock,
    /// `help` — list commands.
    Help,
}

/// A reply line plus exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text for the UART (no trailing newline).
    pub text: String<REPLY_CAP>,
    /// Process-style exit code.
    pub code: i32,
}

impl Reply {
    fn ok(text: &str) -> Self {
        let mut s = String::new();
        let _ = s.push_str(text);
        Self { text: s, code: 0 }
    }

    fn err(text: &str, code: i32) -> Self {
        let mut s = String::new();
        let _ = s.push_str(text);
        Self { text: s, code }
    }

    fn from_error(err: CaptureError) -> Self {
        let mut s = String::new();
        let _ = write!(s, "error: {err}");
        Self {
            text: s,
            code: err.exit_code(),
        }
    }
}

/// Parse one input line into a command.
///
/// Leading/trailing whitespace is ignored; the grammar is
/// `verb [argument]`. Returns a usage [`Reply`] for anything else.
pub fn parse_line(line: &str) -> Result<Command, Reply> {
    let mut words = line.split_ascii_whitespace();
    let Some(verb) = words.next() else {
        return Err(Reply::err("", EXIT_USAGE));
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(Reply::err("usage: too many arguments", EXIT_USAGE));
    }
    match (verb, arg) {
        ("start", None) => Ok(Command::Start),
        ("stop", None) => Ok(Command::Stop),
        ("reset", None) => Ok(Command::Reset),
        ("status", None) => Ok(Command::Status),
        ("measure_clock", None) => Ok(Command::MeasureClock),
        ("help", None) => Ok(Command::Help),
        ("set_mode", Some(name)) => CaptureMode::from_name(name)
            .map(Command::SetMode)
            .ok_or_else(|| Reply::err("usage: set_mode {stereo|tdm}", EXIT_USAGE)),
        ("set_mode", None) => Err(Reply::err("usage: set_mode {stereo|tdm}", EXIT_USAGE)),
        _ => Err(Reply::err("unknown command; try 'help'", EXIT_USAGE)),
    }
}

fn state_name(state: CaptureState) -> &'static str {
    match state {
        CaptureState::Idle => "idle",
        CaptureState::Recording => "recording",
        CaptureState::Stopping => "stopping",
        CaptureState::Error => "error",
    }
}

/// Execute `cmd` against the recorder.
pub async fn dispatch<S, F>(
    cmd: Command,
    recorder: &Mutex<CriticalSectionRawMutex, Recorder<S, F>>,
    queue: &CaptureQueue,
) -> Reply
where
    S: SampleSource,
    F: RecordingStore,
{
    match cmd {
        Command::Start => {
            let mut rec = recorder.lock().await;
            match rec.start(queue).await {
                Ok(()) => {
                    let mut s = String::new();
                    let _ = write!(s, "recording to {}", rec.filename());
                    Reply { text: s, code: 0 }
                }
                Err(e) => Reply::from_error(e),
            }
        }
        Command::Stop => {
            let mut rec = recorder.lock().await;
            match rec.stop().await {
                Ok(report) => {
                    let mut s = String::new();
                    let _ = write!(s, "stopped, {} bytes", report.bytes_written);
                    if !report.file_verified {
                        let _ = s.push_str(" (file not verified)");
                    }
                    Reply { text: s, code: 0 }
                }
                Err(e) => Reply::from_error(e),
            }
        }
        Command::Reset => {
            let mut rec = recorder.lock().await;
            rec.reset(queue).await;
            Reply::ok("reset to idle")
        }
        Command::Status => {
            let rec = recorder.lock().await;
            let st = rec.status(queue);
            let mut s = String::new();
            let _ = write!(
                s,
                "state={} file={} bytes={} queue={}/{} dropped={}",
                state_name(st.state),
                if st.filename.is_empty() {
                    "-"
                } else {
                    st.filename.as_str()
                },
                st.bytes_written,
                st.queue_depth,
                crate::queue::QUEUE_DEPTH,
                st.dropped_chunks,
            );
            Reply { text: s, code: 0 }
        }
        Command::SetMode(mode) => {
            let mut rec = recorder.lock().await;
            match rec.set_mode(mode).await {
                Ok(()) => Reply::ok("mode set"),
                Err(e) => Reply::from_error(e),
            }
        }
        Command::MeasureClock => {
            let rec = recorder.lock().await;
            match rec.measure_clock_hz() {
                Some(hz) => {
                    let mut s = String::new();
                    let _ = write!(s, "measured {hz} Hz");
                    Reply { text: s, code: 0 }
                }
                None => Reply::err("no capture cadence observed yet", -1),
            }
        }
        Command::Help => {
            Reply::ok("commands: start stop reset status set_mode {stereo|tdm} measure_clock help")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn verbs_parse() {
        assert_eq!(parse_line("start").unwrap(), Command::Start);
        assert_eq!(parse_line("  stop  ").unwrap(), Command::Stop);
        assert_eq!(parse_line("reset").unwrap(), Command::Reset);
        assert_eq!(parse_line("status").unwrap(), Command::Status);
        assert_eq!(parse_line("measure_clock").unwrap(), Command::MeasureClock);
        assert_eq!(
            parse_line("set_mode stereo").unwrap(),
            Command::SetMode(CaptureMode::Stereo)
        );
        assert_eq!(
            parse_line("set_mode tdm").unwrap(),
            Command::SetMode(CaptureMode::Tdm)
        );
    }

    #[test]
    fn malformed_lines_are_usage_errors() {
        assert_eq!(parse_line("").unwrap_err().code, EXIT_USAGE);
        assert_eq!(parse_line("blorp").unwrap_err().code, EXIT_USAGE);
        assert_eq!(parse_line("set_mode").unwrap_err().code, EXIT_USAGE);
        assert_eq!(parse_line("set_mode mono").unwrap_err().code, EXIT_USAGE);
        assert_eq!(parse_line("start now").unwrap_err().code, EXIT_USAGE);
    }

    #[test]
    fn error_replies_carry_family_codes() {
        let r = Reply::from_error(CaptureError::Busy);
        assert_eq!(r.code, -5);
        assert!(r.text.as_str().starts_with("error:"));
    }
}
