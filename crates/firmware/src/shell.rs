//! UART shell line discipline.
//!
//! The shell task reads the UART one byte at a time and feeds a
//! [`LineBuffer`], which assembles complete lines with minimal terminal
//! editing (backspace, CR/LF termination). Completed lines go through
//! `capture::control::parse_line`/`dispatch`; replies are written back with
//! a trailing `exit=<code>` marker so host-side scripts can branch on the
//! process-style result.

use heapless::String;

/// Maximum accepted line length. Longer lines are discarded whole.
pub const LINE_CAP: usize = 96;

/// Byte-at-a-time line assembler.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String<LINE_CAP>,
    overflowed: bool,
}

impl LineBuffer {
    /// Create an empty line buffer.
    pub const fn new() -> Self {
        Self {
            buf: String::new(),
            overflowed: false,
        }
    }

    /// Feed one received byte.
    ///
    /// Returns the completed line (without its terminator) on CR or LF.
    /// Oversized lines are dropped in full: the terminator of an overflowed
    /// line yields `None` rather than a truncated command.
    pub fn push(&mut self, byte: u8) -> Option<String<LINE_CAP>> {
        match byte {
            b'\r' | b'\n' => {
                let overflowed = core::mem::replace(&mut self.overflowed, false);
                let line = core::mem::take(&mut self.buf);
                if overflowed || line.is_empty() {
                    None
                } else {
                    Some(line)
                }
            }
            // Backspace / DEL: drop the last byte.
            0x08 | 0x7F => {
                self.buf.pop();
                None
            }
            // Printable ASCII only; control bytes are line noise.
            0x20..=0x7E => {
                if self.buf.push(byte as char).is_err() {
                    self.overflowed = true;
                }
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn feed(lb: &mut LineBuffer, bytes: &[u8]) -> Option<String<LINE_CAP>> {
        let mut out = None;
        for &b in bytes {
            if let Some(line) = lb.push(b) {
                out = Some(line);
            }
        }
        out
    }

    #[test]
    fn assembles_a_cr_terminated_line() {
        let mut lb = LineBuffer::new();
        let line = feed(&mut lb, b"status\r").unwrap();
        assert_eq!(line.as_str(), "status");
    }

    #[test]
    fn crlf_yields_one_line_not_two() {
        let mut lb = LineBuffer::new();
        assert_eq!(feed(&mut lb, b"start\r").unwrap().as_str(), "start");
        // The trailing LF of CRLF terminates an empty line: swallowed.
        assert!(lb.push(b'\n').is_none());
    }

    #[test]
    fn backspace_edits_the_tail() {
        let mut lb = LineBuffer::new();
        let line = feed(&mut lb, b"stoq\x08p\r").unwrap();
        assert_eq!(line.as_str(), "stop");
    }

    #[test]
    fn oversized_lines_are_discarded_whole() {
        let mut lb = LineBuffer::new();
        for _ in 0..(LINE_CAP + 10) {
            assert!(lb.push(b'a').is_none());
        }
        assert!(lb.push(b'\r').is_none(), "overflowed line dropped");
        // The buffer recovers for the next line.
        assert_eq!(feed(&mut lb, b"reset\r").unwrap().as_str(), "reset");
    }

    #[test]
    fn control_bytes_are_ignored() {
        let mut lb = LineBuffer::new();
        let line = feed(&mut lb, b"\x1b[Astat\x00us\r").unwrap();
        // ESC, NUL dropped; '[' and 'A' are printable and kept.
        assert_eq!(line.as_str(), "[Astatus");
    }
}

// ── Hardware task ────────────────────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub mod hardware {
    //! The UART shell task.

    use capture::control::{dispatch, parse_line};
    use capture::queue::CaptureQueue;
    use core::fmt::Write as _;
    use embassy_stm32::peripherals::{DMA1_CH2, DMA1_CH3, USART3};
    use embassy_stm32::usart::Uart;
    use heapless::String;

    use super::LineBuffer;
    use crate::tasks::RecorderMutex;

    /// The shell transport: USART3 with TX/RX DMA.
    pub type ShellUart = Uart<'static, USART3, DMA1_CH2, DMA1_CH3>;

    /// Drive the line-oriented control shell over `uart`.
    ///
    /// Echoes input, executes complete lines against the recorder, and
    /// reports `exit=<code>` after every command.
    pub async fn shell_loop(
        uart: &mut ShellUart,
        recorder: &'static RecorderMutex,
        queue: &'static CaptureQueue,
    ) -> ! {
        let mut lines = LineBuffer::new();
        let _ = uart.write(b"\r\npcm-ingest shell ready\r\n> ").await;
        loop {
            let mut byte = [0u8; 1];
            if uart.read(&mut byte).await.is_err() {
                continue;
            }
            // Local echo.
            let _ = uart.write(&byte).await;

            let Some(line) = lines.push(byte[0]) else {
                continue;
            };
            let _ = uart.write(b"\r\n").await;

            let reply = match parse_line(line.as_str()) {
                Ok(cmd) => dispatch(cmd, recorder, queue).await,
                Err(usage) => usage,
            };
            if !reply.text.is_empty() {
                let _ = uart.write(reply.text.as_bytes()).await;
                let _ = uart.write(b"\r\n").await;
            }
            let mut code_line: String<24> = String::new();
            let _ = write!(code_line, "exit={}\r\n> ", reply.code);
            let _ = uart.write(code_line.as_bytes()).await;
        }
    }
}
