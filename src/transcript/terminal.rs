//! Line-oriented terminal transcript
//!
//! Output is append-only, so an entry is written when it first appears and
//! again whenever its presentation changes (placeholder to answer).
//!
//! A placeholder written last is left open, without its newline, so
//! [`TerminalTranscript::pulse`] can redraw it in place. Any other write
//! settles it first.

use std::io::{self, Write};

use crate::conversation::EntryId;

use super::{EntryView, Presentation, ScrollTarget, Side};

const PLACEHOLDER: &str = "• • •";

/// Pulse frames, padded to the placeholder's width
const PULSE_FRAMES: [&str; 3] = ["•    ", "• •  ", PLACEHOLDER];

/// Bubbles take at most this share of the line, in percent.
const BUBBLE_SHARE: usize = 85;

pub struct TerminalTranscript<W: Write> {
    out: W,
    width: usize,
    painted: Vec<Presentation>,
    scroll_pending: bool,
    /// Frame of the open placeholder line, if there is one
    pulsing: Option<usize>,
}

impl<W: Write> TerminalTranscript<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width: width.max(20),
            painted: Vec::new(),
            scroll_pending: false,
            pulsing: None,
        }
    }

    pub fn banner(&mut self, name: &str, intro: &str, call_to_action: &str) -> io::Result<()> {
        self.settle()?;
        writeln!(self.out, "{:^width$}", name, width = self.width)?;
        for line in textwrap::wrap(intro, self.bubble_width()) {
            writeln!(self.out, "{:^width$}", line, width = self.width)?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "{:^width$}", call_to_action, width = self.width)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn notice(&mut self, message: &str) -> io::Result<()> {
        self.settle()?;
        writeln!(self.out, "  ({})", message)?;
        self.out.flush()
    }

    /// Write every entry that is new or changed since the last paint
    pub fn paint(&mut self, views: &[EntryView]) -> io::Result<()> {
        for view in views {
            let index = view.id.index();
            if self.painted.get(index) == Some(&view.presentation) {
                continue;
            }

            self.write_entry(view)?;

            if index < self.painted.len() {
                self.painted[index] = view.presentation.clone();
            } else {
                self.painted.push(view.presentation.clone());
            }
        }

        if self.scroll_pending {
            self.scroll_pending = false;
            self.out.flush()?;
        }

        Ok(())
    }

    /// Advance the open placeholder to its next frame
    pub fn pulse(&mut self) -> io::Result<()> {
        let Some(frame) = self.pulsing else {
            return Ok(());
        };

        let next = (frame + 1) % PULSE_FRAMES.len();
        write!(self.out, "\r│ {}", PULSE_FRAMES[next])?;
        self.pulsing = Some(next);
        self.out.flush()
    }

    fn settle(&mut self) -> io::Result<()> {
        if self.pulsing.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn write_entry(&mut self, view: &EntryView) -> io::Result<()> {
        self.settle()?;

        if view.presentation == Presentation::Placeholder && view.side == Side::Respondent {
            writeln!(self.out)?;
            write!(self.out, "│ {}", PLACEHOLDER)?;
            self.pulsing = Some(PULSE_FRAMES.len() - 1);
            return Ok(());
        }

        let mut lines: Vec<String> = match &view.presentation {
            Presentation::Placeholder => vec![PLACEHOLDER.to_string()],
            Presentation::Text(text) => textwrap::wrap(text, self.bubble_width())
                .into_iter()
                .map(|line| line.into_owned())
                .collect(),
            Presentation::Failed(reason) => vec![format!("✗ {}", reason)],
        };

        if let Some(url) = &view.attachment_url {
            lines.push(format!("↳ {}", url));
        }

        writeln!(self.out)?;
        for line in lines {
            match view.side {
                Side::Respondent => writeln!(self.out, "│ {}", line)?,
                Side::Asker => {
                    let line = format!("{} │", line);
                    writeln!(self.out, "{:>width$}", line, width = self.width)?;
                }
            }
        }

        Ok(())
    }

    fn bubble_width(&self) -> usize {
        self.width * BUBBLE_SHARE / 100
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ScrollTarget for TerminalTranscript<W> {
    fn scroll_into_view(&mut self, last: EntryId) {
        tracing::trace!(%last, "Scrolling to newest entry");
        self.scroll_pending = true;
    }
}
