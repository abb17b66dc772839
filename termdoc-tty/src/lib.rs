use std::io::{self, Write};
use std::panic;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use termdoc_core::RenderImage;
use termdoc_render::{ClearMode, DrawOp, RenderedFrame, Span, MARKER_GLYPH};
use tracing::warn;

pub mod input;
pub mod probe;

pub use input::{EventMapper, InputMode, PromptKind, UiEvent};
pub use probe::{terminal_size, GeometryProbe, TerminalIdentity};

const IMAGE_FAILED: &str = "(Image rendering failed)";

pub struct KittyRenderer<W: Write> {
    writer: W,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Transmits and places `image` at the cursor, replacing whatever image
    /// previously used `image_id`. The bitmap is shown at its own size.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams, image_id: u32) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p=1,c={},r={},s={},v={},z=-1,m={}",
                    image_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        Ok(())
    }

    /// Removes every image placement and frees the image data.
    pub fn delete_all_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    /// Paints a composed frame inside one synchronized update. An image that
    /// fails to transmit is replaced by a one-line placeholder.
    pub fn paint(&mut self, frame: &RenderedFrame) -> Result<()> {
        self.begin_sync_update()?;
        self.delete_all_images()?;
        if frame.clear == ClearMode::Full {
            self.clear_all()?;
        }

        for op in &frame.ops {
            match op {
                DrawOp::Text { row, column, spans } => {
                    self.clear_row(*row)?;
                    crossterm::queue!(self.writer, cursor::MoveTo(*column, *row))?;
                    self.print_spans(spans)?;
                }
                // the row was blanked by a preceding op; other placeholders may share it
                DrawOp::Placeholder { row, column, text } => {
                    crossterm::queue!(self.writer, cursor::MoveTo(*column, *row), Print(text))?;
                }
                DrawOp::Blank { row } => self.clear_row(*row)?,
                DrawOp::Image {
                    row,
                    column,
                    slot,
                    columns,
                    rows,
                    image,
                } => {
                    crossterm::queue!(self.writer, cursor::MoveTo(*column, *row))?;
                    let params = DrawParams::clamped(u32::from(*columns), u32::from(*rows));
                    if let Err(err) = self.draw(image, params, *slot) {
                        warn!(?err, row, column, "failed to transmit page image");
                        crossterm::queue!(self.writer, cursor::MoveTo(*column, *row), Print(IMAGE_FAILED))?;
                    }
                }
                DrawOp::Marker { row, column } => {
                    crossterm::queue!(self.writer, cursor::MoveTo(*column, *row), Print(MARKER_GLYPH))?;
                }
            }
        }

        self.clear_row(frame.status_row)?;
        crossterm::queue!(self.writer, Print(&frame.status))?;
        self.end_sync_update()
    }

    /// Rewrites only the status row, leaving images in place.
    pub fn paint_status(&mut self, row: u16, status: &str) -> Result<()> {
        self.clear_row(row)?;
        crossterm::queue!(self.writer, Print(status))?;
        self.writer.flush()?;
        Ok(())
    }

    fn clear_row(&mut self, row: u16) -> Result<()> {
        crossterm::queue!(self.writer, cursor::MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        Ok(())
    }

    fn print_spans(&mut self, spans: &[Span]) -> Result<()> {
        for span in spans {
            if span.highlighted {
                crossterm::queue!(
                    self.writer,
                    SetAttribute(Attribute::Reverse),
                    Print(&span.text),
                    SetAttribute(Attribute::NoReverse)
                )?;
            } else {
                crossterm::queue!(self.writer, Print(&span.text))?;
            }
        }
        Ok(())
    }
}

/// Raw mode plus hidden cursor for as long as the guard lives.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = Self;
        crossterm::execute!(io::stdout(), cursor::Hide)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

pub fn restore_terminal() {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\");
    let _ = crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0), cursor::Show);
    let _ = terminal::disable_raw_mode();
}

/// Restores the terminal before the default panic output is printed.
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        default_hook(panic_info);
    }));
}
