//! Terminal surface capability: the registry renders session output into a
//! surface without knowing how it is displayed. The default implementation
//! keeps a vt100 screen in memory; a UI target supplies its own.

/// A writable terminal buffer with geometry. One per session entry; survives
/// process exit so a restart can clear and reuse it.
pub trait TerminalSurface: Send {
    /// Feed raw process output (escape sequences included) into the buffer.
    fn write(&mut self, bytes: &[u8]);

    /// Resize the buffer. The registry mirrors this geometry to the process.
    fn resize(&mut self, rows: u16, cols: u16);

    fn size(&self) -> (u16, u16);

    /// Reset the buffer contents, keeping geometry.
    fn clear(&mut self);

    /// Visible screen contents, rows joined by newlines. Used for snapshots
    /// and tests; a rendering UI would read cells instead.
    fn contents(&self) -> String;
}

pub const DEFAULT_ROWS: u16 = 30;
pub const DEFAULT_COLS: u16 = 80;

/// In-memory surface backed by a vt100 parser.
pub struct Vt100Surface {
    parser: vt100::Parser,
    rows: u16,
    cols: u16,
}

impl Vt100Surface {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, 0),
            rows,
            cols,
        }
    }
}

impl Default for Vt100Surface {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS, DEFAULT_COLS)
    }
}

impl TerminalSurface for Vt100Surface {
    fn write(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
        self.parser.set_size(rows, cols);
    }

    fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    fn clear(&mut self) {
        self.parser = vt100::Parser::new(self.rows, self.cols, 0);
    }

    fn contents(&self) -> String {
        self.parser.screen().contents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_renders_written_bytes() {
        let mut surface = Vt100Surface::new(5, 20);
        surface.write(b"hello\r\nworld");
        let contents = surface.contents();
        assert!(contents.contains("hello"));
        assert!(contents.contains("world"));
    }

    #[test]
    fn clear_resets_contents_but_keeps_geometry() {
        let mut surface = Vt100Surface::new(5, 20);
        surface.write(b"data");
        surface.resize(10, 40);
        surface.clear();
        assert_eq!(surface.size(), (10, 40));
        assert!(surface.contents().trim().is_empty());
    }
}
