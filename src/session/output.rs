//! Output monitoring: strips terminal control sequences from raw PTY bytes,
//! maintains a small ring of recent lines for previews, and derives an
//! auto-generated thread title from the first meaningful output line.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;

/// Recent-line ring capacity per session.
pub const RECENT_LINE_CAPACITY: usize = 5;
/// Derived titles are cut at this many characters.
pub const TITLE_MAX_CHARS: usize = 60;
/// Published previews are cut at this many characters.
pub const PREVIEW_MAX_CHARS: usize = 120;

fn escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // CSI sequences, OSC sequences (BEL or ST terminated), and the
        // remaining single-char ESC forms.
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(\x07|\x1b\\)|\x1b[@-_]")
            .expect("escape regex is valid")
    })
}

/// Strip ANSI escape sequences and non-printing control characters,
/// preserving newlines and tabs.
pub fn strip_control_sequences(text: &str) -> String {
    let cleaned = escape_regex().replace_all(text, "");
    cleaned
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Truncate to `max` characters, appending an ellipsis when cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Per-session accumulator turning raw byte chunks into cleaned lines.
///
/// Chunks rarely align with line boundaries, so a trailing partial line is
/// carried between calls and only completed lines enter the ring.
#[derive(Debug, Default)]
pub struct LineScanner {
    recent: VecDeque<String>,
    partial: String,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of decoded output. Returns the trimmed, non-empty
    /// lines completed by this chunk, in arrival order; each is also pushed
    /// into the recent-line ring (oldest evicted first).
    pub fn ingest(&mut self, chunk: &str) -> Vec<String> {
        let cleaned = strip_control_sequences(chunk);
        let mut completed = Vec::new();
        for c in cleaned.chars() {
            if c == '\n' {
                let line = self.partial.trim().to_string();
                self.partial.clear();
                if !line.is_empty() {
                    completed.push(line);
                }
            } else {
                self.partial.push(c);
            }
        }
        for line in &completed {
            if self.recent.len() == RECENT_LINE_CAPACITY {
                self.recent.pop_front();
            }
            self.recent.push_back(line.clone());
        }
        completed
    }

    /// Most recent completed line, if any.
    pub fn latest(&self) -> Option<&str> {
        self.recent.back().map(String::as_str)
    }

    pub fn recent_lines(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.recent.clear();
        self.partial.clear();
    }
}

/// Whether a line qualifies as a thread title: non-trivial, not a shell
/// prompt artifact, and not an echo of the auto-run command itself.
fn qualifies_as_title(line: &str, auto_run_command: Option<&str>) -> bool {
    if line.chars().count() <= 3 {
        return false;
    }
    if let Some(first) = line.chars().next() {
        if matches!(first, '$' | '%' | '>') || ('\u{2500}'..='\u{259f}').contains(&first) {
            return false;
        }
    }
    if auto_run_command.is_some_and(|cmd| line == cmd.trim()) {
        return false;
    }
    true
}

/// Pick the first qualifying line as the auto-title, truncated for display.
pub fn derive_title<'a, I>(lines: I, auto_run_command: Option<&str>) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .find(|line| qualifies_as_title(line, auto_run_command))
        .map(|line| truncate_with_ellipsis(line, TITLE_MAX_CHARS))
}

/// The preview published for list views: the newest ring line, length-capped.
pub fn preview_of(scanner: &LineScanner) -> Option<String> {
    scanner
        .latest()
        .map(|line| truncate_with_ellipsis(line, PREVIEW_MAX_CHARS))
}
