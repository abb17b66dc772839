//! Measures the pixel size of one terminal cell.
//!
//! Strategies run in order and the first answer wins; the static table at
//! the end always answers, so a probe never fails.

use std::time::Duration;

use termdoc_core::{CellSize, TerminalGeometry, ViewerConfig};
use tracing::{debug, info};

const FALLBACK_COLUMNS: u16 = 80;
const FALLBACK_ROWS: u16 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalIdentity {
    Kitty,
    WezTerm,
    ITerm2,
    AppleTerminal,
    Foot,
    Alacritty,
    Xterm,
    Tmux,
    Screen,
    Unknown,
}

impl TerminalIdentity {
    pub fn detect() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup("TERM_PROGRAM").as_deref() {
            Some("WezTerm") => return TerminalIdentity::WezTerm,
            Some("iTerm.app") => return TerminalIdentity::ITerm2,
            Some("Apple_Terminal") => return TerminalIdentity::AppleTerminal,
            _ => {}
        }
        if lookup("KITTY_WINDOW_ID").is_some() || lookup("KITTY_PID").is_some() {
            return TerminalIdentity::Kitty;
        }
        let term = lookup("TERM").unwrap_or_default().to_ascii_lowercase();
        const BY_TERM: &[(&str, TerminalIdentity)] = &[
            ("kitty", TerminalIdentity::Kitty),
            ("foot", TerminalIdentity::Foot),
            ("alacritty", TerminalIdentity::Alacritty),
            ("wezterm", TerminalIdentity::WezTerm),
            ("xterm", TerminalIdentity::Xterm),
            ("tmux", TerminalIdentity::Tmux),
            ("screen", TerminalIdentity::Screen),
        ];
        BY_TERM
            .iter()
            .find(|(needle, _)| term.contains(needle))
            .map(|(_, identity)| *identity)
            .unwrap_or(TerminalIdentity::Unknown)
    }

    pub fn label(self) -> &'static str {
        match self {
            TerminalIdentity::Kitty => "kitty",
            TerminalIdentity::WezTerm => "wezterm",
            TerminalIdentity::ITerm2 => "iterm2",
            TerminalIdentity::AppleTerminal => "apple-terminal",
            TerminalIdentity::Foot => "foot",
            TerminalIdentity::Alacritty => "alacritty",
            TerminalIdentity::Xterm => "xterm",
            TerminalIdentity::Tmux => "tmux",
            TerminalIdentity::Screen => "screen",
            TerminalIdentity::Unknown => "unknown",
        }
    }

    /// Typical cell size at default font settings.
    pub fn typical_cell(self) -> CellSize {
        let (width, height) = match self {
            TerminalIdentity::Kitty | TerminalIdentity::WezTerm => (18.0, 36.0),
            TerminalIdentity::Foot => (15.0, 25.0),
            TerminalIdentity::Alacritty => (14.0, 28.0),
            TerminalIdentity::ITerm2 => (16.0, 32.0),
            TerminalIdentity::Xterm => (7.0, 14.0),
            _ => return CellSize::FALLBACK,
        };
        CellSize::new(width, height).unwrap_or(CellSize::FALLBACK)
    }
}

/// What a strategy gets to look at.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub columns: u16,
    pub rows: u16,
    pub identity: TerminalIdentity,
    /// Whether writing to the terminal and reading a reply is safe right now.
    pub allow_query: bool,
    pub env_var: String,
    pub timeout: Duration,
}

pub trait CellSizeStrategy: Send {
    fn name(&self) -> &'static str;
    fn measure(&self, ctx: &ProbeContext) -> Option<CellSize>;
}

/// `WxH` from an environment variable.
pub struct EnvOverride;

impl CellSizeStrategy for EnvOverride {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn measure(&self, ctx: &ProbeContext) -> Option<CellSize> {
        let raw = std::env::var(&ctx.env_var).ok()?;
        match raw.parse::<CellSize>() {
            Ok(cell) => Some(cell),
            Err(err) => {
                debug!(%err, var = %ctx.env_var, "ignoring cell size override");
                None
            }
        }
    }
}

/// Asks the terminal with `CSI 16 t`. Only kitty is trusted to answer.
pub struct EscapeQuery;

impl CellSizeStrategy for EscapeQuery {
    fn name(&self) -> &'static str {
        "escape-query"
    }

    fn measure(&self, ctx: &ProbeContext) -> Option<CellSize> {
        if !ctx.allow_query || ctx.identity != TerminalIdentity::Kitty {
            return None;
        }
        let reply = query_tty(b"\x1b[16t", ctx.timeout)?;
        parse_cell_size_reply(&reply)
    }
}

/// Window pixel size from the terminal driver divided by the cell grid.
pub struct WindowPixels;

impl CellSizeStrategy for WindowPixels {
    fn name(&self) -> &'static str {
        "window-size"
    }

    fn measure(&self, _ctx: &ProbeContext) -> Option<CellSize> {
        let size = crossterm::terminal::window_size().ok()?;
        cell_from_window(size.width, size.height, size.columns, size.rows)
    }
}

pub struct StaticTable;

impl CellSizeStrategy for StaticTable {
    fn name(&self) -> &'static str {
        "static-table"
    }

    fn measure(&self, ctx: &ProbeContext) -> Option<CellSize> {
        Some(ctx.identity.typical_cell())
    }
}

/// Cell size from window pixels, rejected when implausibly small.
pub fn cell_from_window(width: u16, height: u16, columns: u16, rows: u16) -> Option<CellSize> {
    if columns == 0 || rows == 0 {
        return None;
    }
    let cell_width = f32::from(width) / f32::from(columns);
    let cell_height = f32::from(height) / f32::from(rows);
    if cell_width > 4.0 && cell_height > 8.0 {
        CellSize::new(cell_width, cell_height)
    } else {
        None
    }
}

/// Parses `CSI 6 ; height ; width t`, ignoring anything around it.
pub fn parse_cell_size_reply(reply: &[u8]) -> Option<CellSize> {
    let text = String::from_utf8_lossy(reply);
    let start = text.find("\x1b[6;")? + 4;
    let rest = &text[start..];
    let end = rest.find('t')?;
    let (height, width) = rest[..end].split_once(';')?;
    let height: f32 = height.trim().parse().ok()?;
    let width: f32 = width.trim().parse().ok()?;
    CellSize::new(width, height)
}

#[cfg(unix)]
fn query_tty(request: &[u8], timeout: Duration) -> Option<Vec<u8>> {
    use std::fs::OpenOptions;
    use std::io::{Read, Write};
    use std::os::unix::io::AsRawFd;
    use std::time::Instant;

    let mut tty = OpenOptions::new().read(true).write(true).open("/dev/tty").ok()?;
    tty.write_all(request).ok()?;
    tty.flush().ok()?;

    let deadline = Instant::now() + timeout;
    let mut reply = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let mut fds = libc::pollfd {
            fd: tty.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `fds` is a valid pollfd for the lifetime of the call.
        let ready = unsafe { libc::poll(&mut fds, 1, remaining.as_millis() as libc::c_int) };
        if ready <= 0 {
            break;
        }
        let read = tty.read(&mut chunk).ok()?;
        if read == 0 {
            break;
        }
        reply.extend_from_slice(&chunk[..read]);
        if reply.contains(&b't') {
            break;
        }
    }
    (!reply.is_empty()).then_some(reply)
}

#[cfg(not(unix))]
fn query_tty(_request: &[u8], _timeout: Duration) -> Option<Vec<u8>> {
    None
}

/// Current terminal size in cells, 80x24 when unknown.
pub fn terminal_size() -> (u16, u16) {
    match crossterm::terminal::size() {
        Ok((columns, rows)) if columns > 0 && rows > 0 => (columns, rows),
        _ => (FALLBACK_COLUMNS, FALLBACK_ROWS),
    }
}

#[derive(Debug, Clone, Copy)]
struct Measured {
    columns: u16,
    rows: u16,
    cell: CellSize,
    source: &'static str,
}

pub struct GeometryProbe {
    strategies: Vec<Box<dyn CellSizeStrategy>>,
    identity: TerminalIdentity,
    allow_query: bool,
    env_var: String,
    timeout: Duration,
    cached: Option<Measured>,
}

impl GeometryProbe {
    pub fn new(config: &ViewerConfig) -> Self {
        let strategies: Vec<Box<dyn CellSizeStrategy>> = vec![
            Box::new(EnvOverride),
            Box::new(EscapeQuery),
            Box::new(WindowPixels),
            Box::new(StaticTable),
        ];
        Self::with_strategies(TerminalIdentity::detect(), strategies, config)
    }

    pub fn with_strategies(
        identity: TerminalIdentity,
        strategies: Vec<Box<dyn CellSizeStrategy>>,
        config: &ViewerConfig,
    ) -> Self {
        Self {
            strategies,
            identity,
            allow_query: true,
            env_var: config.cell_size_env.clone(),
            timeout: config.probe_timeout,
            cached: None,
        }
    }

    pub fn identity(&self) -> TerminalIdentity {
        self.identity
    }

    /// Stops strategies from talking to the terminal, e.g. once another
    /// thread owns terminal input.
    pub fn disable_queries(&mut self) {
        self.allow_query = false;
    }

    pub fn refresh(&mut self) {
        self.cached = None;
    }

    pub fn geometry(&mut self) -> TerminalGeometry {
        let (columns, rows) = terminal_size();
        self.geometry_for(columns, rows)
    }

    pub fn geometry_for(&mut self, columns: u16, rows: u16) -> TerminalGeometry {
        let measured = match self.cached {
            Some(m) if m.columns == columns && m.rows == rows => m,
            _ => {
                let m = self.measure(columns, rows);
                self.cached = Some(m);
                m
            }
        };
        TerminalGeometry::new(columns, rows, measured.cell)
    }

    /// Name of the strategy behind the cached cell size.
    pub fn source(&self) -> Option<&'static str> {
        self.cached.map(|m| m.source)
    }

    pub fn diagnostics(&self) -> Vec<String> {
        vec![
            format!("terminal program: {}", self.identity.label()),
            format!("cell size source: {}", self.source().unwrap_or("not measured")),
        ]
    }

    fn measure(&self, columns: u16, rows: u16) -> Measured {
        let ctx = ProbeContext {
            columns,
            rows,
            identity: self.identity,
            allow_query: self.allow_query,
            env_var: self.env_var.clone(),
            timeout: self.timeout,
        };
        let found = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.measure(&ctx).map(|cell| (cell, strategy.name())));
        let (cell, source) = found.unwrap_or((self.identity.typical_cell(), "fallback"));
        info!(
            columns,
            rows,
            width = cell.width(),
            height = cell.height(),
            source,
            "measured cell size"
        );
        Measured {
            columns,
            rows,
            cell,
            source,
        }
    }
}
