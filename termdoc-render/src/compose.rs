//! Frame layout. Builds a [`RenderedFrame`] from the viewer state without
//! touching the terminal; the painter in `termdoc-tty` executes it.

use termdoc_core::reflow::reflow_with;
use termdoc_core::search::{fold_case, match_ranges};
use termdoc_core::{
    classify_counts, ContentKind, DarkMode, DualPageMode, ForceMode, PageEntry, RenderImage,
    TerminalGeometry, Viewer,
};
use tracing::warn;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::sizing::{CellBudget, ImageCompositor};

pub const RULE_GLYPH: char = '─';
pub const MARKER_GLYPH: char = '▶';
pub const END_OF_DOCUMENT: &str = "[end of document]";

const TEXT_INDENT: u16 = 2;
const MIXED_IMAGE_ROWS: u16 = 12;

/// Kitty image ids used for the first and second page of a frame.
pub const PRIMARY_SLOT: u32 = 1;
pub const SECONDARY_SLOT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Clear the whole screen before painting.
    Full,
    /// Delete previous graphics and overwrite rows in place.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub highlighted: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Replaces the whole row with `spans` starting at `column`.
    Text { row: u16, column: u16, spans: Vec<Span> },
    /// Stand-in text for content that could not be shown. Covers only its
    /// own columns, so several can share a row.
    Placeholder { row: u16, column: u16, text: String },
    Image {
        row: u16,
        column: u16,
        slot: u32,
        columns: u16,
        rows: u16,
        image: RenderImage,
    },
    /// Search-hit indicator in the left margin beside an image.
    Marker { row: u16, column: u16 },
    Blank { row: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub ops: Vec<DrawOp>,
    pub status: String,
    pub status_row: u16,
    pub clear: ClearMode,
}

impl RenderedFrame {
    /// Plain text drawn on `row`, if any.
    pub fn text_at(&self, row: u16) -> Option<String> {
        self.ops.iter().find_map(|op| match op {
            DrawOp::Text { row: r, spans, .. } if *r == row => {
                Some(spans.iter().map(|s| s.text.as_str()).collect())
            }
            DrawOp::Placeholder { row: r, text, .. } if *r == row => Some(text.clone()),
            _ => None,
        })
    }

    /// Every text and placeholder drawn on `row`, left to right.
    pub fn texts_on(&self, row: u16) -> Vec<String> {
        let mut found: Vec<(u16, String)> = self
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { row: r, column, spans } if *r == row => {
                    Some((*column, spans.iter().map(|s| s.text.as_str()).collect()))
                }
                DrawOp::Placeholder { row: r, column, text } if *r == row => Some((*column, text.clone())),
                _ => None,
            })
            .collect();
        found.sort_by_key(|(column, _)| *column);
        found.into_iter().map(|(_, text)| text).collect()
    }

    pub fn images(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Image { .. }))
    }
}

/// Full-screen text panels shown instead of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Help,
    /// Terminal diagnostics supplied by the caller; document details are
    /// added during composition.
    Debug(Vec<String>),
}

pub struct FrameRequest<'a> {
    pub viewer: &'a Viewer,
    pub geometry: TerminalGeometry,
    pub prompt: Option<&'a str>,
    pub overlay: Option<&'a Overlay>,
    pub clear: ClearMode,
}

pub fn compose_frame(request: &FrameRequest<'_>) -> RenderedFrame {
    let FrameRequest {
        viewer,
        geometry,
        prompt,
        overlay,
        clear,
    } = *request;
    let mut canvas = Canvas::new(geometry);

    if let Some(overlay) = overlay {
        let lines = match overlay {
            Overlay::Help => help_lines(),
            Overlay::Debug(terminal) => debug_lines(viewer, geometry, terminal),
        };
        canvas.place_lines(&lines, 0, canvas.status_row(), TEXT_INDENT, "");
        return canvas.finish("Press any key to return".to_string(), clear);
    }

    let state = viewer.state();
    let pages = &viewer.document().pages;
    let Some(entry) = pages.get(state.current_page) else {
        return canvas.finish(current_status(viewer, prompt, geometry.columns), clear);
    };

    let compositor = ImageCompositor::new(viewer.config(), geometry.cell);
    let kind = page_kind(viewer, entry);

    match (state.dual_page, kind) {
        (DualPageMode::Off, ContentKind::Text) => layout_text(&mut canvas, viewer, entry),
        (DualPageMode::Off, ContentKind::Image) => layout_image(&mut canvas, viewer, &compositor, entry),
        (DualPageMode::Off, ContentKind::Mixed) => layout_mixed(&mut canvas, viewer, &compositor, entry),
        (mode, _) => {
            let next = pages.get(state.current_page + 1);
            layout_dual(&mut canvas, viewer, &compositor, mode, entry, next)
        }
    }

    canvas.finish(current_status(viewer, prompt, geometry.columns), clear)
}

/// Status line for whatever is on screen, labelled with the current page's
/// layout (dual-page views are always images).
pub fn current_status(viewer: &Viewer, prompt: Option<&str>, columns: u16) -> String {
    let state = viewer.state();
    let kind = match viewer.document().pages.get(state.current_page) {
        Some(_) if state.dual_page != DualPageMode::Off => ContentKind::Image,
        Some(entry) => page_kind(viewer, entry),
        None => ContentKind::Text,
    };
    status_line(viewer, kind, prompt, columns)
}

/// Classification of a listed page under the current force mode.
pub fn page_kind(viewer: &Viewer, entry: &PageEntry) -> ContentKind {
    let state = viewer.state();
    let config = viewer.config();
    // skip the raster probe when the answer cannot depend on it
    let has_visual = state.force_mode == ForceMode::Auto
        && entry.substantial_words() < config.classifier.text_words
        && entry.has_visual(viewer.document().backend.as_ref(), &config.sampling);
    classify_counts(entry.substantial_words(), has_visual, state.force_mode, &config.classifier)
}

fn layout_text(canvas: &mut Canvas, viewer: &Viewer, entry: &PageEntry) {
    let width = canvas.columns.saturating_sub(3) as usize;
    let lines = reflowed(viewer, entry, width);
    let end = canvas.rows.saturating_sub(2);
    if lines.is_empty() {
        canvas.placeholder(0, TEXT_INDENT, format!("[No text content - page {}]", entry.index + 1));
        return;
    }
    canvas.place_lines(&lines, 0, end, TEXT_INDENT, &viewer.state().search_query);
}

fn layout_image(canvas: &mut Canvas, viewer: &Viewer, compositor: &ImageCompositor<'_>, entry: &PageEntry) {
    let image_row = 1;
    let budget = CellBudget::new(canvas.columns.saturating_sub(4), canvas.rows.saturating_sub(3));
    let Some((_, rows)) = canvas.place_image(viewer, compositor, entry, image_row, TEXT_INDENT, budget, PRIMARY_SLOT)
    else {
        canvas.placeholder(image_row, TEXT_INDENT, format!("[Image content - page {}]", entry.index + 1));
        canvas.placeholder(image_row + 1, TEXT_INDENT, "(Image rendering failed)".to_string());
        return;
    };

    let query = &viewer.state().search_query;
    if let (Some(text), false) = (entry.text(), query.is_empty()) {
        for row in marker_rows(text, query, image_row, rows) {
            canvas.extra.push(DrawOp::Marker { row, column: 0 });
        }
    }
}

fn layout_mixed(canvas: &mut Canvas, viewer: &Viewer, compositor: &ImageCompositor<'_>, entry: &PageEntry) {
    let available = canvas.rows.saturating_sub(4);
    let max_image_rows = (available / 2).min(MIXED_IMAGE_ROWS);
    let budget = CellBudget::new(canvas.columns.saturating_sub(4), max_image_rows);
    let image_rows = canvas
        .place_image(viewer, compositor, entry, 1, TEXT_INDENT, budget, PRIMARY_SLOT)
        .map(|(_, rows)| rows)
        .unwrap_or(0);

    let mut row = 1 + image_rows;
    let mut used = image_rows;
    if image_rows > 0 && available.saturating_sub(image_rows) > 2 {
        let rule: String = std::iter::repeat(RULE_GLYPH)
            .take(canvas.columns as usize)
            .collect();
        canvas.set(row, DrawOp::Text {
            row,
            column: 0,
            spans: vec![Span::plain(rule)],
        });
        row += 1;
        used += 1;
    }

    let text_rows = available.saturating_sub(used);
    let width = canvas.columns.saturating_sub(4) as usize;
    let lines = reflowed(viewer, entry, width);
    canvas.place_lines(&lines, row, row + text_rows, TEXT_INDENT, &viewer.state().search_query);
}

fn layout_dual(
    canvas: &mut Canvas,
    viewer: &Viewer,
    compositor: &ImageCompositor<'_>,
    mode: DualPageMode,
    first: &PageEntry,
    second: Option<&PageEntry>,
) {
    let usable_rows = canvas.rows.saturating_sub(3);
    let usable_cols = canvas.columns.saturating_sub(4);
    let ((row_a, col_a, budget_a), (row_b, col_b, budget_b)) = match mode {
        DualPageMode::Horizontal => {
            let half = usable_cols.saturating_sub(1) / 2;
            (
                (1, TEXT_INDENT, CellBudget::new(half, usable_rows)),
                (
                    1,
                    TEXT_INDENT + half + 1,
                    CellBudget::new(usable_cols.saturating_sub(half + 1), usable_rows),
                ),
            )
        }
        _ => {
            let half = usable_rows / 2;
            (
                (1, TEXT_INDENT, CellBudget::new(usable_cols, half)),
                (1 + half, TEXT_INDENT, CellBudget::new(usable_cols, usable_rows - half)),
            )
        }
    };

    for (entry, row, column, budget, slot) in [
        (Some(first), row_a, col_a, budget_a, PRIMARY_SLOT),
        (second, row_b, col_b, budget_b, SECONDARY_SLOT),
    ] {
        let Some(entry) = entry else {
            canvas.placeholder_within(row, column, budget.columns, END_OF_DOCUMENT.to_string());
            continue;
        };
        if canvas
            .place_image(viewer, compositor, entry, row, column, budget, slot)
            .is_some()
        {
            continue;
        }
        let label = format!("[Image content - page {}]", entry.index + 1);
        if budget.rows > 1 {
            canvas.placeholder_within(row, column, budget.columns, label);
            canvas.placeholder_within(row + 1, column, budget.columns, "(Image rendering failed)".to_string());
        } else {
            canvas.placeholder_within(row, column, budget.columns, format!("{} (Image rendering failed)", label));
        }
    }
}

fn reflowed(viewer: &Viewer, entry: &PageEntry, width: usize) -> Vec<String> {
    let config = viewer.config();
    let kind = viewer.document().info().kind;
    entry
        .text()
        .map(|text| reflow_with(text, width, kind, config.min_reflow_width, config.prewrapped_ratio))
        .unwrap_or_default()
}

/// Rows at which to draw search markers beside an image, mapping each
/// matching source line proportionally onto the image's rows.
pub fn marker_rows(text: &str, query: &str, image_row: u16, image_rows: u16) -> Vec<u16> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() || image_rows == 0 || query.is_empty() {
        return Vec::new();
    }
    let total = lines.len();
    let mut rows: Vec<u16> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| fold_case(line).contains(query))
        .map(|(idx, _)| image_row + (idx * image_rows as usize / total) as u16)
        .collect();
    rows.dedup();
    rows
}

/// Splits `line` into spans with every case-insensitive match of `query`
/// flagged. `query` is expected already folded.
pub fn highlight_spans(line: &str, query: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for (start, end) in match_ranges(line, query) {
        if start > cursor {
            spans.push(Span::plain(&line[cursor..start]));
        }
        spans.push(Span {
            text: line[start..end].to_string(),
            highlighted: true,
        });
        cursor = end;
    }
    if cursor < line.len() || spans.is_empty() {
        spans.push(Span::plain(&line[cursor..]));
    }
    spans
}

pub fn status_line(viewer: &Viewer, kind: ContentKind, prompt: Option<&str>, columns: u16) -> String {
    let state = viewer.state();
    let info = viewer.document().info();
    let mut parts = vec![format!(
        "Page {}/{} ({}) - {}",
        state.current_page + 1,
        viewer.page_count(),
        kind.label(),
        info.kind.label()
    )];

    if state.force_mode != ForceMode::Auto {
        parts.push(format!("force:{}", state.force_mode));
    }
    parts.push(format!("fit:{}", state.fit_mode));
    let percent = (state.scale * 100.0).round() as u32;
    match viewer.reflow_page_width() {
        Some(width) => parts.push(format!("zoom {}% @{:.0}pt", percent, width)),
        None => parts.push(format!("{}%", percent)),
    }
    if state.dark_mode != DarkMode::Off {
        parts.push(format!("dark:{}", state.dark_mode));
    }
    if state.dual_page != DualPageMode::Off {
        parts.push(format!("dual:{}", state.dual_page));
    }
    if state.has_search() {
        if state.search_hits.is_empty() {
            parts.push(format!("/{}: no matches", state.search_query));
        } else {
            parts.push(format!(
                "/{}: {}/{}",
                state.search_query,
                state.search_cursor + 1,
                state.search_hits.len()
            ));
        }
    }
    if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
        parts.push(prompt.to_string());
    }

    center(&truncate_with_ellipsis(&parts.join(" | "), columns as usize), columns as usize)
}

/// Fits `text` into `width` terminal columns, ending in "..." when cut.
pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width <= 3 {
        return take_columns(text, width);
    }
    let mut truncated = take_columns(text, width - 3);
    truncated.push_str("...");
    truncated
}

/// Longest prefix of `text` that is at most `width` columns wide.
fn take_columns(text: &str, width: usize) -> String {
    let mut used = 0;
    text.chars()
        .take_while(|ch| {
            used += ch.width().unwrap_or(0);
            used <= width
        })
        .collect()
}

fn center(text: &str, width: usize) -> String {
    let len = text.width();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), text)
}

fn help_lines() -> Vec<String> {
    const KEYS: &[(&str, &str)] = &[
        ("j, space, Down, Right", "next page"),
        ("k, Up, Left", "previous page"),
        ("J / K, Shift+arrows", "move two pages"),
        ("<n> before a motion", "repeat it n times"),
        ("g, <n>g", "go to page"),
        ("G, End / Home", "last / first page"),
        ("/", "search"),
        ("n / N", "next / previous match"),
        ("t", "force text, image or auto layout"),
        ("f", "fit height, width or auto"),
        ("+ / -", "zoom in / out"),
        ("i", "dark mode off, smart or simple"),
        ("D", "dual page off, vertical or horizontal"),
        ("r", "re-measure the terminal"),
        ("d", "debug information"),
        ("h, ?", "this help"),
        ("b", "back to file selection"),
        ("q, Ctrl-C", "quit"),
    ];
    let mut lines = vec!["Keys".to_string(), String::new()];
    lines.extend(KEYS.iter().map(|(keys, action)| format!("{:<24}{}", keys, action)));
    lines
}

fn debug_lines(viewer: &Viewer, geometry: TerminalGeometry, terminal: &[String]) -> Vec<String> {
    let info = viewer.document().info();
    let state = viewer.state();
    let mut lines = vec![
        "Debug".to_string(),
        String::new(),
        format!("terminal: {}x{} cells", geometry.columns, geometry.rows),
        format!(
            "cell: {:.1}x{:.1} px",
            geometry.cell.width(),
            geometry.cell.height()
        ),
    ];
    lines.extend(terminal.iter().cloned());
    lines.push(String::new());
    lines.push(format!("file: {}", info.path.display()));
    lines.push(format!("format: {}", info.kind.label()));
    lines.push(format!(
        "pages: {} shown of {}",
        viewer.page_count(),
        info.page_count
    ));
    if let Some(title) = &info.metadata.title {
        lines.push(format!("title: {}", title));
    }
    if let Some(author) = &info.metadata.author {
        lines.push(format!("author: {}", author));
    }
    if let Some(entry) = viewer.document().pages.get(state.current_page) {
        lines.push(format!(
            "current: page {} ({} words, {})",
            entry.index + 1,
            entry.substantial_words(),
            page_kind(viewer, entry).label()
        ));
    }
    lines
}

/// Row-indexed scratch space. A content row holds one full-width text op,
/// any number of column-anchored placeholders, or nothing; images and
/// markers follow.
struct Canvas {
    columns: u16,
    rows: u16,
    cells: Vec<Vec<DrawOp>>,
    extra: Vec<DrawOp>,
}

impl Canvas {
    fn new(geometry: TerminalGeometry) -> Self {
        let content_rows = geometry.rows.saturating_sub(1) as usize;
        Self {
            columns: geometry.columns,
            rows: geometry.rows,
            cells: vec![Vec::new(); content_rows],
            extra: Vec::new(),
        }
    }

    fn status_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    /// Replaces everything on `row` with `op`.
    fn set(&mut self, row: u16, op: DrawOp) {
        if let Some(cell) = self.cells.get_mut(row as usize) {
            *cell = vec![op];
        }
    }

    fn clip(&self, column: u16, text: &str) -> String {
        take_columns(text, self.columns.saturating_sub(column) as usize)
    }

    fn placeholder(&mut self, row: u16, column: u16, text: String) {
        self.placeholder_within(row, column, self.columns, text);
    }

    /// Adds a placeholder clipped to `width` columns, keeping whatever else
    /// sits on the row.
    fn placeholder_within(&mut self, row: u16, column: u16, width: u16, text: String) {
        let text = take_columns(&self.clip(column, &text), width as usize);
        if let Some(cell) = self.cells.get_mut(row as usize) {
            cell.retain(|op| !matches!(op, DrawOp::Text { .. }));
            cell.push(DrawOp::Placeholder { row, column, text });
        }
    }

    fn place_lines(&mut self, lines: &[String], start: u16, end: u16, column: u16, query: &str) {
        for (row, line) in (start..end).zip(lines) {
            let clipped = self.clip(column, line);
            let spans = if query.is_empty() {
                vec![Span::plain(clipped)]
            } else {
                highlight_spans(&clipped, query)
            };
            self.set(row, DrawOp::Text { row, column, spans });
        }
    }

    /// Renders `entry` into `budget` at (`row`, `column`), centred
    /// horizontally. Returns the image column and row count.
    #[allow(clippy::too_many_arguments)]
    fn place_image(
        &mut self,
        viewer: &Viewer,
        compositor: &ImageCompositor<'_>,
        entry: &PageEntry,
        row: u16,
        column: u16,
        budget: CellBudget,
        slot: u32,
    ) -> Option<(u16, u16)> {
        let backend = viewer.document().backend.as_ref();
        match compositor.prepare(backend, entry, budget, viewer.state()) {
            Ok(prepared) => {
                let column = column + budget.columns.saturating_sub(prepared.columns) / 2;
                self.extra.push(DrawOp::Image {
                    row,
                    column,
                    slot,
                    columns: prepared.columns,
                    rows: prepared.rows,
                    image: prepared.image,
                });
                Some((column, prepared.rows))
            }
            Err(err) => {
                warn!(?err, page = entry.index, "page image unavailable");
                None
            }
        }
    }

    fn finish(self, status: String, clear: ClearMode) -> RenderedFrame {
        let status_row = self.status_row();
        let mut ops = Vec::new();
        for (row, cell) in self.cells.into_iter().enumerate() {
            // text ops clear their row themselves; placeholders only cover their span
            if !matches!(cell.first(), Some(DrawOp::Text { .. })) {
                ops.push(DrawOp::Blank { row: row as u16 });
            }
            ops.extend(cell);
        }
        ops.extend(self.extra);
        RenderedFrame {
            ops,
            status,
            status_row,
            clear,
        }
    }
}
