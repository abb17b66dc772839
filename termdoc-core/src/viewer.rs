use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::pages::LoadedDocument;
use crate::reload::ReloadCheck;
use crate::search::SearchIndex;
use crate::state::{clamp_scale, Command, ViewerState};

/// What a state change means for the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Redraw,
    /// The document was swapped underneath the view; repaint in place.
    Reloaded,
}

/// The open document and the view onto it. Owned by the event loop, which is
/// the only caller of the mutating methods.
pub struct Viewer {
    state: ViewerState,
    document: LoadedDocument,
    config: ViewerConfig,
}

impl Viewer {
    pub fn new(document: LoadedDocument, config: ViewerConfig) -> Self {
        let state = ViewerState {
            force_mode: config.force,
            fit_mode: config.fit,
            dark_mode: config.dark,
            dual_page: config.dual,
            last_modified: document.modified,
            ..ViewerState::default()
        }
        .with_scale(config.scale);
        let mut viewer = Self {
            state,
            document,
            config,
        };
        viewer.relayout();
        viewer
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn document(&self) -> &LoadedDocument {
        &self.document
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn page_count(&self) -> usize {
        self.document.pages.len()
    }

    /// Backend index of the page on screen.
    pub fn current_backend_page(&self) -> Option<usize> {
        self.document
            .pages
            .get(self.state.current_page)
            .map(|entry| entry.index)
    }

    pub fn apply(&mut self, command: Command) -> Outcome {
        let last = self.page_count().saturating_sub(1);
        match command {
            Command::NextPage { count } => {
                let next = self.state.current_page.saturating_add(count).min(last);
                self.set_page(next)
            }
            Command::PrevPage { count } => {
                let next = self.state.current_page.saturating_sub(count);
                self.set_page(next)
            }
            Command::FirstPage => self.set_page(0),
            Command::LastPage => self.set_page(last),
            Command::GotoPage { number } => {
                if number == 0 || number > self.page_count() {
                    debug!(number, "ignoring out-of-range page number");
                    return Outcome::Unchanged;
                }
                self.set_page(number - 1)
            }
            Command::ScaleBy { delta } => {
                let scale = clamp_scale(self.state.scale + delta);
                if (scale - self.state.scale).abs() > f32::EPSILON {
                    self.state.scale = scale;
                    self.relayout();
                    Outcome::Redraw
                } else {
                    Outcome::Unchanged
                }
            }
            Command::CycleFitMode => {
                self.state.fit_mode = self.state.fit_mode.cycle();
                Outcome::Redraw
            }
            Command::CycleForceMode => {
                self.state.force_mode = self.state.force_mode.cycle();
                Outcome::Redraw
            }
            Command::CycleDarkMode => {
                self.state.dark_mode = self.state.dark_mode.cycle();
                Outcome::Redraw
            }
            Command::CycleDualPage => {
                self.state.dual_page = self.state.dual_page.cycle();
                Outcome::Redraw
            }
            Command::Search { query } => self.search(&query),
            Command::SearchNext { count } => self.step_search(count as isize),
            Command::SearchPrev { count } => self.step_search(-(count as isize)),
            Command::ClearSearch => {
                if !self.state.has_search() {
                    return Outcome::Unchanged;
                }
                self.state.search_query.clear();
                self.state.search_hits.clear();
                self.state.search_cursor = 0;
                Outcome::Redraw
            }
        }
    }

    /// Jumps to a 1-based backend page number received from the control
    /// channel, snapping to the nearest listed page.
    pub fn jump_to_document_page(&mut self, number: usize) -> Outcome {
        let backend_index = number.saturating_sub(1);
        match self.document.pages.nearest_position(backend_index) {
            Some(position) => {
                // the control channel always repaints, even onto the same page
                self.set_page(position);
                Outcome::Redraw
            }
            None => Outcome::Unchanged,
        }
    }

    pub fn apply_reload(&mut self, check: ReloadCheck) -> Outcome {
        match check {
            ReloadCheck::Unchanged => Outcome::Unchanged,
            ReloadCheck::Rejected { modified, reason } => {
                info!(%reason, "keeping previous document after failed reload");
                self.state.last_modified = Some(modified);
                Outcome::Unchanged
            }
            ReloadCheck::Reloaded(document) => {
                info!(
                    pages = document.pages.len(),
                    path = %document.info().path.display(),
                    "document reloaded"
                );
                self.state.last_modified = document.modified.or(self.state.last_modified);
                self.document = document;
                let last = self.page_count().saturating_sub(1);
                self.state.current_page = self.state.current_page.min(last);
                self.relayout();
                self.rebuild_search();
                Outcome::Reloaded
            }
        }
    }

    /// Target layout width in points for reflowable documents at the
    /// current zoom. `None` for fixed-layout documents.
    pub fn reflow_page_width(&self) -> Option<f32> {
        if !self.document.info().kind.is_reflowable() {
            return None;
        }
        Some(self.config.reflow_page_width / self.state.scale.max(0.1))
    }

    fn relayout(&mut self) {
        let Some(width) = self.reflow_page_width() else {
            return;
        };
        let height = width * 1.4;
        if let Err(err) = self.document.backend.relayout(width, height, 12.0) {
            debug!(?err, width, "relayout failed");
        }
    }

    fn set_page(&mut self, position: usize) -> Outcome {
        if position == self.state.current_page {
            return Outcome::Unchanged;
        }
        self.state.current_page = position;
        Outcome::Redraw
    }

    fn search(&mut self, query: &str) -> Outcome {
        let index = SearchIndex::build(&self.document.pages, query);
        self.state.search_query = index.query;
        self.state.search_hits = index.hits;
        self.state.search_cursor = 0;
        if let Some(&first) = self.state.search_hits.first() {
            if let Some(position) = self.document.pages.position_of(first) {
                self.state.current_page = position;
            }
        }
        Outcome::Redraw
    }

    fn step_search(&mut self, delta: isize) -> Outcome {
        let total = self.state.search_hits.len();
        if total == 0 {
            return Outcome::Unchanged;
        }
        let cursor = (self.state.search_cursor as isize + delta).rem_euclid(total as isize);
        self.state.search_cursor = cursor as usize;
        let target = self.state.search_hits[self.state.search_cursor];
        if let Some(position) = self.document.pages.position_of(target) {
            self.state.current_page = position;
        }
        Outcome::Redraw
    }

    fn rebuild_search(&mut self) {
        if !self.state.has_search() {
            return;
        }
        let query = self.state.search_query.clone();
        let index = SearchIndex::build(&self.document.pages, &query);
        self.state.search_hits = index.hits;
        if self.state.search_cursor >= self.state.search_hits.len() {
            self.state.search_cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisualSampling;
    use crate::state::{DarkMode, DualPageMode, FitMode, ForceMode};
    use crate::testing::{words, FakeBackend};
    use crate::DocumentKind;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn viewer_with(texts: Vec<&str>) -> Viewer {
        let backend = Arc::new(FakeBackend::with_texts(texts));
        let document = LoadedDocument::load(backend, &VisualSampling::default()).unwrap();
        Viewer::new(document, ViewerConfig::default())
    }

    fn viewer(pages: usize) -> Viewer {
        let filler = words(8);
        viewer_with(vec![filler.as_str(); pages])
    }

    #[test]
    fn starts_with_documented_defaults() {
        let viewer = viewer(3);
        let state = viewer.state();
        assert_eq!(state.current_page, 0);
        assert_eq!(state.fit_mode, FitMode::Height);
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.dark_mode, DarkMode::Off);
        assert_eq!(state.force_mode, ForceMode::Auto);
        assert_eq!(state.dual_page, DualPageMode::Off);
    }

    #[test]
    fn navigation_is_clamped_to_page_list() {
        let mut viewer = viewer(10);
        assert_eq!(viewer.apply(Command::NextPage { count: 4 }), Outcome::Redraw);
        assert_eq!(viewer.state().current_page, 4);
        viewer.apply(Command::NextPage { count: 40 });
        assert_eq!(viewer.state().current_page, 9);
        assert_eq!(viewer.apply(Command::NextPage { count: 1 }), Outcome::Unchanged);
        viewer.apply(Command::PrevPage { count: 3 });
        assert_eq!(viewer.state().current_page, 6);
        viewer.apply(Command::PrevPage { count: 30 });
        assert_eq!(viewer.state().current_page, 0);
        viewer.apply(Command::LastPage);
        assert_eq!(viewer.state().current_page, 9);
        viewer.apply(Command::FirstPage);
        assert_eq!(viewer.state().current_page, 0);
    }

    #[test]
    fn out_of_range_page_numbers_are_ignored() {
        let mut viewer = viewer(5);
        viewer.apply(Command::GotoPage { number: 3 });
        assert_eq!(viewer.state().current_page, 2);
        assert_eq!(viewer.apply(Command::GotoPage { number: 0 }), Outcome::Unchanged);
        assert_eq!(viewer.apply(Command::GotoPage { number: 6 }), Outcome::Unchanged);
        assert_eq!(viewer.state().current_page, 2);
    }

    #[test]
    fn scale_stays_within_bounds() {
        let mut viewer = viewer(1);
        for _ in 0..30 {
            viewer.apply(Command::ScaleBy { delta: 0.1 });
        }
        assert_eq!(viewer.state().scale, 2.0);
        assert_eq!(viewer.apply(Command::ScaleBy { delta: 0.1 }), Outcome::Unchanged);
        for _ in 0..30 {
            viewer.apply(Command::ScaleBy { delta: -0.1 });
        }
        assert_eq!(viewer.state().scale, 0.1);
    }

    #[test]
    fn mode_commands_cycle() {
        let mut viewer = viewer(1);
        viewer.apply(Command::CycleFitMode);
        assert_eq!(viewer.state().fit_mode, FitMode::Width);
        viewer.apply(Command::CycleForceMode);
        viewer.apply(Command::CycleForceMode);
        assert_eq!(viewer.state().force_mode, ForceMode::Image);
        viewer.apply(Command::CycleDarkMode);
        assert_eq!(viewer.state().dark_mode, DarkMode::Smart);
        viewer.apply(Command::CycleDualPage);
        viewer.apply(Command::CycleDualPage);
        assert_eq!(viewer.state().dual_page, DualPageMode::Horizontal);
    }

    #[test]
    fn search_jumps_to_list_position_of_first_hit() {
        let filler = words(6);
        let mut viewer = viewer_with(vec![
            filler.as_str(),
            "",
            filler.as_str(),
            "where is the Foo hiding today",
            filler.as_str(),
        ]);
        viewer.apply(Command::Search {
            query: "foo".to_string(),
        });
        assert_eq!(viewer.state().search_hits, vec![3]);
        // backend page 1 is blank, so page 3 sits at list position 2
        assert_eq!(viewer.state().current_page, 2);
        assert_eq!(viewer.current_backend_page(), Some(3));
    }

    #[test]
    fn search_cursor_wraps_both_ways() {
        let mut viewer = viewer_with(vec![
            "alpha needle one two",
            "beta other words here",
            "gamma needle three four",
        ]);
        viewer.apply(Command::Search {
            query: "NEEDLE".to_string(),
        });
        assert_eq!(viewer.state().search_hits, vec![0, 2]);
        viewer.apply(Command::SearchNext { count: 1 });
        assert_eq!(viewer.state().current_page, 2);
        viewer.apply(Command::SearchNext { count: 1 });
        assert_eq!(viewer.state().current_page, 0);
        viewer.apply(Command::SearchPrev { count: 1 });
        assert_eq!(viewer.state().current_page, 2);
        assert_eq!(viewer.state().search_cursor, 1);
    }

    #[test]
    fn search_without_hits_keeps_page() {
        let mut viewer = viewer(4);
        viewer.apply(Command::NextPage { count: 2 });
        viewer.apply(Command::Search {
            query: "absent".to_string(),
        });
        assert!(viewer.state().search_hits.is_empty());
        assert_eq!(viewer.state().current_page, 2);
        assert_eq!(viewer.apply(Command::SearchNext { count: 1 }), Outcome::Unchanged);
    }

    #[test]
    fn control_jump_snaps_to_nearest_content_page() {
        let filler = words(6);
        let mut viewer = viewer_with(vec![filler.as_str(), "", filler.as_str(), "", ""]);
        assert_eq!(viewer.jump_to_document_page(3), Outcome::Redraw);
        assert_eq!(viewer.state().current_page, 1);
        viewer.jump_to_document_page(2);
        assert_eq!(viewer.state().current_page, 1);
        viewer.jump_to_document_page(1);
        assert_eq!(viewer.state().current_page, 0);
        viewer.jump_to_document_page(99);
        assert_eq!(viewer.state().current_page, 1);
    }

    #[test]
    fn rejected_reload_keeps_document_and_page() {
        let mut viewer = viewer(6);
        viewer.apply(Command::NextPage { count: 4 });
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let outcome = viewer.apply_reload(ReloadCheck::Rejected {
            modified,
            reason: "no content pages".to_string(),
        });
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(viewer.state().current_page, 4);
        assert_eq!(viewer.page_count(), 6);
        assert_eq!(viewer.state().last_modified, Some(modified));
    }

    #[test]
    fn accepted_reload_clamps_page_and_refreshes_search() {
        let mut viewer = viewer(6);
        viewer.apply(Command::Search {
            query: "word3".to_string(),
        });
        viewer.apply(Command::LastPage);

        let backend = Arc::new(FakeBackend::with_texts(vec!["word3 appears here", "nothing else matches"]));
        let document = LoadedDocument::load(backend, &VisualSampling::default()).unwrap();
        let outcome = viewer.apply_reload(ReloadCheck::Reloaded(document));

        assert_eq!(outcome, Outcome::Reloaded);
        assert_eq!(viewer.page_count(), 2);
        assert_eq!(viewer.state().current_page, 1);
        assert_eq!(viewer.state().search_hits, vec![0]);
    }

    #[test]
    fn reflowable_documents_report_layout_width() {
        let mut backend = FakeBackend::with_texts(vec!["some words for the page"]);
        backend.info.kind = DocumentKind::Epub;
        let document = LoadedDocument::load(Arc::new(backend), &VisualSampling::default()).unwrap();
        let mut viewer = Viewer::new(document, ViewerConfig::default());
        assert_eq!(viewer.reflow_page_width(), Some(450.0));
        viewer.apply(Command::ScaleBy { delta: 0.5 });
        assert_eq!(viewer.reflow_page_width(), Some(300.0));

        assert_eq!(self::viewer(1).reflow_page_width(), None);
    }
}
