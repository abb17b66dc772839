//! File-based control channel. Another process writes a 1-based page number
//! into a well-known file and the viewer jumps there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::document_id_for_path;

pub fn control_path_for(document: &Path) -> PathBuf {
    std::env::temp_dir().join(format!("termdoc-{}.page", document_id_for_path(document)))
}

/// Parses the control file contents. Only a positive integer (surrounding
/// whitespace allowed) is a valid request.
pub fn parse_control_page(contents: &str) -> Option<usize> {
    contents.trim().parse::<usize>().ok().filter(|&page| page >= 1)
}

/// Owns the control file for the lifetime of a viewing session. The file is
/// created empty and removed again on drop.
#[derive(Debug)]
pub struct ControlChannel {
    path: PathBuf,
    last_seen: Option<SystemTime>,
}

impl ControlChannel {
    pub fn create(document: &Path) -> io::Result<Self> {
        Self::create_at(control_path_for(document))
    }

    pub fn create_at(path: PathBuf) -> io::Result<Self> {
        fs::write(&path, b"")?;
        let last_seen = modified(&path);
        debug!(path = %path.display(), "control channel ready");
        Ok(Self { path, last_seen })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a requested page when the file changed since the last call and
    /// holds a valid page number.
    pub fn poll(&mut self) -> Option<usize> {
        let current = modified(&self.path)?;
        if self.last_seen.is_some_and(|seen| current <= seen) {
            return None;
        }
        self.last_seen = Some(current);
        let contents = fs::read_to_string(&self.path).ok()?;
        let page = parse_control_page(&contents);
        if page.is_none() && !contents.trim().is_empty() {
            debug!(contents = contents.trim(), "ignoring malformed control request");
        }
        page
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(?err, path = %self.path.display(), "failed to remove control file");
            }
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch_later(path: &Path, contents: &str, seconds: u64) {
        fs::write(path, contents).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds))
            .unwrap();
    }

    #[test]
    fn path_is_stable_and_lives_in_temp_dir() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("paper.pdf");
        fs::write(&doc, b"%PDF").unwrap();

        let first = control_path_for(&doc);
        assert_eq!(first, control_path_for(&doc));
        assert!(first.starts_with(std::env::temp_dir()));
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("termdoc-") && name.ends_with(".page"));
    }

    #[test]
    fn parses_positive_page_numbers_only() {
        assert_eq!(parse_control_page("12\n"), Some(12));
        assert_eq!(parse_control_page("  3 "), Some(3));
        assert_eq!(parse_control_page("0"), None);
        assert_eq!(parse_control_page("-1"), None);
        assert_eq!(parse_control_page("page 4"), None);
        assert_eq!(parse_control_page(""), None);
    }

    #[test]
    fn channel_reports_new_requests_once_and_cleans_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.page");
        let mut channel = ControlChannel::create_at(path.clone()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert_eq!(channel.poll(), None);

        touch_later(&path, "7\n", 5);
        assert_eq!(channel.poll(), Some(7));
        assert_eq!(channel.poll(), None);

        touch_later(&path, "garbage", 10);
        assert_eq!(channel.poll(), None);

        drop(channel);
        assert!(!path.exists());
    }
}
