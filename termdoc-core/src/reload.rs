use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, info, instrument, warn};

use crate::config::{ReloadConfig, VisualSampling};
use crate::pages::LoadedDocument;
use crate::DocumentProvider;

/// Result of one reload poll.
pub enum ReloadCheck {
    Unchanged,
    /// The file changed but could not be turned into a usable document. The
    /// new timestamp is reported so the same revision is not retried.
    Rejected { modified: SystemTime, reason: String },
    Reloaded(LoadedDocument),
}

impl std::fmt::Debug for ReloadCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadCheck::Unchanged => f.write_str("Unchanged"),
            ReloadCheck::Rejected { modified, reason } => f
                .debug_struct("Rejected")
                .field("modified", modified)
                .field("reason", reason)
                .finish(),
            ReloadCheck::Reloaded(doc) => f
                .debug_tuple("Reloaded")
                .field(&doc.pages.len())
                .finish(),
        }
    }
}

/// Checks whether `path` changed after `last_modified` and, if so, reopens it
/// once its size has stopped changing.
#[instrument(skip(provider, sampling, config), fields(path = %path.display()))]
pub async fn check_for_reload(
    path: &Path,
    last_modified: Option<SystemTime>,
    provider: &dyn DocumentProvider,
    sampling: &VisualSampling,
    config: &ReloadConfig,
) -> ReloadCheck {
    let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
        return ReloadCheck::Unchanged;
    };
    if last_modified.is_some_and(|seen| modified <= seen) {
        return ReloadCheck::Unchanged;
    }

    if !wait_until_stable(path, config).await {
        debug!("file still changing, keeping current document");
    }

    let backend = match provider.open(path).await {
        Ok(backend) => backend,
        Err(err) => {
            warn!(?err, "reopening changed document failed");
            return ReloadCheck::Rejected {
                modified,
                reason: format!("{:#}", err),
            };
        }
    };

    let sampling = *sampling;
    let loaded = tokio::task::spawn_blocking(move || LoadedDocument::load(backend, &sampling)).await;
    match loaded {
        Ok(Ok(mut document)) => {
            info!(pages = document.pages.len(), "changed document rebuilt");
            document.modified = Some(modified);
            ReloadCheck::Reloaded(document)
        }
        Ok(Err(err)) => {
            warn!(%err, "changed document has no usable pages");
            ReloadCheck::Rejected {
                modified,
                reason: err.to_string(),
            }
        }
        Err(err) => ReloadCheck::Rejected {
            modified,
            reason: format!("page scan aborted: {}", err),
        },
    }
}

/// Polls the file size until two consecutive reads agree. Returns `false`
/// when the attempts run out first.
async fn wait_until_stable(path: &Path, config: &ReloadConfig) -> bool {
    let size = |path: &Path| fs::metadata(path).map(|meta| meta.len()).ok();
    let mut previous = size(path);
    for _ in 0..config.settle_attempts {
        tokio::time::sleep(config.settle_interval).await;
        let current = size(path);
        if current.is_some() && current == previous {
            return true;
        }
        previous = current;
    }
    false
}
