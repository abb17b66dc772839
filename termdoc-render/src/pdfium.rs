use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use termdoc_core::pages::REFERENCE_DPI;
use termdoc_core::{
    document_id_for_path, DocumentBackend, DocumentInfo, DocumentKind, DocumentMetadata, DocumentProvider,
    RenderImage,
};
use tracing::{debug, instrument, warn};

/// Runtime override for the location of the pdfium shared library.
const LIBRARY_ENV: &str = "TERMDOC_PDFIUM_LIBRARY";

/// Opens PDF files. Fixed layout only: documents are never relaid out, so
/// EPUB entity handling and reflow-on-zoom need a different backend.
pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pdfium: Arc::new(bind_pdfium()?),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", path.display()))?;
        let info = read_document_info(&self.pdfium, &absolute)?;
        Ok(Arc::new(PdfiumDocument::new(Arc::clone(&self.pdfium), absolute, info)))
    }
}

struct PdfiumDocument {
    // declared before `pdfium` so it is dropped first
    document: Mutex<Option<PdfDocument<'static>>>,
    cache: Mutex<Option<LastRender>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
}

/// Last non-reference render. Redraws of the same page at the same zoom hit
/// this instead of pdfium.
struct LastRender {
    page_index: usize,
    dpi: f32,
    image: RenderImage,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            cache: Mutex::new(None),
            pdfium,
            path,
            info,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("pdfium could not reopen {}", self.path.display()))?;
        // SAFETY: the document borrows the bindings owned by self.pdfium. It is
        // stored in self.document, which is declared before self.pdfium and is
        // therefore dropped first.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        let document = match guard.take() {
            Some(document) => document,
            None => self.open_document()?,
        };
        let result = f(&document);
        *guard = Some(document);
        result
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let index: PdfPageIndex = page_index
                .try_into()
                .map_err(|_| anyhow!("page index {page_index} exceeds pdfium's page range"))?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("no page {page_index} in {}", self.path.display()))?;
            f(&page)
        })
    }

    fn render_internal(&self, page_index: usize, dpi: f32) -> Result<RenderImage> {
        self.with_page(page_index, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor((dpi / REFERENCE_DPI).max(0.01));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("rasterizing page {page_index} at {dpi} dpi"))?;
            let rgba = bitmap.as_image().to_rgba8();
            let (width, height) = rgba.dimensions();
            Ok(RenderImage {
                width,
                height,
                pixels: rgba.into_raw(),
            })
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn render_page(&self, page_index: usize, dpi: f32) -> Result<RenderImage> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page_index == page_index && (entry.dpi - dpi).abs() < f32::EPSILON {
                    return Ok(entry.image.clone());
                }
            }
        }

        let image = self.render_internal(page_index, dpi)?;
        if (dpi - REFERENCE_DPI).abs() > f32::EPSILON {
            *self.cache.lock() = Some(LastRender {
                page_index,
                dpi,
                image: image.clone(),
            });
        }
        Ok(image)
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        self.with_page(page_index, |page| {
            page.text()
                .map(|text| text.all())
                .with_context(|| format!("extracting text from page {page_index}"))
        })
    }
}

fn read_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("pdfium could not open {}", path.display()))?;
    let page_count = usize::from(document.pages().len());
    let tag = |kind| {
        document
            .metadata()
            .get(kind)
            .map(|tag| tag.value().trim().to_owned())
            .filter(|value| !value.is_empty())
    };
    let title = tag(PdfDocumentMetadataTagType::Title);
    let author = tag(PdfDocumentMetadataTagType::Author);
    debug!(page_count, ?title, "read document info");

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        kind: DocumentKind::from_path(path),
        page_count,
        metadata: DocumentMetadata { title, author },
    })
}

/// Tries the env override, then the working directory, then the system
/// library, and reports every location that failed.
fn bind_pdfium() -> Result<Pdfium> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = std::env::var_os(LIBRARY_ENV).filter(|p| !p.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    let mut failures = Vec::new();
    for candidate in &candidates {
        match Pdfium::bind_to_library(candidate) {
            Ok(bindings) => {
                debug!(library = %candidate.display(), "bound pdfium");
                return Ok(Pdfium::new(bindings));
            }
            Err(err) => {
                warn!(library = %candidate.display(), %err, "pdfium not usable");
                failures.push(format!("{}: {err}", candidate.display()));
            }
        }
    }

    Pdfium::bind_to_system_library().map(Pdfium::new).map_err(|err| {
        failures.push(format!("system: {err}"));
        anyhow!(
            "no usable pdfium library (set {LIBRARY_ENV} to its path); tried {}",
            failures.join(", ")
        )
    })
}
