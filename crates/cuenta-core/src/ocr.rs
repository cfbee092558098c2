//! OCR fallback for statements without a usable text layer
//!
//! Pages are rasterized with ImageMagick `convert` (grayscale, alpha removed,
//! upscaled 200%) into a scratch directory, then each page image is run
//! through `tesseract` in page order. The scratch directory is a `TempDir`, so
//! images are removed on every exit path; with `OCR_DEBUG` set they are copied
//! out first under non-colliding names.
//!
//! Every failure here is absorbed: the caller treats empty OCR output the same
//! as "no OCR available".

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::OcrConfig;
use crate::error::{Error, Result};

/// Separator placed before each page's text
const PAGE_SEPARATOR: &str = "\n";

static DEBUG_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Something that can turn a PDF's pages into text
pub trait OcrEngine: Send + Sync {
    /// Returns an empty string on any failure
    fn extract_text(&self, path: &Path) -> String;
}

/// ImageMagick + Tesseract OCR
#[derive(Debug, Clone, Default)]
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(OcrConfig::from_env())
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn run(&self, pdf_path: &Path) -> Result<String> {
        let scratch = tempfile::Builder::new().prefix("cuenta-ocr-").tempdir()?;
        let pages = self.rasterize(pdf_path, scratch.path())?;
        info!(pages = pages.len(), dpi = self.config.dpi, "Rasterized PDF for OCR");

        let mut text = String::new();
        for page in &pages {
            match self.recognize(page) {
                Ok(page_text) => {
                    text.push_str(PAGE_SEPARATOR);
                    text.push_str(&page_text);
                }
                Err(e) => error!(page = %page.display(), error = %e, "OCR failed for page"),
            }
        }

        if self.config.debug {
            self.preserve_debug_images(&pages);
        }

        Ok(text)
    }

    /// Rasterize every page to `page-NN.png` and return them in page order
    fn rasterize(&self, pdf_path: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
        let output_pattern = format!("png:{}", dir.join("page-%02d.png").display());
        let output = Command::new(&self.config.convert_bin)
            .arg("-density")
            .arg(self.config.dpi.to_string())
            .arg(pdf_path)
            .args([
                "-colorspace",
                "Gray",
                "-alpha",
                "remove",
                "-strip",
                "-filter",
                "Triangle",
                "-resize",
                "200%",
            ])
            .arg(&output_pattern)
            .output()?;

        if !output.status.success() {
            return Err(Error::Extraction(format!(
                "{} exited with {}: {}",
                self.config.convert_bin,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        page_images(dir)
    }

    fn recognize(&self, image: &Path) -> Result<String> {
        let output = Command::new(&self.config.tesseract_bin)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.lang)
            .output()?;

        if !output.status.success() {
            return Err(Error::Extraction(format!(
                "{} exited with {}: {}",
                self.config.tesseract_bin,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn preserve_debug_images(&self, pages: &[PathBuf]) {
        if let Err(e) = fs::create_dir_all(&self.config.debug_dir) {
            warn!(dir = %self.config.debug_dir.display(), error = %e, "Cannot create OCR debug dir");
            return;
        }

        let prefix = debug_prefix();
        for page in pages {
            let Some(name) = page.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let target = self.config.debug_dir.join(format!("{}-{}", prefix, name));
            match fs::copy(page, &target) {
                Ok(_) => debug!(path = %target.display(), "Preserved OCR page image"),
                Err(e) => warn!(path = %target.display(), error = %e, "Failed to preserve OCR image"),
            }
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn extract_text(&self, path: &Path) -> String {
        match self.run(path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %path.display(), error = %e, "OCR failed");
                String::new()
            }
        }
    }
}

/// Rendered `page-N.png` files in `dir`, ordered by page number
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| {
            let number = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("page-"))
                .and_then(|n| n.strip_suffix(".png"))
                .and_then(|n| n.parse().ok())?;
            Some((number, path))
        })
        .collect();
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// `ocr-<timestamp>-<pid>-<n>`, unique per run within and across processes
fn debug_prefix() -> String {
    format!(
        "ocr-{}-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        std::process::id(),
        DEBUG_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_tools() -> OcrConfig {
        OcrConfig {
            convert_bin: "/nonexistent/convert".to_string(),
            tesseract_bin: "/nonexistent/tesseract".to_string(),
            ..OcrConfig::default()
        }
    }

    #[test]
    fn test_missing_tools_yield_empty_text() {
        let ocr = TesseractOcr::new(missing_tools());
        assert_eq!(ocr.extract_text(Path::new("/nonexistent/statement.pdf")), "");
    }

    #[test]
    fn test_pages_ordered_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-100.png", "page-11.png", "page-02.png", "page-9.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let names: Vec<String> = page_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-02.png", "page-9.png", "page-11.png", "page-100.png"]);
    }

    #[test]
    fn test_debug_prefixes_do_not_collide() {
        let a = debug_prefix();
        let b = debug_prefix();
        assert_ne!(a, b);
        assert!(a.starts_with("ocr-"));
    }

    #[test]
    fn test_debug_images_are_copied_with_unique_names() {
        let debug_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let page = scratch.path().join("page-00.png");
        fs::write(&page, b"png").unwrap();

        let ocr = TesseractOcr::new(OcrConfig {
            debug: true,
            debug_dir: debug_dir.path().to_path_buf(),
            ..missing_tools()
        });
        ocr.preserve_debug_images(std::slice::from_ref(&page));
        ocr.preserve_debug_images(std::slice::from_ref(&page));

        let names: Vec<_> = fs::read_dir(debug_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with("-page-00.png")));
    }
}
