//! Figure extraction: base64 figures from the OCR response → files on disk.
//!
//! The provider returns each figure as base64, sometimes wrapped in a
//! `data:` URI and occasionally with junk bytes before the real image
//! header. We scan for the first JPEG, PNG or GIF signature, drop whatever
//! precedes it, and then either keep the bytes as-is or transcode them.
//!
//! Nothing here aborts a conversion. A figure that cannot be identified is
//! written as `.bin`; one that cannot be decoded is written raw with a
//! `_raw` suffix. Both are reported through [`SavedImage::error`].
//!
//! Decoding and encoding are CPU-bound, so [`extract_figures`] runs them in
//! `spawn_blocking`.

use crate::config::ImageFormat;
use crate::error::Ocr2MdError;
use crate::output::SavedImage;
use crate::pipeline::ocr::OcrPage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Image container detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Jpeg,
    Png,
    Gif,
}

impl DetectedFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DetectedFormat::Jpeg => "jpg",
            DetectedFormat::Png => "png",
            DetectedFormat::Gif => "gif",
        }
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            DetectedFormat::Jpeg => image::ImageFormat::Jpeg,
            DetectedFormat::Png => image::ImageFormat::Png,
            DetectedFormat::Gif => image::ImageFormat::Gif,
        }
    }
}

const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const GIF_MAGIC: &[u8] = b"GIF8";

/// Locate the earliest known image signature in `data`.
pub fn find_image_start(data: &[u8]) -> Option<(usize, DetectedFormat)> {
    [
        (JPEG_MAGIC, DetectedFormat::Jpeg),
        (PNG_MAGIC, DetectedFormat::Png),
        (GIF_MAGIC, DetectedFormat::Gif),
    ]
    .into_iter()
    .filter_map(|(magic, fmt)| find_subslice(data, magic).map(|pos| (pos, fmt)))
    .min_by_key(|(pos, _)| *pos)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode a figure payload, accepting both bare base64 and `data:` URIs.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let b64 = match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => payload,
    };
    STANDARD.decode(b64.trim())
}

/// Writes figures for one document into a single directory.
#[derive(Debug, Clone)]
pub struct FigureWriter {
    dir: PathBuf,
    format: ImageFormat,
    jpeg_quality: u8,
}

impl FigureWriter {
    pub fn new(dir: impl Into<PathBuf>, format: ImageFormat, jpeg_quality: u8) -> Self {
        Self {
            dir: dir.into(),
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode, convert and write one figure. Never fails; problems are
    /// recorded on the returned [`SavedImage`].
    ///
    /// `page_index` is the provider's 0-based index; file names carry the
    /// 1-based page number, like `## Page N` headings.
    pub fn save(
        &self,
        payload: &str,
        page_index: usize,
        image_index: usize,
        id: Option<String>,
    ) -> SavedImage {
        let mut saved = SavedImage {
            page_index,
            image_index,
            id,
            path: None,
            format: None,
            dimensions: None,
            error: None,
        };
        let stem = format!("page_{}_figure_{image_index}", page_index + 1);

        let data = match decode_base64(payload) {
            Ok(d) => d,
            Err(e) => {
                saved.error = Some(format!("invalid base64: {e}"));
                return saved;
            }
        };

        let Some((start, detected)) = find_image_start(&data) else {
            let path = self.dir.join(format!("{stem}.bin"));
            saved.error = Some("could not identify image format".to_string());
            if let Err(e) = std::fs::write(&path, &data) {
                saved.error = Some(format!("could not identify image format; write failed: {e}"));
            } else {
                saved.path = Some(path);
                saved.format = Some("bin".to_string());
            }
            return saved;
        };
        let clean = &data[start..];

        match self.encode(clean, detected) {
            Ok((bytes, ext, dims)) => {
                let path = self.dir.join(format!("{stem}.{ext}"));
                match std::fs::write(&path, bytes) {
                    Ok(()) => {
                        debug!("Saved figure {} ({}x{})", path.display(), dims.0, dims.1);
                        saved.path = Some(path);
                        saved.format = Some(ext.to_string());
                        saved.dimensions = Some(dims);
                    }
                    Err(e) => saved.error = Some(format!("write failed: {e}")),
                }
            }
            Err(e) => {
                let path = self
                    .dir
                    .join(format!("{stem}_raw.{}", detected.extension()));
                match std::fs::write(&path, clean) {
                    Ok(()) => {
                        saved.error = Some(format!("image processing failed: {e}, saved raw data"));
                        saved.path = Some(path);
                        saved.format = Some(detected.extension().to_string());
                    }
                    Err(we) => {
                        saved.error = Some(format!("image processing failed: {e}; write failed: {we}"))
                    }
                }
            }
        }
        saved
    }

    /// Produce the output bytes, extension and dimensions for a figure.
    fn encode(
        &self,
        clean: &[u8],
        detected: DetectedFormat,
    ) -> Result<(Vec<u8>, &'static str, (u32, u32)), image::ImageError> {
        let img = image::load_from_memory_with_format(clean, detected.image_format())?;
        let dims = (img.width(), img.height());

        match self.format {
            ImageFormat::Original => Ok((clean.to_vec(), detected.extension(), dims)),
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let mut buf = Vec::new();
                rgb.write_with_encoder(JpegEncoder::new_with_quality(
                    &mut buf,
                    self.jpeg_quality,
                ))?;
                Ok((buf, "jpg", dims))
            }
            ImageFormat::Png => {
                let mut buf = Vec::new();
                img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
                Ok((buf, "png", dims))
            }
        }
    }
}

/// Save every figure in `pages`, taking the base64 payloads out of the
/// pages so they are not carried further.
///
/// Figures without a payload are skipped but keep their position number,
/// so `figure_3` is always the third figure on its page.
pub async fn extract_figures(
    pages: &mut [OcrPage],
    writer: FigureWriter,
) -> Result<Vec<SavedImage>, Ocr2MdError> {
    let mut jobs = Vec::new();
    for page in pages.iter_mut() {
        for (i, img) in page.images.iter_mut().enumerate() {
            if let Some(payload) = img.image_base64.take() {
                jobs.push((page.index, i + 1, img.id.clone(), payload));
            }
        }
    }
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    tokio::fs::create_dir_all(writer.dir())
        .await
        .map_err(|e| Ocr2MdError::Write {
            path: writer.dir().to_path_buf(),
            source: e,
        })?;

    let saved = tokio::task::spawn_blocking(move || {
        jobs.into_iter()
            .map(|(page, idx, id, payload)| writer.save(&payload, page, idx, id))
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| Ocr2MdError::Internal(format!("Figure task panicked: {e}")))?;

    for s in saved.iter().filter(|s| !s.is_success()) {
        warn!(
            "Page {} figure {}: {}",
            s.page_index + 1,
            s.image_index,
            s.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(saved)
}

/// Remove figures written by [`extract_figures`], and their directory once
/// it is empty. Used when the Markdown write fails after figures were saved.
pub async fn discard_figures(saved: &[SavedImage], dir: &Path) {
    for path in saved.iter().filter_map(|s| s.path.as_ref()) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove figure {}: {}", path.display(), e);
        }
    }
    // Stays when it still holds files from an earlier run.
    let _ = tokio::fs::remove_dir(dir).await;
}

static RE_IMAGE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").unwrap());

/// Point the page's figure links at the saved files.
///
/// Links whose target matches a saved figure's provider id are rewritten to
/// `link_dir/<file>`; saved figures the page never links to are appended.
pub fn rewrite_figure_links(markdown: &str, page_index: usize, saved: &[SavedImage], link_dir: &str) -> String {
    let on_page: Vec<&SavedImage> = saved
        .iter()
        .filter(|s| s.page_index == page_index && s.path.is_some())
        .collect();
    if on_page.is_empty() {
        return markdown.to_string();
    }

    let link_for = |s: &SavedImage| -> Option<String> {
        let file = s.path.as_ref()?.file_name()?.to_string_lossy().into_owned();
        let target = format!("{link_dir}/{file}");
        Some(if target.contains(' ') {
            format!("<{target}>")
        } else {
            target
        })
    };

    let mut referenced = vec![false; on_page.len()];
    let mut out = RE_IMAGE_LINK
        .replace_all(markdown, |caps: &regex::Captures| {
            let target = &caps[2];
            match on_page
                .iter()
                .position(|s| s.id.as_deref() == Some(target))
            {
                Some(pos) => {
                    referenced[pos] = true;
                    match link_for(on_page[pos]) {
                        Some(link) => format!("![{}]({})", &caps[1], link),
                        None => caps[0].to_string(),
                    }
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    for (s, _) in on_page.iter().zip(&referenced).filter(|(_, r)| !**r) {
        if let Some(link) = link_for(*s) {
            out.push_str(&format!(
                "\n\n![Figure page {} image {}]({})",
                s.page_index + 1,
                s.image_index,
                link
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::OcrImage;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([0, 128, 255, 200])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn detects_earliest_signature() {
        let mut data = b"junk".to_vec();
        data.extend_from_slice(PNG_MAGIC);
        data.extend_from_slice(b"....GIF8");
        assert_eq!(find_image_start(&data), Some((4, DetectedFormat::Png)));

        let jpeg = b"\x00\x00\xff\xd8\xff\xe0rest";
        assert_eq!(find_image_start(jpeg), Some((2, DetectedFormat::Jpeg)));

        assert_eq!(find_image_start(b"no image here"), None);
        assert_eq!(find_image_start(b""), None);
    }

    #[test]
    fn decodes_data_uri_and_bare_base64() {
        assert_eq!(decode_base64("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64("aGk=").unwrap(), b"hi");
        assert!(decode_base64("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn saves_original_format_with_prefix_stripped() {
        let dir = TempDir::new().unwrap();
        let mut data = b"\x00\x01".to_vec();
        data.extend(png_bytes());
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(&data));

        let writer = FigureWriter::new(dir.path(), ImageFormat::Original, 95);
        let saved = writer.save(&payload, 0, 1, Some("img-0.png".into()));

        assert!(saved.is_success(), "{saved:?}");
        assert_eq!(saved.format.as_deref(), Some("png"));
        assert_eq!(saved.dimensions, Some((4, 3)));
        let path = saved.path.unwrap();
        assert_eq!(path.file_name().unwrap(), "page_1_figure_1.png");
        assert_eq!(std::fs::read(path).unwrap(), png_bytes());
    }

    #[test]
    fn converts_to_jpeg() {
        let dir = TempDir::new().unwrap();
        let writer = FigureWriter::new(dir.path(), ImageFormat::Jpeg, 80);
        let saved = writer.save(&STANDARD.encode(png_bytes()), 2, 3, None);

        assert!(saved.is_success(), "{saved:?}");
        let path = saved.path.unwrap();
        assert_eq!(path.file_name().unwrap(), "page_3_figure_3.jpg");
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(find_image_start(&bytes), Some((0, DetectedFormat::Jpeg)));
    }

    #[test]
    fn unknown_bytes_saved_as_bin() {
        let dir = TempDir::new().unwrap();
        let writer = FigureWriter::new(dir.path(), ImageFormat::Png, 95);
        let saved = writer.save(&STANDARD.encode(b"not an image"), 1, 1, None);

        assert!(!saved.is_success());
        assert_eq!(saved.format.as_deref(), Some("bin"));
        assert!(saved.path.unwrap().ends_with("page_2_figure_1.bin"));
    }

    #[test]
    fn undecodable_image_saved_raw() {
        let dir = TempDir::new().unwrap();
        let mut data = PNG_MAGIC.to_vec();
        data.extend_from_slice(b"truncated");
        let writer = FigureWriter::new(dir.path(), ImageFormat::Png, 95);
        let saved = writer.save(&STANDARD.encode(&data), 0, 2, None);

        assert!(!saved.is_success());
        assert!(saved.error.as_deref().unwrap().contains("saved raw data"));
        assert!(saved.path.unwrap().ends_with("page_1_figure_2_raw.png"));
    }

    #[tokio::test]
    async fn extract_figures_takes_payloads_and_keeps_positions() {
        let dir = TempDir::new().unwrap();
        let mut pages = vec![OcrPage {
            index: 0,
            markdown: String::new(),
            images: vec![
                OcrImage {
                    id: Some("img-0.png".into()),
                    image_base64: None,
                },
                OcrImage {
                    id: Some("img-1.png".into()),
                    image_base64: Some(STANDARD.encode(png_bytes())),
                },
            ],
            dimensions: None,
        }];

        let figures_dir = dir.path().join("doc_images");
        let writer = FigureWriter::new(&figures_dir, ImageFormat::Original, 95);
        let saved = extract_figures(&mut pages, writer).await.unwrap();

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].image_index, 2);
        assert!(figures_dir.join("page_1_figure_2.png").exists());
        assert!(pages[0].images[1].image_base64.is_none());
    }

    #[tokio::test]
    async fn discard_removes_written_figures_and_empty_dir() {
        let dir = TempDir::new().unwrap();
        let figures_dir = dir.path().join("doc_images");
        let mut pages = vec![OcrPage {
            index: 0,
            images: vec![OcrImage {
                id: Some("img-0.png".into()),
                image_base64: Some(STANDARD.encode(png_bytes())),
            }],
            ..Default::default()
        }];
        let writer = FigureWriter::new(&figures_dir, ImageFormat::Png, 95);
        let saved = extract_figures(&mut pages, writer).await.unwrap();
        assert!(figures_dir.join("page_1_figure_1.png").exists());

        discard_figures(&saved, &figures_dir).await;

        assert!(!figures_dir.exists());
    }

    #[tokio::test]
    async fn discard_keeps_directory_with_other_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.png"), b"x").unwrap();
        discard_figures(&[], dir.path()).await;
        assert!(dir.path().join("keep.png").exists());
    }

    fn saved(page: usize, idx: usize, id: &str, file: &str) -> SavedImage {
        SavedImage {
            page_index: page,
            image_index: idx,
            id: Some(id.into()),
            path: Some(PathBuf::from("/out/doc_images").join(file)),
            format: Some("jpg".into()),
            dimensions: Some((1, 1)),
            error: None,
        }
    }

    #[test]
    fn rewrites_inline_links_and_appends_unreferenced() {
        let figures = vec![
            saved(0, 1, "img-0.jpeg", "page_1_figure_1.jpg"),
            saved(0, 2, "img-1.jpeg", "page_1_figure_2.jpg"),
            saved(1, 1, "img-2.jpeg", "page_2_figure_1.jpg"),
        ];
        let md = "Intro\n\n![img-0.jpeg](img-0.jpeg)\n\n![logo](https://x.test/l.png)";
        let out = rewrite_figure_links(md, 0, &figures, "doc_images");

        assert!(out.contains("![img-0.jpeg](doc_images/page_1_figure_1.jpg)"));
        assert!(out.contains("![logo](https://x.test/l.png)"));
        assert!(out.ends_with("\n\n![Figure page 1 image 2](doc_images/page_1_figure_2.jpg)"));
        assert!(!out.contains("page_2_figure_1"));
    }

    #[test]
    fn link_dir_with_spaces_uses_angle_brackets() {
        let figures = vec![saved(0, 1, "img-0.jpeg", "page_1_figure_1.jpg")];
        let out = rewrite_figure_links("![a](img-0.jpeg)", 0, &figures, "my doc_images");
        assert_eq!(out, "![a](<my doc_images/page_1_figure_1.jpg>)");
    }

    #[test]
    fn page_without_figures_is_untouched() {
        let md = "![img-0.jpeg](img-0.jpeg)";
        assert_eq!(rewrite_figure_links(md, 5, &[], "x"), md);
    }
}
