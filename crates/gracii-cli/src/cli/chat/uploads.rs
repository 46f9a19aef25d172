use std::collections::HashMap;
use std::fmt;
use std::io::Write as _;
use std::path::{
    Path,
    PathBuf,
};

use bytes::Bytes;
use mime::Mime;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{
    debug,
    warn,
};
use url::Url;
use uuid::Uuid;

use super::consts::{
    MAX_UPLOADS,
    TEXT_SNIPPET_MAX_LINE_CHARS,
    TEXT_SNIPPET_MAX_LINES,
    UPLOAD_LIMIT_NOTICE,
};
use crate::util::directories::{
    self,
    DirectoryError,
};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{}", UPLOAD_LIMIT_NOTICE)]
    LimitReached,
    #[error("`{}` is not a file", .0.display())]
    NotAFile(PathBuf),
    #[error("cannot preview `{0}`: unrecognized image data")]
    UnsupportedImage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Whether the textual form of this id starts with `prefix`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.to_string().starts_with(&prefix.to_ascii_lowercase())
    }

    /// The first characters of the id, enough to address it from the prompt.
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(8).collect()
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Document,
    Data,
}

impl FileKind {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            FileKind::Image
        } else if mime_type.contains("pdf") || mime_type.contains("doc") {
            FileKind::Document
        } else {
            FileKind::Data
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Image => "Image",
            FileKind::Document => "Document",
            FileKind::Data => "Data File",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            FileKind::Image => "🖼️",
            FileKind::Document => "📄",
            FileKind::Data => "📊",
        }
    }
}

/// An attached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub bytes: Bytes,
}

impl FileData {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        if !tokio::fs::metadata(path).await?.is_file() {
            return Err(UploadError::NotAFile(path.to_path_buf()));
        }

        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime_for_path(path).to_string(), bytes))
    }

    /// Text preview for plain text and JSON files: the first lines, each cut to a few characters.
    pub fn text_snippet(&self) -> Option<Vec<String>> {
        let is_text = self.mime_type == mime::TEXT_PLAIN.as_ref()
            || self.mime_type == mime::APPLICATION_JSON.as_ref()
            || self.name.ends_with(".txt")
            || self.name.ends_with(".json");
        if !is_text {
            return None;
        }

        let text = String::from_utf8_lossy(&self.bytes);
        Some(
            text.lines()
                .take(TEXT_SNIPPET_MAX_LINES)
                .map(|line| line.chars().take(TEXT_SNIPPET_MAX_LINE_CHARS).collect())
                .collect(),
        )
    }
}

/// Guesses the MIME type from the file extension.
pub fn mime_for_path(path: &Path) -> Mime {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let known = match ext.as_deref() {
        Some("png") => return mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => return mime::IMAGE_JPEG,
        Some("gif") => return mime::IMAGE_GIF,
        Some("bmp") => return mime::IMAGE_BMP,
        Some("svg") => return mime::IMAGE_SVG,
        Some("pdf") => return mime::APPLICATION_PDF,
        Some("txt" | "text") => return mime::TEXT_PLAIN,
        Some("csv") => return mime::TEXT_CSV,
        Some("json") => return mime::APPLICATION_JSON,
        Some("webp") => "image/webp",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };

    known.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Handle to a materialized preview of an image upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewUrl(Url);

impl PreviewUrl {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creates and releases preview resources.
///
/// Every preview returned by [PreviewProvider::create] is handed back to
/// [PreviewProvider::revoke] exactly once.
pub trait PreviewProvider {
    fn create(&mut self, file: &FileData) -> Result<PreviewUrl, UploadError>;

    fn revoke(&mut self, preview: PreviewUrl);
}

/// Writes previews to temporary files under the previews directory.
#[derive(Debug)]
pub struct TempFilePreviews {
    dir: PathBuf,
    files: HashMap<PreviewUrl, NamedTempFile>,
}

impl TempFilePreviews {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: HashMap::new(),
        }
    }

    pub fn in_previews_dir() -> Result<Self, UploadError> {
        Ok(Self::new(directories::previews_dir()?))
    }
}

impl PreviewProvider for TempFilePreviews {
    fn create(&mut self, file: &FileData) -> Result<PreviewUrl, UploadError> {
        let ext = preview_extension(file)?;

        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix("preview-")
            .suffix(&format!(".{ext}"))
            .tempfile_in(&self.dir)?;
        tmp.write_all(&file.bytes)?;
        tmp.flush()?;

        let url = Url::from_file_path(tmp.path())
            .map_err(|()| UploadError::NotAFile(tmp.path().to_path_buf()))?;
        let preview = PreviewUrl::new(url);
        debug!(%preview, name = %file.name, "created preview");
        self.files.insert(preview.clone(), tmp);
        Ok(preview)
    }

    fn revoke(&mut self, preview: PreviewUrl) {
        match self.files.remove(&preview) {
            Some(file) => {
                if let Err(err) = file.close() {
                    warn!(%preview, ?err, "failed to delete preview");
                }
            },
            None => warn!(%preview, "revoked an unknown preview"),
        }
    }
}

/// File extension for the preview of an image upload.
///
/// Taken from the declared MIME subtype, then the file name, then sniffed from the content.
/// Content that contradicts a declared format infer can check is rejected.
fn preview_extension(file: &FileData) -> Result<String, UploadError> {
    let sniffed = infer::get(&file.bytes).filter(|kind| kind.matcher_type() == infer::MatcherType::Image);
    if sniffed.is_none() && infer::is_mime_supported(&file.mime_type) {
        return Err(UploadError::UnsupportedImage(file.name.clone()));
    }

    let declared = file
        .mime_type
        .parse::<Mime>()
        .ok()
        .filter(|mime| mime.type_() == mime::IMAGE)
        .map(|mime| match mime.subtype().as_str() {
            "jpeg" => "jpg".to_string(),
            subtype => subtype.to_ascii_lowercase(),
        });

    declared
        .or_else(|| {
            Path::new(&file.name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
        })
        .or_else(|| sniffed.map(|kind| kind.extension().to_string()))
        .ok_or_else(|| UploadError::UnsupportedImage(file.name.clone()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub id: UploadId,
    pub file: FileData,
    pub kind: FileKind,
    pub preview: Option<PreviewUrl>,
}

/// The files attached to the next message, together with the pending prompt text.
///
/// Holds at most [MAX_UPLOADS] entries. Previews are released when an upload is removed, when
/// the manager is cleared and when it is dropped.
#[derive(Debug)]
pub struct UploadManager<P: PreviewProvider = TempFilePreviews> {
    uploads: Vec<Upload>,
    pending_input: String,
    previews: P,
}

impl<P: PreviewProvider> UploadManager<P> {
    pub fn new(previews: P) -> Self {
        Self {
            uploads: Vec::new(),
            pending_input: String::new(),
            previews,
        }
    }

    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn set_pending_input(&mut self, input: impl Into<String>) {
        self.pending_input = input.into();
    }

    pub fn previews(&self) -> &P {
        &self.previews
    }

    /// Attaches a file.
    ///
    /// Fails with [UploadError::LimitReached] without touching any state once [MAX_UPLOADS] files
    /// are attached. A preview is only created for images; failing to create one keeps the upload.
    pub fn add(&mut self, file: FileData) -> Result<&Upload, UploadError> {
        if self.uploads.len() >= MAX_UPLOADS {
            return Err(UploadError::LimitReached);
        }

        let kind = FileKind::from_mime(&file.mime_type);
        let preview = match kind {
            FileKind::Image => match self.previews.create(&file) {
                Ok(preview) => Some(preview),
                Err(err) => {
                    warn!(?err, name = %file.name, "failed to create a preview");
                    None
                },
            },
            FileKind::Document | FileKind::Data => None,
        };

        let upload = Upload {
            id: UploadId::new(),
            file,
            kind,
            preview,
        };
        debug!(id = %upload.id, name = %upload.file.name, ?kind, "added upload");
        self.uploads.push(upload);
        Ok(&self.uploads[self.uploads.len() - 1])
    }

    /// Removes an upload and releases its preview.
    ///
    /// The pending input is cleared when no upload remains.
    pub fn remove(&mut self, id: UploadId) -> Option<Upload> {
        let idx = self.uploads.iter().position(|upload| upload.id == id)?;
        let mut upload = self.uploads.remove(idx);
        if let Some(preview) = upload.preview.take() {
            self.previews.revoke(preview);
        }
        if self.uploads.is_empty() {
            self.pending_input.clear();
        }
        Some(upload)
    }

    /// Finds the single upload whose id starts with `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<UploadId> {
        let mut matches = self.uploads.iter().filter(|upload| upload.id.matches_prefix(prefix));
        match (matches.next(), matches.next()) {
            (Some(upload), None) => Some(upload.id),
            _ => None,
        }
    }

    /// Releases every preview and forgets all uploads and the pending input.
    pub fn clear(&mut self) {
        for upload in self.uploads.drain(..) {
            if let Some(preview) = upload.preview {
                self.previews.revoke(preview);
            }
        }
        self.pending_input.clear();
    }
}

impl<P: PreviewProvider> Drop for UploadManager<P> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Human readable size, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    /// Counts how often every preview is created and revoked.
    #[derive(Debug, Default)]
    struct CountingPreviews {
        created: Vec<PreviewUrl>,
        revoked: Vec<PreviewUrl>,
    }

    impl PreviewProvider for CountingPreviews {
        fn create(&mut self, file: &FileData) -> Result<PreviewUrl, UploadError> {
            preview_extension(file)?;
            let url = Url::parse(&format!("blob:preview/{}", self.created.len())).unwrap();
            let preview = PreviewUrl::new(url);
            self.created.push(preview.clone());
            Ok(preview)
        }

        fn revoke(&mut self, preview: PreviewUrl) {
            self.revoked.push(preview);
        }
    }

    fn image(name: &str) -> FileData {
        FileData::new(name, "image/png", PNG)
    }

    fn text(name: &str) -> FileData {
        FileData::new(name, "text/plain", "hello")
    }

    fn assert_revoked_once(previews: &CountingPreviews) {
        let unique: HashSet<_> = previews.revoked.iter().collect();
        assert_eq!(unique.len(), previews.revoked.len(), "a preview was revoked twice");
        let created: HashSet<_> = previews.created.iter().collect();
        assert_eq!(created, unique);
    }

    #[test]
    fn test_file_kind() {
        assert_eq!(FileKind::from_mime("image/png"), FileKind::Image);
        assert_eq!(FileKind::from_mime("application/pdf"), FileKind::Document);
        assert_eq!(FileKind::from_mime("application/msword"), FileKind::Data);
        assert_eq!(
            FileKind::from_mime("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            FileKind::Document
        );
        assert_eq!(FileKind::from_mime("text/csv"), FileKind::Data);
        assert_eq!(FileKind::from_mime("application/json"), FileKind::Data);
        assert_eq!(FileKind::Data.label(), "Data File");
        assert_eq!(FileKind::Document.icon(), "📄");
    }

    #[tokio::test]
    async fn test_word_97_upload_is_a_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.doc");
        std::fs::write(&path, [0xD0, 0xCF, 0x11, 0xE0]).unwrap();

        let mut manager = UploadManager::new(CountingPreviews::default());
        let upload = manager.add(FileData::from_path(&path).await.unwrap()).unwrap();
        assert_eq!(upload.file.mime_type, "application/msword");
        assert_eq!(upload.kind, FileKind::Data);
        assert_eq!(upload.kind.label(), "Data File");
        assert!(upload.preview.is_none());
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), mime::IMAGE_PNG);
        assert_eq!(mime_for_path(Path::new("report.pdf")), mime::APPLICATION_PDF);
        assert_eq!(mime_for_path(Path::new("sheet.xlsx")).essence_str(), "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
        assert_eq!(mime_for_path(Path::new("Makefile")), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn test_upload_limit() {
        let mut manager = UploadManager::new(CountingPreviews::default());
        for i in 0..MAX_UPLOADS {
            manager.add(text(&format!("{i}.txt"))).unwrap();
        }
        manager.set_pending_input("draft");

        let before: Vec<_> = manager.uploads().iter().map(|u| u.id).collect();
        let err = manager.add(image("six.png")).unwrap_err();
        assert!(matches!(err, UploadError::LimitReached));
        assert_eq!(err.to_string(), "Maximum 5 files allowed");

        let after: Vec<_> = manager.uploads().iter().map(|u| u.id).collect();
        assert_eq!(before, after);
        assert_eq!(manager.pending_input(), "draft");
        assert!(manager.previews().created.is_empty());
    }

    #[test]
    fn test_previews_only_for_images() {
        let mut manager = UploadManager::new(CountingPreviews::default());
        let kind = manager.add(image("cat.png")).unwrap().kind;
        assert_eq!(kind, FileKind::Image);
        assert!(manager.add(text("notes.txt")).unwrap().preview.is_none());
        assert_eq!(manager.previews().created.len(), 1);
    }

    #[test]
    fn test_preview_failure_keeps_upload() {
        let mut manager = UploadManager::new(CountingPreviews::default());
        let upload = manager.add(FileData::new("broken.png", "image/png", "not an image")).unwrap();
        assert_eq!(upload.kind, FileKind::Image);
        assert!(upload.preview.is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_last_upload_clears_pending_input() {
        let mut manager = UploadManager::new(CountingPreviews::default());
        let a = manager.add(image("a.png")).unwrap().id;
        let b = manager.add(text("b.txt")).unwrap().id;
        manager.set_pending_input("describe these");

        let removed = manager.remove(a).unwrap();
        assert_eq!(removed.file.name, "a.png");
        assert_eq!(manager.pending_input(), "describe these");

        manager.remove(b).unwrap();
        assert!(manager.is_empty());
        assert_eq!(manager.pending_input(), "");
        assert!(manager.remove(b).is_none());
        assert_eq!(manager.previews().revoked.len(), 1);
    }

    #[test]
    fn test_every_preview_released_exactly_once() {
        let mut manager = UploadManager::new(CountingPreviews::default());
        let first = manager.add(image("1.png")).unwrap().id;
        manager.add(image("2.png")).unwrap();
        manager.add(text("3.txt")).unwrap();
        manager.remove(first);
        manager.add(image("4.png")).unwrap();
        manager.clear();
        manager.clear();

        assert_eq!(manager.previews().created.len(), 3);
        assert_eq!(manager.previews().revoked.len(), 3);
        assert_revoked_once(manager.previews());
        assert_eq!(manager.pending_input(), "");
    }

    #[test]
    fn test_find_by_prefix() {
        let mut manager = UploadManager::new(CountingPreviews::default());
        let id = manager.add(text("a.txt")).unwrap().id;

        assert_eq!(manager.find_by_prefix(&id.short()), Some(id));
        assert_eq!(manager.find_by_prefix(&id.short().to_uppercase()), Some(id));
        assert_eq!(manager.find_by_prefix(""), None);
        assert_eq!(manager.find_by_prefix("zzzz"), None);
    }

    #[test]
    fn test_temp_file_previews() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut manager = UploadManager::new(TempFilePreviews::new(dir.path()));
            let upload = manager.add(image("cat.png")).unwrap();
            let preview = upload.preview.clone().unwrap();
            path = preview.url().to_file_path().unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), PNG);
        }
        // Dropping the manager releases the preview.
        assert!(!path.exists());
    }

    #[test]
    fn test_svg_gets_a_preview() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = UploadManager::new(TempFilePreviews::new(dir.path()));
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"/>"#;
        let upload = manager.add(FileData::new("logo.svg", "image/svg+xml", svg)).unwrap();

        assert_eq!(upload.kind, FileKind::Image);
        let path = upload.preview.as_ref().unwrap().url().to_file_path().unwrap();
        assert_eq!(path.extension().unwrap(), "svg");
        assert_eq!(std::fs::read_to_string(path).unwrap(), svg);
    }

    #[test]
    fn test_preview_extension() {
        assert_eq!(preview_extension(&image("cat.png")).unwrap(), "png");
        assert_eq!(
            preview_extension(&FileData::new("photo", "image/jpeg", vec![0xFF_u8, 0xD8, 0xFF, 0xE0])).unwrap(),
            "jpg"
        );
        assert_eq!(
            preview_extension(&FileData::new("pic.webp", "application/octet-stream", "??")).unwrap(),
            "webp"
        );
        assert_eq!(preview_extension(&FileData::new("blob", "", PNG)).unwrap(), "png");
        assert!(matches!(
            preview_extension(&FileData::new("broken.png", "image/png", "not an image")),
            Err(UploadError::UnsupportedImage(_))
        ));
    }

    #[tokio::test]
    async fn test_file_data_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{\n  \"a\": \"a very long value indeed\"\n}\n").unwrap();

        let file = FileData::from_path(&path).await.unwrap();
        assert_eq!(file.name, "data.json");
        assert_eq!(file.mime_type, "application/json");
        assert_eq!(file.size, 38);
        assert_eq!(FileKind::from_mime(&file.mime_type), FileKind::Data);
        assert_eq!(
            file.text_snippet().unwrap(),
            vec!["{".to_string(), "  \"a\": \"a very ".to_string(), "}".to_string()]
        );

        assert!(matches!(
            FileData::from_path(dir.path()).await,
            Err(UploadError::NotAFile(_))
        ));
        assert!(image("x.png").text_snippet().is_none());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
    }
}
