//! Character-encoding validation of text files inside a payload.

use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::EncodingConfig;
use crate::error::{ConfigError, StorageError};
use crate::sanitize;

/// A text file whose detected encoding is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingViolation {
    /// Path relative to the payload root.
    pub file: String,
    pub encoding: String,
}

pub struct ContentValidator {
    text_file: Regex,
    supported: Vec<String>,
}

impl ContentValidator {
    pub fn new(text_file: Regex, supported: Vec<String>) -> Self {
        Self {
            text_file,
            supported,
        }
    }

    pub fn from_config(config: &EncodingConfig) -> Result<Self, ConfigError> {
        let text_file =
            Regex::new(&config.text_file_regex).map_err(|e| ConfigError::InvalidPattern {
                name: "encoding.text_file_regex".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(text_file, config.supported_encodings.clone()))
    }

    /// All regular files below `root` whose name matches the text pattern,
    /// in path order.
    pub fn collect_text_files(&self, root: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| StorageError::Scan {
                path: root.to_path_buf(),
                source: e,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if self.text_file.is_match(&name) {
                files.push(entry.into_path());
            }
        }
        debug!(count = files.len(), "Collected text files");
        Ok(files)
    }

    /// Checks every file and returns all offenders, not only the first.
    pub fn check(
        &self,
        root: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<EncodingViolation>, StorageError> {
        let mut violations = Vec::new();
        for file in files {
            let bytes = std::fs::read(file).map_err(|e| StorageError::ReadFile {
                path: file.clone(),
                source: e,
            })?;
            let encoding = detect_encoding(&bytes);
            if !self.is_supported(encoding) {
                let relative = sanitize::relative_path(file, root);
                debug!(file = %relative, encoding = encoding.name(), "Unsupported encoding");
                violations.push(EncodingViolation {
                    file: relative,
                    encoding: encoding.name().to_string(),
                });
            }
        }
        Ok(violations)
    }

    fn is_supported(&self, encoding: &'static Encoding) -> bool {
        self.supported.iter().any(|label| {
            match Encoding::for_label(label.trim().as_bytes()) {
                Some(known) => known == encoding,
                None => label.eq_ignore_ascii_case(encoding.name()),
            }
        })
    }
}

/// Detects the encoding of `bytes`.
///
/// Valid UTF-8 (including pure ASCII) is always reported as UTF-8. A byte
/// order mark wins over statistical sniffing.
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, WINDOWS_1252};
    use tempfile::TempDir;

    const JAPANESE: &str = "これは日本語のテキストファイルです。研究のためのデータとコードが含まれています。\
        ファイルの文字コードはシフトジスです。ひらがなとカタカナと漢字を使っています。";

    fn validator() -> ContentValidator {
        ContentValidator::from_config(&EncodingConfig::default()).unwrap()
    }

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    // ── Detection ──

    #[test]
    fn test_ascii_is_utf8() {
        assert_eq!(detect_encoding(b"x <- c(1, 2, 3)\n"), UTF_8);
    }

    #[test]
    fn test_empty_is_utf8() {
        assert_eq!(detect_encoding(b""), UTF_8);
    }

    #[test]
    fn test_utf8_multibyte() {
        assert_eq!(detect_encoding("Grüße aus Münster".as_bytes()), UTF_8);
    }

    #[test]
    fn test_shift_jis_detected() {
        let (bytes, _, _) = SHIFT_JIS.encode(JAPANESE);
        assert_eq!(detect_encoding(&bytes).name(), "Shift_JIS");
    }

    #[test]
    fn test_latin_text_not_utf8() {
        let (bytes, _, _) = WINDOWS_1252.encode("Grüße aus Münster, schöne Größe");
        assert_ne!(detect_encoding(&bytes), UTF_8);
    }

    #[test]
    fn test_utf16_bom() {
        let bytes = [0xFF, 0xFE, b'a', 0x00];
        assert_eq!(detect_encoding(&bytes).name(), "UTF-16LE");
    }

    // ── Collection ──

    #[test]
    fn test_collect_text_files_filters_by_extension() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.R", b"1");
        write(tmp.path(), "paper.Rmd", b"1");
        write(tmp.path(), "data/table.csv", b"1");
        write(tmp.path(), "figure.png", b"\x89PNG");
        write(tmp.path(), "Makefile", b"all:");

        let files = validator().collect_text_files(tmp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| sanitize::relative_path(f, tmp.path()))
            .collect();

        assert_eq!(names, vec!["data/table.csv", "main.R", "paper.Rmd"]);
    }

    // ── Checking ──

    #[test]
    fn test_check_reports_every_offender() {
        let tmp = TempDir::new().unwrap();
        let (sjis, _, _) = SHIFT_JIS.encode(JAPANESE);
        let (latin, _, _) = WINDOWS_1252.encode("Grüße aus Münster, schöne Größe");
        write(tmp.path(), "a.txt", b"plain ascii");
        write(tmp.path(), "b.txt", &sjis);
        write(tmp.path(), "sub/c.txt", &latin);
        write(tmp.path(), "d.txt", "utf-8 ✓".as_bytes());

        let validator = validator();
        let files = validator.collect_text_files(tmp.path()).unwrap();
        let violations = validator.check(tmp.path(), &files).unwrap();

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].file, "b.txt");
        assert_eq!(violations[0].encoding, "Shift_JIS");
        assert_eq!(violations[1].file, "sub/c.txt");
    }

    #[test]
    fn test_check_all_clean() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.R", b"print('hello')");

        let validator = validator();
        let files = validator.collect_text_files(tmp.path()).unwrap();
        assert!(validator.check(tmp.path(), &files).unwrap().is_empty());
    }

    #[test]
    fn test_supported_list_accepts_labels() {
        let validator = ContentValidator::new(
            Regex::new(r"\.txt$").unwrap(),
            vec!["utf8".to_string(), "Shift_JIS".to_string()],
        );
        assert!(validator.is_supported(UTF_8));
        assert!(validator.is_supported(SHIFT_JIS));
        assert!(!validator.is_supported(WINDOWS_1252));
    }
}
