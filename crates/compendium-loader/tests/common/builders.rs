//! Builders for test archives.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use md5::{Digest, Md5};
use zip::write::SimpleFileOptions;

/// Japanese prose long enough for statistical detection.
pub const JAPANESE_TEXT: &str = "これは日本語のテキストファイルです。研究のためのデータとコードが含まれています。\
    ファイルの文字コードはシフトジスです。ひらがなとカタカナと漢字を使っています。\
    再現可能な研究のために、すべてのファイルを一緒に保存してください。";

pub fn shift_jis(text: &str) -> Vec<u8> {
    let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(text);
    bytes.into_owned()
}

/// Builder for zip archives with files and explicit directories.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.entries
            .push((path.to_string(), Some(content.as_ref().to_vec())));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push((path.to_string(), None));
        self
    }

    /// Wraps every entry in one top-level directory, the way share
    /// downloads do.
    pub fn wrapped_in(mut self, basedir: &str) -> Self {
        for (path, _) in &mut self.entries {
            *path = format!("{}/{}", basedir, path);
        }
        self
    }

    pub fn write_zip(&self, destination: &Path) {
        let file = std::fs::File::create(destination).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (path, content) in &self.entries {
            match content {
                Some(bytes) => {
                    zip.start_file(path.as_str(), options).unwrap();
                    zip.write_all(bytes).unwrap();
                }
                None => {
                    zip.add_directory(path.as_str(), options).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }

    pub fn zip_bytes(&self) -> Vec<u8> {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archive.zip");
        self.write_zip(&path);
        std::fs::read(path).unwrap()
    }

    /// Same entries as a gzip-compressed tar stream.
    pub fn tar_gz_bytes(&self) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut tar = tar::Builder::new(encoder);
        for (path, content) in &self.entries {
            let mut header = tar::Header::new_gnu();
            match content {
                Some(bytes) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(bytes.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    tar.append_data(&mut header, path, bytes.as_slice()).unwrap();
                }
                None => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    tar.append_data(&mut header, path, std::io::empty()).unwrap();
                }
            }
        }
        tar.into_inner().unwrap().finish().unwrap()
    }
}

/// Builder for BagIt bags with an md5 manifest over the payload.
pub struct BagBuilder {
    payload: Vec<(String, Vec<u8>)>,
    corrupt_manifest: bool,
}

impl BagBuilder {
    pub fn new() -> Self {
        Self {
            payload: Vec::new(),
            corrupt_manifest: false,
        }
    }

    /// Adds `data/<path>`.
    pub fn payload(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.payload
            .push((path.to_string(), content.as_ref().to_vec()));
        self
    }

    /// Adds `data/erc.yml` declaring `id`.
    pub fn compendium(self, id: &str) -> Self {
        self.payload("erc.yml", format!("id: {}\nspec_version: 1\n", id))
    }

    /// Writes a wrong checksum for every payload file.
    pub fn with_corrupt_manifest(mut self) -> Self {
        self.corrupt_manifest = true;
        self
    }

    pub fn archive(&self) -> ArchiveBuilder {
        let mut manifest = String::new();
        let mut archive = ArchiveBuilder::new()
            .file("bagit.txt", "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n");
        for (path, content) in &self.payload {
            let sum = if self.corrupt_manifest {
                "0".repeat(32)
            } else {
                hex::encode(Md5::digest(content))
            };
            manifest.push_str(&format!("{}  data/{}\n", sum, path));
            archive = archive.file(&format!("data/{}", path), content);
        }
        archive.file("manifest-md5.txt", manifest)
    }
}

/// A bag declaring `id` with an R script next to its configuration.
pub fn compendium_bag(id: &str) -> ArchiveBuilder {
    BagBuilder::new()
        .compendium(id)
        .payload("main.R", "x <- c(1, 2, 3)\nplot(x)\n")
        .archive()
}

/// A plain workspace with a single R script.
pub fn workspace() -> ArchiveBuilder {
    ArchiveBuilder::new().file("main.R", "print('hello')\n")
}
