//! Corpus Loading
//!
//! Enumerates the metadata documents under a model root and loads or saves
//! them. Documents are classified by the directory that holds them
//! (`AxEdt/CustAccount.xml`, `AxTable/SalesLine.xml`, ...) and visited in path
//! order so a run over the same corpus is repeatable.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::MigrationConfig;
use crate::document::Element;
use crate::error::{MigrationError, Result};
use crate::model::Origin;

/// What a document describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    ExtendedType,
    Table,
}

/// A document found while scanning
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

/// The documents of one model root
#[derive(Debug, Clone)]
pub struct Corpus {
    pub root: PathBuf,
    pub origin: Origin,
    files: Vec<CorpusFile>,
}

impl Corpus {
    /// Scan `root` for extended data type and table documents
    pub fn scan(root: &Path, origin: Origin, config: &MigrationConfig) -> Result<Self> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if !path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("xml"))
            {
                continue;
            }

            let dir = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .unwrap_or_default();

            let kind = if config.is_edt_dir(dir) {
                DocumentKind::ExtendedType
            } else if config.is_table_dir(dir) {
                DocumentKind::Table
            } else {
                continue;
            };

            files.push(CorpusFile {
                path: path.to_path_buf(),
                kind,
            });
        }

        tracing::info!(
            "scanned {} ({:?}): {} documents",
            root.display(),
            origin,
            files.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            origin,
            files,
        })
    }

    pub fn extended_types(&self) -> impl Iterator<Item = &CorpusFile> {
        self.files
            .iter()
            .filter(|f| f.kind == DocumentKind::ExtendedType)
    }

    pub fn tables(&self) -> impl Iterator<Item = &CorpusFile> {
        self.files.iter().filter(|f| f.kind == DocumentKind::Table)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Load and parse one document, dropping a leading byte-order mark
pub fn load(path: &Path) -> Result<Element> {
    let content = fs::read_to_string(path).map_err(|e| MigrationError::from(e).in_document(path))?;
    Element::parse(content.trim_start_matches('\u{feff}')).map_err(|e| e.in_document(path))
}

/// Serialize and write one document
pub fn save(path: &Path, doc: &Element) -> Result<()> {
    let xml = doc.to_xml()?;
    fs::write(path, xml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_classifies_by_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for (sub, file) in [
            ("AxEdt", "CustAccount.xml"),
            ("AxEdt", "notes.txt"),
            ("AxTable", "SalesLine.xml"),
            ("AxTableExtension", "SalesLine.MyModel.xml"),
            ("AxClass", "SalesCalc.xml"),
        ] {
            fs::create_dir_all(root.join("MyModel").join(sub)).unwrap();
            fs::write(root.join("MyModel").join(sub).join(file), "<X/>").unwrap();
        }

        let corpus = Corpus::scan(root, Origin::Target, &MigrationConfig::default()).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.extended_types().count(), 1);
        assert_eq!(corpus.tables().count(), 2);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(Corpus::scan(&missing, Origin::Reference, &MigrationConfig::default()).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xml");
        fs::write(&path, "<AxEdt><Name>x</AxEdt>").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.xml"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CustAccount.xml");
        let doc = Element::new("AxEdt").child_element(Element::with_text("Name", "CustAccount"));

        save(&path, &doc).unwrap();
        assert_eq!(load(&path).unwrap(), doc);
    }
}
