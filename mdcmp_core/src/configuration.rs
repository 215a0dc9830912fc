//! The root aggregate: one loaded configuration file. Loading is a single
//! blocking pass — the physical container tree is read and decoded first,
//! then the logical objects are parsed from the root descriptor stream and
//! cross-resolved against the finished tree.

use crate::checksum;
use crate::container::{ContainerTree, NodeId, ProgressFn};
use crate::descriptor;
use crate::objects::{
    AccountingParameters, CalcJournal, CalculationAlgorithm, Catalog, Document, Form, Journal,
    Processing, ReportItem,
};
use mdcmp_common::{MdCmpError, Result, Warning};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::info;
use uuid::Uuid;

/// Root descriptor stream; a configuration without it is not loadable.
pub const DESCRIPTOR_STREAM_PATH: &str = "Root\\Metadata\\Main MetaData Stream";
pub const GLOBAL_MODULE_PATH: &str = "Root\\TypedText\\ModuleText_Number1\\MD Programm text";
pub const TAG_STREAM_PATH: &str = "Root\\Metadata\\TagStream";
pub const GUID_DATA_PATH: &str = "Root\\Metadata\\GUIDData";

/// Header bytes preceding the packed GUID list.
const GUID_DATA_HEADER_LEN: usize = 20;

/// One parsed configuration file. Immutable once built; used only for
/// comparison.
pub struct Configuration {
    pub source: PathBuf,
    pub tree: ContainerTree,
    /// Decoded root descriptor stream.
    pub descriptor_text: String,
    pub descriptor_checksum: u32,
    pub global_module: Option<NodeId>,
    pub tag_stream: Option<NodeId>,
    pub guids: Vec<Uuid>,
    pub catalogs: Vec<Catalog>,
    pub documents: Vec<Document>,
    pub journals: Vec<Journal>,
    pub calc_journals: Vec<CalcJournal>,
    pub reports: Vec<ReportItem>,
    pub processings: Vec<Processing>,
    pub algorithms: Vec<CalculationAlgorithm>,
    pub accounting: Option<AccountingParameters>,
    pub unknown_categories: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, None, None)
    }

    /// Loads with an optional synchronous progress callback and an optional
    /// cancellation flag checked between top-level elements. Cancellation
    /// never changes the result of a completed load.
    pub fn load_with(
        path: &Path,
        progress: Option<ProgressFn>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self> {
        info!("loading configuration {}", path.display());
        let mut tree = ContainerTree::open_with(path, progress, cancel)?;
        let mut warnings = std::mem::take(&mut tree.warnings);

        let descriptor_text = tree
            .get_leaf(DESCRIPTOR_STREAM_PATH)
            .and_then(|node| node.leaf())
            .and_then(|content| content.text.clone())
            .ok_or_else(|| MdCmpError::MissingStream(DESCRIPTOR_STREAM_PATH.to_string()))?;

        let global_module = tree.get_leaf_id(GLOBAL_MODULE_PATH);
        let tag_stream = tree.get_leaf_id(TAG_STREAM_PATH);

        let guids = match tree.get_leaf(GUID_DATA_PATH).and_then(|node| node.leaf()) {
            Some(content) => parse_guid_list(&content.raw),
            None => {
                warnings.push(Warning::StructureMismatch {
                    path: GUID_DATA_PATH.to_string(),
                    detail: "GUID stream missing".to_string(),
                });
                Vec::new()
            }
        };

        let objects = descriptor::parse_descriptor(&descriptor_text, &tree);
        warnings.extend(objects.warnings);

        info!(
            "loaded {}: {} catalogs, {} documents, {} warnings",
            path.display(),
            objects.catalogs.len(),
            objects.documents.len(),
            warnings.len()
        );

        Ok(Configuration {
            source: path.to_path_buf(),
            descriptor_checksum: checksum::text_checksum(&descriptor_text),
            descriptor_text,
            global_module,
            tag_stream,
            guids,
            catalogs: objects.catalogs,
            documents: objects.documents,
            journals: objects.journals,
            calc_journals: objects.calc_journals,
            reports: objects.reports,
            processings: objects.processings,
            algorithms: objects.algorithms,
            accounting: objects.accounting,
            unknown_categories: objects.unknown_categories,
            warnings,
            tree,
        })
    }

    /// Persists the unrecognized-category list next to the source file as
    /// `<file>.errorlog`. Returns the sidecar path, or `None` when there was
    /// nothing to write.
    pub fn write_error_log(&self) -> Result<Option<PathBuf>> {
        if self.unknown_categories.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(format!("{}.errorlog", self.source.display()));
        let mut text = String::new();
        for tag in &self.unknown_categories {
            text.push_str(tag);
            text.push_str("\r\n");
        }
        fs::write(&path, text)?;
        Ok(Some(path))
    }
}

/// Extracts the packed GUID list: a fixed header followed by consecutive
/// 16-byte little-endian GUID values.
pub(crate) fn parse_guid_list(raw: &[u8]) -> Vec<Uuid> {
    let mut guids = Vec::new();
    let mut index = 0usize;
    while raw.len().saturating_sub(GUID_DATA_HEADER_LEN + 16 * index) >= 16 {
        let start = GUID_DATA_HEADER_LEN + 16 * index;
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&raw[start..start + 16]);
        guids.push(Uuid::from_bytes_le(buffer));
        index += 1;
    }
    guids
}

/// A standalone processing file: a container holding a single processing,
/// with the descriptor stream and the form at the container root.
pub struct ExternalProcessing {
    pub source: PathBuf,
    pub identity: String,
    pub alias: String,
    pub descriptor_text: String,
    pub form: Form,
    pub tree: ContainerTree,
}

impl ExternalProcessing {
    pub fn load(path: &Path) -> Result<Self> {
        let tree = ContainerTree::open(path)?;
        let descriptor_text = tree
            .get_leaf("Root\\Main MetaData Stream")
            .and_then(|node| node.leaf())
            .and_then(|content| content.text.clone())
            .ok_or_else(|| {
                MdCmpError::MissingStream("Root\\Main MetaData Stream".to_string())
            })?;
        let form = Form::from_container(&tree, tree.root());

        Ok(ExternalProcessing {
            identity: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            alias: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source: path.to_path_buf(),
            descriptor_text,
            form,
            tree,
        })
    }
}
