//! Compound-container reader. Opens the binary container read-only and
//! builds a typed descriptor tree: at every level the manifest stream
//! `Container.Contents` is read first, then physical elements are matched to
//! it by name. Payload bytes are attached to matched leaves and decoded in
//! the same pass; the tree is immutable afterward.

use crate::decoder;
use cfb::CompoundFile;
use mdcmp_common::{MdCmpError, Result, Warning};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::module_parser::Module;

/// Manifest stream present at every container level.
pub const CONTENTS_STREAM: &str = "Container.Contents";

/// Synchronous progress callback: message and percent complete.
pub type ProgressFn<'a> = &'a dyn Fn(&str, u32);

/// Storage roles of the container format. Role names are the manifest
/// strings with dots removed (`Moxcel.Worksheet` → `MoxcelWorksheet`);
/// `RigthType` is spelled the way the format spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageRole {
    MetaDataContainer,
    SubcontoContainer,
    SublistContainer,
    SubcontoGroupFolder,
    DocumentContainer,
    JournalContainer,
    ReportContainer,
    TypedTextContainer,
    UserDefContainer,
    PictureContainer,
    CalcJournalContainer,
    CalcVarContainer,
    AccountChartListContainer,
    AccountChartContainer,
    OperationListContainer,
    OperationContainer,
    GlobalDataContainer,
    ProvListContainer,
    TypedObjectContainer,
    WorkBookContainer,
    ModuleContainer,
    WorkPlaceType,
    RigthType,
    UsersInterfaceType,
    SubUsersInterfaceType,
    MetaDataStream,
    MetaDataHolderContainer,
    GuidHistoryContainer,
    TagStream,
    MetaDataDescription,
    DialogEditor,
    TextDocument,
    MoxcelWorksheet,
    MenuEditorType,
    ToolbarEditorType,
    PictureGalleryContainer,
}

impl StorageRole {
    /// Resolves a manifest role string (dots already removed) to a role.
    pub fn from_manifest(tag: &str) -> Option<Self> {
        use StorageRole::*;
        Some(match tag {
            "MetaDataContainer" => MetaDataContainer,
            "SubcontoContainer" => SubcontoContainer,
            "SublistContainer" => SublistContainer,
            "SubcontoGroupFolder" => SubcontoGroupFolder,
            "DocumentContainer" => DocumentContainer,
            "JournalContainer" => JournalContainer,
            "ReportContainer" => ReportContainer,
            "TypedTextContainer" => TypedTextContainer,
            "UserDefContainer" => UserDefContainer,
            "PictureContainer" => PictureContainer,
            "CalcJournalContainer" => CalcJournalContainer,
            "CalcVarContainer" => CalcVarContainer,
            "AccountChartListContainer" => AccountChartListContainer,
            "AccountChartContainer" => AccountChartContainer,
            "OperationListContainer" => OperationListContainer,
            "OperationContainer" => OperationContainer,
            "GlobalDataContainer" => GlobalDataContainer,
            "ProvListContainer" => ProvListContainer,
            "TypedObjectContainer" => TypedObjectContainer,
            "WorkBookContainer" => WorkBookContainer,
            "ModuleContainer" => ModuleContainer,
            "WorkPlaceType" => WorkPlaceType,
            "RigthType" => RigthType,
            "UsersInterfaceType" => UsersInterfaceType,
            "SubUsersInterfaceType" => SubUsersInterfaceType,
            "MetaDataStream" => MetaDataStream,
            "MetaDataHolderContainer" => MetaDataHolderContainer,
            "GuidHistoryContainer" => GuidHistoryContainer,
            "TagStream" => TagStream,
            "MetaDataDescription" => MetaDataDescription,
            "DialogEditor" => DialogEditor,
            "TextDocument" => TextDocument,
            "MoxcelWorksheet" => MoxcelWorksheet,
            "MenuEditorType" => MenuEditorType,
            "ToolbarEditorType" => ToolbarEditorType,
            "PictureGalleryContainer" => PictureGalleryContainer,
            _ => return None,
        })
    }

    /// Whether elements of this role are substorages rather than streams.
    pub fn is_container(self) -> bool {
        use StorageRole::*;
        matches!(
            self,
            MetaDataContainer
                | SubcontoContainer
                | SublistContainer
                | SubcontoGroupFolder
                | DocumentContainer
                | JournalContainer
                | ReportContainer
                | TypedTextContainer
                | UserDefContainer
                | PictureContainer
                | CalcJournalContainer
                | CalcVarContainer
                | AccountChartListContainer
                | AccountChartContainer
                | OperationListContainer
                | OperationContainer
                | GlobalDataContainer
                | ProvListContainer
                | TypedObjectContainer
                | WorkBookContainer
                | ModuleContainer
                | WorkPlaceType
                | RigthType
                | UsersInterfaceType
                | SubUsersInterfaceType
        )
    }
}

/// Handle into the tree's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Decoded payload of a leaf stream.
#[derive(Debug, Default, Clone)]
pub struct LeafContent {
    pub raw: Vec<u8>,
    pub text: Option<String>,
    pub module: Option<Module>,
    pub checksum: u32,
    pub compressed: bool,
    pub encrypted: bool,
}

#[derive(Debug)]
enum NodeKind {
    Container { children: Vec<NodeId> },
    Leaf(LeafContent),
}

/// One descriptor in the container tree: either a substorage with children
/// or a leaf stream with decoded payload. The parent link is a handle into
/// the owning arena, used for navigation only.
#[derive(Debug)]
pub struct Node {
    pub role: StorageRole,
    pub name: String,
    pub description: String,
    pub path: String,
    pub parent: Option<NodeId>,
    kind: NodeKind,
}

impl Node {
    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container { .. })
    }

    pub fn leaf(&self) -> Option<&LeafContent> {
        match &self.kind {
            NodeKind::Leaf(content) => Some(content),
            NodeKind::Container { .. } => None,
        }
    }
}

struct ManifestEntry {
    role: StorageRole,
    name: String,
    description: String,
}

/// The loaded container tree.
pub struct ContainerTree {
    nodes: Vec<Node>,
    root: NodeId,
    pub warnings: Vec<Warning>,
}

impl ContainerTree {
    /// Opens a compound container and reads the full descriptor tree.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, None, None)
    }

    /// A tree holding only the root container; lookups all miss.
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        ContainerTree {
            nodes: vec![Node {
                role: StorageRole::MetaDataContainer,
                name: "Root".to_string(),
                description: String::new(),
                path: "Root".to_string(),
                parent: None,
                kind: NodeKind::Container {
                    children: Vec::new(),
                },
            }],
            root: NodeId(0),
            warnings: Vec::new(),
        }
    }

    /// Opens with an optional progress callback (invoked synchronously) and
    /// an optional cancellation flag checked between top-level elements.
    pub fn open_with(
        path: &Path,
        progress: Option<ProgressFn>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let mut comp = CompoundFile::open(file).map_err(|e| {
            MdCmpError::ContainerFormat(format!("{}: {}", path.display(), e))
        })?;

        let mut tree = ContainerTree {
            nodes: vec![Node {
                role: StorageRole::MetaDataContainer,
                name: "Root".to_string(),
                description: String::new(),
                path: "Root".to_string(),
                parent: None,
                kind: NodeKind::Container {
                    children: Vec::new(),
                },
            }],
            root: NodeId(0),
            warnings: Vec::new(),
        };

        let root = tree.root;
        tree.read_level(&mut comp, Path::new("/"), root, true, progress, cancel)?;
        Ok(tree)
    }

    fn read_level(
        &mut self,
        comp: &mut CompoundFile<File>,
        storage_path: &Path,
        node_id: NodeId,
        top_level: bool,
        progress: Option<ProgressFn>,
        cancel: Option<&AtomicBool>,
    ) -> Result<()> {
        let manifest_raw = read_stream(comp, &storage_path.join(CONTENTS_STREAM)).map_err(
            |_| {
                MdCmpError::ContainerFormat(format!(
                    "missing {} in storage {}",
                    CONTENTS_STREAM,
                    storage_path.display()
                ))
            },
        )?;
        let manifest_text = decoder::windows_1251(&manifest_raw);
        let node_path = self.node(node_id).path.clone();
        let entries = self.parse_manifest(&manifest_text, &node_path);

        for entry in entries {
            let kind = if entry.role.is_container() {
                NodeKind::Container {
                    children: Vec::new(),
                }
            } else {
                NodeKind::Leaf(LeafContent::default())
            };
            let child = self.push_node(Node {
                role: entry.role,
                path: format!("{}\\{}", node_path, entry.name),
                name: entry.name,
                description: entry.description,
                parent: Some(node_id),
                kind,
            });
            match &mut self.nodes[node_id.0 as usize].kind {
                NodeKind::Container { children } => children.push(child),
                NodeKind::Leaf(_) => unreachable!("levels are always containers"),
            }
        }

        let physical: Vec<(String, bool)> = comp
            .read_storage(storage_path)
            .map_err(|e| {
                MdCmpError::ContainerFormat(format!("{}: {}", storage_path.display(), e))
            })?
            .map(|entry| (entry.name().to_string(), entry.is_storage()))
            .collect();

        let mut matched: Vec<NodeId> = Vec::new();
        let total = physical.len().max(1);

        for (index, (name, is_storage)) in physical.iter().enumerate() {
            if top_level {
                if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                    return Err(MdCmpError::Cancelled);
                }
                if let Some(report) = progress {
                    report(name, (index * 100 / total) as u32);
                }
            }
            if name == CONTENTS_STREAM {
                continue;
            }

            let child = self.children(node_id).iter().copied().find(|id| {
                let node = self.node(*id);
                node.name == *name && node.is_container() == *is_storage
            });
            let Some(child) = child else {
                debug!("no manifest entry for physical element {}", name);
                self.warnings.push(Warning::StructureMismatch {
                    path: node_path.clone(),
                    detail: format!("no manifest entry for element \"{}\"", name),
                });
                continue;
            };
            matched.push(child);

            let element_path = storage_path.join(name);
            if *is_storage {
                self.read_level(comp, &element_path, child, false, progress, cancel)?;
            } else {
                let raw = read_stream(comp, &element_path)?;
                let role = self.node(child).role;
                let decoded = decoder::decode(role, &raw);
                if let Some(detail) = decoded.error {
                    self.warnings.push(Warning::Decode {
                        path: self.node(child).path.clone(),
                        detail,
                    });
                }
                match &mut self.nodes[child.0 as usize].kind {
                    NodeKind::Leaf(content) => {
                        *content = LeafContent {
                            raw,
                            text: decoded.text,
                            module: decoded.module,
                            checksum: decoded.checksum,
                            compressed: decoded.compressed,
                            encrypted: decoded.encrypted,
                        };
                    }
                    NodeKind::Container { .. } => unreachable!("matched by leaf flag"),
                }
            }
        }

        for id in self.children(node_id).to_vec() {
            if !matched.contains(&id) {
                let name = self.node(id).name.clone();
                self.warnings.push(Warning::StructureMismatch {
                    path: node_path.clone(),
                    detail: format!("no physical element for manifest entry \"{}\"", name),
                });
            }
        }

        Ok(())
    }

    fn parse_manifest(&mut self, text: &str, parent_path: &str) -> Vec<ManifestEntry> {
        let text = text.trim_end();
        let mut entries = Vec::new();

        let Some(body) = text.strip_prefix("{\"Container.Contents\"") else {
            self.warnings.push(Warning::StructureMismatch {
                path: parent_path.to_string(),
                detail: "manifest does not start with Container.Contents".to_string(),
            });
            return entries;
        };
        let Some(body) = body.strip_prefix(',') else {
            // childless level
            return entries;
        };
        let body = &body[..body.len().saturating_sub(2)];

        for tuple in body.replace("},{", "#").split('#') {
            let cleaned = tuple.replace('{', "").replace('}', "").replace('"', "");
            let fields: Vec<&str> = cleaned.split(',').collect();
            if fields.len() < 3 {
                self.warnings.push(Warning::StructureMismatch {
                    path: parent_path.to_string(),
                    detail: format!("short manifest tuple \"{}\"", tuple),
                });
                continue;
            }
            let tag = fields[0].replace('.', "");
            let Some(role) = StorageRole::from_manifest(&tag) else {
                self.warnings.push(Warning::StructureMismatch {
                    path: parent_path.to_string(),
                    detail: format!("unknown storage role \"{}\"", fields[0]),
                });
                continue;
            };
            let mut description = fields[2].to_string();
            if role == StorageRole::MoxcelWorksheet && description == "Moxel WorkPlace" {
                description = "Таблица".to_string();
            }
            entries.push(ManifestEntry {
                role,
                name: fields[1].to_string(),
                description,
            });
        }
        entries
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Container { children } => children,
            NodeKind::Leaf(_) => &[],
        }
    }

    /// First child leaf of the given role, in manifest order.
    pub fn child_by_role(&self, container: NodeId, role: StorageRole) -> Option<NodeId> {
        self.children(container)
            .iter()
            .copied()
            .find(|id| self.node(*id).role == role)
    }

    /// All child leaves of the given role, in manifest order.
    pub fn children_by_role(&self, container: NodeId, role: StorageRole) -> Vec<NodeId> {
        self.children(container)
            .iter()
            .copied()
            .filter(|id| self.node(*id).role == role)
            .collect()
    }

    fn path_components<'a>(&self, path: &'a str) -> Vec<&'a str> {
        let mut components: Vec<&str> =
            path.split('\\').filter(|c| !c.is_empty()).collect();
        if components.first() == Some(&self.node(self.root).name.as_str()) {
            components.remove(0);
        }
        components
    }

    /// Resolves a backslash-delimited path to a leaf. A container at the end
    /// of the path, or a missing component, yields `None`.
    pub fn get_leaf(&self, path: &str) -> Option<&Node> {
        self.get_leaf_id(path).map(|id| self.node(id))
    }

    /// Handle form of [`get_leaf`].
    pub fn get_leaf_id(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root;
        for component in self.path_components(path) {
            let child = self
                .children(current)
                .iter()
                .copied()
                .find(|id| self.node(*id).name == component)?;
            if self.node(child).is_container() {
                current = child;
            } else {
                return Some(child);
            }
        }
        None
    }

    /// Resolves a backslash-delimited path to a container. A leaf on the
    /// path yields `None`; an empty path yields the starting container.
    pub fn get_container(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root;
        for component in self.path_components(path) {
            let child = self
                .children(current)
                .iter()
                .copied()
                .find(|id| self.node(*id).name == component)?;
            if !self.node(child).is_container() {
                return None;
            }
            current = child;
        }
        Some(current)
    }

    /// Checksum of the leaf at `id`, 0 when the payload is missing.
    pub fn leaf_checksum(&self, id: NodeId) -> u32 {
        self.node(id).leaf().map(|c| c.checksum).unwrap_or(0)
    }

    /// Parsed module of the leaf at `id`, if its role carries one.
    pub fn leaf_module(&self, id: NodeId) -> Option<&Module> {
        self.node(id).leaf().and_then(|c| c.module.as_ref())
    }
}

fn read_stream(comp: &mut CompoundFile<File>, path: &Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut stream = comp.open_stream(path)?;
    let mut buffer = Vec::with_capacity(stream.len() as usize);
    stream.read_to_end(&mut buffer)?;
    Ok(buffer)
}
