use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use crate::world::{TileId, TileWalkabilityTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileTypeErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    MissingAttribute,
    InvalidValue,
    DuplicateTileId,
}

#[derive(Debug, Clone)]
pub struct TileTypeError {
    pub code: TileTypeErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for TileTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for TileTypeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileType {
    pub id: TileId,
    pub name: String,
    pub walkable: bool,
}

/// Tile-type metadata keyed by id. Ids without an entry are not walkable.
#[derive(Debug, Clone, Default)]
pub struct TileTypeTable {
    types: BTreeMap<TileId, TileType>,
}

impl TileTypeTable {
    pub fn load(path: &Path) -> Result<Self, TileTypeError> {
        let raw = fs::read_to_string(path).map_err(|error| TileTypeError {
            code: TileTypeErrorCode::ReadFile,
            message: format!("failed to read tile types: {error}"),
            file_path: path.to_path_buf(),
            location: None,
        })?;
        let table = Self::parse(path, &raw)?;
        info!(
            path = %path.display(),
            tile_type_count = table.len(),
            "tile_types_loaded"
        );
        Ok(table)
    }

    pub fn parse(file_path: &Path, raw: &str) -> Result<Self, TileTypeError> {
        let doc = Document::parse(raw).map_err(|error| TileTypeError {
            code: TileTypeErrorCode::XmlMalformed,
            message: format!("malformed XML: {error}"),
            file_path: file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            }),
        })?;

        let root = doc.root_element();
        if root.tag_name().name() != "TileTypes" {
            return Err(error_at_node(
                TileTypeErrorCode::InvalidRoot,
                "root element must be <TileTypes>".to_string(),
                file_path,
                &doc,
                root,
            ));
        }

        let mut types = BTreeMap::new();
        let mut seen = HashSet::<u16>::new();
        for child in root.children().filter(|node| node.is_element()) {
            if child.tag_name().name() != "TileType" {
                return Err(error_at_node(
                    TileTypeErrorCode::UnknownElement,
                    format!(
                        "unsupported element <{}>; expected <TileType>",
                        child.tag_name().name()
                    ),
                    file_path,
                    &doc,
                    child,
                ));
            }
            let tile_type = parse_tile_type(file_path, &doc, child)?;
            if !seen.insert(tile_type.id.0) {
                return Err(error_at_node(
                    TileTypeErrorCode::DuplicateTileId,
                    format!("tile id {} is defined more than once", tile_type.id.0),
                    file_path,
                    &doc,
                    child,
                ));
            }
            types.insert(tile_type.id, tile_type);
        }

        Ok(Self { types })
    }

    pub fn from_types(types: impl IntoIterator<Item = TileType>) -> Self {
        Self {
            types: types.into_iter().map(|ty| (ty.id, ty)).collect(),
        }
    }

    pub fn get(&self, id: TileId) -> Option<&TileType> {
        self.types.get(&id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TileWalkabilityTable for TileTypeTable {
    fn is_walkable(&self, tile: TileId) -> bool {
        self.types.get(&tile).is_some_and(|ty| ty.walkable)
    }
}

fn parse_tile_type(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<TileType, TileTypeError> {
    let id_raw = required_attribute(file_path, doc, node, "id")?;
    let id = id_raw.trim().parse::<u16>().map_err(|_| {
        error_at_node(
            TileTypeErrorCode::InvalidValue,
            format!("id '{id_raw}' is not an integer in 0..=65535"),
            file_path,
            doc,
            node,
        )
    })?;
    let name = required_attribute(file_path, doc, node, "name")?
        .trim()
        .to_string();
    let walkable = match node.attribute("walkable").map(str::trim) {
        None | Some("true") => true,
        Some("false") => false,
        Some(other) => {
            return Err(error_at_node(
                TileTypeErrorCode::InvalidValue,
                format!("walkable must be 'true' or 'false', got '{other}'"),
                file_path,
                doc,
                node,
            ))
        }
    };
    Ok(TileType {
        id: TileId(id),
        name,
        walkable,
    })
}

fn required_attribute<'a>(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'a, '_>,
    name: &str,
) -> Result<&'a str, TileTypeError> {
    node.attribute(name).ok_or_else(|| {
        error_at_node(
            TileTypeErrorCode::MissingAttribute,
            format!("<TileType> is missing attribute '{name}'"),
            file_path,
            doc,
            node,
        )
    })
}

fn error_at_node(
    code: TileTypeErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> TileTypeError {
    let pos = doc.text_pos_at(node.range().start);
    TileTypeError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}
