//! Static tile catalog
//!
//! Loaded once from the catalog JSON (a list of categories, each with a list of
//! tiles) and never mutated afterwards. Ids are assigned densely in file order,
//! so callers must only ever use ids they received from the catalog or the wire.

use crate::error::{WorldError, WorldResult};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which structured payload, if any, a foreground tile carries in the metadata layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKind {
    None,
    Number,
    Vanish,
    Portal,
    Text,
}

impl MetadataKind {
    /// Maps the catalog's behaviour class onto the payload it needs.
    pub fn from_class(class: Option<&str>) -> Self {
        match class {
            Some("Vanish") => MetadataKind::Vanish,
            Some("Portal") => MetadataKind::Portal,
            Some("Text") => MetadataKind::Text,
            Some(class) if class.ends_with("CoinDoor") || class.ends_with("CoinGate") => {
                MetadataKind::Number
            }
            _ => MetadataKind::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDefinition {
    pub id: u16,
    pub name: String,
    pub placeable: bool,
    pub metadata_kind: MetadataKind,
    pub minimap_color: Option<String>,
}

/// One tile as it appears in the catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub placeable: Option<bool>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogCategory {
    pub contents: Vec<CatalogEntry>,
}

/// A tile named either by id or by catalog name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileRef<'a> {
    Id(u16),
    Name(&'a str),
}

impl From<u16> for TileRef<'_> {
    fn from(id: u16) -> Self {
        TileRef::Id(id)
    }
}

impl<'a> From<&'a str> for TileRef<'a> {
    fn from(name: &'a str) -> Self {
        TileRef::Name(name)
    }
}

impl<'a> From<&'a TileDefinition> for TileRef<'a> {
    fn from(tile: &'a TileDefinition) -> Self {
        TileRef::Id(tile.id)
    }
}

#[derive(Debug, Default)]
struct TileTable {
    tiles: Vec<TileDefinition>,
    by_name: HashMap<String, u16>,
}

impl TileTable {
    fn from_categories(categories: Vec<CatalogCategory>) -> WorldResult<Self> {
        let mut table = TileTable::default();
        for entry in categories.into_iter().flat_map(|c| c.contents) {
            let id = u16::try_from(table.tiles.len()).map_err(|_| {
                WorldError::Catalog(format!("'{}' does not fit in a 16-bit tile id", entry.name))
            })?;
            table.by_name.insert(entry.name.clone(), id);
            table.tiles.push(TileDefinition {
                id,
                metadata_kind: MetadataKind::from_class(entry.class.as_deref()),
                placeable: entry.placeable.unwrap_or(true),
                minimap_color: entry.color.map(|c| format!("#{}", c)),
                name: entry.name,
            });
        }
        Ok(table)
    }

    fn get(&self, id: u16) -> Option<&TileDefinition> {
        self.tiles.get(id as usize)
    }

    fn resolve(&self, tile: TileRef<'_>) -> WorldResult<&TileDefinition> {
        let found = match tile {
            TileRef::Id(id) => self.get(id),
            TileRef::Name(name) => self.by_name.get(name).and_then(|id| self.get(*id)),
        };
        found.ok_or_else(|| match tile {
            TileRef::Id(id) => WorldError::UnknownTile(format!("#{}", id)),
            TileRef::Name(name) => WorldError::UnknownTile(format!("'{}'", name)),
        })
    }
}

/// Foreground and background lookup tables.
#[derive(Debug, Default)]
pub struct TileCatalog {
    foregrounds: TileTable,
    backgrounds: TileTable,
}

impl TileCatalog {
    pub fn new(
        foregrounds: Vec<CatalogCategory>,
        backgrounds: Vec<CatalogCategory>,
    ) -> WorldResult<Self> {
        let catalog = Self {
            foregrounds: TileTable::from_categories(foregrounds)?,
            backgrounds: TileTable::from_categories(backgrounds)?,
        };
        debug!(
            "Loaded tile catalog: {} foregrounds, {} backgrounds",
            catalog.foreground_count(),
            catalog.background_count()
        );
        Ok(catalog)
    }

    /// Parses the foreground and background catalog documents.
    pub fn from_json(foregrounds: &str, backgrounds: &str) -> WorldResult<Self> {
        let parse = |doc: &str| -> WorldResult<Vec<CatalogCategory>> {
            serde_json::from_str(doc).map_err(|e| WorldError::Catalog(e.to_string()))
        };
        Self::new(parse(foregrounds)?, parse(backgrounds)?)
    }

    pub fn foreground(&self, id: u16) -> Option<&TileDefinition> {
        self.foregrounds.get(id)
    }

    pub fn background(&self, id: u16) -> Option<&TileDefinition> {
        self.backgrounds.get(id)
    }

    pub fn resolve_foreground<'a>(
        &self,
        tile: impl Into<TileRef<'a>>,
    ) -> WorldResult<&TileDefinition> {
        self.foregrounds.resolve(tile.into())
    }

    pub fn resolve_background<'a>(
        &self,
        tile: impl Into<TileRef<'a>>,
    ) -> WorldResult<&TileDefinition> {
        self.backgrounds.resolve(tile.into())
    }

    pub fn foreground_count(&self) -> usize {
        self.foregrounds.tiles.len()
    }

    pub fn background_count(&self) -> usize {
        self.backgrounds.tiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOREGROUNDS: &str = r#"[
        {"contents": [
            {"name": "empty"},
            {"name": "shiny light grey", "color": "c0c0c0"},
            {"name": "spawn", "placeable": false}
        ]},
        {"contents": [
            {"name": "gold coin door", "class": "GoldCoinDoor"},
            {"name": "multiple blue coin gate", "class": "MultipleBlueCoinGate"},
            {"name": "vanish", "class": "Vanish"},
            {"name": "portal", "class": "Portal"},
            {"name": "sign", "class": "Text"},
            {"name": "blue key", "class": "Key"}
        ]}
    ]"#;

    #[test]
    fn test_ids_follow_file_order() {
        let catalog = TileCatalog::from_json(FOREGROUNDS, "[]").unwrap();
        assert_eq!(catalog.foreground_count(), 9);
        assert_eq!(catalog.background_count(), 0);
        assert_eq!(catalog.resolve_foreground("empty").unwrap().id, 0);
        assert_eq!(catalog.resolve_foreground("gold coin door").unwrap().id, 3);
        assert_eq!(catalog.foreground(8).unwrap().name, "blue key");
    }

    #[test]
    fn test_kinds_and_flags() {
        let catalog = TileCatalog::from_json(FOREGROUNDS, "[]").unwrap();
        let kind = |name: &str| catalog.resolve_foreground(name).unwrap().metadata_kind;

        assert_eq!(kind("empty"), MetadataKind::None);
        assert_eq!(kind("gold coin door"), MetadataKind::Number);
        assert_eq!(kind("multiple blue coin gate"), MetadataKind::Number);
        assert_eq!(kind("vanish"), MetadataKind::Vanish);
        assert_eq!(kind("portal"), MetadataKind::Portal);
        assert_eq!(kind("sign"), MetadataKind::Text);
        assert_eq!(kind("blue key"), MetadataKind::None);

        assert!(!catalog.resolve_foreground("spawn").unwrap().placeable);
        assert!(catalog.resolve_foreground("vanish").unwrap().placeable);
        assert_eq!(
            catalog.foreground(1).unwrap().minimap_color.as_deref(),
            Some("#c0c0c0")
        );
    }

    #[test]
    fn test_unknown_tiles() {
        let catalog = TileCatalog::from_json(FOREGROUNDS, "[]").unwrap();
        assert!(matches!(
            catalog.resolve_foreground("lava"),
            Err(WorldError::UnknownTile(_))
        ));
        assert!(catalog.resolve_foreground(99u16).is_err());
        assert!(catalog.resolve_background(0u16).is_err());
        assert!(catalog.foreground(9).is_none());
    }

    #[test]
    fn test_catalog_errors() {
        assert!(matches!(
            TileCatalog::from_json("{not json", "[]"),
            Err(WorldError::Catalog(_))
        ));

        let full = CatalogCategory {
            contents: (0..=u16::MAX as usize)
                .map(|i| CatalogEntry {
                    name: format!("tile {}", i),
                    placeable: None,
                    class: None,
                    color: None,
                })
                .collect(),
        };
        let catalog = TileCatalog::new(vec![full.clone()], Vec::new()).unwrap();
        assert_eq!(catalog.foreground(u16::MAX).unwrap().name, "tile 65535");

        let mut overflow = full;
        overflow.contents.push(CatalogEntry {
            name: "one too many".to_string(),
            placeable: None,
            class: None,
            color: None,
        });
        match TileCatalog::new(vec![overflow], Vec::new()) {
            Err(WorldError::Catalog(msg)) => assert!(msg.contains("one too many")),
            other => panic!("Unexpected result {:?}", other.map(|c| c.foreground_count())),
        }
    }
}
