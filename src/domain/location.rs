//! Warehouse location hierarchy: region → city → warehouse → zone → section.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_BULK_IDS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind { Region, City, Warehouse, Zone, Section }

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [Self::Region, Self::City, Self::Warehouse, Self::Zone, Self::Section];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Region => "warehouse_regions",
            Self::City => "warehouse_cities",
            Self::Warehouse => "warehouse_warehouses",
            Self::Zone => "warehouse_zones",
            Self::Section => "warehouse_sections",
        }
    }

    /// Column holding the parent id, `None` for the root level.
    pub fn parent_column(&self) -> Option<&'static str> {
        match self {
            Self::Region => None,
            Self::City => Some("region_id"),
            Self::Warehouse => Some("city_id"),
            Self::Zone => Some("warehouse_id"),
            Self::Section => Some("zone_id"),
        }
    }

    pub fn parent(&self) -> Option<NodeKind> {
        match self {
            Self::Region => None,
            Self::City => Some(Self::Region),
            Self::Warehouse => Some(Self::City),
            Self::Zone => Some(Self::Warehouse),
            Self::Section => Some(Self::Zone),
        }
    }

    /// Table and foreign key column of the rows that reference this level.
    pub fn children(&self) -> (&'static str, &'static str) {
        match self {
            Self::Region => ("warehouse_cities", "region_id"),
            Self::City => ("warehouse_warehouses", "city_id"),
            Self::Warehouse => ("warehouse_zones", "warehouse_id"),
            Self::Zone => ("warehouse_sections", "zone_id"),
            Self::Section => ("warehouse_inventory", "section_id"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::City => "city",
            Self::Warehouse => "warehouse",
            Self::Zone => "zone",
            Self::Section => "section",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Region => "Region",
            Self::City => "City",
            Self::Warehouse => "Warehouse",
            Self::Zone => "Zone",
            Self::Section => "Section",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for NodeKind {
    type Err = String;
    /// Accepts both the singular name and the collection path segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region" | "regions" => Ok(Self::Region),
            "city" | "cities" => Ok(Self::City),
            "warehouse" | "warehouses" => Ok(Self::Warehouse),
            "zone" | "zones" => Ok(Self::Zone),
            "section" | "sections" => Ok(Self::Section),
            other => Err(format!("Unknown location level {other:?}")),
        }
    }
}

/// Flat row used to assemble the hierarchy tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub code: String,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: Uuid,
    pub kind: NodeKind,
    pub name: String,
    pub code: String,
    pub is_active: bool,
    pub children: Vec<TreeNode>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LocationTree {
    pub regions: Vec<TreeNode>,
    /// Nodes whose parent was not in the snapshot.
    pub orphans: usize,
}

/// Nests each level under its parent. Siblings are ordered by name.
pub fn build_tree(levels: &HashMap<NodeKind, Vec<LocationNode>>) -> LocationTree {
    let mut orphans = 0;
    let mut below: HashMap<Uuid, Vec<TreeNode>> = HashMap::new();

    for kind in NodeKind::ALL.iter().rev() {
        let nodes = levels.get(kind).map(Vec::as_slice).unwrap_or(&[]);
        let mut children = std::mem::take(&mut below);
        let mut grouped: HashMap<Uuid, Vec<TreeNode>> = HashMap::new();
        let mut roots = Vec::new();

        for node in nodes {
            let mut kids = children.remove(&node.id).unwrap_or_default();
            kids.sort_by(|a, b| a.name.cmp(&b.name));
            let tree_node = TreeNode {
                id: node.id, kind: *kind, name: node.name.clone(), code: node.code.clone(),
                is_active: node.is_active, children: kids,
            };
            match (kind.parent(), node.parent_id) {
                (None, _) => roots.push(tree_node),
                (Some(_), Some(parent)) => grouped.entry(parent).or_default().push(tree_node),
                (Some(_), None) => orphans += 1,
            }
        }
        // Children left over reference a parent that does not exist.
        orphans += children.values().map(Vec::len).sum::<usize>();

        if *kind == NodeKind::Region {
            roots.sort_by(|a, b| a.name.cmp(&b.name));
            return LocationTree { regions: roots, orphans };
        }
        below = grouped;
    }
    LocationTree { regions: vec![], orphans }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction { Activate, Deactivate, Delete }

#[derive(Clone, Debug, Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub kind: NodeKind,
    pub ids: Vec<Uuid>,
}

impl BulkRequest {
    /// Drops duplicate ids keeping first-seen order and enforces the size limit.
    pub fn normalized_ids(&self) -> Result<Vec<Uuid>, String> {
        if self.ids.is_empty() { return Err("No ids given".to_string()); }
        let mut seen = HashSet::with_capacity(self.ids.len());
        let ids: Vec<Uuid> = self.ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.len() > MAX_BULK_IDS {
            return Err(format!("At most {MAX_BULK_IDS} ids per bulk operation"));
        }
        Ok(ids)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BulkFailure { pub id: Uuid, pub error: String }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn record(&mut self, id: Uuid, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => self.succeeded.push(id),
            Err(error) => self.failed.push(BulkFailure { id, error }),
        }
    }

    pub fn is_complete_success(&self) -> bool { self.failed.is_empty() }
}
