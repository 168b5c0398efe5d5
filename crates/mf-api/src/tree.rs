//! ---
//! mfg_section: "05-networking-external-interfaces"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Hierarchical resource tree over the digital twin."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! The resource hierarchy under `/factory`:
//!
//! ```text
//! /factory
//! /factory/cmd
//! /factory/{cell}
//! /factory/{cell}/devices
//! /factory/{cell}/{type}
//! /factory/{cell}/{type}/{id}
//! /factory/{cell}/{type}/{id}/state
//! /factory/{cell}/{type}/{id}/cmd
//! ```
//!
//! Nodes are resolved lazily per request; there is no persistent node
//! table. `cmd` is reserved at the factory level and `devices` at the cell
//! level, so neither can be used as a cell or device-type name.

use mf_model::DeviceKey;

/// A resolved position in the resource hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `/factory` — the factory summary.
    Root,
    /// `/factory/cmd` — broadcast command submission.
    FactoryCommand,
    /// `/factory/{cell}`.
    Cell { cell_id: String },
    /// `/factory/{cell}/devices` — flat device listing for the cell.
    DeviceList { cell_id: String },
    /// `/factory/{cell}/{type}`.
    DeviceType {
        cell_id: String,
        device_type: String,
    },
    /// `/factory/{cell}/{type}/{id}`.
    Device { key: DeviceKey },
    /// `/factory/{cell}/{type}/{id}/state` — the twin snapshot.
    State { key: DeviceKey },
    /// `/factory/{cell}/{type}/{id}/cmd` — device command submission.
    Command { key: DeviceKey },
}

/// Resolve one child segment. Leaf nodes have no children.
pub fn child(parent: &Node, segment: &str) -> Option<Node> {
    if segment.is_empty() {
        return None;
    }
    match parent {
        Node::Root => Some(match segment {
            "cmd" => Node::FactoryCommand,
            cell => Node::Cell {
                cell_id: cell.to_owned(),
            },
        }),
        Node::Cell { cell_id } => Some(match segment {
            "devices" => Node::DeviceList {
                cell_id: cell_id.clone(),
            },
            device_type => Node::DeviceType {
                cell_id: cell_id.clone(),
                device_type: device_type.to_owned(),
            },
        }),
        Node::DeviceType {
            cell_id,
            device_type,
        } => DeviceKey::new(cell_id, device_type, segment).map(|key| Node::Device { key }),
        Node::Device { key } => match segment {
            "state" => Some(Node::State { key: key.clone() }),
            "cmd" => Some(Node::Command { key: key.clone() }),
            _ => None,
        },
        Node::FactoryCommand
        | Node::DeviceList { .. }
        | Node::State { .. }
        | Node::Command { .. } => None,
    }
}

/// Resolve a slash-separated path relative to `/factory`.
pub fn resolve(path: &str) -> Option<Node> {
    let mut node = Node::Root;
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        node = child(&node, segment)?;
    }
    Some(node)
}
