// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Typed view of an ECUFlash XML definition document
//!
//! The XML is converted to these nodes as soon as it is read.  Every later
//! step (include merging, template lookup, scaling inference, table
//! construction) works on the typed nodes only.
//!
//! Element text is kept exactly as written.  Identifiers such as `xmlid` or
//! `internalidstring` are frequently all digits and must never be treated as
//! numbers.

use roxmltree::Node;

use crate::error::{Error, Result};

/// `<romid>`: identity, fingerprint and platform metadata
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct RomIdNode {
    pub xmlid: Option<String>,
    pub internal_id_address: Option<String>,
    pub internal_id_string: Option<String>,
    pub internal_id_hex: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub submodel: Option<String>,
    pub year: Option<String>,
    pub market: Option<String>,
    pub transmission: Option<String>,
    pub checksum_module: Option<String>,
}

/// `<scaling>`: named storage type and conversion
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct ScalingNode {
    pub name: String,
    pub units: Option<String>,
    pub toexpr: Option<String>,
    pub storage_type: Option<String>,
    pub endian: Option<String>,
}

/// Axis role, from the ECUFlash axis `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AxisRole {
    X,
    Y,
}

/// A `<table>` nested in another table: one axis
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct AxisNode {
    pub name: String,
    pub axis_type: Option<String>,
    pub address: Option<String>,
    pub elements: Option<String>,
    pub scaling: Option<String>,

    /// Inline `<data>` values, verbatim
    pub data: Vec<String>,
}

impl AxisNode {
    /// Role declared by the axis type, if any
    pub fn role(&self) -> Option<AxisRole> {
        let axis_type = self.axis_type.as_deref()?.to_lowercase();
        if axis_type.contains("x axis") {
            Some(AxisRole::X)
        } else if axis_type.contains("y axis") {
            Some(AxisRole::Y)
        } else {
            None
        }
    }

    /// Fills anything this node leaves unset from `template`
    pub fn merged_with(&self, template: &AxisNode) -> AxisNode {
        AxisNode {
            name: self.name.clone(),
            axis_type: self.axis_type.clone().or_else(|| template.axis_type.clone()),
            address: self.address.clone().or_else(|| template.address.clone()),
            elements: self.elements.clone().or_else(|| template.elements.clone()),
            scaling: self.scaling.clone().or_else(|| template.scaling.clone()),
            data: if self.data.is_empty() {
                template.data.clone()
            } else {
                self.data.clone()
            },
        }
    }
}

/// A top-level `<table>`
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct TableNode {
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub table_type: Option<String>,
    pub scaling: Option<String>,
    pub elements: Option<String>,
    pub swapxy: Option<String>,
    pub axes: Vec<AxisNode>,
}

/// One parsed definition file
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct DefinitionDocument {
    pub romid: Option<RomIdNode>,

    /// Include names, in document order
    pub includes: Vec<String>,
    pub scalings: Vec<ScalingNode>,
    pub tables: Vec<TableNode>,
}

fn attr(node: Node, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn text(node: Node) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn child_text(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.is_element() && c.has_tag_name(name))
        .and_then(text)
}

impl RomIdNode {
    fn from_node(node: Node) -> Self {
        Self {
            xmlid: child_text(node, "xmlid"),
            internal_id_address: child_text(node, "internalidaddress"),
            internal_id_string: child_text(node, "internalidstring"),
            internal_id_hex: child_text(node, "internalidhex"),
            make: child_text(node, "make"),
            model: child_text(node, "model"),
            submodel: child_text(node, "submodel"),
            year: child_text(node, "year"),
            market: child_text(node, "market"),
            transmission: child_text(node, "transmission"),
            checksum_module: child_text(node, "checksummodule"),
        }
    }
}

impl ScalingNode {
    fn from_node(node: Node) -> Option<Self> {
        Some(Self {
            name: attr(node, "name")?,
            units: attr(node, "units"),
            toexpr: attr(node, "toexpr"),
            storage_type: attr(node, "storagetype"),
            endian: attr(node, "endian"),
        })
    }
}

impl AxisNode {
    fn from_node(node: Node) -> Self {
        Self {
            name: attr(node, "name").unwrap_or_default(),
            axis_type: attr(node, "type"),
            address: attr(node, "address"),
            elements: attr(node, "elements"),
            scaling: attr(node, "scaling"),
            data: node
                .children()
                .filter(|c| c.is_element() && c.has_tag_name("data"))
                .filter_map(text)
                .collect(),
        }
    }
}

impl TableNode {
    fn from_node(node: Node) -> Option<Self> {
        Some(Self {
            name: attr(node, "name")?,
            category: attr(node, "category"),
            address: attr(node, "address"),
            table_type: attr(node, "type"),
            scaling: attr(node, "scaling"),
            elements: attr(node, "elements"),
            swapxy: attr(node, "swapxy"),
            axes: node
                .children()
                .filter(|c| c.is_element() && c.has_tag_name("table"))
                .map(AxisNode::from_node)
                .collect(),
        })
    }

    /// Fills anything this node leaves unset from `template`.
    ///
    /// Axes are matched by name.  Template axes keep their order, and local
    /// axes the template does not know are appended.
    pub fn merged_with(&self, template: &TableNode) -> TableNode {
        let mut axes: Vec<AxisNode> = template
            .axes
            .iter()
            .map(|t| match self.axes.iter().find(|a| a.name == t.name) {
                Some(local) => local.merged_with(t),
                None => t.clone(),
            })
            .collect();
        axes.extend(
            self.axes
                .iter()
                .filter(|a| !template.axes.iter().any(|t| t.name == a.name))
                .cloned(),
        );

        TableNode {
            name: self.name.clone(),
            category: self.category.clone().or_else(|| template.category.clone()),
            address: self.address.clone().or_else(|| template.address.clone()),
            table_type: self.table_type.clone().or_else(|| template.table_type.clone()),
            scaling: self.scaling.clone().or_else(|| template.scaling.clone()),
            elements: self.elements.clone().or_else(|| template.elements.clone()),
            swapxy: self.swapxy.clone().or_else(|| template.swapxy.clone()),
            axes,
        }
    }
}

impl DefinitionDocument {
    /// Parses `source`.  `source_name` is only used in errors.
    pub fn parse(source: &str, source_name: &str) -> Result<Self> {
        let xml_error = |message: String| Error::Xml {
            source_name: source_name.to_string(),
            message,
        };
        let doc = roxmltree::Document::parse(source).map_err(|e| xml_error(e.to_string()))?;
        let root = doc.root_element();
        if !root.has_tag_name("rom") {
            return Err(xml_error(format!(
                "root element is <{}>, expected <rom>",
                root.tag_name().name()
            )));
        }

        let mut document = DefinitionDocument::default();
        for node in root.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "romid" => document.romid = Some(RomIdNode::from_node(node)),
                "include" => document.includes.extend(text(node)),
                "scaling" => document.scalings.extend(ScalingNode::from_node(node)),
                "table" => document.tables.extend(TableNode::from_node(node)),
                _ => {}
            }
        }
        Ok(document)
    }
}
