//! Resource schema for `aws_vpc_peering_connection`
//!
//! Declares the attribute set, flags and defaults. The lifecycle uses the
//! force-new flags to decide between an in-place update and a replacement;
//! `pcxctl schema` prints the declaration.

use serde::Serialize;

use crate::config::TimeoutsConfig;

/// Type name of the managed resource
pub const RESOURCE_TYPE: &str = "aws_vpc_peering_connection";

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Bool,
    Map,
    /// A single nested block (list with at most one element)
    Block,
}

/// One attribute of the resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<Attribute>,
}

impl Attribute {
    fn new(name: &'static str, ty: AttributeType) -> Self {
        Self {
            name,
            ty,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            default: None,
            max_items: None,
            nested: Vec::new(),
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    fn block(mut self, nested: Vec<Attribute>) -> Self {
        self.max_items = Some(1);
        self.nested = nested;
        self
    }
}

/// Schema of the managed resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSchema {
    pub type_name: &'static str,
    pub attributes: Vec<Attribute>,
    pub timeouts: TimeoutsConfig,
    pub importable: bool,
}

impl ResourceSchema {
    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Names of attributes whose change forces a replacement
    pub fn force_new_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .filter(|a| a.force_new)
            .map(|a| a.name)
    }
}

fn options_block(name: &'static str) -> Attribute {
    let flag = |n| {
        Attribute::new(n, AttributeType::Bool)
            .optional()
            .default_value(serde_json::Value::Bool(false))
    };

    Attribute::new(name, AttributeType::Block)
        .optional()
        .computed()
        .block(vec![
            flag("allow_classic_link_to_remote_vpc"),
            flag("allow_remote_vpc_dns_resolution"),
            flag("allow_vpc_to_remote_classic_link"),
        ])
}

/// Build the schema declaration
pub fn resource_schema() -> ResourceSchema {
    use AttributeType::*;

    ResourceSchema {
        type_name: RESOURCE_TYPE,
        attributes: vec![
            Attribute::new("accept_status", String).computed(),
            options_block("accepter"),
            Attribute::new("auto_accept", Bool).optional(),
            Attribute::new("peer_owner_id", String)
                .optional()
                .force_new()
                .computed(),
            Attribute::new("peer_region", String)
                .optional()
                .force_new()
                .computed(),
            Attribute::new("peer_vpc_id", String).required().force_new(),
            options_block("requester"),
            Attribute::new("tags", Map).optional(),
            Attribute::new("tags_all", Map).optional().computed(),
            Attribute::new("vpc_id", String).required().force_new(),
        ],
        timeouts: TimeoutsConfig::default(),
        importable: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_new_attributes() {
        let schema = resource_schema();
        let force_new: Vec<_> = schema.force_new_attributes().collect();
        assert_eq!(
            force_new,
            vec!["peer_owner_id", "peer_region", "peer_vpc_id", "vpc_id"]
        );
    }

    #[test]
    fn test_options_block_shape() {
        let schema = resource_schema();
        let accepter = schema.attribute("accepter").unwrap();
        assert_eq!(accepter.max_items, Some(1));
        assert!(accepter.optional && accepter.computed);
        assert_eq!(accepter.nested.len(), 3);
        assert!(
            accepter
                .nested
                .iter()
                .all(|a| a.default == Some(serde_json::Value::Bool(false)))
        );
    }

    #[test]
    fn test_default_timeouts_are_one_minute() {
        let schema = resource_schema();
        assert_eq!(schema.timeouts.create_secs, 60);
        assert_eq!(schema.timeouts.update_secs, 60);
        assert_eq!(schema.timeouts.delete_secs, 60);
        assert!(schema.importable);
    }

    #[test]
    fn test_serializes_type_field() {
        let json = serde_json::to_value(resource_schema()).unwrap();
        assert_eq!(json["type_name"], RESOURCE_TYPE);
        assert_eq!(json["attributes"][0]["type"], "string");
    }
}
