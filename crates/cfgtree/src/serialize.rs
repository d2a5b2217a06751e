//! serde output of resolved nodes
//!
//! - value: the literal as read
//! - object: a map in member order
//!
//! Placeholders cannot be represented and make serialization fail.
use crate::config::Config;
use crate::node::{NodeKind, NodeRef};
use serde::{ser::SerializeMap, Serializer};

impl serde::ser::Serialize for NodeRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.kind() {
            NodeKind::Value(value) => value.serialize(serializer),
            NodeKind::Object(members) => {
                let mut ser = serializer.serialize_map(Some(members.len()))?;
                for (name, member) in self.members() {
                    ser.serialize_entry(name, &member)?;
                }
                ser.end()
            }
            NodeKind::NodeReference(_) | NodeKind::DerivedObject(_) => Err(
                serde::ser::Error::custom(format!("unresolved reference at {}", self.node_path())),
            ),
        }
    }
}

impl serde::ser::Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.root().serialize(serializer)
    }
}
