//! resolved configuration
//!
//! A [Config] only comes out of a successful resolution, so every node reachable through it is a
//! value or an object. It cannot be changed afterwards and may be shared freely between threads.
//!
//! Typed access goes through serde: [Config::value] decodes whatever lives at a path (a single
//! value or a whole object) into any [serde::de::DeserializeOwned] type.
use crate::node::{NodeRef, NodeType, Tree};
use crate::node_path::NodePath;
use crate::resolve::{resolve_references, unresolved_paths, ResolveError};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    tree: Tree,
}

impl Config {
    /// Resolves `tree`, consulting `externals` when the tree alone makes no progress
    pub fn resolve(
        mut tree: Tree,
        externals: &[&Config],
        max_cycles: usize,
    ) -> Result<Self, ResolveError> {
        let externals: Vec<&Tree> = externals.iter().map(|config| &config.tree).collect();
        resolve_references(&mut tree, &externals, max_cycles)?;

        Ok(Self {
            tree: tree.compact(),
        })
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.tree.root_node()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// Node at `path`, relative paths start at the root
    pub fn get(&self, path: impl AsRef<str>) -> Result<NodeRef<'_>, AccessError> {
        self.root().get(path)
    }

    pub fn value<T: serde::de::DeserializeOwned>(
        &self,
        path: impl AsRef<str>,
    ) -> Result<T, AccessError> {
        self.get(path)?.decode()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, AccessError> {
        self.root().decode()
    }
}

impl<'a> NodeRef<'a> {
    /// Checked lookup for consumers of resolved trees
    ///
    /// Unlike [NodeRef::node_at_path] this reports why a lookup failed and refuses to hand out
    /// placeholders.
    pub fn get(&self, path: impl AsRef<str>) -> Result<NodeRef<'a>, AccessError> {
        let path = NodePath::new(path.as_ref());
        if !path.is_valid() {
            return Err(AccessError::InvalidPath(path));
        }

        let node = self
            .node_at_path(&path)
            .ok_or_else(|| AccessError::NotFound(path.to_absolute(&self.node_path())))?;

        match node.node_type() {
            NodeType::NodeReference | NodeType::DerivedObject => {
                Err(AccessError::UnresolvedReference(node.node_path()))
            }
            NodeType::Value | NodeType::Object => Ok(node),
        }
    }

    /// Named member of an object
    pub fn get_member(&self, name: &str) -> Result<NodeRef<'a>, AccessError> {
        if self.node_type() != NodeType::Object {
            return Err(AccessError::NotAnObject(self.node_path()));
        }

        self.get(name)
    }

    /// Literal of a value node
    pub fn get_value(&self) -> Result<&'a serde_json::Value, AccessError> {
        match self.node_type() {
            NodeType::Value => Ok(self.value().unwrap_or(&serde_json::Value::Null)),
            NodeType::Object => Err(AccessError::NotAValue(self.node_path())),
            NodeType::NodeReference | NodeType::DerivedObject => {
                Err(AccessError::UnresolvedReference(self.node_path()))
            }
        }
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, AccessError> {
        if let Some(unresolved) = unresolved_paths(&self.to_tree()).into_iter().next() {
            let path = self.node_path().append(unresolved.as_str().trim_start_matches('/'));
            return Err(AccessError::UnresolvedReference(if path.is_valid() {
                path
            } else {
                self.node_path()
            }));
        }

        let value = serde_json::to_value(self).map_err(|error| AccessError::Decode {
            path: self.node_path(),
            error,
        })?;

        serde_json::from_value(value).map_err(|error| AccessError::Decode {
            path: self.node_path(),
            error,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AccessError {
    #[error("invalid node path `{0}`")]
    InvalidPath(NodePath),
    #[error("no node at {0}")]
    NotFound(NodePath),
    #[error("unresolved reference at {0}")]
    UnresolvedReference(NodePath),
    #[error("{0} is not an object")]
    NotAnObject(NodePath),
    #[error("{0} is not a value")]
    NotAValue(NodePath),
    #[error("unable to decode {path}")]
    Decode {
        path: NodePath,
        #[source]
        error: serde_json::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::environment::EnvironmentVariables;
    use crate::reader::Reader;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(config: serde_json::Value) -> Tree {
        let serde_json::Value::Object(config) = config else {
            panic!("config must be an object");
        };
        Reader::new(EnvironmentVariables::new())
            .read_config(&config)
            .expect("valid config")
    }

    fn config(value: serde_json::Value) -> Config {
        Config::resolve(tree(value), &[], 100).expect("must resolve")
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Listen {
        host: String,
        port: u16,
    }

    #[test]
    fn typed_access() {
        let config = config(json!({
            "defaults": {"host": "localhost", "port": 80},
            "&listen": {"base": "/defaults", "config": {"port": 8080}}
        }));

        assert_eq!(
            config.value::<Listen>("/listen").unwrap(),
            Listen {
                host: "localhost".to_string(),
                port: 8080
            }
        );
        assert_eq!(config.value::<u16>("listen/port").unwrap(), 8080);
        assert!(matches!(
            config.value::<u16>("/listen/host"),
            Err(AccessError::Decode { .. })
        ));
    }

    #[test]
    fn lookup_errors() {
        let config = config(json!({"a": {"b": 1}}));

        assert!(matches!(
            config.get("/a/c"),
            Err(AccessError::NotFound(path)) if path.as_str() == "/a/c"
        ));
        assert!(matches!(config.get("a//b"), Err(AccessError::InvalidPath(_))));
        assert!(matches!(
            config.get("/a/b").unwrap().get_member("x"),
            Err(AccessError::NotAnObject(_))
        ));
        assert!(matches!(
            config.get("/a").unwrap().get_value(),
            Err(AccessError::NotAValue(_))
        ));
        assert_eq!(config.get("/a/b").unwrap().get_value().unwrap(), &json!(1));
    }

    #[test]
    fn placeholders_are_refused() {
        let raw = tree(json!({"a": {"&r": "/missing"}}));
        let a = raw.root_node().member("a").unwrap();

        assert!(matches!(
            a.get_member("r"),
            Err(AccessError::UnresolvedReference(path)) if path.as_str() == "/a/r"
        ));
        assert!(matches!(
            a.decode::<serde_json::Value>(),
            Err(AccessError::UnresolvedReference(path)) if path.as_str() == "/a/r"
        ));
    }

    #[test]
    fn resolution_with_external_configs() {
        let shared = config(json!({"db": {"host": "db.internal"}}));
        let app = Config::resolve(tree(json!({"&db": "/db"})), &[&shared], 100).unwrap();

        assert_eq!(app.to_json().unwrap(), json!({"db": {"host": "db.internal"}}));
    }

    #[test]
    fn config_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Config>();
    }
}
