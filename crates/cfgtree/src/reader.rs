//! decorator-aware ingestion of source documents into a [Tree]
//!
//! Member keys may carry a decorator as their first character:
//!
//! | key       | payload                              | node                         |
//! |-----------|--------------------------------------|------------------------------|
//! | `name`    | object                               | `Object`, members read again |
//! | `name`    | anything else                        | `Value`                      |
//! | `#name`   | anything                             | `Value`, kept as is          |
//! | `&name`   | path string                          | `NodeReference`              |
//! | `&name`   | `{"base": .., "config": {..}}`       | `DerivedObject`              |
//!
//! Strings inside values are passed through [EnvironmentVariables::expand_text].
use crate::config::Config;
use crate::documents::Documents;
use crate::environment::{EnvironmentVariables, ExpandError};
use crate::node::{Derivation, NodeId, NodeKind, Tree};
use crate::node_path::{is_valid_name, NodePath};
use crate::resolve::ResolveError;

pub const LITERAL_DECORATOR: char = '#';
pub const REFERENCE_DECORATOR: char = '&';
pub const DEFAULT_MAX_CYCLES: usize = 100;

#[derive(Debug, Clone)]
pub struct Reader {
    pub environment: EnvironmentVariables,
    /// Upper bound of resolution passes before giving up
    pub reference_resolution_max_cycles: usize,
}

impl Default for Reader {
    /// Environment taken from the process
    fn default() -> Self {
        Self::new(EnvironmentVariables::from_process())
    }
}

impl Reader {
    pub fn new(environment: EnvironmentVariables) -> Self {
        Self {
            environment,
            reference_resolution_max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.reference_resolution_max_cycles = max_cycles;
        self
    }

    /// Reads the `config` object of a document into a raw tree (placeholders included)
    pub fn read_config(
        &self,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Tree, ReadError> {
        let mut tree = Tree::default();
        let root = tree.root();
        self.read_object(&mut tree, root, config, &NodePath::root())?;
        Ok(tree)
    }

    /// Reads all documents and merges them in order
    pub fn read_documents(&self, documents: &Documents) -> Result<Tree, ReadError> {
        let mut tree = Tree::default();
        let root = tree.root();

        for (source, document) in documents.iter() {
            let raw = self.read_config(&document.config).map_err(|error| {
                ReadError::InDocument {
                    document: source
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "<input>".to_string()),
                    error: Box::new(error),
                }
            })?;

            tree.apply(root, &raw, raw.root());
        }

        Ok(tree)
    }

    /// Resolves a raw tree into a [Config], `externals` are consulted when the tree alone makes
    /// no progress
    pub fn resolve(&self, tree: Tree, externals: &[&Config]) -> Result<Config, ResolveError> {
        Config::resolve(tree, externals, self.reference_resolution_max_cycles)
    }

    /// [Reader::read_documents] followed by [Reader::resolve]
    pub fn load(&self, documents: &Documents, externals: &[&Config]) -> Result<Config, crate::Error> {
        let tree = self.read_documents(documents)?;
        Ok(self.resolve(tree, externals)?)
    }

    fn read_object(
        &self,
        tree: &mut Tree,
        object: NodeId,
        members: &serde_json::Map<String, serde_json::Value>,
        location: &NodePath,
    ) -> Result<(), ReadError> {
        for (key, payload) in members {
            let (decorator, name) = split_decorator(key);

            if !is_valid_name(name) {
                return Err(ReadError::InvalidName {
                    path: location.clone(),
                    name: key.clone(),
                });
            }

            if tree.member(object, name).is_some() {
                return Err(ReadError::DuplicateMember {
                    path: location.clone(),
                    name: name.to_string(),
                });
            }

            let path = location.append(name);
            tracing::trace!(%path, ?decorator, "reading member");

            let kind = match (decorator, payload) {
                (Some(LITERAL_DECORATOR), payload) => {
                    NodeKind::Value(self.expand_value(payload, &path)?)
                }
                (Some(_), payload) => self.read_placeholder(payload, &path)?,
                (None, serde_json::Value::Object(child_members)) => {
                    let child = tree.add_member(object, name, NodeKind::empty_object());
                    self.read_object(tree, child, child_members, &path)?;
                    continue;
                }
                (None, payload) => NodeKind::Value(self.expand_value(payload, &path)?),
            };

            tree.add_member(object, name, kind);
        }

        Ok(())
    }

    fn read_placeholder(
        &self,
        payload: &serde_json::Value,
        path: &NodePath,
    ) -> Result<NodeKind, ReadError> {
        match payload {
            serde_json::Value::String(reference) => {
                Ok(NodeKind::NodeReference(parse_reference(reference, path)?))
            }
            serde_json::Value::Object(members) => {
                if let Some(key) = members.keys().find(|key| *key != "base" && *key != "config") {
                    return Err(ReadError::InvalidDerivation {
                        path: path.clone(),
                        reason: format!("unexpected member `{key}`"),
                    });
                }

                let bases = match members.get("base") {
                    Some(serde_json::Value::String(base)) => vec![parse_reference(base, path)?],
                    Some(serde_json::Value::Array(bases)) => bases
                        .iter()
                        .map(|base| match base {
                            serde_json::Value::String(base) => parse_reference(base, path),
                            _ => Err(ReadError::InvalidDerivation {
                                path: path.clone(),
                                reason: "`base` entries must be path strings".to_string(),
                            }),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(_) => {
                        return Err(ReadError::InvalidDerivation {
                            path: path.clone(),
                            reason: "`base` must be a path string or an array of path strings"
                                .to_string(),
                        })
                    }
                    None => {
                        return Err(ReadError::InvalidDerivation {
                            path: path.clone(),
                            reason: "`base` is missing".to_string(),
                        })
                    }
                };

                let mut config = Tree::default();
                match members.get("config") {
                    None => {}
                    Some(serde_json::Value::Object(config_members)) => {
                        let root = config.root();
                        self.read_object(&mut config, root, config_members, path)?;
                    }
                    Some(_) => {
                        return Err(ReadError::InvalidDerivation {
                            path: path.clone(),
                            reason: "`config` must be an object".to_string(),
                        })
                    }
                }

                Ok(NodeKind::DerivedObject(Derivation::new(bases, config)))
            }
            _ => Err(ReadError::InvalidPlaceholder { path: path.clone() }),
        }
    }

    fn expand_value(
        &self,
        value: &serde_json::Value,
        path: &NodePath,
    ) -> Result<serde_json::Value, ReadError> {
        match value {
            serde_json::Value::String(text) => self
                .environment
                .expand_text(text)
                .map(serde_json::Value::String)
                .map_err(|error| ReadError::Expansion {
                    path: path.clone(),
                    error,
                }),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| self.expand_value(item, path))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(members) => members
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.expand_value(value, path)?)))
                .collect::<Result<serde_json::Map<_, _>, _>>()
                .map(serde_json::Value::Object),
            other => Ok(other.clone()),
        }
    }
}

fn split_decorator(key: &str) -> (Option<char>, &str) {
    for decorator in [LITERAL_DECORATOR, REFERENCE_DECORATOR] {
        if let Some(name) = key.strip_prefix(decorator) {
            return (Some(decorator), name);
        }
    }

    (None, key)
}

fn parse_reference(reference: &str, path: &NodePath) -> Result<NodePath, ReadError> {
    let reference = NodePath::new(reference);
    if !reference.is_valid() {
        return Err(ReadError::InvalidReference {
            path: path.clone(),
            reference: reference.to_string(),
        });
    }

    Ok(reference)
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("invalid member name `{name}` in {path}")]
    InvalidName { path: NodePath, name: String },
    #[error("member `{name}` is defined more than once in {path}")]
    DuplicateMember { path: NodePath, name: String },
    #[error("invalid reference path `{reference}` at {path}")]
    InvalidReference { path: NodePath, reference: String },
    #[error("invalid derivation at {path}: {reason}")]
    InvalidDerivation { path: NodePath, reason: String },
    #[error("{path} must hold a path string or a derivation object")]
    InvalidPlaceholder { path: NodePath },
    #[error("unable to expand environment variables at {path}")]
    Expansion {
        path: NodePath,
        #[source]
        error: ExpandError,
    },
    #[error("in {document}")]
    InDocument {
        document: String,
        #[source]
        error: Box<ReadError>,
    },
}
