//! collection of source documents (`config` object, `includes` and path to source file)
//!
//! A source document is an object with two optional members:
//! ```json
//! {
//!   "includes": ["common.json", {"path": "local.json", "optional": true}],
//!   "config": {}
//! }
//! ```
//!
//! Includes are loaded depth-first, relative to the including file, and end up in [Documents]
//! ahead of the document that included them. Later documents override earlier ones when their
//! trees get merged.
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Turns source text into a json value
pub trait SourceFormat: std::fmt::Debug + Send + Sync {
    fn parse(&self, text: &str) -> Result<serde_json::Value, FormatError>;
}

#[derive(Debug, Default)]
pub struct JsonFormat;

impl SourceFormat for JsonFormat {
    fn parse(&self, text: &str) -> Result<serde_json::Value, FormatError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Default)]
pub struct YamlFormat;

impl SourceFormat for YamlFormat {
    fn parse(&self, text: &str) -> Result<serde_json::Value, FormatError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid yaml")]
    Yaml(#[from] serde_yaml::Error),
}

/// Known source formats by tag (file extension)
///
/// Built by the application and handed to whatever loads files.
#[derive(Debug)]
pub struct FormatRegistry {
    formats: IndexMap<String, Box<dyn SourceFormat>>,
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            formats: IndexMap::new(),
        }
    }

    /// Registers (or replaces) the format used for `tag`
    pub fn register(&mut self, tag: impl Into<String>, format: impl SourceFormat + 'static) {
        self.formats
            .insert(tag.into().to_ascii_lowercase(), Box::new(format));
    }

    pub fn get(&self, tag: &str) -> Option<&dyn SourceFormat> {
        self.formats
            .get(&tag.to_ascii_lowercase())
            .map(|format| format.as_ref())
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn SourceFormat> {
        self.get(path.extension()?.to_str()?)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }
}

impl Default for FormatRegistry {
    /// `json`, `yaml` and `yml`
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("json", JsonFormat);
        registry.register("yaml", YamlFormat);
        registry.register("yml", YamlFormat);
        registry
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub path: PathBuf,
    /// Missing optional includes are skipped
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceDocument {
    pub includes: Vec<Include>,
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl SourceDocument {
    pub fn from_value(value: serde_json::Value) -> Result<Self, DocumentError> {
        let serde_json::Value::Object(members) = value else {
            return Err(DocumentError::NotAnObject);
        };

        let mut document = SourceDocument::default();
        for (key, value) in members {
            match key.as_str() {
                "includes" => document.includes = parse_includes(value)?,
                "config" => {
                    let serde_json::Value::Object(config) = value else {
                        return Err(DocumentError::ConfigNotAnObject);
                    };
                    document.config = config;
                }
                _ => return Err(DocumentError::UnknownMember(key)),
            }
        }

        Ok(document)
    }
}

impl std::str::FromStr for SourceDocument {
    type Err = DocumentError;

    /// Parses a json document
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

fn parse_includes(value: serde_json::Value) -> Result<Vec<Include>, DocumentError> {
    let serde_json::Value::Array(items) = value else {
        return Err(DocumentError::InvalidIncludes);
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(path) => Ok(Include {
                path: path.into(),
                optional: false,
            }),
            serde_json::Value::Object(mut descriptor) => {
                let Some(serde_json::Value::String(path)) = descriptor.remove("path") else {
                    return Err(DocumentError::InvalidInclude(
                        "include needs a `path` string".to_string(),
                    ));
                };

                let optional = match descriptor.remove("optional") {
                    None => false,
                    Some(serde_json::Value::Bool(optional)) => optional,
                    Some(_) => {
                        return Err(DocumentError::InvalidInclude(
                            "`optional` must be a boolean".to_string(),
                        ))
                    }
                };

                if let Some(key) = descriptor.keys().next() {
                    return Err(DocumentError::InvalidInclude(format!(
                        "unknown include member `{key}`"
                    )));
                }

                Ok(Include {
                    path: path.into(),
                    optional,
                })
            }
            _ => Err(DocumentError::InvalidInclude(
                "include must be a path or an include object".to_string(),
            )),
        })
        .collect()
}

#[derive(Default, Debug)]
pub struct Documents {
    documents: Vec<(Source, SourceDocument)>,
}

impl Documents {
    /// Appends a document as is, its includes are not loaded
    pub fn insert(&mut self, document: SourceDocument, path: impl Into<Option<PathBuf>>) {
        self.documents.push((path.into(), document));
    }

    /// Documents in merge order
    pub fn iter(&self) -> impl Iterator<Item = (&Source, &SourceDocument)> {
        self.documents
            .iter()
            .map(|(source, document)| (source, document))
    }

    pub fn source_count(&self) -> usize {
        self.documents.len()
    }
}

impl Documents {
    pub fn load_file(&mut self, file_path: &Path, formats: &FormatRegistry) -> Result<(), LoadError> {
        self.load_file_with_stack(file_path, formats, &mut vec![])
    }

    /// Loads a document that did not come from a file, includes are relative to `directory`
    pub fn load_text(
        &mut self,
        text: &str,
        format: &dyn SourceFormat,
        directory: &Path,
        formats: &FormatRegistry,
    ) -> Result<(), LoadError> {
        let document = parse_document(text, format, None)?;
        self.load_includes(&document, directory, formats, &mut vec![])?;
        self.insert(document, None);
        Ok(())
    }

    fn load_file_with_stack(
        &mut self,
        file_path: &Path,
        formats: &FormatRegistry,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), LoadError> {
        let file_path = file_path
            .canonicalize()
            .map_err(|error| LoadError::ReadFailed {
                path: file_path.to_owned(),
                error,
            })?;

        if stack.contains(&file_path) {
            return Err(LoadError::CircularInclude(file_path));
        }

        tracing::info!(path=%file_path.display(), "loading file");

        let format = formats
            .for_path(&file_path)
            .ok_or_else(|| LoadError::UnknownFormat {
                path: file_path.clone(),
                known: formats.tags().collect::<Vec<_>>().join(", "),
            })?;
        let text = std::fs::read_to_string(&file_path).map_err(|error| LoadError::ReadFailed {
            path: file_path.clone(),
            error,
        })?;
        let document = parse_document(&text, format, Some(&file_path))?;

        let directory = file_path.parent().unwrap_or(Path::new("/")).to_owned();
        stack.push(file_path.clone());
        self.load_includes(&document, &directory, formats, stack)?;
        stack.pop();

        self.insert(document, Some(file_path));
        Ok(())
    }

    fn load_includes(
        &mut self,
        document: &SourceDocument,
        directory: &Path,
        formats: &FormatRegistry,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), LoadError> {
        for include in &document.includes {
            let include_path = directory.join(&include.path);
            if include.optional && !include_path.exists() {
                tracing::debug!(path=%include_path.display(), "skipping missing optional include");
                continue;
            }

            self.load_file_with_stack(&include_path, formats, stack)?;
        }

        Ok(())
    }
}

fn parse_document(
    text: &str,
    format: &dyn SourceFormat,
    path: Option<&Path>,
) -> Result<SourceDocument, LoadError> {
    let describe = || {
        path.map(|path| path.display().to_string())
            .unwrap_or_else(|| "<input>".to_string())
    };

    let value = format.parse(text).map_err(|error| LoadError::Parse {
        source_name: describe(),
        error,
    })?;

    SourceDocument::from_value(value).map_err(|error| LoadError::InvalidDocument {
        source_name: describe(),
        error,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("document must be an object")]
    NotAnObject,
    #[error("`config` must be an object")]
    ConfigNotAnObject,
    #[error("unknown document member `{0}`, expected `includes` or `config`")]
    UnknownMember(String),
    #[error("`includes` must be an array")]
    InvalidIncludes,
    #[error("invalid include: {0}")]
    InvalidInclude(String),
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("unable to read {}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("no source format registered for {}, known extensions: {known}", .path.display())]
    UnknownFormat { path: PathBuf, known: String },
    #[error("unable to parse {source_name}")]
    Parse {
        source_name: String,
        #[source]
        error: FormatError,
    },
    #[error("invalid document {source_name}")]
    InvalidDocument {
        source_name: String,
        #[source]
        error: DocumentError,
    },
    #[error("circular include of {}", .0.display())]
    CircularInclude(PathBuf),
}

impl From<SourceDocument> for Documents {
    fn from(value: SourceDocument) -> Self {
        let mut documents = Documents::default();
        documents.insert(value, None);
        documents
    }
}

/// Utility macro to create [Documents] from json text
///
/// Create from a single document
/// ```
/// # use cfgtree::documents;
/// documents!(r#"{"config": {"attribute": 42}}"#);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use cfgtree::documents;
/// documents! {
///   "one.json" => r#"{"config": {"one": 1}}"#,
///   "two.json" => r#"{"config": {"two": 2}}"#
/// };
/// ```
///
/// Includes are not loaded.
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use cfgtree::documents;
/// documents!(r#"{"config": 1}"#);
/// ```
#[macro_export]
macro_rules! documents {
    // single document without source
    { $expr:expr } => {
        $crate::documents::Documents::from(
            $expr.parse::<$crate::documents::SourceDocument>().expect("document must parse")
        )
    };
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::documents::Documents::default();
        $(
            docs.insert(
                $expr.parse::<$crate::documents::SourceDocument>().expect("document must parse"),
                Some(::std::path::PathBuf::from($source)),
            );
        )+

        docs
    }};
}

pub type Source = Option<PathBuf>;

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_includes() {
        let document: SourceDocument = r#"{
            "includes": ["a.json", {"path": "b.yaml", "optional": true}],
            "config": {"x": 1}
        }"#
        .parse()
        .unwrap();

        assert_eq!(
            document.includes,
            vec![
                Include {
                    path: "a.json".into(),
                    optional: false
                },
                Include {
                    path: "b.yaml".into(),
                    optional: true
                },
            ]
        );
        assert_eq!(document.config.len(), 1);
    }

    #[test]
    fn rejects_unknown_members() {
        let error = r#"{"config": {}, "extra": 1}"#
            .parse::<SourceDocument>()
            .unwrap_err();
        assert!(matches!(error, DocumentError::UnknownMember(name) if name == "extra"));

        let error = r#"{"includes": [{"path": "a", "when": true}]}"#
            .parse::<SourceDocument>()
            .unwrap_err();
        assert!(matches!(error, DocumentError::InvalidInclude(_)));
    }

    #[test]
    fn missing_config_is_empty() {
        let document: SourceDocument = "{}".parse().unwrap();
        assert!(document.config.is_empty());
        assert!(document.includes.is_empty());
    }

    #[test]
    fn registry_lookup() {
        let registry = FormatRegistry::default();
        assert!(registry.for_path(Path::new("a/b.JSON")).is_some());
        assert!(registry.for_path(Path::new("a/b.yml")).is_some());
        assert!(registry.for_path(Path::new("a/b.toml")).is_none());
        assert!(registry.for_path(Path::new("a/b")).is_none());

        let value = registry
            .get("yaml")
            .unwrap()
            .parse("config:\n  a: 1\n")
            .unwrap();
        assert_eq!(value, serde_json::json!({"config": {"a": 1}}));
    }

    #[test]
    fn unknown_extension_names_registered_formats() {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let error = Documents::default()
            .load_file(&manifest, &FormatRegistry::default())
            .unwrap_err();

        assert!(matches!(&error, LoadError::UnknownFormat { known, .. } if known == "json, yaml, yml"));
        assert!(error.to_string().ends_with("known extensions: json, yaml, yml"));
    }

    #[test]
    fn macro_keeps_order() {
        let documents = documents! {
            "one.json" => r#"{"config": {"one": 1}}"#,
            "two.json" => r#"{"config": {"two": 2}}"#
        };

        let sources: Vec<_> = documents
            .iter()
            .map(|(source, _)| source.clone().unwrap())
            .collect();
        assert_eq!(sources, vec![PathBuf::from("one.json"), PathBuf::from("two.json")]);
    }
}
