//! Snapshot tests
//!
//! Loads each inputs/*.json file individually and compares if the
//! resolved `test` member changes.
use cfgtree::documents::{Documents, FormatRegistry};
use cfgtree::environment::EnvironmentVariables;
use cfgtree::Reader;

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CFGTREE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("inputs/*.json", |path| {
        let mut documents = Documents::default();
        documents
            .load_file(path, &FormatRegistry::default())
            .unwrap();
        let config = Reader::new(EnvironmentVariables::new())
            .load(&documents, &[])
            .expect("must be a resolvable document");

        let rendered = config
            .value::<serde_json::Value>("/test")
            .expect("valid value");

        insta::assert_json_snapshot!(rendered);
    });
}
