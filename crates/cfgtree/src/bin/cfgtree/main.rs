mod cli;

use cfgtree::documents::{Documents, FormatRegistry};
use cfgtree::environment::EnvironmentVariables;
use cfgtree::{Config, Reader};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CFGTREE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Resolve(resolve_cli) => resolve(resolve_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn resolve(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let formats = FormatRegistry::default();
    let reader = reader(&cli.input);

    let externals = cli
        .input
        .externals
        .iter()
        .map(|path| {
            let mut documents = Documents::default();
            documents.load_file(path, &formats)?;
            Ok(reader.load(&documents, &[])?)
        })
        .collect::<anyhow::Result<Vec<Config>>>()?;
    let externals: Vec<&Config> = externals.iter().collect();

    let documents = load(&cli.input, &formats)?;
    let config = reader.load(&documents, &externals)?;

    output(&cli.output, &serde_json::to_value(config.get(&cli.path)?)?)?;
    Ok(())
}

fn reader(input: &cli::InputArgs) -> Reader {
    let mut environment = if input.no_process_env {
        EnvironmentVariables::new()
    } else {
        EnvironmentVariables::from_process()
    };

    for (name, value) in &input.variables {
        environment.set_value(name, value);
    }

    Reader::new(environment).with_max_cycles(input.max_cycles)
}

fn load(input: &cli::InputArgs, formats: &FormatRegistry) -> anyhow::Result<Documents> {
    let mut documents = Documents::default();

    if input.files.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        let json = formats
            .get("json")
            .ok_or_else(|| anyhow::anyhow!("json format not registered"))?;
        documents.load_text(&stdin, json, &std::env::current_dir()?, formats)?;
        return Ok(documents);
    }

    for file_path in &input.files {
        documents.load_file(file_path, formats)?;
    }

    anyhow::ensure!(documents.source_count() > 0, "No files loaded");

    Ok(documents)
}

fn output(output: &cli::OutputArgs, value: &serde_json::Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), value)?;
            println!();
        }
    };

    Ok(())
}

/// (cfgtree-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    let formats = FormatRegistry::default();
    let documents = load(&cli.input, &formats)?;

    match cli.command {
        cli::DevSubCommand::Documents => println!("{documents:#?}"),
        cli::DevSubCommand::Tree => {
            let tree = reader(&cli.input).read_documents(&documents)?;
            println!("{tree:#?}");
        }
        cli::DevSubCommand::Unresolved => {
            let tree = reader(&cli.input).read_documents(&documents)?;
            for path in cfgtree::resolve::unresolved_paths(&tree) {
                println!("{path}");
            }
        }
    }

    Ok(())
}
