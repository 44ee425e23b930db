//! Templater CLI
//!
//! Usage:
//!   templater [OPTIONS] [TEMPLATE]
//!
//! Options:
//!   -c, --context <FILE>   JSON object with the template variables
//!   -p, --partial <FILE>   Partial body, named by its file name (repeatable)
//!   --config <FILE>        Render configuration (TOML format)
//!   --lenient              Leave malformed regions and unknown partials in place
//!   -v, --verbose          Log each render and partial expansion
//!   -h, --help             Print help

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use templater::{
    render_with_config, Context, Origin, PartialRegistry, RenderConfig, RenderError, Strictness,
};

#[derive(Parser)]
#[command(name = "templater")]
#[command(about = "Render markup templates with inline expressions and partials")]
struct Cli {
    /// Template file (reads from stdin if not provided)
    template: Option<PathBuf>,

    /// JSON file holding the context object
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Partial file; `card.html` is invoked as `<_card>`
    #[arg(short, long = "partial")]
    partials: Vec<PathBuf>,

    /// Render configuration file (TOML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Leave malformed regions and unknown partials in the output
    #[arg(long)]
    lenient: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => RenderConfig::from_file(path)
            .unwrap_or_else(|e| fail(&format!("Error loading config '{}': {}", path.display(), e))),
        None => RenderConfig::default(),
    };
    if cli.lenient {
        config = config.with_strictness(Strictness::Lenient);
    }

    let context = match &cli.context {
        Some(path) => load_context(path),
        None => Context::new(),
    };

    let mut partials = PartialRegistry::new();
    for path in &cli.partials {
        let name = partial_name(path);
        let body = read_file(path);
        if let Err(e) = partials.register(name, body) {
            fail(&format!("Error registering '{}': {}", path.display(), e));
        }
    }

    let (source, filename) = match &cli.template {
        Some(path) => (read_file(path), path.display().to_string()),
        None => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                fail(&format!("Error reading from stdin: {}", e));
            }
            (buffer, "<stdin>".to_string())
        }
    };

    match render_with_config(&source, &context, &partials, &config) {
        Ok(html) => print!("{}", html),
        Err(e) => {
            report(&e, &source, &filename, &partials);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read_file(path: &Path) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("Error reading file '{}': {}", path.display(), e)))
}

fn load_context(path: &Path) -> Context {
    let json: serde_json::Value = serde_json::from_str(&read_file(path))
        .unwrap_or_else(|e| fail(&format!("Error parsing context '{}': {}", path.display(), e)));
    Context::try_from(json)
        .unwrap_or_else(|e| fail(&format!("Error in context '{}': {}", path.display(), e)))
}

/// File name up to the first `.`: `nav-bar.partial.html` is `nav-bar`
fn partial_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file_name,
    }
}

/// Print a diagnostic against whichever text the error points into
fn report(err: &RenderError, source: &str, filename: &str, partials: &PartialRegistry) {
    match err.origin() {
        Some(Origin::Template) => eprint!("{}", err.format(source, filename)),
        Some(Origin::Partial(name)) => match partials.get(name) {
            Some(body) => eprint!("{}", err.format(body, &format!("_{}", name))),
            None => eprintln!("Error: {}", err),
        },
        None => eprintln!("Error: {}", err),
    }
}
