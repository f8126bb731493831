//! ipdrload CLI - Map and load IPDR session logs
//!
//! # Main Commands
//!
//! ```bash
//! ipdrload serve                          # Start HTTP server (port 3000)
//! ipdrload analyze sessions.csv           # Suggest a column mapping
//! ipdrload process sessions.csv           # Map, normalize and load
//! ipdrload template list                  # Manage saved mappings
//! ```
//!
//! # Loading into PostgreSQL
//!
//! ```bash
//! ipdrload process sessions.csv --no-header \
//!     --command "psql -c '\copy sessions FROM STDIN WITH (FORMAT csv)'"
//! ```

use clap::{Parser, Subcommand};
use ipdrload::{
    open_sink, preflight, process_file, read_info, schema, validate_mapping, ColumnMapping, Config,
    JobLog, MappingRegistry,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ipdrload")]
#[command(about = "Map IPDR session exports onto the canonical schema and bulk-load them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Detect file format and suggest a column mapping
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// Fuzzy matching only, even with an API key configured
        #[arg(long)]
        no_ai: bool,
    },

    /// Normalize a file and stream it into the load destination
    Process {
        /// Input CSV file
        input: PathBuf,

        /// Mapping JSON file (`{field: header}`); suggested if omitted
        #[arg(short, long, conflicts_with = "template")]
        mapping: Option<PathBuf>,

        /// Saved template to map with
        #[arg(short, long)]
        template: Option<String>,

        /// Output file to append to (default: IPDR_OUTPUT or ipdr_records.csv)
        #[arg(short, long, conflicts_with = "command")]
        output: Option<PathBuf>,

        /// Load command fed through stdin, e.g. a psql \copy
        #[arg(short, long)]
        command: Option<String>,

        /// Do not write the column header line to a new output file
        #[arg(long)]
        no_header: bool,

        /// Save the mapping as a template under this name
        #[arg(long)]
        save_template: Option<String>,

        /// Fuzzy matching only, even with an API key configured
        #[arg(long)]
        no_ai: bool,
    },

    /// Print the canonical schema
    Schema,

    /// Manage saved mapping templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List all stored templates
    List,

    /// Import a mapping JSON file as template
    Import {
        /// Mapping JSON file to import
        file: PathBuf,
        /// Name for the template
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a template
    Show {
        /// Template ID
        id: String,
    },

    /// Delete a template
    Delete {
        /// Template ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match Config::from_env() {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, mut config: Config) -> CliResult {
    match command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            ipdrload::start_server(config).await?;
            Ok(())
        }

        Commands::Analyze { input, no_ai } => {
            if no_ai {
                config.api_key = None;
            }
            cmd_analyze(&input, &config).await
        }

        Commands::Process {
            input,
            mapping,
            template,
            output,
            command,
            no_header,
            save_template,
            no_ai,
        } => {
            if no_ai {
                config.api_key = None;
            }
            if let Some(output) = output {
                config.output = output;
                config.load_command = None;
            }
            if command.is_some() {
                config.load_command = command;
            }
            let source = match (mapping, template) {
                (Some(path), _) => MappingChoice::File(path),
                (None, Some(id)) => MappingChoice::Template(id),
                (None, None) => MappingChoice::Suggest,
            };
            cmd_process(&input, source, &config, !no_header, save_template.as_deref()).await
        }

        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&schema::definition())?);
            Ok(())
        }

        Commands::Template { action } => cmd_template(action, &config),
    }
}

async fn cmd_analyze(input: &Path, config: &Config) -> CliResult {
    eprintln!("📄 Analyzing: {}", input.display());

    let info = read_info(input)?;
    eprintln!("   Encoding: {}", info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(info.delimiter));
    eprintln!("   Columns: {}", info.headers.join(", "));

    let suggestion = config.suggester().suggest(&info.headers).await;
    let report = validate_mapping(&suggestion.mapping, Some(&info.headers));

    eprintln!(
        "\n🧭 Suggested mapping ({}): {} fields mapped",
        suggestion.source,
        suggestion.mapping.mapped_count()
    );
    print_report(&report.errors, &report.warnings);

    let registry = MappingRegistry::with_dir(&config.template_dir);
    if let Some((stored, score)) = registry.find_compatible(&info.headers).first() {
        eprintln!(
            "   💾 Compatible template: {} ({}), {:.0}% of columns",
            stored.name,
            stored.id,
            score * 100.0
        );
    }

    println!("{}", serde_json::to_string_pretty(&suggestion.mapping)?);
    Ok(())
}

/// Where `process` takes its mapping from
enum MappingChoice {
    File(PathBuf),
    Template(String),
    Suggest,
}

async fn cmd_process(
    input: &Path,
    choice: MappingChoice,
    config: &Config,
    write_header: bool,
    save_template: Option<&str>,
) -> CliResult {
    let mut registry = MappingRegistry::with_dir(&config.template_dir);

    let (mapping, template_id) = match choice {
        MappingChoice::File(path) => {
            let mapping: ColumnMapping = serde_json::from_str(&fs::read_to_string(&path)?)?;
            eprintln!("📋 Mapping: {}", path.display());
            (mapping, None)
        }
        MappingChoice::Template(id) => {
            let stored = registry.get(&id)?;
            eprintln!("📋 Template: {} ({})", stored.name, stored.id);
            (stored.mapping.clone(), Some(id))
        }
        MappingChoice::Suggest => {
            let info = read_info(input)?;
            let suggestion = config.suggester().suggest(&info.headers).await;
            eprintln!("🧭 Suggested mapping ({})", suggestion.source);
            (suggestion.mapping, None)
        }
    };

    let report = preflight(input, &mapping).map_err(|e| {
        for detail in e.details() {
            eprintln!("   - {}", detail);
        }
        e
    })?;
    print_report(&report.validation.errors, &report.validation.warnings);

    let mut sink = open_sink(config.load_command.as_deref(), &config.output, write_header).await?;
    match &config.load_command {
        Some(command) => eprintln!("🚚 Loading through: {}", command),
        None => eprintln!("🚚 Appending to: {}", config.output.display()),
    }

    let log = JobLog::default();
    let outcome = process_file(input, mapping.clone(), &mut sink, config.pipeline_options(), &log).await;

    if let Some(id) = &template_id {
        let success = matches!(&outcome, Ok(stats) if stats.records_processed > 0);
        registry.update_stats(id, success)?;
    }
    let stats = outcome?;

    if let Some(name) = save_template {
        let id = registry.save(mapping, name, report.info.headers)?;
        eprintln!("💾 Template saved with ID: {}", id);
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    eprintln!("\n✨ Done!");
    Ok(())
}

fn print_report(errors: &[String], warnings: &[String]) {
    for error in errors {
        eprintln!("   ❌ {}", error);
    }
    for warning in warnings {
        eprintln!("   ⚠️  {}", warning);
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_template(action: TemplateAction, config: &Config) -> CliResult {
    let mut registry = MappingRegistry::with_dir(&config.template_dir);

    match action {
        TemplateAction::List => {
            let templates = registry.list();
            if templates.is_empty() {
                eprintln!("📋 No templates stored yet.");
                eprintln!("   Use 'ipdrload template import <file>' or 'process --save-template' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored templates ({}):\n", templates.len());
            for t in templates {
                println!("  📄 {} ({})", t.name, t.id);
                println!("     Columns: {}", t.csv_columns.join(", "));
                println!("     Success rate: {:.0}%", t.success_rate * 100.0);
                println!("     Uses: {}", t.use_count);
                if let Some(ref last) = t.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        TemplateAction::Import { file, name } => {
            eprintln!("📥 Importing template from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Template saved with ID: {}", id);
        }

        TemplateAction::Show { id } => {
            let t = registry.get(&id)?;
            println!("📄 Template: {} ({})\n", t.name, t.id);
            println!("CSV Columns: {}", t.csv_columns.join(", "));
            println!("Created: {}", t.created_at);
            println!("Success rate: {:.0}%", t.success_rate * 100.0);
            println!("Uses: {}", t.use_count);
            println!("\nMapping:");
            println!("{}", serde_json::to_string_pretty(&t.mapping)?);
        }

        TemplateAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Template deleted: {}", id);
        }
    }

    Ok(())
}
