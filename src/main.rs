use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rowmerge::allocate::GeneratorMap;
use rowmerge::catalog::{Catalog, Dialect};
use rowmerge::config::RunConfig;
use rowmerge::model::ForeignKeyRelation;
use rowmerge::overlay::{FileOverlay, RelationOverlay};
use rowmerge::pipeline::{self, MergeRequest};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowmerge", version, about = "Replay a foreign-key row graph as MERGE statements")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a MERGE script for the rows reachable from the seed values
    Generate(GenerateArgs),
    /// Manage virtual foreign keys
    Overlay {
        /// Overlay store file
        #[arg(short, long, env = "ROWMERGE_OVERLAY")]
        file: PathBuf,
        #[command(subcommand)]
        action: OverlayAction,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// SQL dump with CREATE TABLE and INSERT statements
    #[arg(short, long)]
    dump: PathBuf,
    /// Root table
    #[arg(short, long)]
    table: String,
    /// Column the values are matched against (default: primary key)
    #[arg(short, long)]
    column: Option<String>,
    /// Seed value; repeat or separate with commas for a batch
    #[arg(long = "value", required = true, value_delimiter = ',')]
    values: Vec<String>,
    /// Business-key column of the root table used to match existing rows
    #[arg(long)]
    name_column: Option<String>,
    /// Update matched rows instead of only inserting missing ones
    #[arg(long)]
    update: bool,
    /// Append a timestamp suffix to the name-column value
    #[arg(long)]
    test: bool,
    /// Sequence-fed key, TABLE.COLUMN=SEQUENCE
    #[arg(long = "sequence")]
    sequences: Vec<String>,
    /// Use sequences found in BEFORE INSERT triggers of the dump
    #[arg(long)]
    detect_sequences: bool,
    /// Tables whose rows already exist in the target
    #[arg(long = "constant", value_delimiter = ',')]
    constant_tables: Vec<String>,
    /// Virtual foreign key store
    #[arg(long, env = "ROWMERGE_OVERLAY")]
    overlay: Option<PathBuf>,
    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Dump dialect: auto, generic, postgres, mysql, oracle
    #[arg(long, default_value = "auto")]
    dialect: String,
    /// Print the dependency tree to stderr
    #[arg(long)]
    tree: bool,
}

#[derive(Subcommand)]
enum OverlayAction {
    /// List stored relations
    List,
    /// Add CHILD_TABLE FK_COLUMN PARENT_TABLE PARENT_PK_COLUMN
    Add(RelationArgs),
    /// Remove CHILD_TABLE FK_COLUMN PARENT_TABLE PARENT_PK_COLUMN
    Remove(RelationArgs),
}

#[derive(Args)]
struct RelationArgs {
    child_table: String,
    fk_column: String,
    parent_table: String,
    parent_pk_column: String,
}

impl From<RelationArgs> for ForeignKeyRelation {
    fn from(args: RelationArgs) -> Self {
        ForeignKeyRelation::new(
            args.child_table.to_uppercase(),
            args.fk_column.to_uppercase(),
            args.parent_table.to_uppercase(),
            args.parent_pk_column.to_uppercase(),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Generate(args) => generate(args),
        Command::Overlay { file, action } => overlay(file, action),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn generate(args: GenerateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    let dialect = Dialect::from_name(&args.dialect)
        .with_context(|| format!("unknown dialect '{}'", args.dialect))?;
    let dump = fs::read_to_string(&args.dump)
        .with_context(|| format!("failed to read {}", args.dump.display()))?;
    let catalog = Catalog::from_sql_with(&dump, dialect)
        .with_context(|| format!("failed to load {}", args.dump.display()))?;

    let mut generators: GeneratorMap = config.generators()?;
    for mapping in &args.sequences {
        generators.insert_mapping(mapping)?;
    }
    let detected = if args.detect_sequences {
        catalog.detected_generators()
    } else {
        GeneratorMap::new()
    };

    let mut constant_tables = config.constant_tables();
    constant_tables.extend(args.constant_tables.iter().map(|t| t.trim().to_uppercase()));

    let name_column = args.name_column.or(config.name_column);
    if args.test && name_column.is_none() {
        bail!("--test needs a name column (--name-column or name_column in the config)");
    }
    let now = chrono::Local::now();
    let test_suffix = args.test.then(|| now.format("_%Y%m%d%H%M%S").to_string());
    let generated_at = now.format("%Y-%m-%d %H:%M:%S").to_string();

    let mut overlay = args
        .overlay
        .or(config.overlay_file)
        .map(FileOverlay::open);

    let request = MergeRequest {
        root_table: &args.table,
        lookup_column: args.column.as_deref(),
        seeds: &args.values,
        name_column: name_column.as_deref(),
        test_suffix: test_suffix.as_deref(),
        include_update: args.update || config.include_update,
        generators,
        detected,
        constant_tables: &constant_tables,
        generated_at: Some(&generated_at),
    };
    let output = pipeline::run(
        &catalog,
        overlay.as_mut().map(|o| o as &mut dyn RelationOverlay),
        &request,
    )?;

    if args.tree {
        eprint!("{}", output.tree);
    }

    match args.output {
        Some(path) => {
            fs::write(&path, &output.script)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} statements to {}",
                output.result.total_rows(),
                path.display()
            );
        }
        None => print!("{}", output.script),
    }
    Ok(())
}

fn overlay(file: PathBuf, action: OverlayAction) -> Result<()> {
    let mut store = FileOverlay::open(&file);
    match action {
        OverlayAction::List => {
            for relation in store.entries() {
                println!("{}", relation);
            }
        }
        OverlayAction::Add(args) => {
            let relation = ForeignKeyRelation::from(args);
            let added = store
                .add(relation.clone())
                .with_context(|| format!("failed to write {}", file.display()))?;
            if !added {
                eprintln!("{} is already stored", relation);
            }
        }
        OverlayAction::Remove(args) => {
            let relation = ForeignKeyRelation::from(args);
            let removed = store
                .remove(&relation)
                .with_context(|| format!("failed to write {}", file.display()))?;
            if !removed {
                bail!("{} is not stored", relation);
            }
        }
    }
    Ok(())
}
