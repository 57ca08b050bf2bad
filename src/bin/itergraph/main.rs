//! Binary entry point for the itergraph administrative CLI.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use itergraph::admin::{verify, VerifyLevel};
use itergraph::{
    DependentRecord, EntityId, EntityTypeId, Iteration, LedgerConfig, RelationId, Schema, Store,
};
use serde_json::json;

use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "itergraph",
    version,
    about = "Inspect and verify an iteration ledger store",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[arg(
        long,
        global = true,
        env = "RUST_LOG",
        default_value = "warn",
        help = "Log filter directives"
    )]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(
        long,
        global = true,
        env = "ITERGRAPH_CONFIG",
        value_name = "FILE",
        help = "Configuration file declaring the schema"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "ITERGRAPH_DB",
        value_name = "DB",
        help = "Database path; overrides [store].database"
    )]
    db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create every table declared by the configuration")]
    Init,

    #[command(about = "Check entity histories and interval chains")]
    Verify {
        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Full,
            help = "Verification level"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "List every iteration of an entity")]
    History {
        #[arg(value_name = "TYPE")]
        entity_type: String,
        #[arg(value_name = "ID")]
        id: String,
    },

    #[command(name = "as-of", about = "Show an entity and its dependents at one iteration")]
    AsOf {
        #[arg(value_name = "TYPE")]
        entity_type: String,
        #[arg(value_name = "ID")]
        id: String,
        #[arg(value_name = "ITERATION")]
        iteration: Iteration,
    },

    #[command(about = "List dependents of an owner")]
    Dependents {
        #[arg(value_name = "RELATION")]
        relation: String,
        #[arg(value_name = "OWNER")]
        owner: String,
        #[arg(long, value_name = "ITERATION", help = "Owner iteration to read at")]
        at: Option<Iteration>,
    },

    #[command(about = "Print shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "itergraph", &mut io::stdout());
        return Ok(());
    }
    itergraph::logging::init_logging(&cli.log)?;
    let ui = Ui::new(cli.theme);
    let mut store = open_store(&cli.open)?;

    match cli.command {
        Command::Init => {
            let schema = store.schema();
            let entities: Vec<String> = schema
                .entity_types()
                .map(|ty| schema.entity(ty).table.clone())
                .collect();
            let relations: Vec<String> = schema
                .relations()
                .map(|rel| schema.relation(rel).table.clone())
                .collect();
            let report = json!({ "entity_tables": entities, "relation_tables": relations });
            emit(cli.format, &report, || ui.tables(&entities, &relations))?;
        }
        Command::Verify { level } => {
            let spinner = ui.spinner("verifying store");
            let report = verify(&mut store, level.into())?;
            let elapsed = spinner.stop();
            emit(cli.format, &report, || ui.verify_report(&report, elapsed))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::History { entity_type, id } => {
            let ty = entity_type_named(store.schema(), &entity_type)?;
            let ledger = store.ledger();
            let rows = store.transaction(|cx| ledger.history(cx, ty, &id))?;
            if rows.is_empty() {
                return Err(format!("{entity_type} '{id}' not found").into());
            }
            emit(cli.format, &rows, || ui.history(&format!("{entity_type} '{id}'"), &rows))?;
        }
        Command::AsOf {
            entity_type,
            id,
            iteration,
        } => {
            let ty = entity_type_named(store.schema(), &entity_type)?;
            let history = store.history();
            let entity = EntityId::new(id.as_str());
            let snapshot = store
                .transaction(|cx| history.snapshot_at(cx, ty, &entity, iteration))?
                .ok_or_else(|| format!("{entity_type} '{id}' has no iteration {iteration}"))?;
            emit(cli.format, &snapshot, || ui.snapshot(&snapshot))?;
        }
        Command::Dependents {
            relation,
            owner,
            at,
        } => {
            let rel = relation_named(store.schema(), &relation)?;
            let owner = EntityId::new(owner);
            let rows = read_dependents(&mut store, rel, &owner, at)?;
            emit(cli.format, &rows, || ui.dependents(&format!("{relation} of '{owner}'"), &rows))?;
        }
        Command::Completions { .. } => {}
    }
    Ok(())
}

fn open_store(args: &OpenArgs) -> Result<Store, Box<dyn Error>> {
    let config = LedgerConfig::load_or_default(args.config.as_deref())?;
    let schema = Schema::from_config(&config.schema)?;
    let options = config.options()?;
    let db = args
        .db
        .clone()
        .or_else(|| config.store.database.clone())
        .ok_or("no database path: pass --db or set [store].database")?;
    Ok(Store::open(resolve(&db), schema, options)?)
}

fn resolve(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

fn read_dependents(
    store: &mut Store,
    rel: RelationId,
    owner: &EntityId,
    at: Option<Iteration>,
) -> Result<Vec<DependentRecord>, Box<dyn Error>> {
    let symmetric = store.schema().relation(rel).kind.is_symmetric();
    let history = store.history();
    let cascade = store.cascade();
    let adapter = store.symmetric();
    let rows = store.transaction(|cx| match at {
        Some(k) => history.dependents_at(cx, rel, owner, k),
        None if symmetric => Ok(adapter
            .dependents_of(cx, rel, owner)?
            .into_iter()
            .map(|view| view.record)
            .collect()),
        None => cascade.dependents_of(cx, rel, owner),
    })?;
    Ok(rows)
}

fn entity_type_named(schema: &Schema, name: &str) -> Result<EntityTypeId, Box<dyn Error>> {
    schema
        .entity_type(name)
        .ok_or_else(|| format!("unknown entity type '{name}'").into())
}

fn relation_named(schema: &Schema, name: &str) -> Result<RelationId, Box<dyn Error>> {
    schema
        .relation_named(name)
        .ok_or_else(|| format!("unknown relation '{name}'").into())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}
