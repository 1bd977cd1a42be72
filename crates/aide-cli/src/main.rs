use std::path::PathBuf;

use aide_api::Memory;
use aide_core::MemoryRecord;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Parser)]
#[command(name = "aide-mem")]
#[command(about = "Maintenance CLI for the aide conversation memory store")]
struct Cli {
    /// SQLite database path.
    #[arg(long, default_value = "./aide_memory.sqlite3")]
    db: PathBuf,

    /// User namespace all operations are scoped to.
    #[arg(long, env = "AIDE_USER", default_value = "JD")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add a record.
    Add(AddArgs),
    /// Show recent records (oldest first for readability).
    Recent(RecentArgs),
    /// Substring search over record content.
    Search(SearchArgs),
    /// Soft-delete records containing a keyword.
    ForgetKeyword(ForgetKeywordArgs),
    /// Soft-delete a single record by id.
    ForgetId(ForgetIdArgs),
    /// Soft-delete every record for the user.
    Clear,
    /// Database maintenance.
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Debug, Args)]
struct AddArgs {
    #[arg(long, value_enum, default_value_t = RoleArg::User)]
    role: RoleArg,
    #[arg(long, value_enum, default_value_t = KindArg::Chat)]
    kind: KindArg,
    /// Content text.
    #[arg(required = true, num_args = 1..)]
    content: Vec<String>,
}

#[derive(Debug, Args)]
struct RecentArgs {
    #[arg(long, default_value_t = 20)]
    n: usize,
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    #[arg(long, default_value_t = false)]
    include_deleted: bool,
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Query text.
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,
    #[arg(long, default_value_t = 20)]
    n: usize,
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    #[arg(long, default_value_t = false)]
    include_deleted: bool,
}

#[derive(Debug, Args)]
struct ForgetKeywordArgs {
    /// Keyword to match in content.
    #[arg(required = true, num_args = 1..)]
    keyword: Vec<String>,
}

#[derive(Debug, Args)]
struct ForgetIdArgs {
    id: i64,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Print the recorded schema version.
    SchemaVersion,
    /// Physically compact the backing file.
    Vacuum,
    /// Write an online backup of the database.
    Backup {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Assistant,
    System,
}

impl RoleArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Chat,
    Remembered,
}

impl KindArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Remembered => "remembered",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let memory = Memory::new(cli.db);

    match cli.command {
        Command::Add(args) => run_add(&memory, &cli.user, &args),
        Command::Recent(args) => run_recent(&memory, &cli.user, &args),
        Command::Search(args) => run_search(&memory, &cli.user, &args),
        Command::ForgetKeyword(args) => run_forget_keyword(&memory, &cli.user, &args),
        Command::ForgetId(args) => run_forget_id(&memory, &cli.user, args.id),
        Command::Clear => run_clear(&memory, &cli.user),
        Command::Db { command } => run_db(&memory, command),
    }
}

fn run_add(memory: &Memory, user: &str, args: &AddArgs) -> Result<()> {
    let content = args.content.join(" ");
    let id = memory.store(user, args.role.as_str(), &content, args.kind.as_str())?;
    println!("added id={id}");
    Ok(())
}

fn run_recent(memory: &Memory, user: &str, args: &RecentArgs) -> Result<()> {
    let kind = args.kind.map(KindArg::as_str);
    let rows = memory.recent(user, args.n, args.include_deleted, kind)?;
    print_rows(&rows);
    Ok(())
}

fn run_search(memory: &Memory, user: &str, args: &SearchArgs) -> Result<()> {
    let query = args.query.join(" ");
    let kind = args.kind.map(KindArg::as_str);
    let rows = memory.search(user, &query, args.n, args.include_deleted, kind)?;
    print_rows(&rows);
    Ok(())
}

fn run_forget_keyword(memory: &Memory, user: &str, args: &ForgetKeywordArgs) -> Result<()> {
    let keyword = args.keyword.join(" ");
    let affected = memory.forget_keyword(user, &keyword)?;
    println!("forgot {affected} row(s) matching: {keyword}");
    Ok(())
}

fn run_forget_id(memory: &Memory, user: &str, id: i64) -> Result<()> {
    let affected = memory.forget_id(user, id)?;
    println!("forgot {affected} row(s) with id={id}");
    Ok(())
}

fn run_clear(memory: &Memory, user: &str) -> Result<()> {
    let affected = memory.clear(user)?;
    println!("cleared {affected} row(s) for user={user}");
    Ok(())
}

fn run_db(memory: &Memory, command: DbCommand) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            match memory.schema_version()? {
                Some(version) => println!("schema_version={version}"),
                None => println!("schema_version=unknown"),
            }
            Ok(())
        }
        DbCommand::Vacuum => {
            memory.reclaim_space()?;
            println!("vacuum complete");
            Ok(())
        }
        DbCommand::Backup { out } => {
            memory.backup(&out)?;
            println!("backup written to {}", out.display());
            Ok(())
        }
    }
}

/// Rows arrive newest first; print oldest first so the terminal reads like a
/// transcript.
fn print_rows(rows: &[MemoryRecord]) {
    for row in rows.iter().rev() {
        println!("{}", render_row(row));
    }
}

fn render_row(row: &MemoryRecord) -> String {
    let timestamp = row.created_at.format(&Rfc3339).unwrap_or_else(|_| "-".to_string());
    let flag = if row.deleted { " (DELETED)" } else { "" };
    format!("[{}] {} {}/{}{}: {}", row.id, timestamp, row.role, row.kind, flag, row.content)
}
