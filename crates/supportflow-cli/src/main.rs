mod email;
mod import;
mod normalize;
mod table;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use supportflow_config::{AppConfig, ConfigLoader};
use supportflow_db::{LegacyConnection, MySqlLegacySource, SqliteTicketStore, TicketStore};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::email::{
    CommandEmailReplies, DEFAULT_ARCHIVE, DEFAULT_INBOX, ImapDetails, details_filter,
    download_and_process_email_replies,
};
use crate::import::{ImportOptions, Importer};
use crate::normalize::QuotedReplyStripper;
use crate::table::Table;

#[derive(Parser)]
#[command(
    name = "supportflow",
    version,
    about = "SupportFlow - helpdesk import and email reply tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config.yml / config.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Ticket store database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import threads and messages from a remote SupportFlow database
    ImportRemote {
        /// Hostname for the remote database (host[:port])
        #[arg(long)]
        db_host: String,

        /// Name of the database to connect to
        #[arg(long)]
        db_name: String,

        /// Remote database user
        #[arg(long)]
        db_user: String,

        /// Remote database password
        #[arg(long, default_value = "")]
        db_pass: String,

        /// Prefix for the SupportFlow tables [default: support_]
        #[arg(long)]
        table_prefix: Option<String>,

        /// Prefix for imported thread statuses [default: imported_]
        #[arg(long)]
        status_prefix: Option<String>,

        /// Drop quoted history from imported messages
        #[arg(long)]
        strip_quoted: bool,

        /// Report what would be imported without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Download and process email replies from a remote IMAP inbox
    EmailReplies {
        /// IMAP server, e.g. {imap.gmail.com:993/imap/ssl/novalidate-cert}
        #[arg(long, default_value = "")]
        host: String,

        /// Mailbox user, the full address for Gmail
        #[arg(long, default_value = "")]
        username: String,

        #[arg(long, default_value = "")]
        password: String,

        /// Folder new replies arrive in
        #[arg(long, default_value = DEFAULT_INBOX)]
        inbox: String,

        /// Folder processed replies are moved to
        #[arg(long, default_value = DEFAULT_ARCHIVE)]
        archive: String,
    },

    /// List threads in the ticket store
    Threads {
        /// Only show threads with this status
        #[arg(long)]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new()?,
    };
    let config = config_loader.load()?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    debug!("config directory: {}", config_loader.config_dir().display());

    match cli.command {
        Commands::ImportRemote {
            db_host,
            db_name,
            db_user,
            db_pass,
            table_prefix,
            status_prefix,
            strip_quoted,
            dry_run,
        } => {
            let connection = LegacyConnection::new(db_host, db_name, db_user, db_pass)
                .with_table_prefix(
                    table_prefix.unwrap_or_else(|| config.import.table_prefix.clone()),
                );
            let options = ImportOptions {
                status_prefix: status_prefix
                    .unwrap_or_else(|| config.import.status_prefix.clone()),
                dry_run,
            };
            let strip_quoted = strip_quoted || config.import.strip_quoted_replies;

            let store = open_store(&config_loader, &config, cli.db.as_deref())?;
            import_remote(&store, &connection, options, strip_quoted).await?;
        }
        Commands::EmailReplies {
            host,
            username,
            password,
            inbox,
            archive,
        } => {
            let details = ImapDetails {
                host,
                username,
                password,
                inbox,
                archive,
            };
            let service = CommandEmailReplies::from_config(&config.email_replies);

            let filter = details_filter(&config.imap);

            match download_and_process_email_replies(details, filter.as_ref(), &service) {
                Ok(message) => println!("{} {message}", "Success:".green().bold()),
                Err(e) => anyhow::bail!("{e}"),
            }
        }
        Commands::Threads { status } => {
            let store = open_store(&config_loader, &config, cli.db.as_deref())?;
            println!("{}", render_threads(&store, status.as_deref())?);
        }
    }

    Ok(())
}

fn open_store(
    loader: &ConfigLoader,
    config: &AppConfig,
    explicit: Option<&Path>,
) -> Result<SqliteTicketStore> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            loader.ensure_dirs(config)?;
            loader.store_path(config)
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    SqliteTicketStore::open(&path)
        .with_context(|| format!("failed to open ticket store at {}", path.display()))
}

async fn import_remote(
    store: &dyn TicketStore,
    connection: &LegacyConnection,
    options: ImportOptions,
    strip_quoted: bool,
) -> Result<()> {
    let dry_run = options.dry_run;
    println!(
        "Importing from {}@{}/{} (prefix '{}'){}",
        connection.user,
        connection.host,
        connection.database,
        connection.table_prefix,
        if dry_run { " (dry run)" } else { "" }
    );

    let mut source = MySqlLegacySource::connect(connection).await?;

    let mut importer = Importer::new(store, options);
    if strip_quoted {
        importer = importer.with_normalizer(&QuotedReplyStripper);
    }
    let result = importer
        .run(&mut source, &mut |outcome| println!("{outcome}"))
        .await;

    if let Err(e) = source.close().await {
        warn!("{e}");
    }

    let report = result?;
    println!("{} {}", "Success:".green().bold(), report.final_line());
    report.print_summary();
    Ok(())
}

fn render_threads(store: &dyn TicketStore, status: Option<&str>) -> Result<String> {
    let threads = store.list_threads(status)?;

    let mut table = Table::new();
    table.set_columns([
        ("id", "ID"),
        ("subject", "Subject"),
        ("status", "Status"),
        ("respondents", "Respondents"),
        ("replies", "Replies"),
        ("created", "Created"),
    ]);
    table.set_no_items(
        "No threads found. Run 'supportflow import-remote' to migrate a legacy instance.",
    );
    table.set_rows(
        threads
            .into_iter()
            .map(|summary| {
                HashMap::from([
                    ("id".to_string(), summary.thread.id.to_string()),
                    ("subject".to_string(), summary.thread.subject),
                    ("status".to_string(), summary.thread.status),
                    ("respondents".to_string(), summary.respondents.join(", ")),
                    ("replies".to_string(), summary.message_count.to_string()),
                    (
                        "created".to_string(),
                        summary.thread.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    ),
                ])
            })
            .collect(),
    );

    Ok(table.render())
}

#[cfg(test)]
mod tests {
    use super::render_threads;
    use supportflow_common::{NewMessage, NewThread, Visibility};
    use supportflow_db::{SqliteTicketStore, TicketStore};

    #[test]
    fn render_threads_shows_empty_state() {
        let store = SqliteTicketStore::in_memory().expect("store");
        let rendered = render_threads(&store, None).expect("render");
        assert_eq!(
            rendered,
            "No threads found. Run 'supportflow import-remote' to migrate a legacy instance."
        );
    }

    #[test]
    fn render_threads_lists_store_contents() {
        let store = SqliteTicketStore::in_memory().expect("store");
        let id = store
            .create_thread(&NewThread {
                subject: "Help".into(),
                status: "imported_open".into(),
                created_at: None,
            })
            .expect("create");
        store
            .set_thread_respondents(id, "a@example.com")
            .expect("respondents");
        store
            .add_message(
                id,
                "Hi",
                &NewMessage {
                    author: "a@example.com".into(),
                    author_email: "a@example.com".into(),
                    visibility: Visibility::Public,
                    created_at: None,
                },
            )
            .expect("message");

        let rendered = render_threads(&store, None).expect("render");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID  Subject  Status"));
        assert!(lines[2].contains("Help"));
        assert!(lines[2].contains("imported_open"));
        assert!(lines[2].contains("a@example.com"));

        let filtered = render_threads(&store, Some("imported_closed")).expect("render");
        assert!(filtered.starts_with("No threads found."));
    }
}
