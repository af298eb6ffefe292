use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

use vk2rss::app::{App, FeedForm, ImportOptions, ManageError};
use vk2rss::config::Config;
use vk2rss::storage::{Database, DatabaseError, FeedConfig};
use vk2rss::vk::SourceType;

/// SEC-014: Largest accepted import file (1 MB).
const MAX_IMPORT_SIZE: u64 = 1_048_576;

/// Get the config directory path (~/.config/vk2rss/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("vk2rss");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "vk2rss", about = "Publish VK walls as RSS feeds", version)]
struct Args {
    /// Config file (default: ~/.config/vk2rss/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Act as this user (created on first use)
    #[arg(long, global = true, default_value = "admin")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct FeedArgs {
    /// VK id, screen name or URL
    source_id: String,

    /// Feed title
    #[arg(long)]
    title: String,

    #[arg(long)]
    description: Option<String>,

    /// Source type: user, group or page
    #[arg(long = "type", default_value = "group")]
    source_type: String,

    /// Number of posts per document (1-100)
    #[arg(long, default_value_t = 20)]
    items: i64,

    /// Leave attachments out of entry bodies
    #[arg(long)]
    no_attachments: bool,

    /// Store the include-comments flag
    #[arg(long)]
    comments: bool,

    /// Do not translate titles
    #[arg(long)]
    no_translate: bool,

    /// Serve without an access token
    #[arg(long)]
    public: bool,
}

impl FeedArgs {
    fn into_form(self) -> FeedForm {
        FeedForm {
            title: self.title,
            description: self.description,
            source_type: self.source_type,
            source_id: self.source_id,
            items_count: self.items,
            include_attachments: !self.no_attachments,
            include_comments: self.comments,
            translate_titles: !self.no_translate,
            is_public: self.public,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a feed
    Add(FeedArgs),
    /// Replace a feed's settings (the access token is kept)
    Edit {
        id: i64,
        #[command(flatten)]
        feed: FeedArgs,
    },
    /// Delete a feed
    Delete { id: i64 },
    /// List your feeds with their URLs
    List,
    /// Resolve and describe a VK source without saving anything
    Check {
        /// Source type: user, group or page
        #[arg(long = "type", default_value = "group")]
        source_type: String,
        source_id: String,
    },
    /// Create feeds from a file with one `<url-or-id>[#title]` per line ("-" for stdin)
    Import {
        file: PathBuf,
        #[arg(long, default_value = "VK Feed")]
        default_title: String,
        #[arg(long = "type", default_value = "group")]
        source_type: SourceType,
        #[arg(long, default_value_t = 20)]
        items: i64,
        #[arg(long)]
        no_attachments: bool,
        #[arg(long)]
        no_translate: bool,
        #[arg(long)]
        public: bool,
    },
    /// Print a feed document. With --token, behaves like the public endpoint.
    Render {
        id: i64,
        #[arg(long)]
        token: Option<String>,
    },
    /// Print a feed's public URL
    Url { id: i64 },
}

fn print_feed(app: &App, feed: &FeedConfig) {
    println!(
        "{:>4}  {:<30}  {:<5}  {:<30}  {}",
        feed.id,
        feed.title,
        feed.source_type,
        feed.source_id,
        if feed.is_public { "public" } else { "private" }
    );
    println!("      {}", app.feed_url(feed));
}

fn read_import_text(file: &Path) -> Result<String> {
    let mut text = String::new();
    if file.as_os_str() == "-" {
        std::io::stdin()
            .take(MAX_IMPORT_SIZE)
            .read_to_string(&mut text)
            .context("Failed to read import list from stdin")?;
        return Ok(text);
    }

    // SEC-008: Canonicalize to resolve symlinks before reading
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }
    if metadata.len() > MAX_IMPORT_SIZE {
        anyhow::bail!(
            "Import file is {} bytes (max {} bytes)",
            metadata.len(),
            MAX_IMPORT_SIZE
        );
    }
    std::fs::read_to_string(&canonical)
        .with_context(|| format!("Failed to read import file: {}", canonical.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        eprintln!("Created config directory: {}", config_dir.display());
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .apply_env(|name| std::env::var(name).ok())
        .context("Invalid environment override")?;

    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| config_dir.join("vk2rss.db"));
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database at {} is locked by another process.", db_path.display());
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let user = db
        .ensure_user(&args.user)
        .await
        .context("Failed to load user")?;
    let app = App::new(config, db).context("Failed to create application")?;

    match run(&app, &user, args.command).await {
        Ok(()) => Ok(()),
        Err(ManageError::Validation(e)) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
        Err(e @ (ManageError::NotFound(_) | ManageError::Forbidden(_))) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(ManageError::Storage(e)) => Err(e),
    }
}

async fn run(
    app: &App,
    user: &vk2rss::storage::User,
    command: Command,
) -> Result<(), ManageError> {
    match command {
        Command::Add(feed) => {
            let feed = app.add_feed(user, &feed.into_form()).await?;
            println!("Added feed {}", feed.id);
            print_feed(app, &feed);
        }
        Command::Edit { id, feed } => {
            let feed = app.edit_feed(user, id, &feed.into_form()).await?;
            println!("Updated feed {}", feed.id);
            print_feed(app, &feed);
        }
        Command::Delete { id } => {
            app.delete_feed(user, id).await?;
            println!("Deleted feed {}", id);
        }
        Command::List => {
            let feeds = app.list_feeds(user).await?;
            if feeds.is_empty() {
                println!("No feeds yet. Add one with `vk2rss add <source> --title <title>`.");
            }
            for feed in &feeds {
                print_feed(app, feed);
            }
        }
        Command::Check {
            source_type,
            source_id,
        } => {
            let meta = app.check_source(&source_type, &source_id).await?;
            println!("Title:       {}", meta.title);
            println!("Link:        {}", meta.link);
            println!("Description: {}", meta.description);
            if let Some(image) = meta.image {
                println!("Image:       {}", image);
            }
        }
        Command::Import {
            file,
            default_title,
            source_type,
            items,
            no_attachments,
            no_translate,
            public,
        } => {
            let text = read_import_text(&file)?;
            let options = ImportOptions {
                default_title,
                source_type,
                items_count: items,
                include_attachments: !no_attachments,
                translate_titles: !no_translate,
                is_public: public,
                ..Default::default()
            };
            let report = app.import_feeds(user, &text, &options).await?;
            for feed in &report.created {
                print_feed(app, feed);
            }
            for error in &report.errors {
                eprintln!("Error: {}", error);
            }
            println!(
                "Created {} feeds, {} errors",
                report.created.len(),
                report.errors.len()
            );
        }
        Command::Render { id, token: Some(token) } => {
            let response = app.serve_feed(id, Some(&token)).await;
            if !response.status.is_success() {
                eprintln!("Error: {}", response.status);
                std::process::exit(1);
            }
            println!("{}", response.body);
        }
        Command::Render { id, token: None } => {
            println!("{}", app.preview_feed(user, id).await?);
        }
        Command::Url { id } => {
            let feed = app.owned_feed(user, id).await?;
            println!("{}", app.feed_url(&feed));
        }
    }
    Ok(())
}
