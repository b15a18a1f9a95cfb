//! Catalog seeding and user maintenance against the same database the server uses.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use foodgram_sdk::{
    actions::{ingredients, tags, users},
    connect,
    error::{Error, ErrorKind},
    schema::UserRole,
};

#[derive(Parser, Debug)]
#[command(name = "foodgram-load")]
#[command(about = "Load catalog data and manage users")]
struct Args {
    #[arg(long, default_value = "sqlite:foodgram.db?mode=rwc", env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import `name,measurement_unit` rows
    Ingredients { csv: PathBuf },
    /// Import `name,color,slug` rows
    Tags { csv: PathBuf },
    /// Change the role of the user with this email
    Role { email: String, role: String },
}

async fn read(path: &Path) -> Result<String, Error> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        ErrorKind::Validation.new(&format!("Cannot read {}: {e}", path.display()))
    })
}

async fn run(args: Args) -> Result<(), Error> {
    let pool = connect(&args.database_url).await?;

    match args.command {
        Command::Ingredients { csv } => {
            let count = ingredients::import_csv(&read(&csv).await?, &pool).await?;
            log::info!("Loaded {count} ingredients from {}", csv.display());
        }
        Command::Tags { csv } => {
            let count = tags::import_csv(&read(&csv).await?, &pool).await?;
            log::info!("Loaded {count} tags from {}", csv.display());
        }
        Command::Role { email, role } => {
            let role = UserRole::try_from(role.as_str())?;
            users::set_role(&email, role, &pool).await?;
            log::info!("{email} is now {role:?}");
        }
    }

    pool.close().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Err(e) = run(Args::parse()).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}
