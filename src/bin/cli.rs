use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use drms::authz::Role;

#[derive(Parser, Debug)]
#[command(author, version, about = "drms administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Change the role of an existing user, e.g. to bootstrap the first admin
    SetRole {
        email: String,
        /// ADMIN, HR, DEPARTMENT_HEAD or EMPLOYEE
        role: String,
        #[arg(long)]
        department: Option<String>,
        /// Required for DEPARTMENT_HEAD
        #[arg(long)]
        managed_department: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fall back to the crate-local `.env` when run from another directory.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::SetRole { email, role, department, managed_department } => {
            let pool = get_pool().await?;
            let role: Role = role.parse()?;
            set_role(&pool, &email, role, clean(department), clean(managed_department)).await?;
            println!("{} is now {}", email.trim().to_lowercase(), role);
        }
    }

    Ok(())
}

async fn set_role(
    pool: &SqlitePool,
    email: &str,
    role: Role,
    department: Option<String>,
    managed_department: Option<String>,
) -> anyhow::Result<()> {
    let managed_department = match role {
        Role::DepartmentHead => Some(managed_department.context("DEPARTMENT_HEAD requires --managed-department")?),
        _ => None,
    };

    let result = sqlx::query(
        "UPDATE users SET role = ?, department = COALESCE(?, department), managed_department = ?, updated_at = ? \
         WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(role.as_str())
    .bind(department)
    .bind(managed_department)
    .bind(Utc::now())
    .bind(email.trim().to_lowercase())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no active user with email {}", email);
    }

    Ok(())
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied_versions: HashSet<i64> = if tracked > 0 {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
