use std::path::PathBuf;
use std::sync::Arc;

use catalog_admin::admin::{self, AdminError};
use catalog_admin::catalog::{CatalogError, NewProduct, ProductPatch, ProductStore, RestProducts};
use catalog_admin::guard::{self, RouteError};
use catalog_admin::storage::ProductImages;
use catalog_admin::{
    AuthStore, ConfigError, ProviderConfig, ProviderError, RouteGuard, Router, SessionController, SessionFailure,
    SupabaseClient,
};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Session(#[from] SessionFailure),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("admin sign-in failed: {0}")]
    Admin(#[from] AdminError),
    #[error("navigation failed: {0}")]
    Route(#[from] RouteError),
    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not signed in; run `catalog-admin login` first")]
    NotSignedIn,
}

#[derive(Parser, Debug)]
#[command(name = "catalog-admin", about = "Product catalog admin for a Supabase project")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password.
    Login {
        #[arg(long, env = "CATALOG_EMAIL")]
        email: String,
        #[arg(long, env = "CATALOG_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with ADMIN_EMAIL / ADMIN_PASSWORD.
    AdminLogin,
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Resolve a panel route the way the guard would.
    Navigate { path: String },
    Products(ProductsCommand),
    Images(ImagesCommand),
}

#[derive(Args, Debug)]
struct ProductsCommand {
    #[command(subcommand)]
    command: ProductsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProductsSubcommand {
    List,
    Get {
        id: Uuid,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "")]
        image_url: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        stock: Option<i32>,
        #[arg(long)]
        featured: Option<bool>,
    },
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        stock: Option<i32>,
        #[arg(long)]
        featured: Option<bool>,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct ImagesCommand {
    #[command(subcommand)]
    command: ImagesSubcommand,
}

#[derive(Subcommand, Debug)]
enum ImagesSubcommand {
    Upload {
        file: PathBuf,
        #[arg(long, default_value = "products")]
        folder: String,
    },
    Url {
        path: String,
    },
    Delete {
        path: String,
    },
}

struct CliContext {
    config: ProviderConfig,
    client: Arc<SupabaseClient>,
    controller: SessionController,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ProviderConfig::from_env()?;
    let client = Arc::new(SupabaseClient::new(config.clone())?);
    if let Err(e) = client.restore_session().await {
        tracing::warn!(error = %e, "ignoring unreadable persisted session");
    }
    let refresher = client.spawn_auto_refresh();

    let controller = SessionController::new(client.clone(), AuthStore::new());
    let subscription = controller.init().await;

    let ctx = CliContext { config, client, controller };
    let result = run(&ctx, cli.command).await;

    subscription.unsubscribe();
    if let Some(refresher) = refresher {
        refresher.abort();
    }
    result
}

async fn run(ctx: &CliContext, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            let user = ctx.controller.login(&email, &password).await?;
            println!("signed in as {}", user.email.as_deref().unwrap_or("<no email>"));
        }
        Command::AdminLogin => {
            let session = admin::sign_in_as_admin(ctx.client.as_ref(), &ctx.config).await?;
            println!("signed in as admin {}", session.user.email.as_deref().unwrap_or("<no email>"));
        }
        Command::Logout => {
            ctx.controller.logout().await?;
            println!("signed out");
        }
        Command::Whoami => {
            let state = ctx.controller.store().snapshot();
            match &state.user {
                Some(user) => println!("{}", serde_json::to_string_pretty(user)?),
                None => return Err(CliError::NotSignedIn),
            }
        }
        Command::Navigate { path } => {
            let router = Router::new(guard::default_routes(), RouteGuard::new(ctx.client.clone()));
            let route = router.navigate(&path).await?;
            println!("{path} -> {} ({})", route.path, route.name);
        }
        Command::Products(cmd) => run_products(ctx, cmd.command).await?,
        Command::Images(cmd) => run_images(ctx, cmd.command).await?,
    }
    Ok(())
}

async fn run_products(ctx: &CliContext, command: ProductsSubcommand) -> Result<(), CliError> {
    let store = RestProducts::new(ctx.client.clone());
    match command {
        ProductsSubcommand::List => {
            let products = store.list().await?;
            println!("{}", serde_json::to_string_pretty(&products)?);
        }
        ProductsSubcommand::Get { id } => {
            println!("{}", serde_json::to_string_pretty(&store.get(id).await?)?);
        }
        ProductsSubcommand::Create { name, description, price, image_url, category, stock, featured } => {
            require_session(ctx)?;
            let product = NewProduct { name, description, price, image_url, category, stock, featured };
            println!("{}", serde_json::to_string_pretty(&store.create(&product).await?)?);
        }
        ProductsSubcommand::Update { id, name, description, price, image_url, category, stock, featured } => {
            require_session(ctx)?;
            let patch = ProductPatch { name, description, price, image_url, category, stock, featured };
            println!("{}", serde_json::to_string_pretty(&store.update(id, &patch).await?)?);
        }
        ProductsSubcommand::Delete { id } => {
            require_session(ctx)?;
            store.delete(id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn run_images(ctx: &CliContext, command: ImagesSubcommand) -> Result<(), CliError> {
    let images = ProductImages::new(ctx.client.clone(), ctx.config.storage_bucket.clone());
    match command {
        ImagesSubcommand::Upload { file, folder } => {
            require_session(ctx)?;
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|source| CliError::ReadFile { path: file.clone(), source })?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let path = images.upload_file(&file_name, bytes, &folder).await?;
            println!("{path}");
            println!("{}", images.public_url(&path));
        }
        ImagesSubcommand::Url { path } => println!("{}", images.public_url(&path)),
        ImagesSubcommand::Delete { path } => {
            require_session(ctx)?;
            images.delete_file(&path).await?;
            println!("deleted {path}");
        }
    }
    Ok(())
}

fn require_session(ctx: &CliContext) -> Result<(), CliError> {
    if ctx.controller.store().snapshot().is_authenticated {
        Ok(())
    } else {
        Err(CliError::NotSignedIn)
    }
}
