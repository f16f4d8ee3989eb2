use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shop_catalog_store::catalog_store::{
    CatalogError, CatalogStore, CustomerDraft, CustomerId, EntityKind, ErrorKind, OrderId,
    ProductDraft, ProductId, SqliteCatalogStore,
};
use shop_catalog_store::config::{AppConfig, CliConfig, FileConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "catalog-admin", version, about = "Administer the shop catalog database")]
struct CliArgs {
    /// Directory holding catalog.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML config file, its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Number of read-only connections kept open.
    #[clap(long, default_value_t = 4)]
    pub read_pool_size: usize,

    /// How long to wait on a locked database before giving up.
    #[clap(long, default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Let several customers share an email address.
    #[clap(long)]
    pub allow_duplicate_emails: bool,

    /// Print results as JSON.
    #[clap(long)]
    pub json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shows product, stock, customer and order totals.
    Summary,

    /// Manages products.
    #[command(subcommand)]
    Product(ProductCommand),

    /// Manages customers.
    #[command(subcommand)]
    Customer(CustomerCommand),

    /// Places and inspects orders.
    #[command(subcommand)]
    Order(OrderCommand),
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
    List,
    Get {
        id: i64,
    },
    Add {
        name: String,
        price: f64,
        stock: i64,
        #[clap(long)]
        image: Option<String>,
    },
    /// Replaces all fields of a product.
    Update {
        id: i64,
        name: String,
        price: f64,
        stock: i64,
        #[clap(long)]
        image: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
    List,
    Get {
        id: i64,
    },
    /// Looks a customer up by email (case-insensitive).
    Find {
        email: String,
    },
    Add {
        name: String,
        email: String,
        #[clap(long)]
        city: Option<String>,
    },
    Update {
        id: i64,
        name: String,
        email: String,
        #[clap(long)]
        city: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
    List,
    Get {
        id: i64,
    },
    /// Records an order and takes the quantity out of stock.
    Place {
        customer_id: i64,
        product_id: i64,
        quantity: i64,
    },
}

fn print_result<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text(value));
    }
    Ok(())
}

#[derive(Serialize)]
struct ErrorOutput {
    error: ErrorKind,
    message: String,
}

fn print_done(json: bool, message: String) -> Result<()> {
    print_result(json, &serde_json::json!({ "ok": true }), |_| message)
}

fn product_draft(name: String, price: f64, stock: i64, image: Option<String>) -> ProductDraft {
    ProductDraft {
        name,
        price,
        stock,
        image,
    }
}

fn run_product_command(store: &dyn CatalogStore, command: ProductCommand, json: bool) -> Result<()> {
    match command {
        ProductCommand::List => print_result(json, &store.list_products()?, |products| {
            products
                .iter()
                .map(|p| {
                    format!(
                        "{:>5}  {:<30} {:>10.2} {:>6}  {}",
                        p.id,
                        p.name,
                        p.price,
                        p.stock,
                        p.image.as_deref().unwrap_or("-")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }),
        ProductCommand::Get { id } => {
            let product = store
                .get_product(ProductId(id))?
                .ok_or_else(|| CatalogError::not_found(EntityKind::Product, id))?;
            print_result(json, &product, |p| {
                format!(
                    "#{} {} - {:.2} ({} in stock){}",
                    p.id,
                    p.name,
                    p.price,
                    p.stock,
                    p.image
                        .as_deref()
                        .map(|image| format!(" [{}]", image))
                        .unwrap_or_default()
                )
            })
        }
        ProductCommand::Add {
            name,
            price,
            stock,
            image,
        } => {
            let id = store.add_product(&product_draft(name, price, stock, image))?;
            print_result(json, &id, |id| format!("Added product {}", id))
        }
        ProductCommand::Update {
            id,
            name,
            price,
            stock,
            image,
        } => {
            store.update_product(ProductId(id), &product_draft(name, price, stock, image))?;
            print_done(json, format!("Updated product {}", id))
        }
        ProductCommand::Delete { id } => {
            store.delete_product(ProductId(id))?;
            print_done(json, format!("Deleted product {}", id))
        }
    }
}

fn run_customer_command(
    store: &dyn CatalogStore,
    command: CustomerCommand,
    json: bool,
) -> Result<()> {
    let describe = |c: &shop_catalog_store::catalog_store::Customer| {
        format!(
            "{:>5}  {:<25} {:<30} {}",
            c.id,
            c.name,
            c.email,
            c.city.as_deref().unwrap_or("-")
        )
    };
    match command {
        CustomerCommand::List => print_result(json, &store.list_customers()?, |customers| {
            customers
                .iter()
                .map(describe)
                .collect::<Vec<_>>()
                .join("\n")
        }),
        CustomerCommand::Get { id } => {
            let customer = store
                .get_customer(CustomerId(id))?
                .ok_or_else(|| CatalogError::not_found(EntityKind::Customer, id))?;
            print_result(json, &customer, |c| describe(c))
        }
        CustomerCommand::Find { email } => {
            let customer = store.find_customer_by_email(&email)?;
            print_result(json, &customer, |c| match c {
                Some(c) => describe(c),
                None => format!("No customer with email '{}'", email),
            })
        }
        CustomerCommand::Add { name, email, city } => {
            let id = store.add_customer(&CustomerDraft { name, email, city })?;
            print_result(json, &id, |id| format!("Added customer {}", id))
        }
        CustomerCommand::Update {
            id,
            name,
            email,
            city,
        } => {
            store.update_customer(CustomerId(id), &CustomerDraft { name, email, city })?;
            print_done(json, format!("Updated customer {}", id))
        }
        CustomerCommand::Delete { id } => {
            store.delete_customer(CustomerId(id))?;
            print_done(json, format!("Deleted customer {}", id))
        }
    }
}

fn run_order_command(store: &dyn CatalogStore, command: OrderCommand, json: bool) -> Result<()> {
    let describe = |o: &shop_catalog_store::catalog_store::Order| {
        format!(
            "{:>5}  {}  customer {:>5}  product {:>5}  x{}",
            o.id, o.order_date, o.customer_id, o.product_id, o.quantity
        )
    };
    match command {
        OrderCommand::List => print_result(json, &store.list_orders()?, |orders| {
            orders.iter().map(describe).collect::<Vec<_>>().join("\n")
        }),
        OrderCommand::Get { id } => {
            let order = store
                .get_order(OrderId(id))?
                .ok_or_else(|| CatalogError::not_found(EntityKind::Order, id))?;
            print_result(json, &order, |o| describe(o))
        }
        OrderCommand::Place {
            customer_id,
            product_id,
            quantity,
        } => {
            let id = store.place_order(CustomerId(customer_id), ProductId(product_id), quantity)?;
            print_result(json, &id, |id| format!("Placed order {}", id))
        }
    }
}

fn run(cli_args: CliArgs) -> Result<()> {
    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        read_pool_size: cli_args.read_pool_size,
        busy_timeout_ms: cli_args.busy_timeout_ms,
        allow_duplicate_emails: cli_args.allow_duplicate_emails,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening catalog database at {:?}...", config.catalog_db_path());
    let store: Arc<dyn CatalogStore> = Arc::new(
        SqliteCatalogStore::open(config.catalog_db_path(), &config.store_options())
            .context("Failed to open catalog store")?,
    );

    let json = cli_args.json;
    match cli_args.command {
        Command::Summary => print_result(json, &store.summary()?, |s| {
            format!(
                "Products:    {}\nTotal stock: {}\nCustomers:   {}\nOrders:      {}",
                s.product_count, s.total_stock, s.customer_count, s.order_count
            )
        }),
        Command::Product(command) => run_product_command(store.as_ref(), command, json),
        Command::Customer(command) => run_customer_command(store.as_ref(), command, json),
        Command::Order(command) => run_order_command(store.as_ref(), command, json),
    }
}

fn main() -> ExitCode {
    let cli_args = CliArgs::parse();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();

    let json = cli_args.json;
    match run(cli_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<CatalogError>() {
                Some(catalog_err) if json => {
                    let output = ErrorOutput {
                        error: catalog_err.kind(),
                        message: catalog_err.to_string(),
                    };
                    match serde_json::to_string_pretty(&output) {
                        Ok(rendered) => println!("{}", rendered),
                        Err(_) => eprintln!("error[{}]: {}", catalog_err.kind(), catalog_err),
                    }
                }
                Some(catalog_err) => eprintln!("error[{}]: {}", catalog_err.kind(), catalog_err),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
