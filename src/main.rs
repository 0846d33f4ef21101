mod config;
mod error;
mod llm_extract;
mod pipeline;
mod sanitize;
mod schema;
mod store;
mod upload;
mod validate;

use clap::{Parser, Subcommand};
use config::Config;
use llm_extract::GeminiClient;
use pipeline::Pipeline;
use std::path::PathBuf;
use store::RecordStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "invoice_extract",
    about = "Extract invoice data from documents with a generative model"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "invoice_extract.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract records from one or more documents (pdf, jpg, png, csv, xlsx, xls)
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Change the model used for extraction
    SetModel { model: String },
    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let cli = Cli::parse();

    match cli.command {
        Command::Upload { files } => {
            let cfg = Config::load_or_default(&cli.config)?;
            let pipeline = Pipeline::new(GeminiClient::from_config(&cfg.extraction)?);
            let mut store = RecordStore::new();

            // one at a time: each upload finishes before the next starts
            let failed = pipeline.process_all(&files, &mut store).await;

            log_records(&store, files.len(), failed);
            println!("{}", serde_json::to_string_pretty(&store)?);
            if failed > 0 {
                eprintln!("{failed} of {} uploads failed", files.len());
            }
            if let Some(message) = store.error() {
                eprintln!("{message}");
            }
        }
        Command::SetModel { model } => {
            Config::update_model(&cli.config, &model)?;
            info!(path = %cli.config.display(), model = %model, "Updated extraction model");
        }
        Command::ShowConfig => {
            let cfg = Config::load_or_default(&cli.config)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}

fn log_records(store: &RecordStore, uploads: usize, failed: usize) {
    for invoice in store.invoices() {
        info!(
            id = %invoice.id,
            serial = %invoice.serial_number,
            customer = %invoice.customer_name,
            products = store.products_for(invoice).count(),
            quantity = %invoice.quantity,
            tax = %invoice.tax,
            charges = format!("{:.2}", invoice.additional_charges.total()),
            total = %invoice.total_amount,
            date = %invoice.date,
            "Invoice"
        );
    }

    for product in store.products() {
        info!(
            id = %product.id,
            name = %product.name,
            qty = %product.quantity,
            unit_price = %product.unit_price,
            discount = %product.discount,
            tax = %product.tax,
            price_with_tax = %product.price_with_tax,
            "Product"
        );
    }

    for customer in store.customers() {
        info!(
            id = %customer.id,
            name = %customer.name,
            phone = %customer.phone_number,
            total_purchase = %customer.total_purchase_amount,
            "Customer"
        );
    }

    info!(
        invoices = store.invoices().len(),
        products = store.products().len(),
        customers = store.customers().len(),
        uploads,
        failed,
        "Store summary"
    );
}
