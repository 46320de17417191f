use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use phone_catalog::config::Config;
use phone_catalog::schema::validation;
use phone_catalog::store::http::HttpStore;
use phone_catalog::{CollectionState, Pending, PhoneCache, PhoneDraft, PhoneId, Subscription};

/// Manage the phone catalog.
#[derive(Parser)]
#[command(name = "phone-catalog")]
#[command(version)]
struct Cli {
    /// Base URL of the database (overrides PHONE_CATALOG_URL)
    #[arg(global = true, long)]
    base_url: Option<String>,

    /// Collection name (overrides PHONE_CATALOG_COLLECTION)
    #[arg(global = true, long)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every phone
    List,
    /// Add a phone
    Add {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        price: String,
    },
    /// Change some fields of a phone
    Update {
        id: String,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        price: Option<String>,
    },
    /// Delete a phone
    Remove { id: String },
}

/// Drives one operation and logs every state it produced.
async fn settle(pending: Pending, subscription: &mut Subscription) {
    pending.await;
    for state in subscription.drain() {
        match &state {
            CollectionState::Loading => tracing::info!("loading"),
            CollectionState::Success(phones) => tracing::info!(count = phones.len(), "ready"),
            CollectionState::Failure { error, .. } => tracing::error!(%error, "store call failed"),
        }
    }
}

fn print_phones(state: &CollectionState) {
    for phone in state.phones().unwrap_or_default() {
        println!(
            "{}\t{}\t{}\t{:.2}",
            phone.id, phone.brand, phone.model, phone.price
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }

    tracing::info!(base_url = %config.base_url, collection = %config.collection, "opening catalog");
    let (cache, initial) = PhoneCache::open(HttpStore::from_config(&config));
    let mut subscription = cache.subscribe();
    settle(initial, &mut subscription).await;
    if let Some(error) = cache.state().error() {
        return Err(error.clone().into());
    }

    let pending = match cli.command {
        Command::List => None,
        Command::Add {
            brand,
            model,
            price,
        } => {
            let price = validation::parse_price(&price)?;
            Some(cache.add(PhoneDraft::new(brand, model, price))?)
        }
        Command::Update {
            id,
            brand,
            model,
            price,
        } => {
            let id = PhoneId::new(id);
            let current = cache.get(&id).ok_or_else(|| format!("no phone with id {id}"))?;
            let mut draft = current.draft();
            if let Some(brand) = brand {
                draft.brand = brand;
            }
            if let Some(model) = model {
                draft.model = model;
            }
            if let Some(price) = price {
                draft.price = validation::parse_price(&price)?;
            }
            Some(cache.update(current.with_fields(draft))?)
        }
        Command::Remove { id } => Some(cache.remove(PhoneId::new(id))?),
    };
    if let Some(pending) = pending {
        settle(pending, &mut subscription).await;
    }

    let state = cache.state();
    print_phones(&state);
    cache.dispose();
    match state.error() {
        Some(error) => Err(error.clone().into()),
        None => Ok(()),
    }
}
