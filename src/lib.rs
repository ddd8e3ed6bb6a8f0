pub mod candidate;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod ingestion;
pub mod lookup;
pub mod normalize;
pub mod output;
pub mod resolver;
pub mod scoring;
pub mod throttle;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use candidate::{flatten_suggestions, AddressTree, Candidate};
pub use config::AppConfig;
pub use diagnostics::{DiagnosticsSink, FailureStage};
pub use errors::{AppError, AppResult};
pub use ingestion::{read_addresses, BatchSlice};
pub use lookup::{AddressLookup, LookupService};
pub use normalize::strip_floor;
pub use output::{write_records, OutputRecord};
pub use resolver::AddressResolver;
pub use scoring::{select_best, Similarity};
pub use throttle::RateLimiter;

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,als_resolver=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
