//! Search demo binary: types a query one keystroke at a time and lets the
//! debounced, cancellable lookup settle.

use std::time::Duration;

use search::{CatalogClient, SearchAction, SearchEnvironment, SearchReducer, SearchState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unistore_runtime::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search=debug,unistore_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let catalog = vec![
        "rust".to_owned(),
        "rustfmt".to_owned(),
        "trust".to_owned(),
        "crate".to_owned(),
    ];
    let env = SearchEnvironment {
        client: CatalogClient::new(catalog, Duration::from_millis(50)),
        debounce: Duration::from_millis(300),
    };
    let store = Store::new(SearchState::default(), SearchReducer::new(), env);

    // Observer: print every committed state change.
    let mut states = store.subscribe();
    let observer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let snapshot = states.borrow_and_update().clone();
            println!(
                "state: query={:?} results={:?} (for {:?})",
                snapshot.query, snapshot.results, snapshot.results_for
            );
        }
    });

    // Simulated typing: each keystroke lands inside the debounce window, so
    // only the final query actually hits the catalog.
    let mut last = None;
    for keystroke in ["r", "ru", "rus", "rust"] {
        last = Some(
            store
                .send(SearchAction::QueryChanged(keystroke.to_owned()))
                .await?,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if let Some(mut handle) = last {
        handle.wait().await;
    }

    let results = store.state(|s| s.results.clone()).await;
    println!("final results: {results:?}");

    store.shutdown().await?;
    drop(store);
    let _ = observer.await;

    Ok(())
}
