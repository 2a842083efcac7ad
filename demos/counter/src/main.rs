//! Counter demo binary.

use counter::{CounterAction, CounterEnvironment, CounterReducer, CounterState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unistore_runtime::Store;
use unistore_testing::test_clock;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,unistore_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = CounterEnvironment::new(test_clock());
    let store = Store::new(CounterState::default(), CounterReducer::new(), env);

    println!("initial count: {}", store.state(|s| s.count).await);

    for action in [
        CounterAction::Increment,
        CounterAction::Increment,
        CounterAction::Decrement,
    ] {
        println!(">>> sending {action:?}");
        let _ = store.send(action).await;
        println!("count: {}", store.state(|s| s.count).await);
    }

    let _ = store.send(CounterAction::Reset).await;
    println!("after reset: {}", store.state(|s| s.count).await);
}
