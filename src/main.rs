use entity_state_tracker::config::TrackerConfig;
use entity_state_tracker::seed;
use entity_state_tracker::{EntityState, InMemoryStore, MetadataRegistry, TrackingContext, Value};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Entity State Tracker: change tracking walkthrough");

    // Load configuration
    let config = TrackerConfig::load()?;
    println!(
        "Configuration loaded: container={}, auto_detect_changes={}",
        config.query.container_name, config.tracking.auto_detect_changes
    );

    let schema = match config.load_schema()? {
        Some(schema) => schema,
        None => {
            println!("No model file configured, using the demo model");
            seed::demo_schema()
        }
    };
    let registry = Arc::new(MetadataRegistry::build(schema)?);

    let store = Arc::new(InMemoryStore::new());
    seed::load_seed_data(&store);

    let context = TrackingContext::new(registry, store.clone(), config);

    // Attach an object matching a stored row and change it
    let alice = seed::person(1, "Alice", 30).into_ref();
    let entry = context.attach(&alice)?;
    println!("Attached {} as {}", entry.class(), entry.state());

    entry.property("Age")?.set_current_value(31)?;
    entry.property("Home.City")?.set_current_value("Trondheim")?;
    println!("After edits: {}", entry.state());

    let current = entry.current_values()?;
    let original = entry.original_values()?;
    println!(
        "Age: current={:?} original={:?}",
        current.get_value("Age")?,
        original.get_value("Age")?
    );

    if let Some(stored) = entry.get_database_values()? {
        println!("Stored Notes: {:?}", stored.get_value("Notes")?);
    }

    // Someone else updates the row; reload picks it up
    store.update("People", "Id", &Value::from(1), |row| row.set("Age", 32));
    entry.reload()?;
    println!(
        "After reload: {} with Age {:?}",
        entry.state(),
        entry.property("Age")?.current_value()?
    );

    let orders = entry.collection("Orders")?;
    orders.load()?;
    println!("Loaded {} orders for Alice", orders.entities()?.len());

    entry.set_state(EntityState::Deleted)?;
    context.accept_all_changes()?;
    println!("Tracked entities after accepting a delete: {}", context.entries().len());

    Ok(())
}
