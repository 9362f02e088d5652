//! Read-side commands: live watch, one-shot list and nearest machines.

use std::sync::Arc;

use tokio::sync::mpsc;
use vendmap_core::{
    format_distance, sort_by_distance, Category, Coordinate, DerivedView, DistanceUnits,
    FilterState, Machine, OperatingStatus,
};
use vendmap_sync::{
    FixedPositionSource, LiveView, Ordering, PositionOptions, PositionSource, Query,
    RegistrySync, RemoteStore, SyncEvent,
};

fn print_table(machines: &[Machine]) {
    println!(
        "{:<34}{:<16}{:<19}{:<22}DESCRIPTION",
        "ID", "CATEGORY", "STATUS", "LOCATION"
    );
    for machine in machines {
        println!(
            "{:<34}{:<16}{:<19}{:<22}{}{}",
            machine.id,
            machine.category.as_str(),
            machine.status.as_str(),
            format!(
                "{:.5},{:.5}",
                machine.coordinate.latitude, machine.coordinate.longitude
            ),
            machine.description,
            if machine.has_image() { " [photo]" } else { "" },
        );
    }
}

fn print_view(view: &DerivedView) {
    let counts = view.counts;
    println!(
        "{} of {} machines (operating {}, maintenance {}, out of order {})",
        view.machines.len(),
        counts.total,
        counts.operating,
        counts.under_maintenance,
        counts.out_of_order
    );
    print_table(&view.machines);
    println!();
}

/// Follow the registry until interrupted, printing the view on every change.
///
/// # Errors
///
/// Returns an error if the subscription fails.
pub(crate) async fn run_watch(
    store: Arc<dyn RemoteStore>,
    collection: &str,
    category: Option<Category>,
    status: Option<OperatingStatus>,
) -> anyhow::Result<()> {
    let sync = RegistrySync::new(store, collection);
    let view = LiveView::attach(&sync);
    view.set_category(category);
    view.set_status(status);

    let (failed_tx, mut failed) = mpsc::unbounded_channel();
    sync.on_change(move |event| {
        if let SyncEvent::Failed(err) = event {
            let _ = failed_tx.send(err.clone());
        }
    });

    let mut updates = view.subscribe();
    sync.start();

    let outcome = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = Arc::clone(&updates.borrow_and_update());
                print_view(&current);
            }
            Some(err) = failed.recv() => {
                break Err(anyhow::anyhow!("registry subscription failed: {err}"));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, closing subscription");
                break Ok(());
            }
        }
    };

    view.detach();
    sync.close();
    outcome
}

/// Print the filtered registry once, newest first.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub(crate) async fn run_list(
    store: &dyn RemoteStore,
    collection: &str,
    category: Option<Category>,
    status: Option<OperatingStatus>,
    json: bool,
) -> anyhow::Result<()> {
    let query = Query {
        filter: FilterState::default()
            .with_category(category)
            .with_status(status),
        order: Ordering::LastUpdatedDesc,
    };
    let machines = store.query(collection, &query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&machines)?);
        return Ok(());
    }
    if machines.is_empty() {
        println!("no machines found; register one with `vendmap add`");
        return Ok(());
    }
    print_table(&machines);
    Ok(())
}

/// List the `limit` machines closest to `(lat, lon)`.
///
/// # Errors
///
/// Returns an error if the point is not a valid coordinate or the store
/// query fails.
pub(crate) async fn run_nearby(
    store: &dyn RemoteStore,
    collection: &str,
    lat: f64,
    lon: f64,
    limit: usize,
) -> anyhow::Result<()> {
    let origin = Coordinate::new(lat, lon);
    anyhow::ensure!(origin.is_valid(), "invalid coordinate {lat},{lon}");

    let position = FixedPositionSource::new(origin)
        .current_position(&PositionOptions::default())
        .await?;
    let machines = store.query(collection, &Query::default()).await?;
    let units = DistanceUnits::default();

    println!("{:<10}{:<34}{:<16}DESCRIPTION", "DISTANCE", "ID", "STATUS");
    for nearby in sort_by_distance(&machines, position.coordinate)
        .into_iter()
        .take(limit)
    {
        println!(
            "{:<10}{:<34}{:<16}{}",
            format_distance(nearby.distance_km, 1, &units),
            nearby.item.id,
            nearby.item.status.as_str(),
            nearby.item.description
        );
    }
    Ok(())
}
