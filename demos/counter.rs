//! Self-contained example demonstrating state components, command handlers,
//! target hierarchies, and observers catching up through aggregated
//! changesets.
//!
//! Run with: `cargo run --example counter`
//!
//! Set `RUST_LOG=statefold=debug` to see registration and scope logs.

use std::collections::BTreeMap;
use std::rc::Rc;

use statefold::{
    Command, CommandTarget, ComponentHandle, ComponentState, DefaultCommandHandler, Diagnostics,
    HandlerResult, IntoHandler, NoChangeset, Observation, ObservedVersions, SequentialIds,
    SimpleChangeset, State, UpdateType,
};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// State components
// ---------------------------------------------------------------------------

/// Named counters, tracked key by key.
#[derive(Debug, Default)]
struct Counters {
    values: BTreeMap<String, i64>,
}

impl ComponentState for Counters {
    const COMPONENT_TYPE: &'static str = "counters";
    type Changeset = SimpleChangeset<String>;
}

/// Number of commands handled, refreshed wholesale.
#[derive(Debug, Default)]
struct Stats {
    handled: u64,
}

impl ComponentState for Stats {
    const COMPONENT_TYPE: &'static str = "stats";
    const TRACKS_CHANGESETS: bool = false;
    type Changeset = NoChangeset;
}

// ---------------------------------------------------------------------------
// Commands and handlers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Increment {
    name: &'static str,
}

impl Command for Increment {}

#[derive(Debug)]
struct Remove {
    name: &'static str,
}

impl Command for Remove {}

/// Errors a counter handler can report.
#[derive(Debug, thiserror::Error)]
enum CounterError {
    #[error("counter '{0}' does not exist")]
    Missing(String),
}

fn increment(counters: &ComponentHandle<Counters>, cmd: &Increment) -> HandlerResult {
    let mut scope = counters.update()?;
    let (data, changeset) = scope.parts_mut();
    let value = data.values.entry(cmd.name.to_owned()).or_default();
    let created = *value == 0;
    *value += 1;
    if let Some(changeset) = changeset {
        if created {
            changeset.created(cmd.name.to_owned());
        } else {
            changeset.changed(cmd.name.to_owned());
        }
    }
    scope.set_update_type(UpdateType::Partial);
    Ok(())
}

fn remove(counters: &ComponentHandle<Counters>, cmd: &Remove) -> HandlerResult {
    let mut scope = counters.update()?;
    let (data, changeset) = scope.parts_mut();
    if data.values.remove(cmd.name).is_none() {
        return Err(CounterError::Missing(cmd.name.to_owned()).into());
    }
    if let Some(changeset) = changeset {
        changeset.deleted(cmd.name.to_owned());
    }
    scope.set_update_type(UpdateType::Partial);
    Ok(())
}

impl DefaultCommandHandler for Remove {
    type Components = (Counters,);

    fn handler() -> impl IntoHandler<Self, Self::Components> {
        remove
    }
}

/// Runs on the application target for every command that bubbles up.
fn count_increment(stats: &ComponentHandle<Stats>, _cmd: &Increment) -> HandlerResult {
    let mut scope = stats.update()?;
    scope.data_mut().handled += 1;
    scope.set_update_type(UpdateType::Complete);
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut state = State::new(SequentialIds::new("counter-demo"));
    let counters = state.add_component(Counters::default())?;
    let stats = state.add_component(Stats::default())?;
    let components = state.component_registry();

    // The application target counts increments; the editor target owns the
    // counter handlers and forwards everything up to the application.
    let mut app = CommandTarget::new("app");
    app.registrar(&components).register_handler(count_increment)?;
    let app = Rc::new(app);

    let mut editor = CommandTarget::new("editor").with_parent(&app);
    {
        let mut registrar = editor.registrar(&components);
        registrar.register_handler(increment)?;
        registrar.register_default_handler::<Remove>()?;
    }

    let diagnostics = Diagnostics::default()
        .with_trace_handlers(true)
        .with_check_recursive_dispatch(true);

    // A view takes its first look before anything happens.
    let mut view = ObservedVersions::default();
    view.observe(&counters, |_| {})?;

    for name in ["alpha", "beta", "alpha", "gamma"] {
        editor.dispatch_to_hierarchy(&Increment { name }, diagnostics)?;
    }
    editor.dispatch_to_hierarchy(&Remove { name: "gamma" }, diagnostics)?;

    if let Err(error) = editor.dispatch_to_hierarchy(&Remove { name: "delta" }, diagnostics) {
        println!("rejected: {error}");
    }

    // The view catches up with a single merged delta.
    view.observe(&counters, |obs| {
        if let Observation::Partial(delta) = obs {
            println!(
                "delta: created={:?} changed={:?} deleted={:?}",
                delta.created_keys().collect::<Vec<_>>(),
                delta.changed_keys().collect::<Vec<_>>(),
                delta.deleted_keys().collect::<Vec<_>>(),
            );
        }
    })?;

    state.prune_changesets(&[&view])?;

    let counters = counters.read()?;
    let stats = stats.read()?;
    println!("counters = {:?} (version {})", counters.data().values, counters.version());
    println!("handled  = {}", stats.data().handled);

    assert_eq!(counters.data().values.get("alpha"), Some(&2));
    assert_eq!(counters.data().values.get("beta"), Some(&1));
    assert!(!counters.data().values.contains_key("gamma"));
    assert_eq!(stats.data().handled, 4);

    println!("all assertions passed");

    Ok(())
}
