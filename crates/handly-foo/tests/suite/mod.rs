use std::sync::{Arc, Mutex};

use handly_core::{
    Body, CancellationToken, Context, ElementChangeEvent, ElementChangeListener, ElementManager,
    EventMask, Result,
};
use handly_foo::{FooElement, FooKind, FooModel, MemoryStore, SourceStore};

mod delta_processor;
mod local_store;
mod structure;
mod working_copy;

pub(crate) fn manager(store: MemoryStore) -> ElementManager<FooModel<MemoryStore>> {
    ElementManager::new(FooModel::new(store))
}

pub(crate) fn open<S: SourceStore>(
    manager: &ElementManager<FooModel<S>>,
    element: &FooElement,
) -> Result<Arc<Body<FooKind>>> {
    manager.open(element, &Context::new(), &CancellationToken::new())
}

pub(crate) fn child_names<S: SourceStore>(
    manager: &ElementManager<FooModel<S>>,
    element: &FooElement,
) -> Vec<String> {
    manager
        .children(element)
        .unwrap()
        .iter()
        .map(FooElement::to_string_name)
        .collect()
}

/// Collects `kind` and rendered delta of every event matching `mask`.
pub(crate) fn record_events<S: SourceStore>(
    manager: &ElementManager<FooModel<S>>,
    mask: EventMask,
) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let listener: Arc<dyn ElementChangeListener<FooKind>> =
        Arc::new(move |event: &ElementChangeEvent<FooKind>| {
            sink.lock()
                .unwrap()
                .push(format!("{:?}\n{}", event.kind(), event.delta()));
        });
    manager.notifications().add_listener_with_mask(listener, mask);
    events
}
