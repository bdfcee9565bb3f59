//! Carrying a collector through the call tree on a [`Context`]

use crate::collector::StatusCollector;
use flowstat_core::Context;
use std::sync::Arc;

/// Private key type; no other crate can bind or shadow this slot
struct CollectorSlot(Arc<StatusCollector>);

/// Derive a context carrying `collector`
pub fn with_status_collector(ctx: &Context, collector: Arc<StatusCollector>) -> Context {
    ctx.with_value(CollectorSlot(collector))
}

/// The collector bound to `ctx`, if any
pub fn status_collector(ctx: &Context) -> Option<Arc<StatusCollector>> {
    ctx.value::<CollectorSlot>().map(|slot| Arc::clone(&slot.0))
}

/// Method-call form of the binding functions
pub trait ContextExt {
    fn with_status_collector(&self, collector: Arc<StatusCollector>) -> Context;
    fn status_collector(&self) -> Option<Arc<StatusCollector>>;
}

impl ContextExt for Context {
    fn with_status_collector(&self, collector: Arc<StatusCollector>) -> Context {
        with_status_collector(self, collector)
    }

    fn status_collector(&self) -> Option<Arc<StatusCollector>> {
        status_collector(self)
    }
}
