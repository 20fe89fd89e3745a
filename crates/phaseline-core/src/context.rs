use std::any::Any;
use std::sync::Arc;

use crate::http::Request;
use crate::vars::{SlotTable, VariableIndex, VariableTable};

/// Request context handed to phase handlers.
///
/// Owns the request and its variable slots; both drop together when the
/// request ends. Nothing stored here outlives the request.
pub struct RequestContext {
    request: Request,
    slots: SlotTable,
    table: Arc<VariableTable>,
    restarts: u32,
}

impl RequestContext {
    pub(crate) fn new(request: Request, table: Arc<VariableTable>) -> Self {
        let slots = SlotTable::for_table(&table);
        Self {
            request,
            slots,
            table,
            restarts: 0,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// Typed view of one variable slot.
    pub fn slot<T: 'static>(&self, index: VariableIndex) -> Option<&T> {
        self.slots.get::<T>(index)
    }

    pub fn slot_is_set(&self, index: VariableIndex) -> bool {
        self.slots.is_set(index)
    }

    /// Store a value in a slot unless one is already present.
    ///
    /// A slot transitions from unset to set once per request; repeat calls
    /// return `None` and leave the first value in place.
    pub fn set_slot_once<T: Any + Send>(&mut self, index: VariableIndex, value: T) -> Option<&T> {
        self.slots.set_once(index, value)
    }

    /// Evaluate a variable through the generic lookup path.
    pub fn evaluate(&self, index: VariableIndex) -> Option<String> {
        self.table.evaluate(self, index)
    }

    /// Times the early phases have been re-entered for this request.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// True once the request has gone through an internal redirect.
    pub fn is_internal_redirect(&self) -> bool {
        self.restarts > 0
    }

    pub(crate) fn mark_restart(&mut self) {
        self.restarts += 1;
    }
}
