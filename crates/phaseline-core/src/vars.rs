use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::StartupError;

/// Default number of slots a registry accepts before registration fails.
pub const DEFAULT_VARIABLE_CAPACITY: usize = 64;

/// Index of one registered per-request variable slot.
///
/// Resolved once at startup and identical for every request thereafter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariableIndex(usize);

impl VariableIndex {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Evaluator attached to a variable for the generic lookup path.
pub type EvalFn = Box<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>;

/// How the generic variable-lookup path treats a variable.
pub enum Lookup {
    /// The slot is opaque storage for its owning extension. The generic path
    /// reports not-found and never renders the stored value.
    IndexedOnly,
    /// A get handler computes the value on demand.
    Evaluated(EvalFn),
}

struct VariableDef {
    name: String,
    lookup: Lookup,
}

/// Startup-time registry of named variables.
///
/// Mutable only while the process is being configured; [`seal`](Self::seal)
/// freezes it into the read-only [`VariableTable`] every request shares.
pub struct VariableRegistry {
    defs: Vec<VariableDef>,
    by_name: HashMap<String, VariableIndex>,
    capacity: usize,
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_VARIABLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defs: Vec::new(),
            by_name: HashMap::new(),
            capacity,
        }
    }

    /// Reserve a named slot and return its index.
    ///
    /// Duplicate names and table exhaustion are startup failures; the caller
    /// is expected to abort configuration rather than continue without the
    /// slot.
    pub fn register(&mut self, name: &str, lookup: Lookup) -> Result<VariableIndex, StartupError> {
        if self.by_name.contains_key(name) {
            return Err(StartupError::duplicate_variable(name));
        }
        if self.defs.len() >= self.capacity {
            return Err(StartupError::table_full(name, self.capacity));
        }

        let index = VariableIndex(self.defs.len());
        self.defs.push(VariableDef {
            name: name.to_string(),
            lookup,
        });
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }

    /// Look up the index of an already-registered variable.
    pub fn resolve(&self, name: &str) -> Result<VariableIndex, StartupError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StartupError::unknown_variable(name))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Freeze the registry into the table shared by all requests.
    pub fn seal(self) -> VariableTable {
        VariableTable {
            defs: self.defs.into(),
            by_name: self.by_name,
        }
    }
}

/// Read-only variable table, fixed after startup.
pub struct VariableTable {
    defs: Arc<[VariableDef]>,
    by_name: HashMap<String, VariableIndex>,
}

impl VariableTable {
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<VariableIndex> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, index: VariableIndex) -> Option<&str> {
        self.defs.get(index.0).map(|def| def.name.as_str())
    }

    /// Generic lookup path.
    ///
    /// Indexed-only variables are storage cells owned by their extension, so
    /// this reports not-found for them regardless of slot state; evaluated
    /// variables run their get handler.
    pub fn evaluate(&self, ctx: &RequestContext, index: VariableIndex) -> Option<String> {
        match self.defs.get(index.0).map(|def| &def.lookup)? {
            Lookup::IndexedOnly => None,
            Lookup::Evaluated(eval) => eval(ctx),
        }
    }
}

/// Per-request storage cells, one per registered variable.
///
/// Cells hold values owned by the request; everything drops together when
/// the request ends. A cell transitions from unset to set at most once.
pub struct SlotTable {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl SlotTable {
    pub(crate) fn for_table(table: &VariableTable) -> Self {
        let mut slots = Vec::with_capacity(table.len());
        slots.resize_with(table.len(), || None);
        Self { slots }
    }

    pub fn is_set(&self, index: VariableIndex) -> bool {
        matches!(self.slots.get(index.0), Some(Some(_)))
    }

    pub fn get<T: 'static>(&self, index: VariableIndex) -> Option<&T> {
        self.slots
            .get(index.0)?
            .as_ref()?
            .downcast_ref::<T>()
    }

    /// Store `value` unless the cell is already occupied.
    ///
    /// Returns a reference to the stored value on the first call for this
    /// request; `None` afterwards, leaving the existing value untouched.
    pub fn set_once<T: Any + Send>(&mut self, index: VariableIndex, value: T) -> Option<&T> {
        debug_assert!(index.0 < self.slots.len(), "index from a foreign table");
        let cell = self.slots.get_mut(index.0)?;
        if cell.is_some() {
            return None;
        }
        *cell = Some(Box::new(value));
        cell.as_ref()?.downcast_ref::<T>()
    }
}
