//! Resource & handle tables: the bookkeeping behind `own<T>`/`borrow<T>`
//! values. Each component instance owns one [`HandleTable`] per resource
//! type it deals in, collected in a [`ResourceTables`] registry hung off the
//! instance's `Env`; handles are never valid outside the (instance,
//! resource type) pair that minted them, except via an explicit
//! [`transfer`].

use crate::error::EngineError;
use std::collections::HashMap;
use weave_ir::TypeIndex;

#[derive(Clone, Copy, Debug)]
enum Entry {
    Owned { rep: u32 },
    Borrowed { rep: u32 },
}

/// One resource type's handle table within a single component instance.
/// Plain `RefCell`-guarded state rather than a full `Mutex` would normally
/// do here, but resource tables are reachable from host callbacks that may
/// run on a different thread than the one that built the instance, so this
/// takes the same per-table lock a multi-threaded embedder needs.
pub struct HandleTable {
    ty: TypeIndex,
    max_handles: u32,
    entries: std::sync::Mutex<HandleTableInner>,
}

struct HandleTableInner {
    slots: HashMap<u32, Entry>,
    next: u32,
}

impl HandleTable {
    pub fn new(ty: TypeIndex, max_handles: u32) -> Self {
        HandleTable {
            ty,
            max_handles,
            entries: std::sync::Mutex::new(HandleTableInner { slots: HashMap::new(), next: 0 }),
        }
    }

    /// Mint a new owning handle for representation value `rep`.
    pub fn new_handle(&self, rep: u32) -> Result<u32, EngineError> {
        let mut inner = self.entries.lock().expect("resource table lock poisoned");
        if inner.slots.len() as u32 >= self.max_handles {
            return Err(EngineError::ResourceExhausted(self.ty));
        }
        let handle = inner.next;
        inner.next += 1;
        inner.slots.insert(handle, Entry::Owned { rep });
        Ok(handle)
    }

    /// Resolve a handle to its underlying representation value, without
    /// consuming it.
    pub fn rep(&self, handle: u32) -> Result<u32, EngineError> {
        let inner = self.entries.lock().expect("resource table lock poisoned");
        match inner.slots.get(&handle) {
            Some(Entry::Owned { rep }) | Some(Entry::Borrowed { rep }) => Ok(*rep),
            None => Err(EngineError::ResourceHandleInvalid { ty: self.ty, handle }),
        }
    }

    /// Drop an owning handle, freeing its slot. Dropping a handle that is
    /// currently lent out as a borrow is a logic error the caller (the
    /// thunk engine) is expected to prevent by scoping borrows to a single
    /// call frame; this just reports the handle as gone.
    pub fn drop_handle(&self, handle: u32) -> Result<(), EngineError> {
        let mut inner = self.entries.lock().expect("resource table lock poisoned");
        match inner.slots.remove(&handle) {
            Some(Entry::Owned { .. }) => Ok(()),
            Some(Entry::Borrowed { .. }) => Err(EngineError::ResourceHandleInvalid { ty: self.ty, handle }),
            None => Err(EngineError::ResourceHandleInvalid { ty: self.ty, handle }),
        }
    }

    /// Lend `handle` for the duration of one call, returning a fresh
    /// borrowed handle distinct from the owning one. The borrowed handle is
    /// only ever valid until the call frame that produced it returns — even
    /// before the caller observes results, since the callee could retain it
    /// past the point the owner is allowed to reclaim the representation.
    pub fn borrow(&self, owning_handle: u32) -> Result<u32, EngineError> {
        let rep = self.rep(owning_handle)?;
        let mut inner = self.entries.lock().expect("resource table lock poisoned");
        if inner.slots.len() as u32 >= self.max_handles {
            return Err(EngineError::ResourceExhausted(self.ty));
        }
        let handle = inner.next;
        inner.next += 1;
        inner.slots.insert(handle, Entry::Borrowed { rep });
        Ok(handle)
    }

    /// Release every borrow handle still outstanding when the call frame
    /// that created them returns, per the scoping rule `borrow` documents.
    pub fn end_call_frame(&self, borrowed_handles: &[u32]) {
        let mut inner = self.entries.lock().expect("resource table lock poisoned");
        for h in borrowed_handles {
            inner.slots.remove(h);
        }
    }

    /// Remove an *owning* handle and hand back its representation value,
    /// without minting a replacement anywhere — the half of `transfer` that
    /// touches the source table. Fails the same way `drop_handle` does if
    /// `handle` is absent or itself only a borrow.
    fn take_owned(&self, handle: u32) -> Result<u32, EngineError> {
        let mut inner = self.entries.lock().expect("resource table lock poisoned");
        match inner.slots.remove(&handle) {
            Some(Entry::Owned { rep }) => Ok(rep),
            Some(entry @ Entry::Borrowed { .. }) => {
                // put it back — a borrow isn't transferable, and removing it
                // here would desync `end_call_frame`'s own bookkeeping.
                inner.slots.insert(handle, entry);
                Err(EngineError::ResourceHandleInvalid { ty: self.ty, handle })
            }
            None => Err(EngineError::ResourceHandleInvalid { ty: self.ty, handle }),
        }
    }
}

/// Move ownership of a resource from `src`'s handle for `ty` into a fresh
/// handle in `dst`, invalidating the source handle in the same step. The
/// Component Model's `own<T>` transfer: after this call `src.rep(handle)`
/// fails and the returned handle is valid only in `dst`.
pub fn transfer(src: &HandleTable, dst: &HandleTable, handle: u32) -> Result<u32, EngineError> {
    let rep = src.take_owned(handle)?;
    dst.new_handle(rep)
}

/// The per-instance collection of [`HandleTable`]s an Instance Record owns,
/// one per resource type it has ever minted or received a handle for. Tables
/// are created lazily on first use rather than pre-sized for every type
/// index the defining component declares, since most resource types a
/// component knows about are never actually instantiated as handles.
pub struct ResourceTables {
    max_handles_per_table: u32,
    tables: std::sync::Mutex<HashMap<TypeIndex, std::sync::Arc<HandleTable>>>,
}

impl ResourceTables {
    pub fn new(max_handles_per_table: u32) -> Self {
        ResourceTables {
            max_handles_per_table,
            tables: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The table for `ty`, creating it on first access.
    pub fn table(&self, ty: TypeIndex) -> std::sync::Arc<HandleTable> {
        let mut tables = self.tables.lock().expect("resource table registry lock poisoned");
        tables
            .entry(ty)
            .or_insert_with(|| std::sync::Arc::new(HandleTable::new(ty, self.max_handles_per_table)))
            .clone()
    }

    pub fn new_handle(&self, ty: TypeIndex, rep: u32) -> Result<u32, EngineError> {
        self.table(ty).new_handle(rep)
    }

    pub fn rep(&self, ty: TypeIndex, handle: u32) -> Result<u32, EngineError> {
        self.table(ty).rep(handle)
    }

    pub fn drop_handle(&self, ty: TypeIndex, handle: u32) -> Result<(), EngineError> {
        self.table(ty).drop_handle(handle)
    }

    pub fn borrow(&self, ty: TypeIndex, owning_handle: u32) -> Result<u32, EngineError> {
        self.table(ty).borrow(owning_handle)
    }

    pub fn end_call_frame(&self, ty: TypeIndex, borrowed_handles: &[u32]) {
        self.table(ty).end_call_frame(borrowed_handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    fn ty() -> TypeIndex {
        TypeIndex::new(0)
    }

    #[test]
    fn new_and_rep_round_trip() {
        let table = HandleTable::new(ty(), 16);
        let h = table.new_handle(42).unwrap();
        assert_eq!(table.rep(h).unwrap(), 42);
    }

    #[test]
    fn drop_invalidates_handle() {
        let table = HandleTable::new(ty(), 16);
        let h = table.new_handle(1).unwrap();
        table.drop_handle(h).unwrap();
        assert!(table.rep(h).is_err());
    }

    #[test]
    fn exhaustion_is_reported() {
        let table = HandleTable::new(ty(), 1);
        table.new_handle(1).unwrap();
        assert!(matches!(table.new_handle(2), Err(EngineError::ResourceExhausted(_))));
    }

    #[test]
    fn borrow_ends_with_call_frame() {
        let table = HandleTable::new(ty(), 16);
        let owner = table.new_handle(7).unwrap();
        let borrowed = table.borrow(owner).unwrap();
        assert_eq!(table.rep(borrowed).unwrap(), 7);
        table.end_call_frame(&[borrowed]);
        assert!(table.rep(borrowed).is_err());
        // the owning handle is unaffected
        assert_eq!(table.rep(owner).unwrap(), 7);
    }

    #[test]
    fn transfer_moves_ownership_between_tables() {
        let a = HandleTable::new(ty(), 16);
        let b = HandleTable::new(ty(), 16);
        let h = a.new_handle(99).unwrap();
        let h2 = transfer(&a, &b, h).unwrap();
        assert!(a.rep(h).is_err(), "source handle must be invalidated by transfer");
        assert_eq!(b.rep(h2).unwrap(), 99);
    }

    #[test]
    fn transfer_rejects_a_borrowed_handle() {
        let a = HandleTable::new(ty(), 16);
        let b = HandleTable::new(ty(), 16);
        let owner = a.new_handle(5).unwrap();
        let borrowed = a.borrow(owner).unwrap();
        assert!(transfer(&a, &b, borrowed).is_err());
        // the borrow is untouched by the failed attempt
        assert_eq!(a.rep(borrowed).unwrap(), 5);
    }

    #[test]
    fn resource_tables_creates_tables_lazily_per_type() {
        let tables = ResourceTables::new(16);
        let t0 = TypeIndex::new(0);
        let t1 = TypeIndex::new(1);
        let h0 = tables.new_handle(t0, 10).unwrap();
        let h1 = tables.new_handle(t1, 20).unwrap();
        assert_eq!(tables.rep(t0, h0).unwrap(), 10);
        assert_eq!(tables.rep(t1, h1).unwrap(), 20);
        // dropping a handle in one type's table never touches the other's
        tables.drop_handle(t0, h0).unwrap();
        assert!(tables.rep(t0, h0).is_err());
        assert_eq!(tables.rep(t1, h1).unwrap(), 20);
    }
}
