//! Process-wide state for every native class bound to a script.
//!
//! A [`BoundType`] exists once per Rust type, independent of how many VMs the
//! class is registered with. It owns:
//!
//! - the script identity (display name and `<name>_mt` table key)
//! - the binding cache, keyed by member name, shared across VMs
//! - the current finalizer and the ownership ledger
//! - upcasts recorded by inheritance
//! - member documentation for the binding doc
//!
//! ```text
//! CLASSES: TypeId -> Arc<BoundType>
//!                       ├── bindings: name -> CachedBinding
//!                       ├── finalizer (replaceable)
//!                       ├── owned: address -> live ownership token
//!                       └── upcasts: parent TypeId -> pointer adjust
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::binding_doc::MemberDoc;
use crate::trampoline::Trampoline;

/// Marker for Rust types that can be exposed to scripts as handles.
///
/// Usually implemented through [`native_class!`](crate::native_class).
pub trait NativeClass: 'static {}

/// Type-erased finalizer invoked with an instance pointer.
pub type Finalizer = Arc<dyn Fn(*mut ()) + Send + Sync>;

/// Shared by every owning handle of one ownership transfer; cleared by the
/// handle that finalizes the instance.
pub type OwnershipToken = Arc<AtomicBool>;

/// Adjusts a derived instance pointer to one of its parents.
pub type Upcast = Arc<dyn Fn(*mut ()) -> *mut () + Send + Sync>;

/// A custom finalizer for instances of `T`.
///
/// Only free callables taking the raw instance pointer qualify; methods are
/// rejected at compile time.
///
/// ```compile_fail
/// use luaglue_core::Destructor;
///
/// struct Widget;
/// impl Widget {
///     fn close(&mut self) {}
/// }
///
/// fn takes<D: Destructor<Widget>>(_: D) {}
/// takes(Widget::close);
/// ```
///
/// ```
/// use luaglue_core::Destructor;
///
/// struct Widget;
/// fn free_widget(widget: *mut Widget) {
///     drop(unsafe { Box::from_raw(widget) });
/// }
///
/// fn takes<D: Destructor<Widget>>(_: D) {}
/// takes(free_widget);
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be used as the destructor of `{T}`",
    label = "expected a free function taking `*mut {T}`",
    note = "methods cannot finalize instances; write `fn(instance: *mut {T})` instead"
)]
pub trait Destructor<T>: Send + Sync + 'static {
    fn destroy(&self, instance: *mut T);
}

impl<T, F> Destructor<T> for F
where
    F: Fn(*mut T) + Send + Sync + 'static,
{
    fn destroy(&self, instance: *mut T) {
        (self)(instance)
    }
}

/// Script-facing names of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassIdentity {
    /// Display name: global constructor and `tostring` prefix.
    pub name: String,
    /// Key of the methods global and the metatable registry entry.
    pub mt_name: String,
}

impl ClassIdentity {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mt_name: format!("{name}_mt"),
        }
    }
}

/// A binding object stored in a class's cache.
#[derive(Clone)]
pub enum CachedBinding {
    Callable(Arc<dyn Trampoline>),
    Field(Arc<dyn Any + Send + Sync>),
}

/// Process-wide record for one native class.
pub struct BoundType {
    type_id: TypeId,
    rust_name: &'static str,
    identity: RwLock<Option<Arc<ClassIdentity>>>,
    bindings: Mutex<FxHashMap<String, CachedBinding>>,
    finalizer: RwLock<Finalizer>,
    default_finalizer: Finalizer,
    owned: Mutex<FxHashMap<usize, OwnershipToken>>,
    upcasts: RwLock<FxHashMap<TypeId, Upcast>>,
    members: Mutex<Vec<MemberDoc>>,
    registration: Mutex<()>,
    teardown_recorded: AtomicBool,
}

static CLASSES: OnceLock<Mutex<FxHashMap<TypeId, Arc<BoundType>>>> = OnceLock::new();

fn classes() -> MutexGuard<'static, FxHashMap<TypeId, Arc<BoundType>>> {
    lock(CLASSES.get_or_init(|| Mutex::new(FxHashMap::default())))
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn boxed_finalizer<T: 'static>() -> Finalizer {
    Arc::new(|instance: *mut ()| {
        // SAFETY: only reached for addresses the VM owns, which were
        // allocated by `Box` unless a custom destructor replaced this one.
        drop(unsafe { Box::from_raw(instance.cast::<T>()) });
    })
}

impl BoundType {
    fn new<T: NativeClass>() -> Self {
        let default_finalizer = boxed_finalizer::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            rust_name: type_name::<T>(),
            identity: RwLock::new(None),
            bindings: Mutex::new(FxHashMap::default()),
            finalizer: RwLock::new(Arc::clone(&default_finalizer)),
            default_finalizer,
            owned: Mutex::new(FxHashMap::default()),
            upcasts: RwLock::new(FxHashMap::default()),
            members: Mutex::new(Vec::new()),
            registration: Mutex::new(()),
            teardown_recorded: AtomicBool::new(false),
        }
    }

    /// The record for `T`, created on first use.
    pub fn of<T: NativeClass>() -> Arc<BoundType> {
        let mut classes = classes();
        Arc::clone(
            classes
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Arc::new(BoundType::new::<T>())),
        )
    }

    /// Every class record created so far.
    pub fn all() -> Vec<Arc<BoundType>> {
        classes().values().cloned().collect()
    }

    pub fn rust_type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub fn identity(&self) -> Option<Arc<ClassIdentity>> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the script name, keeping the current identity if it matches.
    pub(crate) fn bind_name(&self, name: &str) -> Arc<ClassIdentity> {
        let mut slot = self.identity.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(identity) if identity.name == name => Arc::clone(identity),
            _ => {
                let identity = Arc::new(ClassIdentity::new(name));
                *slot = Some(Arc::clone(&identity));
                identity
            }
        }
    }

    /// Serializes first registration of this class against a VM.
    pub(crate) fn lock_registration(&self) -> MutexGuard<'_, ()> {
        lock(&self.registration)
    }

    /// Mark the teardown as recorded; true the first time.
    pub(crate) fn mark_teardown_recorded(&self) -> bool {
        !self.teardown_recorded.swap(true, Ordering::AcqRel)
    }

    // ========================================================================
    // Binding cache
    // ========================================================================

    /// The callable cached under `name`, building it on first use.
    pub fn cached_callable(
        &self,
        name: &str,
        make: impl FnOnce() -> Arc<dyn Trampoline>,
    ) -> Arc<dyn Trampoline> {
        let mut bindings = lock(&self.bindings);
        match bindings.entry(name.to_string()) {
            Entry::Occupied(mut entry) => match entry.get() {
                CachedBinding::Callable(binding) => {
                    debug!(class = self.rust_name, member = name, "reusing cached binding");
                    Arc::clone(binding)
                }
                CachedBinding::Field(_) => {
                    warn!(
                        class = self.rust_name,
                        member = name,
                        "field binding replaced by a callable of the same name"
                    );
                    let binding = make();
                    entry.insert(CachedBinding::Callable(Arc::clone(&binding)));
                    binding
                }
            },
            Entry::Vacant(entry) => {
                let binding = make();
                entry.insert(CachedBinding::Callable(Arc::clone(&binding)));
                binding
            }
        }
    }

    /// The field binding cached under `name`, building it on first use.
    pub fn cached_field<B>(&self, name: &str, make: impl FnOnce() -> B) -> Arc<B>
    where
        B: Any + Send + Sync,
    {
        let mut bindings = lock(&self.bindings);
        if let Some(CachedBinding::Field(existing)) = bindings.get(name) {
            if let Ok(binding) = Arc::clone(existing).downcast::<B>() {
                debug!(class = self.rust_name, member = name, "reusing cached field binding");
                return binding;
            }
        }
        if bindings.contains_key(name) {
            warn!(
                class = self.rust_name,
                member = name,
                "cached binding of a different shape replaced"
            );
        }
        let binding = Arc::new(make());
        bindings.insert(
            name.to_string(),
            CachedBinding::Field(Arc::clone(&binding) as Arc<dyn Any + Send + Sync>),
        );
        binding
    }

    pub fn cached_binding(&self, name: &str) -> Option<CachedBinding> {
        lock(&self.bindings).get(name).cloned()
    }

    pub fn cached_binding_count(&self) -> usize {
        lock(&self.bindings).len()
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Replace the finalizer; the previous one is dropped.
    pub fn set_finalizer(&self, finalizer: Finalizer) {
        *self.finalizer.write().unwrap_or_else(PoisonError::into_inner) = finalizer;
    }

    pub(crate) fn finalize(&self, instance: *mut ()) {
        let finalizer = Arc::clone(&self.finalizer.read().unwrap_or_else(PoisonError::into_inner));
        finalizer(instance);
    }

    /// Record that a VM now owns `address`.
    ///
    /// Pushing an address that is already owned joins the live transfer, so
    /// every owning handle of that instance shares one token.
    pub(crate) fn take_ownership(&self, address: usize) -> OwnershipToken {
        let mut owned = lock(&self.owned);
        match owned.get(&address) {
            Some(token) if token.load(Ordering::Acquire) => Arc::clone(token),
            _ => {
                let token = Arc::new(AtomicBool::new(true));
                owned.insert(address, Arc::clone(&token));
                token
            }
        }
    }

    /// Clear `token`; true for the one caller that must finalize `address`.
    ///
    /// A token from an earlier transfer never touches a newer entry for a
    /// reused address.
    pub(crate) fn release_ownership(&self, address: usize, token: &OwnershipToken) -> bool {
        let mut owned = lock(&self.owned);
        if !token.swap(false, Ordering::AcqRel) {
            return false;
        }
        if owned.get(&address).is_some_and(|current| Arc::ptr_eq(current, token)) {
            owned.remove(&address);
        }
        true
    }

    /// Whether some VM currently owns `address`.
    pub fn is_owned(&self, address: usize) -> bool {
        lock(&self.owned).contains_key(&address)
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    /// Let handles of this class (`T`) be read as `P`, and as every class
    /// `P` itself inherits from.
    pub fn add_upcast<T, P>(&self, parent: &BoundType)
    where
        T: AsMut<P> + 'static,
        P: 'static,
    {
        let direct: Upcast = Arc::new(|instance: *mut ()| {
            // SAFETY: only applied to pointers recorded for `T` handles.
            let child = unsafe { &mut *instance.cast::<T>() };
            (<T as AsMut<P>>::as_mut(child) as *mut P).cast::<()>()
        });
        let inherited: Vec<(TypeId, Upcast)> = parent
            .upcasts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, upcast)| (*id, Arc::clone(upcast)))
            .collect();

        let mut upcasts = self.upcasts.write().unwrap_or_else(PoisonError::into_inner);
        for (id, grand) in inherited {
            let first = Arc::clone(&direct);
            upcasts.insert(id, Arc::new(move |instance: *mut ()| grand(first(instance))));
        }
        upcasts.insert(TypeId::of::<P>(), direct);
    }

    pub(crate) fn upcast(&self, target: TypeId) -> Option<Upcast> {
        self.upcasts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
            .cloned()
    }

    // ========================================================================
    // Documentation and teardown
    // ========================================================================

    /// Record a bound member, replacing an earlier entry of the same name.
    pub fn document(&self, doc: MemberDoc) {
        let mut members = lock(&self.members);
        match members.iter_mut().find(|m| m.name == doc.name && m.role == doc.role) {
            Some(existing) => *existing = doc,
            None => members.push(doc),
        }
    }

    pub fn members(&self) -> Vec<MemberDoc> {
        lock(&self.members).clone()
    }

    /// Drop every cached binding and restore the default finalizer.
    ///
    /// Closures already installed in a VM keep their own binding alive.
    pub fn deallocate(&self) {
        let released = {
            let mut bindings = lock(&self.bindings);
            let count = bindings.len();
            bindings.clear();
            count
        };
        lock(&self.members).clear();
        self.set_finalizer(Arc::clone(&self.default_finalizer));
        self.teardown_recorded.store(false, Ordering::Release);
        debug!(class = self.rust_name, released, "deallocated class bindings");
    }
}

/// Release the cached bindings of `T`.
///
/// Needed per class when [`init`](crate::init) was never called; otherwise
/// [`quit`](crate::quit) does this for every registered class.
pub fn deallocate_bindings<T: NativeClass>() {
    BoundType::of::<T>().deallocate();
}
