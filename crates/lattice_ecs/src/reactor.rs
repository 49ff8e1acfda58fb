//! Stateful query views with update tracking and attached resources.
//!
//! A [`Reactor`] is a materialized view over a [`Query`]: it subscribes to
//! the referenced pools' events at construction and incrementally maintains
//! its member set from then on, instead of re-deriving it per traversal the
//! way a [`Mapper`](crate::Mapper) does. Per member it tracks an
//! [`UpdateMask`] — one bit per tracked `updated` component — and an
//! optional list of [`Attachment`]s created when the entity enters and
//! released exactly once when it leaves or the reactor is detached.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use lattice_component::Entity;
use serde_json::Value;
use tracing::debug;

use crate::error::EcsError;
use crate::pool::{PoolEvent, PoolHandle};
use crate::query::Query;
use crate::signal::SubscriberId;

/// Per-member update flags, one bit per `updated` component of the query.
///
/// Bit positions are assigned by position in the query's `updated` list at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateMask(u32);

impl UpdateMask {
    /// The empty mask.
    pub const EMPTY: UpdateMask = UpdateMask(0);

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the bit for the given `updated`-list position is set.
    #[must_use]
    pub const fn contains(self, bit: u32) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// The raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    fn set(&mut self, bit: u32) {
        self.0 |= 1 << bit;
    }
}

/// A resource bound to an entity's membership lifetime in a reactor.
///
/// A closed set of resource kinds, each released exactly once — when the
/// entity leaves the member set or when the reactor is detached, never both.
pub enum Attachment {
    /// A callback invoked on release.
    Disposer(Box<dyn FnOnce()>),
    /// A signal subscription disconnected on release.
    Connection {
        /// The pool owning the signal.
        pool: PoolHandle,
        /// Which of the pool's signals the subscription is on.
        event: PoolEvent,
        /// The subscription to disconnect.
        id: SubscriberId,
    },
    /// An owned resource dropped on release.
    Handle(Box<dyn Any>),
}

impl Attachment {
    fn release(self) {
        match self {
            Attachment::Disposer(dispose) => dispose(),
            Attachment::Connection { pool, event, id } => {
                pool.signal(event).disconnect(id);
            }
            Attachment::Handle(handle) => drop(handle),
        }
    }
}

fn release_all(attachments: Vec<Attachment>) {
    for attachment in attachments {
        attachment.release();
    }
}

type AttachFn = Rc<dyn Fn(Entity, &[Value], &[Option<Value>]) -> Vec<Attachment>>;

#[derive(Default)]
struct MemberData {
    mask: UpdateMask,
    attachments: Vec<Attachment>,
}

/// State shared between the reactor handle and its pool subscriptions.
struct ReactorShared {
    query: Query,
    members: RefCell<HashMap<Entity, MemberData>>,
    attach: RefCell<Option<AttachFn>>,
    detached: Cell<bool>,
}

impl ReactorShared {
    /// Re-test the membership predicate for `entity` after a presence event
    /// on any referenced pool. Enter and leave are edge-triggered here.
    ///
    /// `removing` is the pool whose `removed` event triggered the re-test:
    /// it fires before the physical removal, so that pool must count as
    /// absent even though it still holds the entity (and attachment
    /// disposal can therefore still read the outgoing payload).
    fn refresh(&self, entity: Entity, removing: Option<&PoolHandle>) {
        if self.detached.get() {
            return;
        }

        let matches = self.query.matches_assuming_absent(entity, removing);
        let is_member = self.members.borrow().contains_key(&entity);

        if matches && !is_member {
            self.members
                .borrow_mut()
                .insert(entity, MemberData::default());
            self.invoke_attach(entity);
        } else if !matches && is_member {
            let data = self.members.borrow_mut().remove(&entity);
            if let Some(data) = data {
                // Borrow released above — disposal may re-enter the registry.
                release_all(data.attachments);
            }
        }
    }

    /// Run the attach callback for a just-entered member, if registered.
    ///
    /// No state borrow is held while the callback runs. If the callback's
    /// own mutations made the entity leave before returning, the resources
    /// it produced are released immediately instead of stored.
    fn invoke_attach(&self, entity: Entity) {
        let callback = self.attach.borrow().clone();
        let Some(callback) = callback else { return };
        // Membership was just decided; don't re-run the predicate (during a
        // `removed` dispatch it would still see pre-removal state).
        let Some((required, optional)) = self.query.values(entity) else {
            return;
        };

        let attachments = callback(entity, &required, &optional);

        let mut members = self.members.borrow_mut();
        match members.get_mut(&entity) {
            Some(data) => data.attachments.extend(attachments),
            None => {
                drop(members);
                release_all(attachments);
            }
        }
    }

    /// Set the update bit for a member after an `updated` event.
    fn mark_updated(&self, entity: Entity, bit: u32) {
        if self.detached.get() {
            return;
        }
        if let Some(data) = self.members.borrow_mut().get_mut(&entity) {
            data.mask.set(bit);
        }
    }
}

/// Incrementally-maintained view over a [`Query`].
///
/// Dropping the reactor detaches it, so pool subscriptions and attachments
/// never outlive the handle.
pub struct Reactor {
    shared: Rc<ReactorShared>,
    connections: RefCell<Vec<(PoolHandle, PoolEvent, SubscriberId)>>,
}

impl Reactor {
    /// Build a reactor over a compiled query.
    ///
    /// Subscribes to every referenced pool's events and seeds the member
    /// set from the current registry state.
    #[must_use]
    pub fn new(query: &Query) -> Self {
        let shared = Rc::new(ReactorShared {
            query: query.clone(),
            members: RefCell::new(HashMap::new()),
            attach: RefCell::new(None),
            detached: Cell::new(false),
        });
        let mut connections = Vec::new();

        for pool in shared.query.presence_pools() {
            let s = Rc::clone(&shared);
            let id = pool
                .on_added()
                .connect(move |entity, _| s.refresh(entity, None));
            connections.push((Rc::clone(&pool), PoolEvent::Added, id));

            let s = Rc::clone(&shared);
            let p = Rc::clone(&pool);
            let id = pool
                .on_removed()
                .connect(move |entity, _| s.refresh(entity, Some(&p)));
            connections.push((Rc::clone(&pool), PoolEvent::Removed, id));
        }

        for (bit, pool) in shared.query.updated_pools().iter().enumerate() {
            let s = Rc::clone(&shared);
            let id = pool
                .on_updated()
                .connect(move |entity, _| s.mark_updated(entity, bit as u32));
            connections.push((Rc::clone(pool), PoolEvent::Updated, id));
        }

        // Seed from what already matches.
        for entity in shared.query.candidates() {
            shared.refresh(entity, None);
        }

        Self {
            shared,
            connections: RefCell::new(connections),
        }
    }

    /// Whether `entity` is currently a member.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.shared.members.borrow().contains_key(&entity)
    }

    /// Number of current members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.members.borrow().len()
    }

    /// Whether the member set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the reactor has been detached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.shared.detached.get()
    }

    /// Invoke `f` for every current member with its payloads.
    ///
    /// Iterates a defensive snapshot: members added or removed by `f` (or
    /// by anything `f` triggers) do not corrupt the pass, and each entity is
    /// revalidated before dispatch.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(Entity, &[Value], &[Option<Value>]),
    {
        for entity in self.member_snapshot() {
            if !self.contains(entity) {
                continue;
            }
            if let Some((required, optional)) = self.shared.query.row(entity) {
                f(entity, &required, &optional);
            }
        }
    }

    /// As [`each`](Self::each), but passes each member's [`UpdateMask`] and
    /// clears it after the callback returns.
    pub fn consume_each<F>(&self, mut f: F)
    where
        F: FnMut(Entity, UpdateMask, &[Value], &[Option<Value>]),
    {
        for entity in self.member_snapshot() {
            let mask = match self.shared.members.borrow().get(&entity) {
                Some(data) => data.mask,
                None => continue,
            };
            if let Some((required, optional)) = self.shared.query.row(entity) {
                f(entity, mask, &required, &optional);
            }
            if let Some(data) = self.shared.members.borrow_mut().get_mut(&entity) {
                data.mask = UpdateMask::EMPTY;
            }
        }
    }

    /// Clear one member's update mask.
    pub fn consume(&self, entity: Entity) -> Result<(), EcsError> {
        match self.shared.members.borrow_mut().get_mut(&entity) {
            Some(data) => {
                data.mask = UpdateMask::EMPTY;
                Ok(())
            }
            None => Err(EcsError::NotAMember(entity)),
        }
    }

    /// A member's current update mask.
    pub fn updates(&self, entity: Entity) -> Result<UpdateMask, EcsError> {
        self.shared
            .members
            .borrow()
            .get(&entity)
            .map(|data| data.mask)
            .ok_or(EcsError::NotAMember(entity))
    }

    /// Register the attach callback and invoke it for every current member.
    ///
    /// The callback runs whenever an entity enters the member set; the
    /// attachments it returns are owned by that membership and released
    /// exactly once, on leave or on [`detach`](Self::detach).
    ///
    /// # Panics
    ///
    /// Panics if an attach callback is already registered — one per reactor.
    pub fn with_attachments<F>(&self, callback: F)
    where
        F: Fn(Entity, &[Value], &[Option<Value>]) -> Vec<Attachment> + 'static,
    {
        {
            let mut attach = self.shared.attach.borrow_mut();
            assert!(
                attach.is_none(),
                "reactor already has an attachment callback"
            );
            *attach = Some(Rc::new(callback));
        }
        for entity in self.member_snapshot() {
            if self.contains(entity) {
                self.shared.invoke_attach(entity);
            }
        }
    }

    /// Release every attachment, disconnect every pool subscription, and
    /// mark the reactor inert. Idempotent; called automatically on drop.
    pub fn detach(&self) {
        if self.shared.detached.replace(true) {
            return;
        }

        for (pool, event, id) in self.connections.borrow_mut().drain(..) {
            pool.signal(event).disconnect(id);
        }

        let members = std::mem::take(&mut *self.shared.members.borrow_mut());
        let count = members.len();
        for (_, data) in members {
            release_all(data.attachments);
        }
        debug!(members = count, "reactor detached");
    }

    fn member_snapshot(&self) -> Vec<Entity> {
        self.shared.members.borrow().keys().copied().collect()
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.detach();
    }
}
