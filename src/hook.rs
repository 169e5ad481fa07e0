//! Lifecycle hooks
//!
//! Hooks are supplied by the application and handed to the migration engine
//! untouched. The engine invokes them at the [`HookEvent`]s below with access
//! to its own connection.

use std::error::Error;
use std::fmt;

use crate::connection::Connection;
use crate::engine::script::ResolvedScript;

/// Points during a migration run at which hooks are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeMigrate,
    BeforeEachMigrate,
    AfterEachMigrate,
    AfterMigrate,
    AfterMigrateError,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookEvent::BeforeMigrate => "beforeMigrate",
            HookEvent::BeforeEachMigrate => "beforeEachMigrate",
            HookEvent::AfterEachMigrate => "afterEachMigrate",
            HookEvent::AfterMigrate => "afterMigrate",
            HookEvent::AfterMigrateError => "afterMigrateError",
        };
        f.write_str(name)
    }
}

pub type HookResult = Result<(), Box<dyn Error + Send + Sync>>;

/// What a hook sees when it is invoked
pub struct HookContext<'a> {
    connection: &'a mut dyn Connection,
    script: Option<&'a ResolvedScript>,
}

impl<'a> HookContext<'a> {
    pub fn new(connection: &'a mut dyn Connection, script: Option<&'a ResolvedScript>) -> Self {
        Self { connection, script }
    }

    /// The engine's connection
    pub fn connection(&mut self) -> &mut dyn Connection {
        &mut *self.connection
    }

    /// The script being applied, for the per-script events
    pub fn script(&self) -> Option<&ResolvedScript> {
        self.script
    }
}

/// Application callback invoked by the migration engine
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &str;

    /// Whether [`handle`](LifecycleHook::handle) should be called for `event`
    fn supports(&self, _event: HookEvent) -> bool {
        true
    }

    /// Returning an error aborts the migration run
    fn handle(&self, event: HookEvent, ctx: &mut HookContext<'_>) -> HookResult;
}

/// A hook built from a closure, see [`from_fn`]
pub struct FnHook<F> {
    name: String,
    events: Vec<HookEvent>,
    f: F,
}

/// Wrap a closure into a hook listening to `events`
pub fn from_fn<F>(name: impl Into<String>, events: &[HookEvent], f: F) -> FnHook<F>
where
    F: Fn(HookEvent, &mut HookContext<'_>) -> HookResult + Send + Sync,
{
    FnHook {
        name: name.into(),
        events: events.to_vec(),
        f,
    }
}

impl<F> LifecycleHook for FnHook<F>
where
    F: Fn(HookEvent, &mut HookContext<'_>) -> HookResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, event: HookEvent) -> bool {
        self.events.contains(&event)
    }

    fn handle(&self, event: HookEvent, ctx: &mut HookContext<'_>) -> HookResult {
        (self.f)(event, ctx)
    }
}
