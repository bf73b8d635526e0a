//! Dependency container.
//!
//! Services are registered by name at startup with a factory and built
//! lazily, exactly once, on first use. The container is then shared
//! read-only with every request through [`Context::service`].
//!
//! ```rust
//! use mesh::services::Container;
//!
//! let container = Container::new()
//!     .add("greeting", || "hello".to_owned())
//!     .add("answer", || 42_u32);
//!
//! assert_eq!(*container.get::<u32>("answer").unwrap(), 42);
//! ```
//!
//! [`Context::service`]: crate::Context::service

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::Settings;
use crate::error::Error;
use crate::telemetry::Logger;

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn() -> Instance + Send + Sync>;

struct Entry {
    factory: Factory,
    instance: OnceLock<Instance>,
}

/// A name → lazily constructed singleton map.
#[derive(Default)]
pub struct Container {
    entries: HashMap<String, Entry>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`. Returns `self` for chaining.
    ///
    /// Registering a name twice replaces the earlier factory.
    pub fn add<T, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let name = name.into();
        let entry = Entry {
            factory: Box::new(move || Arc::new(factory()) as Instance),
            instance: OnceLock::new(),
        };
        if self.entries.insert(name.clone(), entry).is_some() {
            debug!(service = %name, "service registration replaced");
        }
        self
    }

    /// Resolves `name`, constructing it on first use.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::MissingService(name.to_owned()))?;
        let instance = entry.instance.get_or_init(|| {
            debug!(service = %name, "constructing service");
            (entry.factory)()
        });
        Arc::clone(instance)
            .downcast::<T>()
            .map_err(|_| Error::ServiceType { name: name.to_owned(), expected: type_name::<T>() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Container").field("services", &names).finish()
    }
}

/// The services every mesh application starts with: `settings` and `logger`.
pub fn initialize(settings: &Settings) -> Container {
    let logger = Logger::new(settings.server.name.clone());
    let settings = settings.clone();
    Container::new()
        .add("settings", move || settings.clone())
        .add("logger", move || logger.clone())
}
