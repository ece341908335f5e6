use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type EvictionListener<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// Handle returned by `on_evict`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered registry of eviction listeners
pub(crate) struct Listeners<K, V> {
    next_id: u64,
    registered: Vec<(ListenerId, EvictionListener<K, V>)>,
}

impl<K, V> Listeners<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            registered: Vec::new(),
        }
    }

    pub(crate) fn add<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.registered.push((id, Box::new(listener)));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.registered.len();
        self.registered.retain(|(registered, _)| *registered != id);
        self.registered.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.registered.len()
    }

    /// Calls every listener in registration order
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    pub(crate) fn notify(&self, key: &K, value: &V) {
        for (id, listener) in &self.registered {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(key, value))) {
                tracing::error!(
                    listener = id.0,
                    "eviction listener panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl<K, V> fmt::Debug for Listeners<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.registered.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_listeners_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners: Listeners<&str, i32> = Listeners::new();

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            listeners.add(move |key, value| {
                seen.lock().unwrap().push(format!("{tag}:{key}={value}"));
            });
        }

        listeners.notify(&"a", &1);
        assert_eq!(*seen.lock().unwrap(), vec!["first:a=1", "second:a=1"]);
    }

    #[test]
    fn test_remove_listener() {
        let mut listeners: Listeners<u32, u32> = Listeners::new();
        let id = listeners.add(|_, _| {});
        let other = listeners.add(|_, _| {});
        assert_ne!(id, other);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_the_rest() {
        let calls = Arc::new(Mutex::new(0));
        let mut listeners: Listeners<u32, u32> = Listeners::new();

        listeners.add(|_, _| panic!("listener failure"));
        let counter = Arc::clone(&calls);
        listeners.add(move |_, _| *counter.lock().unwrap() += 1);

        listeners.notify(&1, &1);
        listeners.notify(&2, &2);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
