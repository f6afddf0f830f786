use std::thread;

/// Spawns an OS thread named `backdrop-<name>`.
///
/// Used for blocking watchers (`notify` delivers events on a std channel) so
/// they stay off the async runtime.
pub fn spawn_named_thread<F>(name: &str, task: F)
where F: FnOnce() + Send + 'static {
    let thread_name = format!("backdrop-{name}");

    if let Err(err) = thread::Builder::new().name(thread_name.clone()).spawn(task) {
        tracing::error!(thread = %thread_name, error = %err, "failed to spawn thread");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;

    #[test]
    fn spawn_named_thread_uses_prefix() {
        let (tx, rx) = channel();

        spawn_named_thread("config-watcher", move || {
            let name = thread::current().name().unwrap_or("").to_string();
            tx.send(name).unwrap();
        });

        let thread_name = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(thread_name, "backdrop-config-watcher");
    }

    #[test]
    fn spawned_threads_run_concurrently() {
        let (tx1, rx1) = channel();
        let (tx2, rx2) = channel();

        spawn_named_thread("one", move || {
            thread::sleep(Duration::from_millis(50));
            tx1.send(1).unwrap();
        });
        spawn_named_thread("two", move || {
            thread::sleep(Duration::from_millis(50));
            tx2.send(2).unwrap();
        });

        assert_eq!(rx1.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        assert_eq!(rx2.recv_timeout(Duration::from_secs(1)).unwrap(), 2);
    }
}
