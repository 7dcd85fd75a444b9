//! The [`Context`] is a general purpose immutable container to carry scoped values around.
//!
//! Contexts are organised into a tree structure:
//!
//! - A root context represents the general process wide scope.
//! - Derived contexts represents a narrower scope within their parent with additional
//!   or updated information attached to them.
//!
//! Logins and renewals are expected to run with a derived context so log records
//! can carry request attributes (such as the role being logged into).
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

/// The [`Context`] is a general purpose container to carry scoped values around.
///
/// Refer to the [module level docs](crate::context) for details.
#[derive(Clone, Debug)]
pub struct Context {
    /// Logger with contextual attributes attached to it.
    pub logger: Logger,
}

impl Context {
    /// Derive a new [`Context`] by making changes to the current one.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            logger: self.logger.clone(),
        }
    }

    /// Derive a new [`Context`] by making changes to the current one using the provided callback.
    pub fn derive_with<F>(&self, callback: F) -> Context
    where
        F: FnOnce(ContextBuilder) -> ContextBuilder,
    {
        let builder = callback(self.derive());
        builder.build()
    }

    /// Initialise a new root context with no values attached.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder { logger }
    }
}

/// A builder for root and derived contexts.
pub struct ContextBuilder {
    logger: Logger,
}

impl ContextBuilder {
    /// Finalise the build process and return a new [`Context`].
    pub fn build(self) -> Context {
        Context {
            logger: self.logger,
        }
    }

    /// Update the [`Context`] logger to attach new log key/pair values.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::LogCapture;

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Create an empty context useful for test.
    pub fn fixture() -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context { logger }
    }

    /// Create a context whose log records are collected by the returned [`LogCapture`].
    pub fn fixture_with_logs() -> (Context, LogCapture) {
        let capture = LogCapture::default();
        let logger = Logger::root(capture.clone(), slog::o!());
        (Context { logger }, capture)
    }
}

#[cfg(any(test, feature = "test-fixture"))]
mod fixture {
    use std::fmt::Arguments;
    use std::fmt::Write;
    use std::sync::Arc;
    use std::sync::Mutex;

    use slog::Drain;
    use slog::Key;
    use slog::Level;
    use slog::OwnedKVList;
    use slog::Record;
    use slog::Serializer;
    use slog::KV;

    /// Collect rendered log records in memory so tests can inspect them.
    #[derive(Clone, Default)]
    pub struct LogCapture {
        records: Arc<Mutex<Vec<(Level, String)>>>,
    }

    impl LogCapture {
        /// Check if any record logged at the given level contains all the given fragments.
        pub fn contains(&self, level: Level, fragments: &[&str]) -> bool {
            self.records()
                .iter()
                .filter(|(record_level, _)| *record_level == level)
                .any(|(_, line)| fragments.iter().all(|fragment| line.contains(fragment)))
        }

        /// Snapshot of all records collected so far.
        pub fn records(&self) -> Vec<(Level, String)> {
            self.records
                .lock()
                .expect("LogCapture::records lock poisoned")
                .clone()
        }
    }

    impl Drain for LogCapture {
        type Ok = ();
        type Err = slog::Never;

        fn log(&self, record: &Record, values: &OwnedKVList) -> Result<(), slog::Never> {
            let mut line = LineSerializer(record.msg().to_string());
            let _ = record.kv().serialize(record, &mut line);
            let _ = values.serialize(record, &mut line);
            self.records
                .lock()
                .expect("LogCapture::records lock poisoned")
                .push((record.level(), line.0));
            Ok(())
        }
    }

    /// Render key/value pairs as ` key=value` after the message.
    struct LineSerializer(String);

    impl Serializer for LineSerializer {
        fn emit_arguments(&mut self, key: Key, value: &Arguments) -> slog::Result {
            let _ = write!(self.0, " {}={}", key, value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Context;

    #[test]
    fn derive_log_attributes() {
        let root = Context::fixture();
        let parent = root
            .derive()
            .log_values(slog::o!("root" => "value", "test" => "root"))
            .build();
        let context = parent
            .derive()
            .log_values(slog::o!("test" => "override"))
            .build();
        assert_eq!(format!("{:?}", context.logger.list()), "(test, test, root)");
    }

    #[test]
    fn derive_noop() {
        let parent = Context::fixture();
        let context = parent.derive().build();
        assert_eq!(
            format!("{:?}", parent.logger.list()),
            format!("{:?}", context.logger.list()),
        );
    }

    #[test]
    fn capture_logs() {
        let (context, logs) = Context::fixture_with_logs();
        let context = context.derive_with(|b| b.log_values(slog::o!("role" => "web")));
        slog::error!(context.logger, "something failed"; "reason" => "testing");
        assert!(logs.contains(
            slog::Level::Error,
            &["something failed", "reason=testing", "role=web"]
        ));
        assert!(!logs.contains(slog::Level::Info, &["something failed"]));
    }
}
