use crate::config::Config;
use crate::driver::fs::FsDriver;
use crate::driver::{Driver, TransactionHandle};
use crate::error::{ArborDbError, Result};
use crate::node::Visit;
use crate::queue::{TransactionQueue, TransactionReceipt, TransactionRunner};
use crate::validation::{self, Schema, ValidationResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Aggregate counts reported by [`Database::print_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Total live nodes, the root included.
    pub nodes: usize,
    /// Largest depth observed (root = 0).
    pub max_depth: usize,
    /// Largest number of children under a single parent.
    pub max_siblings: usize,
}

/// A JSON file system database engine.
///
/// The public facade: owns the open/close lifecycle, the schema
/// registry, and the transaction queue, and delegates storage work to
/// the driver inside transactions. Transactions run strictly in enqueue
/// order, one at a time.
pub struct Database {
    path: PathBuf,
    driver: Arc<dyn Driver>,
    opened: Arc<AtomicBool>,
    schemas: HashMap<String, Schema>,
    queue: Option<TransactionQueue>,
}

impl Database {
    /// Create a database rooted at an existing data directory.
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(ArborDbError::NotADirectory(path.to_path_buf()));
        }
        let path = path.canonicalize()?;
        let driver = Arc::new(FsDriver::new(&path));
        Ok(Self::with_driver(path, driver))
    }

    /// Create a database from a JSON config file whose `root` field
    /// points at the data directory. Relative roots resolve against the
    /// config file's directory.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config_path = path.as_ref().canonicalize()?;
        let config = Config::load(&config_path)?;
        let root = config.resolve_root(&config_path)?;
        if !root.is_dir() {
            return Err(ArborDbError::NotADirectory(root));
        }
        let root = root.canonicalize()?;
        let driver = Arc::new(FsDriver::new(&root));
        Ok(Self::with_driver(root, driver))
    }

    /// Create a database over a custom storage driver.
    pub fn with_driver(path: impl Into<PathBuf>, driver: Arc<dyn Driver>) -> Self {
        Database {
            path: path.into(),
            driver,
            opened: Arc::new(AtomicBool::new(false)),
            schemas: HashMap::new(),
            queue: None,
        }
    }

    /// The resolved root path of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` between a successful [`open`](Self::open) and the next
    /// [`close`](Self::close).
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Load the directory tree and start accepting transactions.
    ///
    /// Fails with [`ArborDbError::AlreadyOpen`] when called twice
    /// without an intervening close; the database stays usable after
    /// catching that error.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(ArborDbError::AlreadyOpen(self.path.clone()));
        }
        self.driver.open()?;
        self.opened.store(true, Ordering::Release);
        match TransactionQueue::start(self.driver.clone(), self.opened.clone()) {
            Ok(queue) => {
                self.queue = Some(queue);
                Ok(())
            }
            Err(e) => {
                // Stay closed when the worker fails to start.
                self.opened.store(false, Ordering::Release);
                let _ = self.driver.close();
                Err(e)
            }
        }
    }

    /// Close the database if open; a no-op otherwise.
    ///
    /// The flag flips before anything else, so the drain loop stops
    /// executing queued transactions and re-entrant calls see the
    /// database as already closed. The in-flight transaction (if any)
    /// finishes; transactions still queued settle with
    /// [`ArborDbError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.opened.store(false, Ordering::Release);
        if let Some(queue) = self.queue.take() {
            queue.shutdown();
        }
        self.driver.close()
    }

    // ── Schemas ─────────────────────────────────────────────────

    /// Register a named schema. Later registrations for the same name
    /// overwrite earlier ones; nothing is validated at registration.
    pub fn add_schema(&mut self, name: &str, schema: Schema) -> &mut Self {
        self.schemas.insert(name.to_string(), schema);
        self
    }

    /// Register several named schemas at once.
    pub fn add_schemas<I>(&mut self, schemas: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, Schema)>,
    {
        for (name, schema) in schemas {
            self.schemas.insert(name, schema);
        }
        self
    }

    /// Validate a JSON payload against the schema registered under
    /// `name`.
    pub fn validate(&self, name: &str, payload: &serde_json::Value) -> Result<ValidationResult> {
        let schema = self
            .schemas
            .get(name)
            .ok_or_else(|| ArborDbError::SchemaNotFound(name.to_string()))?;
        Ok(validation::validate_document(schema, payload))
    }

    // ── Transactions ────────────────────────────────────────────

    /// Enqueue `callback` and return a receipt for its outcome.
    ///
    /// The receipt is returned immediately; it settles once the
    /// transaction has run. No transaction begins before the previous
    /// one has fully settled. Fails fast with [`ArborDbError::Closed`]
    /// when the database is not open.
    pub fn transaction<T, F>(&self, callback: F) -> Result<TransactionReceipt<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TransactionHandle) -> Result<T> + Send + 'static,
    {
        let queue = self.queue.as_ref().ok_or(ArborDbError::Closed)?;
        let (runner, receipt) = TransactionRunner::new(callback);
        queue.submit(runner)?;
        Ok(receipt)
    }

    /// Log the directory and file nodes and return aggregate counts.
    pub fn print_directory(&self) -> Result<TreeStats> {
        let receipt = self.transaction(|files| {
            let mut stats = TreeStats::default();
            files.each_node(&mut |node, pos| {
                stats.nodes += 1;
                stats.max_depth = stats.max_depth.max(pos.depth);
                stats.max_siblings = stats.max_siblings.max(pos.order + 1);
                let indent = ": ".repeat(pos.depth);
                let marker = if node.is_dir { "/" } else { "" };
                log::info!(
                    "{indent}|- {}{marker}  (id {}, depth {}, ord {})",
                    node.name,
                    node.id,
                    pos.depth,
                    pos.order
                );
                Visit::Descend
            });
            Ok(stats)
        })?;
        receipt.wait()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.is_open() {
            log::warn!(
                "Database at {} dropped while open; closing",
                self.path.display()
            );
            if let Err(e) = self.close() {
                log::warn!("Close during drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    /// root with three files and one subdirectory holding two files.
    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        for name in ["alpha.json", "beta.json", "gamma.json"] {
            std::fs::write(tmp.path().join(name), "{}").unwrap();
        }
        let nested = tmp.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("one.json"), "{}").unwrap();
        std::fs::write(nested.join("two.json"), "{}").unwrap();
        tmp
    }

    fn open_db(tmp: &TempDir) -> Database {
        let mut db = Database::from_directory(tmp.path()).unwrap();
        db.open().unwrap();
        db
    }

    #[test]
    fn database_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();
    }

    #[test]
    fn open_print_directory_close() {
        let tmp = fixture();
        let mut db = open_db(&tmp);
        let stats = db.print_directory().unwrap();
        assert_eq!(
            stats,
            TreeStats {
                nodes: 7,
                max_depth: 2,
                max_siblings: 4,
            }
        );
        db.close().unwrap();
    }

    #[test]
    fn empty_directory_has_only_the_root() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_db(&tmp);
        let stats = db.print_directory().unwrap();
        assert_eq!(
            stats,
            TreeStats {
                nodes: 1,
                max_depth: 0,
                max_siblings: 1,
            }
        );
        db.close().unwrap();
    }

    #[test]
    fn double_open_fails_and_leaves_the_database_usable() {
        let tmp = fixture();
        let mut db = open_db(&tmp);
        assert!(matches!(db.open(), Err(ArborDbError::AlreadyOpen(_))));
        // Still serving transactions after the caught error.
        assert_eq!(db.print_directory().unwrap().nodes, 7);
        db.close().unwrap();
    }

    #[test]
    fn transaction_on_a_closed_database_fails_fast() {
        let tmp = fixture();
        let db = Database::from_directory(tmp.path()).unwrap();
        assert!(matches!(
            db.transaction(|_| Ok(())),
            Err(ArborDbError::Closed)
        ));
    }

    #[test]
    fn close_is_a_no_op_when_already_closed() {
        let tmp = fixture();
        let mut db = Database::from_directory(tmp.path()).unwrap();
        db.close().unwrap();
        db.open().unwrap();
        db.close().unwrap();
        db.close().unwrap();
    }

    #[test]
    fn transactions_execute_in_enqueue_order() {
        let tmp = fixture();
        let mut db = open_db(&tmp);
        let trace: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let slow_trace = trace.clone();
        let a = db
            .transaction(move |_| {
                thread::sleep(Duration::from_millis(50));
                slow_trace.lock().unwrap().push("slow");
                Ok(())
            })
            .unwrap();
        let fast_trace = trace.clone();
        let b = db
            .transaction(move |_| {
                fast_trace.lock().unwrap().push("fast");
                Ok(())
            })
            .unwrap();

        a.wait().unwrap();
        b.wait().unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["slow", "fast"]);
        db.close().unwrap();
    }

    #[test]
    fn callback_error_reaches_only_its_own_receipt() {
        let tmp = fixture();
        let mut db = open_db(&tmp);

        let failing = db
            .transaction::<(), _>(|_| Err(ArborDbError::Config("broken".into())))
            .unwrap();
        let next = db.transaction(|_| Ok("still running")).unwrap();

        assert!(matches!(failing.wait(), Err(ArborDbError::Config(_))));
        assert_eq!(next.wait().unwrap(), "still running");
        // Lifecycle is unaffected by the failed transaction.
        db.close().unwrap();
    }

    #[test]
    fn panicking_callback_does_not_crash_the_queue() {
        let tmp = fixture();
        let mut db = open_db(&tmp);

        let panicking = db.transaction::<(), _>(|_| panic!("bad callback")).unwrap();
        assert!(matches!(
            panicking.wait(),
            Err(ArborDbError::TransactionPanicked(_))
        ));
        assert_eq!(db.print_directory().unwrap().nodes, 7);
        db.close().unwrap();
    }

    #[test]
    fn close_fails_pending_transactions_with_closed() {
        let tmp = fixture();
        let mut db = open_db(&tmp);

        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let in_flight = db
            .transaction(move |_| {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                Ok(())
            })
            .unwrap();
        let stranded = db.transaction(|_| Ok(())).unwrap();

        // Close while the first transaction is mid-flight.
        started_rx.recv().unwrap();
        db.close().unwrap();

        assert!(in_flight.wait().is_ok());
        assert!(matches!(stranded.wait(), Err(ArborDbError::Closed)));
    }

    #[test]
    fn documents_round_trip_through_transactions() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_db(&tmp);

        let doc = json!({ "title": "Hello", "published": true });
        let written = doc.clone();
        let id = db
            .transaction(move |files| files.write(0, "post.json", &written))
            .unwrap()
            .wait()
            .unwrap();
        let read_back = db
            .transaction(move |files| files.read(id))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(read_back, doc);

        db.transaction(move |files| files.remove(id))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(db.print_directory().unwrap().nodes, 1);
        db.close().unwrap();
    }

    #[test]
    fn reopen_rescans_the_directory() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_db(&tmp);
        db.close().unwrap();

        std::fs::write(tmp.path().join("late.json"), "{}").unwrap();
        db.open().unwrap();
        assert_eq!(db.print_directory().unwrap().nodes, 2);
        db.close().unwrap();
    }

    #[test]
    fn schemas_register_overwrite_and_validate() {
        let tmp = fixture();
        let mut db = Database::from_directory(tmp.path()).unwrap();

        let lenient: Schema = serde_json::from_value(json!({
            "fields": { "title": { "type": "string", "required": true } },
            "additional_properties": true
        }))
        .unwrap();
        let strict: Schema = serde_json::from_value(json!({
            "fields": { "title": { "type": "string", "required": true } },
            "additional_properties": true,
            "strict": true
        }))
        .unwrap();

        db.add_schema("post", lenient);
        // Later registration wins.
        db.add_schema("post", strict);

        let result = db.validate("post", &json!({})).unwrap();
        assert!(!result.is_ok());
        assert!(matches!(
            db.validate("missing", &json!({})),
            Err(ArborDbError::SchemaNotFound(_))
        ));
    }

    #[test]
    fn add_schemas_registers_every_entry() {
        let tmp = fixture();
        let mut db = Database::from_directory(tmp.path()).unwrap();
        let schema: Schema = serde_json::from_value(json!({ "strict": true })).unwrap();
        db.add_schemas(vec![
            ("a".to_string(), schema.clone()),
            ("b".to_string(), schema),
        ]);
        assert!(db.validate("a", &json!({})).is_ok());
        assert!(db.validate("b", &json!({})).is_ok());
    }

    #[test]
    fn from_config_file_resolves_a_relative_root() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("doc.json"), "{}").unwrap();
        let config_path = tmp.path().join("db.json");
        std::fs::write(&config_path, r#"{ "root": "./data" }"#).unwrap();

        let mut db = Database::from_config_file(&config_path).unwrap();
        assert_eq!(db.path(), data.canonicalize().unwrap());
        db.open().unwrap();
        assert_eq!(db.print_directory().unwrap().nodes, 2);
        db.close().unwrap();
    }

    #[test]
    fn from_directory_rejects_a_file_path() {
        let tmp = fixture();
        assert!(matches!(
            Database::from_directory(tmp.path().join("alpha.json")),
            Err(ArborDbError::NotADirectory(_))
        ));
    }

    #[test]
    fn dropping_an_open_database_closes_it() {
        let tmp = fixture();
        let db = open_db(&tmp);
        drop(db);
    }
}
