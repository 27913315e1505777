use db_offload::driver::{Dbapi, DriverError, DriverResult, RawConnection, RawCursor};
use db_offload::models::{ColumnDescription, ConnectParams, Row, Value};
use db_offload::pool::{self, DEFAULT_POOL_NAME, WorkerPool};
use db_offload::proxy::{CursorProxy, DriverProxy, ExecutionContext, Method};
use futures_util::FutureExt;
use serial_test::serial;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SLOW_CALL: Duration = Duration::from_millis(400);

/// Records the name of the thread each driver call ran on.
#[derive(Debug, Default, Clone)]
struct CallLog(Arc<Mutex<Vec<(&'static str, String)>>>);

impl CallLog {
    fn record(&self, method: &'static str) {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        self.0.lock().unwrap().push((method, name));
    }

    fn threads_for(&self, method: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

/// A driver that answers `SELECT 1` and ignores every connect argument.
#[derive(Debug, Default)]
struct EchoDbapi {
    log: CallLog,
}

impl Dbapi for EchoDbapi {
    fn threadsafety(&self) -> u8 {
        2
    }

    fn paramstyle(&self) -> &str {
        "format"
    }

    fn connect(&self, _params: &ConnectParams) -> DriverResult<Box<dyn RawConnection>> {
        self.log.record("connect");
        Ok(Box::new(EchoConnection {
            log: self.log.clone(),
        }))
    }
}

struct EchoConnection {
    log: CallLog,
}

impl RawConnection for EchoConnection {
    fn close(&mut self) -> DriverResult<()> {
        self.log.record("close");
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.log.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.log.record("rollback");
        Ok(())
    }

    fn cursor(&mut self) -> DriverResult<Box<dyn RawCursor>> {
        self.log.record("cursor");
        Ok(Box::new(EchoCursor {
            log: self.log.clone(),
            rows: VecDeque::new(),
            description: None,
            rowcount: -1,
            arraysize: 1,
        }))
    }
}

struct EchoCursor {
    log: CallLog,
    rows: VecDeque<Row>,
    description: Option<Vec<ColumnDescription>>,
    rowcount: i64,
    arraysize: usize,
}

impl RawCursor for EchoCursor {
    fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.log.record("description");
        self.description.clone()
    }

    fn rowcount(&self) -> i64 {
        self.log.record("rowcount");
        self.rowcount
    }

    fn arraysize(&self) -> usize {
        self.arraysize
    }

    fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size;
    }

    fn close(&mut self) -> DriverResult<()> {
        self.log.record("cursor.close");
        Ok(())
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> DriverResult<()> {
        self.log.record("execute");
        match sql {
            "SELECT 1" => {
                self.rows = VecDeque::from([vec![Value::Integer(1)]]);
                self.description = Some(vec![ColumnDescription::new("1", None)]);
                self.rowcount = 1;
                Ok(())
            }
            "SLOW" => {
                thread::sleep(SLOW_CALL);
                self.rows = VecDeque::from([vec![Value::from("slow")]]);
                self.description = Some(vec![ColumnDescription::new("slow", None)]);
                self.rowcount = 1;
                Ok(())
            }
            "PANIC" => panic!("driver exploded"),
            other => Err(DriverError::programming(format!("unknown statement: {other}"))),
        }
    }

    fn executemany(&mut self, sql: &str, seq_of_params: &[Vec<Value>]) -> DriverResult<()> {
        for params in seq_of_params {
            self.execute(sql, params)?;
        }
        Ok(())
    }

    fn fetchone(&mut self) -> DriverResult<Option<Row>> {
        self.log.record("fetchone");
        Ok(self.rows.pop_front())
    }
}

fn echo_proxy(context: ExecutionContext) -> (DriverProxy, CallLog) {
    let dbapi = EchoDbapi::default();
    let log = dbapi.log.clone();
    (DriverProxy::new(Arc::new(dbapi), context), log)
}

#[tokio::test]
async fn test_select_one_matches_direct_driver() {
    let direct = EchoDbapi::default();
    let mut raw = direct.connect(&ConnectParams::new().kwarg("host", "x")).unwrap();
    let mut raw_cursor = raw.cursor().unwrap();
    raw_cursor.execute("SELECT 1", &[]).unwrap();
    let expected = raw_cursor.fetchall().unwrap();

    let (dbapi, _) = echo_proxy(ExecutionContext::new());
    let conn = dbapi
        .connect(ConnectParams::new().kwarg("host", "x"))
        .await
        .unwrap();
    let rows = conn
        .cursor()
        .await
        .unwrap()
        .execute("SELECT 1", vec![])
        .await
        .unwrap()
        .fetchall()
        .await
        .unwrap();

    assert_eq!(rows, expected);
    assert_eq!(rows, vec![vec![Value::Integer(1)]]);
}

#[tokio::test]
async fn test_module_attributes_pass_through() {
    let (dbapi, log) = echo_proxy(ExecutionContext::new());
    assert_eq!(dbapi.apilevel(), "2.0");
    assert_eq!(dbapi.threadsafety(), 2);
    assert_eq!(dbapi.paramstyle(), "format");
    assert!(log.threads_for("connect").is_empty());
}

#[tokio::test]
async fn test_offloaded_calls_run_on_pinned_pool_workers() {
    let pinned = Arc::new(WorkerPool::new("dispatch-pinned", 2).unwrap());
    let (dbapi, log) = echo_proxy(ExecutionContext::new().with_pool(Arc::clone(&pinned)));

    let conn = dbapi.connect(ConnectParams::new()).await.unwrap();
    let cursor = conn.cursor().await.unwrap();
    cursor.execute("SELECT 1", vec![]).await.unwrap();
    cursor.fetchone().await.unwrap();
    conn.commit().await.unwrap();

    for method in ["connect", "cursor", "execute", "fetchone", "commit"] {
        let threads = log.threads_for(method);
        assert_eq!(threads.len(), 1, "{method}");
        assert!(
            threads[0].starts_with("dispatch-pinned-"),
            "{method} ran on {}",
            threads[0]
        );
    }
    assert_eq!(pinned.submitted(), 5);
}

#[tokio::test]
async fn test_attribute_reads_are_not_dispatched() {
    let pinned = Arc::new(WorkerPool::new("dispatch-attrs", 1).unwrap());
    let (dbapi, log) = echo_proxy(ExecutionContext::new().with_pool(Arc::clone(&pinned)));

    let conn = dbapi.connect(ConnectParams::new()).await.unwrap();
    let cursor = conn.cursor().await.unwrap();
    cursor.execute("SELECT 1", vec![]).await.unwrap();

    let before = pinned.submitted();
    let rowcount_reads = log.threads_for("rowcount").len();
    assert_eq!(cursor.rowcount(), 1);
    assert_eq!(cursor.description().unwrap()[0].name, "1");
    cursor.set_arraysize(3);
    assert_eq!(cursor.arraysize(), 3);
    assert_eq!(pinned.submitted(), before);

    // Served from the snapshot taken on the worker after `execute`.
    assert_eq!(log.threads_for("rowcount").len(), rowcount_reads);
    assert!(
        log.threads_for("rowcount")
            .last()
            .unwrap()
            .starts_with("dispatch-attrs-")
    );
}

async fn wait_until_started(log: &CallLog, method: &str) {
    while log.threads_for(method).is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_attribute_read_does_not_wait_for_running_call() {
    let (dbapi, log) = echo_proxy(ExecutionContext::new());
    let conn = dbapi.connect(ConnectParams::new()).await.unwrap();
    let cursor = conn.cursor().await.unwrap();

    let (executed, read_took) = tokio::join!(cursor.execute("SLOW", vec![]), async {
        wait_until_started(&log, "execute").await;
        let started = Instant::now();
        assert_eq!(cursor.rowcount(), -1);
        assert!(cursor.description().is_none());
        started.elapsed()
    });

    executed.unwrap();
    assert!(read_took < SLOW_CALL / 4, "read blocked for {read_took:?}");
    assert_eq!(cursor.rowcount(), 1);
    assert_eq!(cursor.description().unwrap()[0].name, "slow");
}

#[tokio::test(flavor = "current_thread")]
async fn test_inline_call_on_busy_cursor_does_not_block_scheduler() {
    let pinned = Arc::new(WorkerPool::new("dispatch-busy", 1).unwrap());
    let direct = EchoDbapi::default();
    let log = direct.log.clone();
    let mut raw = direct.connect(&ConnectParams::new()).unwrap();

    let context = ExecutionContext::new()
        .with_pool(Arc::clone(&pinned))
        .with_methods(&[Method::Execute]);
    let cursor = CursorProxy::new(raw.cursor().unwrap(), context);

    let (executed, (fetched, tick_took)) = tokio::join!(cursor.execute("SLOW", vec![]), async {
        wait_until_started(&log, "execute").await;
        let started = Instant::now();
        tokio::join!(cursor.fetchone(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        })
    });

    executed.unwrap();
    assert!(tick_took < SLOW_CALL / 2, "scheduler stalled for {tick_took:?}");
    // fetchone queued behind execute on the worker instead of running inline.
    assert_eq!(fetched.unwrap(), Some(vec![Value::from("slow")]));
    assert_eq!(log.threads_for("fetchone"), vec!["dispatch-busy-0".to_string()]);
}

#[tokio::test]
async fn test_methods_outside_offload_set_run_inline() {
    let pinned = Arc::new(WorkerPool::new("dispatch-inline", 1).unwrap());
    let direct = EchoDbapi::default();
    let log = direct.log.clone();
    let mut raw = direct.connect(&ConnectParams::new()).unwrap();

    let context = ExecutionContext::new()
        .with_pool(Arc::clone(&pinned))
        .with_methods(&[Method::Execute]);
    let cursor = CursorProxy::new(raw.cursor().unwrap(), context);

    cursor.execute("SELECT 1", vec![]).await.unwrap();
    cursor.fetchone().await.unwrap();

    let caller = thread::current().name().unwrap_or("unnamed").to_string();
    assert_eq!(log.threads_for("execute"), vec!["dispatch-inline-0".to_string()]);
    assert_eq!(log.threads_for("fetchone"), vec![caller]);
    assert_eq!(pinned.submitted(), 1);
}

#[tokio::test]
async fn test_driver_error_passes_through_unchanged() {
    let (dbapi, _) = echo_proxy(ExecutionContext::new());
    let cursor = dbapi
        .connect(ConnectParams::new())
        .await
        .unwrap()
        .cursor()
        .await
        .unwrap();

    let err = cursor.execute("DROP EVERYTHING", vec![]).await.unwrap_err();
    assert_eq!(
        err.as_driver(),
        Some(&DriverError::programming("unknown statement: DROP EVERYTHING"))
    );
}

#[tokio::test]
async fn test_panic_in_driver_propagates_to_caller() {
    let (dbapi, _) = echo_proxy(ExecutionContext::new());
    let conn = dbapi.connect(ConnectParams::new()).await.unwrap();
    let cursor = conn.cursor().await.unwrap();

    let outcome = AssertUnwindSafe(cursor.execute("PANIC", vec![]))
        .catch_unwind()
        .await;
    let payload = match outcome {
        Ok(_) => panic!("expected the driver panic to reach the caller"),
        Err(payload) => payload,
    };
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"driver exploded"));

    // The proxy is still usable afterwards.
    cursor.execute("SELECT 1", vec![]).await.unwrap();
    assert_eq!(
        cursor.fetchone().await.unwrap(),
        Some(vec![Value::Integer(1)])
    );
}

#[tokio::test]
#[serial]
async fn test_default_pool_is_resolved_at_call_time() {
    let (dbapi, log) = echo_proxy(ExecutionContext::new());
    let conn = dbapi.connect(ConnectParams::new()).await.unwrap();
    assert!(conn.context().pool().is_none());

    let replacement = Arc::new(WorkerPool::new("late-bound", 1).unwrap());
    let previous = pool::set_default_pool(Arc::clone(&replacement));

    conn.commit().await.unwrap();
    assert_eq!(log.threads_for("commit"), vec!["late-bound-0".to_string()]);

    match previous {
        Some(previous) => {
            pool::set_default_pool(previous);
        }
        None => {
            let fresh = Arc::new(WorkerPool::new(DEFAULT_POOL_NAME, pool::DEFAULT_POOL_SIZE).unwrap());
            pool::set_default_pool(fresh);
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_scheduler_keeps_running_while_call_blocks() {
    let pinned = Arc::new(WorkerPool::new("dispatch-blocking", 1).unwrap());
    let (ticks_tx, mut ticks_rx) = tokio::sync::mpsc::unbounded_channel();

    let ticker = tokio::spawn(async move {
        for i in 0..5 {
            let _ = ticks_tx.send(i);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    });

    pinned
        .submit(|| thread::sleep(std::time::Duration::from_millis(100)))
        .await
        .unwrap();

    // The ticks fired while the only scheduler thread awaited the worker.
    let mut ticks = Vec::new();
    while let Ok(i) = ticks_rx.try_recv() {
        ticks.push(i);
    }
    assert_eq!(ticks, vec![0, 1, 2, 3, 4]);
    ticker.await.unwrap();
}
