use async_trait::async_trait;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opens, probes and closes the connections held by a [`Pool`].
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a brand new connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Liveness probe. An `Err` marks the connection as dead.
    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Closes a connection that will not be reused.
    async fn close(&self, conn: Self::Connection);
}

/// A bounded stack of reusable connections.
///
/// `get` pops the most recently returned connection and probes it. Dead
/// connections are discarded and the next one is tried; when the stack is
/// empty a fresh connection is opened. Probe failures never escape the pool.
pub struct Pool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    idle: Mutex<Vec<M::Connection>>,
    max_idle: usize,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<M: ManageConnection> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("max_idle", &self.inner.max_idle)
            .finish_non_exhaustive()
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Creates an empty pool that keeps at most `max_idle` idle connections.
    pub fn new(manager: M, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager,
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
            }),
        }
    }

    /// Number of connections currently waiting on the idle stack.
    pub async fn idle_count(&self) -> usize {
        self.inner.idle.lock().await.len()
    }

    /// Borrows a healthy connection.
    ///
    /// The lock is only held while the idle stack is searched; the returned
    /// guard is used without it. Only a failure to open a new connection is
    /// reported as an error.
    pub async fn get(&self) -> Result<PooledConnection<M>, M::Error> {
        let mut dead = Vec::new();
        let reused = {
            let mut idle = self.inner.idle.lock().await;
            let mut found = None;
            while let Some(mut conn) = idle.pop() {
                match self.inner.manager.is_valid(&mut conn).await {
                    Ok(()) => {
                        found = Some(conn);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding pooled connection that failed its liveness probe.");
                        dead.push(conn);
                    }
                }
            }
            found
        };

        for conn in dead {
            self.inner.manager.close(conn).await;
        }

        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!("No idle connection available, opening a new one.");
                self.inner.manager.connect().await?
            }
        };

        Ok(PooledConnection { pool: self.clone(), conn: Some(conn) })
    }

    async fn put_back(&self, mut conn: M::Connection) {
        if let Err(e) = self.inner.manager.is_valid(&mut conn).await {
            tracing::warn!(error = %e, "Connection failed its liveness probe on return; closing it.");
            self.inner.manager.close(conn).await;
            return;
        }

        let overflow = {
            let mut idle = self.inner.idle.lock().await;
            if idle.len() < self.inner.max_idle {
                idle.push(conn);
                None
            } else {
                Some(conn)
            }
        };

        if let Some(conn) = overflow {
            self.inner.manager.close(conn).await;
        }
    }
}

/// A connection borrowed from a [`Pool`].
///
/// Call [`release`](PooledConnection::release) once the work succeeded to hand
/// the connection back. Dropping the guard instead (for example when `?`
/// returns early) discards the connection.
pub struct PooledConnection<M: ManageConnection> {
    pool: Pool<M>,
    conn: Option<M::Connection>,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// Returns the connection to the pool if it still passes the liveness probe.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn).await;
        }
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is present until released")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is present until released")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!("Pooled connection dropped without release; discarding it.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("connection {0} is dead")]
    struct DeadConnection(usize);

    #[derive(Debug)]
    struct FakeConnection {
        id: usize,
    }

    #[derive(Default)]
    struct FakeState {
        opened: AtomicUsize,
        dead: StdMutex<HashSet<usize>>,
        closed: StdMutex<Vec<usize>>,
    }

    struct FakeManager {
        state: Arc<FakeState>,
    }

    #[async_trait]
    impl ManageConnection for FakeManager {
        type Connection = FakeConnection;
        type Error = DeadConnection;

        async fn connect(&self) -> Result<FakeConnection, DeadConnection> {
            let id = self.state.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConnection { id })
        }

        async fn is_valid(&self, conn: &mut FakeConnection) -> Result<(), DeadConnection> {
            if self.state.dead.lock().unwrap().contains(&conn.id) {
                Err(DeadConnection(conn.id))
            } else {
                Ok(())
            }
        }

        async fn close(&self, conn: FakeConnection) {
            self.state.closed.lock().unwrap().push(conn.id);
        }
    }

    fn fake_pool(max_idle: usize) -> (Pool<FakeManager>, Arc<FakeState>) {
        let state = Arc::new(FakeState::default());
        let pool = Pool::new(FakeManager { state: Arc::clone(&state) }, max_idle);
        (pool, state)
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let (pool, state) = fake_pool(2);

        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 0);
        conn.release().await;
        assert_eq!(pool.idle_count().await, 1);

        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 0);
        assert_eq!(pool.idle_count().await, 0);
        conn.release().await;

        assert_eq!(state.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count().await, 1);
    }

    #[tokio::test]
    async fn most_recently_returned_connection_is_lent_first() {
        let (pool, _state) = fake_pool(4);

        let first = pool.get().await.unwrap();
        let second = pool.get().await.unwrap();
        assert_eq!((first.id, second.id), (0, 1));
        first.release().await;
        second.release().await;

        let next = pool.get().await.unwrap();
        assert_eq!(next.id, 1);
    }

    #[tokio::test]
    async fn dead_connection_is_never_lent_again() {
        let (pool, state) = fake_pool(4);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        a.release().await;
        b.release().await;
        assert_eq!(pool.idle_count().await, 2);

        // Connection 1 is on top of the stack; kill it while it sits idle.
        state.dead.lock().unwrap().insert(1);

        for _ in 0..5 {
            let conn = pool.get().await.unwrap();
            assert_ne!(conn.id, 1);
            conn.release().await;
        }
        assert_eq!(*state.closed.lock().unwrap(), vec![1]);
        assert_eq!(pool.idle_count().await, 1);
    }

    #[tokio::test]
    async fn exhausted_stack_of_dead_connections_opens_a_fresh_one() {
        let (pool, state) = fake_pool(4);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        a.release().await;
        b.release().await;
        state.dead.lock().unwrap().extend([0, 1]);

        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 2);
        assert_eq!(pool.idle_count().await, 0);
        assert_eq!(state.closed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dropped_connection_is_discarded() {
        let (pool, state) = fake_pool(2);

        let conn = pool.get().await.unwrap();
        drop(conn);
        assert_eq!(pool.idle_count().await, 0);

        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(state.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connection_that_dies_while_borrowed_is_not_returned() {
        let (pool, state) = fake_pool(2);

        let conn = pool.get().await.unwrap();
        state.dead.lock().unwrap().insert(conn.id);
        conn.release().await;

        assert_eq!(pool.idle_count().await, 0);
        assert_eq!(*state.closed.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn idle_stack_is_bounded() {
        let (pool, state) = fake_pool(1);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        a.release().await;
        b.release().await;

        assert_eq!(pool.idle_count().await, 1);
        assert_eq!(*state.closed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn concurrent_borrowers_all_return_their_connections() {
        let (pool, _state) = fake_pool(8);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let conn = pool.get().await.unwrap();
                    let id = conn.id;
                    tokio::task::yield_now().await;
                    conn.release().await;
                    id
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        let idle = pool.idle_count().await;
        assert!((1..=8).contains(&idle));
    }
}
