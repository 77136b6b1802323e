//! PostgreSQL `LISTEN`/`NOTIFY` transport.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgNotification};

use super::{ListenConnection, Notification, Notifier, TransportError};

fn db_err(e: sqlx::Error) -> TransportError {
    TransportError::Database(e.to_string())
}

fn to_notification(n: &PgNotification) -> Notification {
    Notification::new(n.channel(), n.payload())
}

/// Dedicated listening connection backed by [`PgListener`].
///
/// `PgListener` quotes channel names itself, so any valid log id is a
/// valid channel. A lost connection is reported as
/// [`TransportError::ConnectionLost`] instead of being re-established.
pub struct PgListenConnection {
    listener: PgListener,
}

impl std::fmt::Debug for PgListenConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgListenConnection").finish_non_exhaustive()
    }
}

impl PgListenConnection {
    /// Opens a dedicated connection from `pool`'s connect options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Database`] if the connection cannot be
    /// established.
    pub async fn connect(pool: &PgPool) -> Result<Self, TransportError> {
        let listener = PgListener::connect_with(pool).await.map_err(db_err)?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl ListenConnection for PgListenConnection {
    async fn listen(&mut self, channel: &str) -> Result<(), TransportError> {
        self.listener.listen(channel).await.map_err(db_err)
    }

    async fn unlisten(&mut self, channel: &str) -> Result<(), TransportError> {
        self.listener.unlisten(channel).await.map_err(db_err)
    }

    async fn wait(&mut self) -> Result<Vec<Notification>, TransportError> {
        let Some(first) = self.listener.try_recv().await.map_err(db_err)? else {
            return Err(TransportError::ConnectionLost);
        };
        let mut batch = vec![to_notification(&first)];
        while let Some(next) = self.listener.next_buffered() {
            batch.push(to_notification(&next));
        }
        Ok(batch)
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let mut listener = self.listener;
        listener.unlisten_all().await.map_err(db_err)?;
        drop(listener);
        Ok(())
    }
}

/// Publishes with `pg_notify` on any pooled connection.
#[derive(Debug, Clone)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    /// Creates a notifier over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self, channel: &str, payload: Option<&str>) -> Result<(), TransportError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload.unwrap_or(""))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
