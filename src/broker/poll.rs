//! The poll loop: the only task that touches the broker's connection.

use std::sync::Weak;

use tokio::sync::watch;

use super::command::Command;
use super::{BrokerError, BrokerInner, BrokerState};
use crate::transport::ListenConnection;

pub(super) async fn run(
    broker: Weak<BrokerInner>,
    connection: Box<dyn ListenConnection>,
    state: watch::Sender<BrokerState>,
) {
    let final_state = match poll(&broker, connection).await {
        Ok(()) => {
            tracing::info!("notification broker stopped");
            BrokerState::Stopped
        }
        Err(e) => {
            tracing::error!(error = %e, "notification broker failed, live subscriptions end");
            BrokerState::Failed(e.to_string())
        }
    };

    if let Some(broker) = broker.upgrade() {
        broker.terminate();
    }
    state.send_replace(final_state);
}

async fn poll(
    broker: &Weak<BrokerInner>,
    mut connection: Box<dyn ListenConnection>,
) -> Result<(), BrokerError> {
    loop {
        let notifications = connection.wait().await?;

        let Some(inner) = broker.upgrade() else {
            tracing::debug!("broker handle dropped, closing connection");
            connection.close().await?;
            return Ok(());
        };

        let (commands, open) = inner.commands.lock().take();
        for command in commands {
            execute(connection.as_mut(), command).await?;
        }

        if !open {
            drop(inner);
            connection.close().await?;
            return Ok(());
        }

        for notification in &notifications {
            inner.dispatch(notification);
        }
    }
}

async fn execute(
    connection: &mut dyn ListenConnection,
    command: Command,
) -> Result<(), BrokerError> {
    match command {
        Command::Listen { channel, done } => {
            connection.listen(&channel).await?;
            tracing::debug!(%channel, "LISTEN");
            let _ = done.send(());
        }
        Command::Unlisten { channel } => {
            connection.unlisten(&channel).await?;
            tracing::debug!(%channel, "UNLISTEN");
        }
    }
    Ok(())
}
