use std::sync::Arc;
use std::time::SystemTime;
use futures::channel::mpsc::Sender;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::device::connection::{connect_and_discover, read_battery_level, subscribe_output};
use crate::device::transport::{BlePeripheral, DeviceSelector};
use crate::session::activity::ThrottleKey;
use crate::session::{Command, PairReply};

/// Ask the selector for a device; the result re-enters the session queue.
pub(crate) fn select_device_task(
    selector: Arc<dyn DeviceSelector>,
    mut commands: Sender<Command>,
    reply: PairReply,
) -> JoinHandle<()> {
    spawn(async move {
        let result = selector.request_device().await;
        if let Err(err) = commands.send(Command::Selected { result, reply }).await {
            warn!("Session stopped during device selection: {:?}", err);
        }
    })
}

/// Connect, discover, subscribe and then forward notifications until `cancel` fires or the
/// stream ends. Every step is reported back to the session queue.
pub(crate) fn establish_task(
    peripheral: Arc<dyn BlePeripheral>,
    attempt: u64,
    connect_timeout: Duration,
    cancel: CancellationToken,
    commands: Sender<Command>,
) -> JoinHandle<()> {
    spawn(async move {
        let id = peripheral.id();
        let mut failure_commands = commands.clone();

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Setup of {} cancelled", id);
            },
            result = establish(peripheral, attempt, connect_timeout, cancel.clone(), commands) => {
                if let Err(error) = result {
                    let _ = failure_commands.send(Command::Failed { id, attempt, error }).await;
                }
            },
        }
    })
}

async fn establish(
    peripheral: Arc<dyn BlePeripheral>,
    attempt: u64,
    connect_timeout: Duration,
    cancel: CancellationToken,
    mut commands: Sender<Command>,
) -> Result<(), crate::error::SessionError> {
    let id = peripheral.id();

    let (services, capabilities) = connect_and_discover(&*peripheral, connect_timeout).await?;
    disconnect_watcher_task(peripheral.clone(), attempt, cancel.clone(), commands.clone());

    if commands.send(Command::Connected { id: id.clone(), attempt, services, capabilities: capabilities.clone() }).await.is_err() {
        return Ok(());
    }

    let output = capabilities.output()?;
    let mut notifications = peripheral.notifications().await?;
    subscribe_output(&*peripheral, output).await?;

    if commands.send(Command::Subscribed { id: id.clone(), attempt }).await.is_err() {
        return Ok(());
    }

    if let Some(level) = read_battery_level(&*peripheral, &capabilities).await {
        let _ = commands.send(Command::BatteryRead { id: id.clone(), attempt, level }).await;
    }

    let output_uuid = output.uuid;
    while let Some(notification) = notifications.next().await {
        if notification.uuid != output_uuid {
            continue;
        }

        let command = Command::Notification {
            id: id.clone(),
            attempt,
            timestamp: SystemTime::now(),
            value: notification.value,
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }

    info!("Notification stream of {} ended", id);
    Ok(())
}

fn disconnect_watcher_task(
    peripheral: Arc<dyn BlePeripheral>,
    attempt: u64,
    cancel: CancellationToken,
    mut commands: Sender<Command>,
) -> JoinHandle<()> {
    spawn(async move {
        let id = peripheral.id();

        tokio::select! {
            _ = cancel.cancelled() => {},
            result = peripheral.wait_for_disconnect() => {
                if let Err(err) = result {
                    warn!("Could not watch the connection of {}: {:?}", id, err);
                    return;
                }
                let _ = commands.send(Command::PeerDisconnected { id, attempt }).await;
            },
        }
    })
}

/// Close the throttle window of `key` after `interval`, re-entering the session queue.
pub(crate) fn throttle_timer_task(
    key: ThrottleKey,
    interval: Duration,
    cancel: CancellationToken,
    mut commands: Sender<Command>,
) -> JoinHandle<()> {
    spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {},
            _ = sleep(interval) => {
                let _ = commands.send(Command::ThrottleFired { key }).await;
            },
        }
    })
}
