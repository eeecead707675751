use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use btleplug::api::Service;
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::channel::oneshot;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::capability::CapabilityMap;
use crate::device::connection::close_peripheral;
use crate::device::handle::PeripheralHandle;
use crate::device::transport::{BlePeripheral, DeviceSelector};
use crate::device::types::{BatteryLevel, ConnectionState, DeviceId};
use crate::error::SessionError;
use crate::midi::decoder::{truncate, DomainMessage, SequenceId};
use crate::midi::sink::OutputSink;
use crate::render::RenderBridge;
use crate::session::activity::{ActivityAggregator, ThrottleKey};
use crate::session::dispatcher::Dispatcher;
use crate::session::lifecycle::{establish_task, select_device_task, throttle_timer_task};
use crate::session::registry::{RegistrySnapshot, SessionRegistry};

pub mod activity;
pub mod dispatcher;
mod lifecycle;
pub mod registry;

const COMMAND_BUFFER: usize = 256;

pub(crate) type PairReply = oneshot::Sender<Result<DeviceId, SessionError>>;

/// Everything that can change session state. Commands are handled one at a time, in order.
pub(crate) enum Command {
    Pair { reply: PairReply },
    Selected { result: Result<Arc<dyn BlePeripheral>, SessionError>, reply: PairReply },
    Disconnect { id: DeviceId, reply: oneshot::Sender<Result<(), SessionError>> },
    ActivityExpired { id: DeviceId, sequence_id: SequenceId },
    Shutdown,

    // posted by the tasks of one pairing attempt
    Connected { id: DeviceId, attempt: u64, services: Vec<Service>, capabilities: CapabilityMap },
    Subscribed { id: DeviceId, attempt: u64 },
    BatteryRead { id: DeviceId, attempt: u64, level: u8 },
    Failed { id: DeviceId, attempt: u64, error: SessionError },
    Notification { id: DeviceId, attempt: u64, timestamp: SystemTime, value: Vec<u8> },
    PeerDisconnected { id: DeviceId, attempt: u64 },

    ThrottleFired { key: ThrottleKey },
}

/// Cheap to clone front door of a running [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: Sender<Command>,
    snapshots: watch::Receiver<RegistrySnapshot>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.snapshots.clone()
    }

    pub fn pairing_enabled(&self) -> bool {
        self.snapshots.borrow().pairing_enabled
    }

    /// Wait until the session has installed its output and accepts pairing requests.
    pub async fn initialized(&self) -> Result<(), SessionError> {
        let mut snapshots = self.snapshots.clone();
        let result = snapshots.wait_for(|snapshot| snapshot.pairing_enabled).await.map(|_| ());
        result.map_err(|_| SessionError::SessionClosed)
    }

    /// Let the user pick a device and bring it to ready. Pairing a device that is already
    /// connecting or connected resolves to its id without touching the connection.
    pub async fn pair(&self) -> Result<DeviceId, SessionError> {
        if !self.pairing_enabled() {
            return Err(SessionError::NotInitialized);
        }

        let (reply, result) = oneshot::channel();
        self.send(Command::Pair { reply }).await?;
        result.await?
    }

    pub async fn disconnect(&self, id: DeviceId) -> Result<(), SessionError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::Disconnect { id, reply }).await?;
        result.await?
    }

    /// Reported by the render layer when the pulse of one message has ended.
    pub async fn activity_expired(&self, id: DeviceId, sequence_id: SequenceId) -> Result<(), SessionError> {
        self.send(Command::ActivityExpired { id, sequence_id }).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        let mut commands = self.commands.clone();
        commands.send(command).await?;
        Ok(())
    }
}

/// A session that has been created but not started yet.
pub struct Session {
    config: Config,
    selector: Arc<dyn DeviceSelector>,
    registry: SessionRegistry,
    commands: Sender<Command>,
    receiver: Receiver<Command>,
}

impl Session {
    pub fn new(config: &Config, selector: Arc<dyn DeviceSelector>) -> (Session, SessionHandle) {
        let (registry, snapshots) = SessionRegistry::new();
        let (commands, receiver) = channel(COMMAND_BUFFER);

        let handle = SessionHandle {
            commands: commands.clone(),
            snapshots,
        };
        let session = Session {
            config: config.clone(),
            selector,
            registry,
            commands,
            receiver,
        };

        (session, handle)
    }

    /// Install the output and handle commands until shutdown. Pairing is refused before this
    /// runs.
    pub async fn run(self, sink: Box<dyn OutputSink>, renderer: Box<dyn RenderBridge>) {
        let runner = Runner {
            dispatcher: Dispatcher::new(&self.config),
            aggregator: ActivityAggregator::new(),
            config: self.config,
            selector: self.selector,
            registry: self.registry,
            commands: self.commands,
            receiver: self.receiver,
            sink,
            renderer,
            pending_pairs: HashMap::new(),
            next_attempt: 0,
            shutdown: CancellationToken::new(),
        };

        runner.run().await
    }
}

struct Runner {
    config: Config,
    selector: Arc<dyn DeviceSelector>,
    registry: SessionRegistry,
    aggregator: ActivityAggregator,
    dispatcher: Dispatcher,
    commands: Sender<Command>,
    receiver: Receiver<Command>,
    sink: Box<dyn OutputSink>,
    renderer: Box<dyn RenderBridge>,
    pending_pairs: HashMap<DeviceId, PairReply>,
    next_attempt: u64,
    shutdown: CancellationToken,
}

impl Runner {
    async fn run(mut self) {
        self.registry.set_pairing_enabled(true);
        self.render_devices();
        info!("Session started, pairing enabled");

        while let Some(command) = self.receiver.next().await {
            if let Command::Shutdown = command {
                break;
            }
            self.handle(command);
        }

        self.close_all().await;
        info!("Session stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Pair { reply } => {
                select_device_task(self.selector.clone(), self.commands.clone(), reply);
            },
            Command::Selected { result, reply } => self.on_selected(result, reply),
            Command::Disconnect { id, reply } => self.on_disconnect(id, reply),
            Command::ActivityExpired { id, sequence_id } => {
                if let Some(key) = self.aggregator.expire(&id, sequence_id) {
                    self.schedule(key);
                }
            },
            Command::Shutdown => {},
            Command::Connected { id, attempt, services, capabilities } => {
                self.on_connected(id, attempt, services, capabilities)
            },
            Command::Subscribed { id, attempt } => self.on_subscribed(id, attempt),
            Command::BatteryRead { id, attempt, level } => {
                if self.is_current(&id, attempt) {
                    self.set_battery(&id, BatteryLevel::from_raw(level));
                }
            },
            Command::Failed { id, attempt, error } => self.on_failed(id, attempt, error),
            Command::Notification { id, attempt, timestamp, value } => {
                self.on_notification(id, attempt, timestamp, value)
            },
            Command::PeerDisconnected { id, attempt } => self.on_peer_disconnected(id, attempt),
            Command::ThrottleFired { key } => {
                let (rendered, next) = self.aggregator.fire(&key);
                if let Some(entries) = rendered {
                    self.registry.set_activity(&key.device_id, entries.clone());
                    self.renderer.render_activity(&key.device_id, &entries);
                }
                if let Some(next) = next {
                    self.schedule(next);
                }
            },
        }
    }

    /// Commands of an earlier attempt are stale once the handle has been replaced.
    fn is_current(&self, id: &DeviceId, attempt: u64) -> bool {
        match self.registry.get(id) {
            Some(entry) => entry.attempt() == Some(attempt),
            None => false,
        }
    }

    fn on_selected(&mut self, result: Result<Arc<dyn BlePeripheral>, SessionError>, reply: PairReply) {
        let peripheral = match result {
            Ok(peripheral) => peripheral,
            Err(err) => {
                warn!("No device selected: {}", err);
                let _ = reply.send(Err(err));
                return;
            },
        };

        let id = peripheral.id();
        if let Some(entry) = self.registry.get(&id) {
            if entry.state.is_active() {
                info!("Device {} is already {}", id, entry.state);
                let _ = reply.send(Ok(id));
                return;
            }
        }

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let cancel = self.shutdown.child_token();
        let name = peripheral.name().map(str::to_string);
        let handle = PeripheralHandle::new(peripheral.clone(), attempt, cancel.clone());

        info!("Pairing {} ({})", id, name.as_deref().unwrap_or("unnamed"));
        self.registry.upsert(&id, |entry| {
            entry.name = name;
            entry.handle = Some(handle);
            entry.last_error = None;
        });
        self.registry.transition(&id, ConnectionState::Connecting);
        self.render_devices();

        self.pending_pairs.insert(id, reply);
        establish_task(peripheral, attempt, self.config.connect_timeout(), cancel, self.commands.clone());
    }

    fn on_connected(&mut self, id: DeviceId, attempt: u64, services: Vec<Service>, capabilities: CapabilityMap) {
        if !self.is_current(&id, attempt) {
            debug!("Ignoring stale connection of {}", id);
            return;
        }

        let attached = self.registry.transition_with(&id, ConnectionState::Connected, |entry| {
            if let Some(handle) = entry.handle.as_mut() {
                handle.attach_capabilities(services, capabilities);
            }
        });
        if !attached {
            return;
        }
        self.render_devices();

        if self.registry.transition(&id, ConnectionState::Subscribing) {
            self.render_devices();
        }
    }

    fn on_subscribed(&mut self, id: DeviceId, attempt: u64) {
        if !self.is_current(&id, attempt) {
            debug!("Ignoring stale subscription of {}", id);
            return;
        }

        if self.registry.transition(&id, ConnectionState::Ready) {
            self.render_devices();
            self.reply_pair(&id, Ok(id.clone()));
        }
    }

    fn on_failed(&mut self, id: DeviceId, attempt: u64, error: SessionError) {
        if !self.is_current(&id, attempt) {
            debug!("Ignoring stale failure of {}: {}", id, error);
            return;
        }

        error!("Pairing {} failed: {}", id, error);

        let Some(entry) = self.registry.get(&id) else {
            return;
        };
        let next = if entry.ever_connected || entry.state.is_connected() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Absent
        };
        if let Some(handle) = entry.handle.as_ref() {
            // the link may be up even though setup did not complete
            let peripheral = handle.peripheral.clone();
            spawn(async move { close_peripheral(&*peripheral, None).await });
        }

        let message = error.to_string();
        self.aggregator.forget(&id);
        self.registry.transition_with(&id, next, |entry| {
            entry.last_error = Some(message);
            if next == ConnectionState::Absent {
                entry.handle = None;
            }
        });
        self.render_devices();
        self.reply_pair(&id, Err(error));
    }

    fn on_notification(&mut self, id: DeviceId, attempt: u64, timestamp: SystemTime, value: Vec<u8>) {
        let Some(entry) = self.registry.get(&id) else {
            return;
        };
        if entry.attempt() != Some(attempt) || !entry.ready() {
            debug!("Dropping notification of {} which is {}", id, entry.state);
            return;
        }
        let name = entry.name.clone();

        let frame = truncate(&value);
        if let Err(err) = self.sink.send(frame) {
            warn!("Failed to forward MIDI frame of {}: {}", id, err);
        }

        let message = match DomainMessage::decode(id.clone(), timestamp, frame) {
            Ok(message) => message,
            Err(err) => {
                debug!("Dropping frame {:02x?} of {}: {}", value, id, err);
                return;
            },
        };

        if let Some(level) = self.dispatcher.battery_level(name.as_deref(), &message) {
            self.set_battery(&id, level);
        }

        for key in self.aggregator.enqueue(message.clone()) {
            self.schedule(key);
        }
        self.dispatcher.log_message(&message);
    }

    fn on_peer_disconnected(&mut self, id: DeviceId, attempt: u64) {
        if !self.is_current(&id, attempt) {
            return;
        }

        warn!("Device {} dropped the connection", id);
        self.aggregator.forget(&id);
        if self.registry.transition(&id, ConnectionState::Disconnected) {
            self.render_devices();
            self.reply_pair(&id, Err(SessionError::Connection { source: btleplug::Error::NotConnected }));
        }
    }

    fn on_disconnect(&mut self, id: DeviceId, reply: oneshot::Sender<Result<(), SessionError>>) {
        let Some(entry) = self.registry.get(&id) else {
            let _ = reply.send(Err(SessionError::UnknownDevice { id }));
            return;
        };
        if !entry.state.is_active() {
            info!("Device {} is already {}", id, entry.state);
            let _ = reply.send(Ok(()));
            return;
        }

        let close = entry.handle.as_ref().map(|handle| {
            (handle.peripheral.clone(), handle.capabilities.output().ok().cloned())
        });

        info!("Disconnecting {}", id);
        self.aggregator.forget(&id);
        self.registry.transition(&id, ConnectionState::Absent);
        self.render_devices();
        self.reply_pair(&id, Err(SessionError::Connection { source: btleplug::Error::NotConnected }));

        if let Some((peripheral, output)) = close {
            spawn(async move { close_peripheral(&*peripheral, output.as_ref()).await });
        }
        let _ = reply.send(Ok(()));
    }

    fn set_battery(&mut self, id: &DeviceId, level: BatteryLevel) {
        self.registry.upsert(id, |entry| entry.battery = level);
        self.renderer.render_battery(id, level);
    }

    fn schedule(&self, key: ThrottleKey) {
        throttle_timer_task(key, self.config.throttle_interval(), self.shutdown.child_token(), self.commands.clone());
    }

    fn reply_pair(&mut self, id: &DeviceId, result: Result<DeviceId, SessionError>) {
        if let Some(reply) = self.pending_pairs.remove(id) {
            let _ = reply.send(result);
        }
    }

    fn render_devices(&mut self) {
        let snapshot = self.registry.snapshot();
        self.renderer.render_devices(&snapshot);
    }

    async fn close_all(&mut self) {
        self.shutdown.cancel();
        self.registry.set_pairing_enabled(false);

        for id in self.registry.ids() {
            let close = match self.registry.get(&id) {
                Some(entry) if entry.state.is_active() => entry.handle.as_ref().map(|handle| {
                    (handle.peripheral.clone(), handle.capabilities.output().ok().cloned())
                }),
                _ => continue,
            };
            self.registry.transition(&id, ConnectionState::Absent);

            if let Some((peripheral, output)) = close {
                close_peripheral(&*peripheral, output.as_ref()).await;
            }
        }

        self.render_devices();
    }
}
