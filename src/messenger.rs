//! Definition of [`Messenger`] and [`MessengerConfig`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use log::{debug, warn};

use crate::{
    boxes::{InBox, MethodBox, OutBox},
    common::message::Msg,
    pool::ConnectionPool,
    transport::{Connection, Connector},
};

/// Non-unique tag of boxes, which is used to discover them in bulk.
pub type Group = u32;

/// Called with the box after it is registered or before it is dropped.
pub type BoxHook = Arc<dyn Fn(&MethodBox) + Send + Sync>;

////////////////////////////////////////////////////////////////////////////////

/// Represents configuration of [`Messenger`].
#[derive(Clone, Debug)]
pub struct MessengerConfig {
    /// Own address of the messenger,
    /// which is declared to the remote side of every dialed connection.
    url: String,

    /// Group of boxes, which are created for anonymous client sessions.
    client_group: Group,

    /// Delay between failed flush of [`OutBox`] and its retry.
    retry_interval: Duration,
}

impl MessengerConfig {
    /// Default group of anonymous client session boxes.
    pub const DEFAULT_CLIENT_GROUP: Group = Group::MAX;

    /// Default delay between flush retries.
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

    /// Create config with the specified own address and default other parameters.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_group: Self::DEFAULT_CLIENT_GROUP,
            retry_interval: Self::DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Set group of anonymous client session boxes.
    pub fn with_client_group(mut self, client_group: Group) -> Self {
        self.client_group = client_group;
        self
    }

    /// Set delay between flush retries. It can not be zero.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Result<Self, String> {
        if retry_interval.is_zero() {
            return Err("Retry interval can not be zero".to_owned());
        }
        self.retry_interval = retry_interval;
        Ok(self)
    }

    /// Own address of the messenger.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Group of anonymous client session boxes.
    pub fn client_group(&self) -> Group {
        self.client_group
    }

    /// Delay between flush retries.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Directory entry.
struct Entry {
    /// Group of the box.
    group: Group,
    /// Registered box.
    mbox: MethodBox,
}

#[derive(Default)]
/// Registration hooks.
struct Hooks {
    /// Called after box is registered.
    after_box_in: Option<BoxHook>,
    /// Called before box is dropped.
    before_box_out: Option<BoxHook>,
}

/// State shared by all handles of [`Messenger`].
pub(crate) struct Shared {
    /// Messenger configuration.
    config: MessengerConfig,
    /// Boxes by name.
    directory: Mutex<HashMap<String, Entry>>,
    /// Registration hooks.
    hooks: Mutex<Hooks>,
    /// Connections of the messenger.
    pool: ConnectionPool,
}

/// Weak reference to the messenger, which is held by boxes and connections.
#[derive(Clone)]
pub(crate) struct MessengerRef(Weak<Shared>);

impl MessengerRef {
    /// Messenger, if it is still alive.
    pub fn get(&self) -> Option<Messenger> {
        self.0.upgrade().map(|shared| Messenger { shared })
    }
}

/// Directory of boxes, which routes envelopes between them.
///
/// Envelopes produced inside of the process are routed [by receiver][Messenger::from_inside],
/// envelopes arrived from the network are routed [by sender][Messenger::from_outside]
/// to the out-box representing the remote box.
///
/// Messenger is a cheap handle; clones refer to the same directory.
#[derive(Clone)]
pub struct Messenger {
    /// Directory, hooks and pool.
    shared: Arc<Shared>,
}

impl Messenger {
    /// Create new messenger, which dials remote addresses with `connector`.
    pub fn new(config: MessengerConfig, connector: Arc<dyn Connector>) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| Shared {
            pool: ConnectionPool::new(
                MessengerRef(weak.clone()),
                connector,
                config.url().to_owned(),
                config.client_group(),
            ),
            config,
            directory: Mutex::default(),
            hooks: Mutex::default(),
        });
        Self { shared }
    }

    /// Weak reference for boxes and connections.
    pub(crate) fn downgrade(&self) -> MessengerRef {
        MessengerRef(Arc::downgrade(&self.shared))
    }

    /// Configuration of the messenger.
    pub fn config(&self) -> &MessengerConfig {
        &self.shared.config
    }

    /// Own address of the messenger.
    pub fn url(&self) -> &str {
        self.shared.config.url()
    }

    /// Connections of the messenger.
    pub fn pool(&self) -> &ConnectionPool {
        &self.shared.pool
    }

    /// Take accepted inbound connection. See [`ConnectionPool::accept`].
    pub fn accept(&self, conn: Arc<dyn Connection>, protocol: Option<String>) {
        self.shared.pool.accept(conn, protocol)
    }

    /// Register in-box with the specified group and name.
    pub fn add_in_box(&self, group: Group, name: &str) -> InBox {
        let in_box = InBox::new(name, self.downgrade());
        self.register(group, in_box.clone().into());
        in_box
    }

    /// Register out-box with the specified group and name,
    /// which represents box of the remote process with the specified address.
    pub fn add_out_box(&self, group: Group, name: &str, address: &str) -> OutBox {
        let out_box = OutBox::new(
            name,
            address,
            self.shared.config.retry_interval(),
            self.downgrade(),
        );
        self.register(group, out_box.clone().into());
        out_box
    }

    /// Insert box into the directory, replacing box with the same name.
    fn register(&self, group: Group, mbox: MethodBox) {
        let replaced = self.shared.directory.lock().unwrap().insert(
            mbox.name().to_owned(),
            Entry {
                group,
                mbox: mbox.clone(),
            },
        );
        if let Some(old) = replaced {
            warn!("box {} is registered again, old box is replaced", mbox.name());
            old.mbox.clear();
        }

        let hook = self.shared.hooks.lock().unwrap().after_box_in.clone();
        if let Some(hook) = hook {
            hook(&mbox);
        }
    }

    /// Drop the box from the directory and release it.
    ///
    /// Does nothing if this box is not registered.
    pub fn drop_box(&self, mbox: &MethodBox) {
        let registered = self
            .get_box(mbox.name())
            .is_some_and(|current| current.ptr_eq(mbox));
        if !registered {
            debug!("box {} is not registered, nothing to drop", mbox.name());
            return;
        }

        let hook = self.shared.hooks.lock().unwrap().before_box_out.clone();
        if let Some(hook) = hook {
            hook(mbox);
        }
        mbox.clear();

        let mut directory = self.shared.directory.lock().unwrap();
        if directory
            .get(mbox.name())
            .is_some_and(|entry| entry.mbox.ptr_eq(mbox))
        {
            directory.remove(mbox.name());
        }
    }

    /// Box registered with the specified name.
    pub fn get_box(&self, name: &str) -> Option<MethodBox> {
        self.shared
            .directory
            .lock()
            .unwrap()
            .get(name)
            .map(|entry| entry.mbox.clone())
    }

    /// All boxes registered with the specified group, in no particular order.
    pub fn get_group(&self, group: Group) -> Vec<MethodBox> {
        self.shared
            .directory
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.group == group)
            .map(|entry| entry.mbox.clone())
            .collect()
    }

    /// Route envelope produced inside of the process to its receiver.
    ///
    /// Envelope for unknown box is dropped.
    pub fn from_inside(&self, msg: Msg) {
        match self.get_box(msg.receiver()) {
            Some(mbox) => mbox.receive(msg),
            None => warn!("from_inside: no box {}, {:?} is dropped", msg.receiver(), msg.msg_type()),
        }
    }

    /// Route envelope arrived from the network to the out-box of its sender.
    ///
    /// Envelope is dropped if the sender is unknown or it is not an out-box.
    pub fn from_outside(&self, msg: Msg) {
        match self.get_box(msg.sender()) {
            Some(MethodBox::Out(out_box)) => out_box.interpret(msg),
            Some(MethodBox::In(_)) => warn!(
                "from_outside: box {} is not an out-box, {:?} is dropped",
                msg.sender(),
                msg.msg_type()
            ),
            None => warn!(
                "from_outside: no box {}, {:?} is dropped",
                msg.sender(),
                msg.msg_type()
            ),
        }
    }

    /// Set hook, which is called after every box registration.
    pub fn set_on_after_box_in<F>(&self, hook: F)
    where
        F: Fn(&MethodBox) + Send + Sync + 'static,
    {
        self.shared.hooks.lock().unwrap().after_box_in = Some(Arc::new(hook));
    }

    /// Set hook, which is called before every box is dropped.
    pub fn set_on_before_box_out<F>(&self, hook: F)
    where
        F: Fn(&MethodBox) + Send + Sync + 'static,
    {
        self.shared.hooks.lock().unwrap().before_box_out = Some(Arc::new(hook));
    }
}
