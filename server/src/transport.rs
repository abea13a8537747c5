//! Named-pipe transport multiplexing many logical channels.
//!
//! Each logical request type gets its own well-known FIFO under a working
//! directory, so several request kinds can be pending concurrently without
//! any framing protocol; per-client response channels are named by the
//! client's process id before authentication and by the token signature
//! afterwards, which guarantees uniqueness without a central registry.
//!
//! The exchanger is an explicitly constructed handle with an `init`/
//! `shutdown` lifecycle, passed to whoever owns a session. A channel that
//! cannot be created or opened is fatal to the caller; read or write
//! failures after session establishment only fail the attempted operation.

use log::{error, info, warn};
use nix::sys::stat::Mode;
use nix::unistd;
use shared::wire::WireError;
use shared::Record;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to create pipe directory {path}: {source}")]
    Init {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create or open channel `{channel}`: {source}")]
    Open {
        channel: String,
        source: std::io::Error,
    },
    #[error("channel name `{0}` is not a plain file name")]
    BadChannelName(String),
    #[error("channel `{0}` is not open")]
    NotOpen(String),
    #[error("channel `{0}` is not under listening")]
    NotListening(String),
    #[error("channel `{0}` is already under listening")]
    AlreadyListening(String),
    #[error("I/O failure on channel `{channel}`: {source}")]
    Io {
        channel: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// An open FIFO. Opened read-write so reads block instead of hitting EOF
/// when no peer currently holds the other end.
struct ChannelHandle {
    reader: Mutex<File>,
    writer: Mutex<File>,
}

struct Listener {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    /// Record size of the listened type, needed to craft the wake record.
    record_size: usize,
}

/// Channel multiplexer over named pipes rooted in one working directory.
pub struct MessageExchanger {
    dir: PathBuf,
    channels: Mutex<HashMap<String, Arc<ChannelHandle>>>,
    listeners: Mutex<HashMap<String, Listener>>,
}

impl MessageExchanger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            channels: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the working directory. Fatal if impossible: the process
    /// should not start degraded.
    pub fn init(&self) -> Result<(), TransportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| TransportError::Init {
            path: self.dir.clone(),
            source,
        })
    }

    fn channel_path(&self, name: &str) -> Result<PathBuf, TransportError> {
        if name.is_empty() || name.contains(['/', '\0']) || name == "." || name == ".." {
            return Err(TransportError::BadChannelName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Idempotently creates and opens a duplex channel.
    pub fn open_channel(&self, name: &str) -> Result<(), TransportError> {
        let mut channels = lock(&self.channels);
        if channels.contains_key(name) {
            return Ok(());
        }

        let path = self.channel_path(name)?;
        if let Err(errno) = unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR) {
            if errno != nix::errno::Errno::EEXIST {
                return Err(TransportError::Open {
                    channel: name.to_string(),
                    source: errno.into(),
                });
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                channel: name.to_string(),
                source,
            })?;
        let writer = file.try_clone().map_err(|source| TransportError::Open {
            channel: name.to_string(),
            source,
        })?;

        channels.insert(
            name.to_string(),
            Arc::new(ChannelHandle {
                reader: Mutex::new(file),
                writer: Mutex::new(writer),
            }),
        );
        Ok(())
    }

    /// Releases a channel. Closing a channel that is not open is a no-op.
    pub fn close_channel(&self, name: &str) {
        lock(&self.channels).remove(name);
    }

    fn handle(&self, name: &str) -> Result<Arc<ChannelHandle>, TransportError> {
        lock(&self.channels)
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::NotOpen(name.to_string()))
    }

    /// Spawns a dedicated thread blocking on fixed-size records from the
    /// channel, invoking `handler` for each. Records that fail to decode are
    /// logged and skipped.
    pub fn start_listening<T, F>(&self, name: &str, handler: F) -> Result<(), TransportError>
    where
        T: Record + Send + 'static,
        F: Fn(T) + Send + 'static,
    {
        self.open_channel(name)?;
        let channel = self.handle(name)?;

        let mut listeners = lock(&self.listeners);
        if listeners.contains_key(name) {
            return Err(TransportError::AlreadyListening(name.to_string()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let channel_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("listen-{name}"))
            .spawn(move || {
                let mut buf = vec![0u8; T::SIZE];
                loop {
                    let read = {
                        let mut reader = lock(&channel.reader);
                        reader.read_exact(&mut buf)
                    };
                    if thread_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = read {
                        error!("Read failure on channel `{}`: {}", channel_name, e);
                        break;
                    }
                    match T::decode(&buf) {
                        Ok(record) => handler(record),
                        Err(e) => warn!("Undecodable record on `{}`: {}", channel_name, e),
                    }
                }
            })
            .map_err(|source| TransportError::Io {
                channel: name.to_string(),
                source,
            })?;

        listeners.insert(
            name.to_string(),
            Listener {
                stop,
                handle,
                record_size: T::SIZE,
            },
        );
        Ok(())
    }

    /// Signals and joins the listener thread of a channel.
    ///
    /// Fails cleanly with [`TransportError::NotListening`] when the channel
    /// has no listener; other channels are unaffected either way.
    pub fn stop_listening(&self, name: &str) -> Result<(), TransportError> {
        let listener = lock(&self.listeners)
            .remove(name)
            .ok_or_else(|| TransportError::NotListening(name.to_string()))?;

        listener.stop.store(true, Ordering::SeqCst);
        // Wake the blocked reader with one sacrificial record.
        self.write_raw(name, &vec![0u8; listener.record_size])?;
        if listener.handle.join().is_err() {
            error!("Listener thread for `{}` panicked", name);
        }
        Ok(())
    }

    /// One-shot blocking read of `count` records. Returns the records read,
    /// which is an empty (or short) vector when the writer closed the
    /// channel before producing them.
    pub fn read_message<T: Record>(
        &self,
        name: &str,
        count: usize,
    ) -> Result<Vec<T>, TransportError> {
        let channel = self.handle(name)?;
        let mut records = Vec::with_capacity(count);
        let mut buf = vec![0u8; T::SIZE];

        let mut reader = lock(&channel.reader);
        for _ in 0..count {
            match reader.read_exact(&mut buf) {
                Ok(()) => records.push(T::decode(&buf)?),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(source) => {
                    return Err(TransportError::Io {
                        channel: name.to_string(),
                        source,
                    })
                }
            }
        }
        Ok(records)
    }

    /// Blocking write of a single record.
    pub fn write_message<T: Record>(&self, name: &str, record: &T) -> Result<(), TransportError> {
        self.write_raw(name, &record.encode()?)
    }

    /// Blocking write of a sequence of records, in order.
    pub fn write_records<T: Record>(&self, name: &str, records: &[T]) -> Result<(), TransportError> {
        let channel = self.handle(name)?;
        let mut writer = lock(&channel.writer);
        for record in records {
            let bytes = record.encode()?;
            writer.write_all(&bytes).map_err(|source| TransportError::Io {
                channel: name.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    fn write_raw(&self, name: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let channel = self.handle(name)?;
        let mut writer = lock(&channel.writer);
        writer.write_all(bytes).map_err(|source| TransportError::Io {
            channel: name.to_string(),
            source,
        })
    }

    /// Stops every listener and releases every channel.
    pub fn shutdown(&self) {
        let names: Vec<String> = lock(&self.listeners).keys().cloned().collect();
        for name in names {
            if let Err(e) = self.stop_listening(&name) {
                warn!("Stopping listener `{}` failed: {}", name, e);
            }
        }
        lock(&self.channels).clear();
        info!("Transport shut down");
    }
}

impl Drop for MessageExchanger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Locks a mutex, recovering the inner value if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
