use async_trait::async_trait;

use crate::message::Message;

/// Capabilities a device messaging transport provides to the publisher
#[async_trait]
pub trait Transport: Send {
    /// Live connection created by [`Transport::open_session`]
    type Session: Session;

    /// Acquire process-wide runtime state needed before any session can be opened
    fn init(&mut self) -> crate::Result<()>;

    /// Authenticate with `connection_string` and connect
    async fn open_session(&mut self, connection_string: &str) -> crate::Result<Self::Session>;

    /// Release the state acquired by [`Transport::init`]
    fn shutdown(&mut self);
}

/// A connected device session
#[async_trait]
pub trait Session: Send {
    /// Submit a message without waiting for the hub to acknowledge it.
    /// `Ok` means the message was queued, not that it was delivered.
    fn send(&mut self, message: Message) -> crate::Result<()>;

    /// Disconnect from the hub
    async fn close(&mut self);
}

/// Transport whose runtime has been initialized
///
/// Dropping the guard shuts the runtime down, so every exit path after a
/// successful [`TransportRuntime::init`] tears it down exactly once.
#[derive(Debug)]
pub struct TransportRuntime<T: Transport> {
    transport: T,
}

impl<T: Transport> TransportRuntime<T> {
    /// Initialize `transport`. On failure nothing needs tearing down.
    pub fn init(mut transport: T) -> crate::Result<Self> {
        transport.init()?;
        debug!("Transport runtime initialized");
        Ok(TransportRuntime { transport })
    }

    ///
    pub async fn open_session(&mut self, connection_string: &str) -> crate::Result<T::Session> {
        self.transport.open_session(connection_string).await
    }
}

impl<T: Transport> Drop for TransportRuntime<T> {
    fn drop(&mut self) {
        self.transport.shutdown();
        debug!("Transport runtime shut down");
    }
}
