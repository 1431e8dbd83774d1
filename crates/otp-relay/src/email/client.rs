//! IMAP client for the monitored mailbox.

use std::time::Duration;

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::config::MailboxConfig;
use crate::sanitize::redact_address;

use super::error::{EmailError, Result};
use super::session::{MailConnector, MailSession, RawMessage};

type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// IMAP client for searching and fetching unseen messages.
pub struct ImapClient {
    session: Option<Session<TlsStream>>,
    config: MailboxConfig,
    password: SecretString,
    timeout: Duration,
}

impl ImapClient {
    /// Creates a new IMAP client with the given configuration.
    pub fn new(config: MailboxConfig, password: SecretString) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            session: None,
            config,
            password,
            timeout,
        }
    }

    /// Connects to the IMAP server and authenticates.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("Already connected to IMAP server");
            return Ok(());
        }

        if !self.config.use_tls {
            return Err(EmailError::ConfigError(
                "TLS is required for secure email connections".to_string(),
            ));
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(
            "Connecting to IMAP server at {} as {}",
            addr,
            redact_address(&self.config.username)
        );

        let session = with_timeout(self.timeout, "connect", self.open_session(&addr)).await?;

        info!("Successfully authenticated to IMAP server");
        self.session = Some(session);
        Ok(())
    }

    async fn open_session(&self, addr: &str) -> Result<Session<TlsStream>> {
        let socket_addr = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?
            .next()
            .ok_or_else(|| {
                EmailError::ConnectionFailed(format!("No address found for {}", addr))
            })?;

        let tcp_stream = AsyncTcpStream::connect(socket_addr)
            .await
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?;

        let tls_stream = TlsConnector::new()
            .connect(&self.config.host, tcp_stream)
            .await?;

        let client = async_imap::Client::new(tls_stream);
        client
            .login(&self.config.username, self.password.expose_secret())
            .await
            .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))
    }

    /// Opens a folder read-write with SELECT so that fetched messages get
    /// their `\Seen` flag set by the server.
    pub async fn select_folder(&mut self, folder: &str) -> Result<()> {
        let timeout = self.timeout;
        let session = self.session_mut()?;

        info!("Selecting folder: {}", folder);

        let mailbox = with_timeout(timeout, "select", async {
            session.select(folder).await.map_err(|e| {
                let message = e.to_string();
                if message.contains("Mailbox doesn't exist") || message.contains("NO") {
                    EmailError::FolderNotFound(folder.to_string())
                } else {
                    EmailError::ProtocolError(message)
                }
            })
        })
        .await?;

        debug!("Folder '{}' selected with {} messages", folder, mailbox.exists);
        Ok(())
    }

    /// Searches for unseen messages. Returns UIDs in ascending order.
    pub async fn search_unseen_uids(&mut self) -> Result<Vec<u32>> {
        let timeout = self.timeout;
        let session = self.session_mut()?;

        let uids = with_timeout(timeout, "search", async {
            session
                .uid_search("UNSEEN")
                .await
                .map_err(|e| EmailError::ProtocolError(e.to_string()))
        })
        .await?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        debug!("Found {} unseen messages", uid_list.len());
        Ok(uid_list)
    }

    /// Fetches a message by UID. Fetching `RFC822` marks the message as seen.
    pub async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let session = self.session_mut()?;

        debug!("Fetching email with UID {}", uid);

        let result = with_timeout(timeout, "fetch", async {
            let messages = session
                .uid_fetch(uid.to_string(), "RFC822")
                .await
                .map_err(|e| EmailError::FetchFailed(uid.to_string(), e.to_string()))?;
            futures_util::pin_mut!(messages);

            // Drain the whole response so the session stays in sync.
            let mut body = None;
            while let Some(message_result) = messages.next().await {
                match message_result {
                    Ok(message) if message.uid == Some(uid) => {
                        if body.is_none() {
                            body = message.body().map(|b| b.to_vec());
                        }
                    }
                    Ok(message) => debug!(
                        "Ignoring FETCH response for UID {:?} while fetching {}",
                        message.uid, uid
                    ),
                    Err(e) => warn!("Error fetching message UID {}: {}", uid, e),
                }
            }

            body.ok_or_else(|| {
                EmailError::FetchFailed(uid.to_string(), "message has no body".to_string())
            })
        })
        .await;

        // An abandoned FETCH leaves its response on the wire.
        if matches!(result, Err(ref e) if e.is_session_fatal()) {
            warn!("Dropping IMAP session after failed fetch of UID {}", uid);
            self.session = None;
        }
        result
    }

    /// Disconnects from the IMAP server gracefully.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            with_timeout(self.timeout, "logout", async {
                session
                    .logout()
                    .await
                    .map_err(|e| EmailError::ProtocolError(e.to_string()))
            })
            .await?;
        }
        Ok(())
    }

    /// Checks if the client is currently connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn session_mut(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| EmailError::ConnectionFailed("Not connected".to_string()))
    }
}

#[async_trait]
impl MailSession for ImapClient {
    async fn search_unseen(&mut self) -> Result<Vec<String>> {
        Ok(self
            .search_unseen_uids()
            .await?
            .into_iter()
            .map(|uid| uid.to_string())
            .collect())
    }

    async fn fetch(&mut self, id: &str) -> Result<RawMessage> {
        let uid: u32 = id
            .parse()
            .map_err(|_| EmailError::FetchFailed(id.to_string(), "not a UID".to_string()))?;
        let bytes = self.fetch_message(uid).await?;
        Ok(RawMessage {
            id: id.to_string(),
            bytes,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.disconnect().await
    }
}

impl Drop for ImapClient {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapClient dropped without explicit disconnect - session will be closed");
        }
    }
}

/// Opens [`ImapClient`] sessions with the configured folder selected.
pub struct ImapConnector {
    config: MailboxConfig,
    password: SecretString,
}

impl ImapConnector {
    pub fn new(config: MailboxConfig, password: SecretString) -> Self {
        Self { config, password }
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn MailSession>> {
        let password = SecretString::from(self.password.expose_secret().to_string());
        let mut client = ImapClient::new(self.config.clone(), password);
        client.connect().await?;
        if let Err(e) = client.select_folder(&self.config.folder).await {
            if let Err(close_err) = client.disconnect().await {
                debug!("Logout after failed SELECT also failed: {}", close_err);
            }
            return Err(e);
        }
        Ok(Box::new(client))
    }
}

async fn with_timeout<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| EmailError::Timeout(format!("IMAP {} after {:?}", operation, timeout)))?
}
