//! Remote transport connectors
//!
//! The sync engine talks to the destination through [`RemoteConnector`],
//! implemented for SFTP (ssh2) and plain FTP (suppaftp). Both keep a
//! `{Disconnected, Connected}` session state and reconnect on demand: the
//! session is probed before every operation and re-established if dead,
//! with no background keep-alive.
//!
//! Directory creation is idempotent by contract. When `mkdir` fails the
//! connector probes for the directory and treats "already exists" as
//! success; re-running a whole delivery against a populated destination
//! must never fail on the directory structure.

use std::fs::File;
use std::net::TcpStream;
use std::path::Path;

use ssh2::{Session, Sftp};
use suppaftp::FtpStream;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("fail while connecting to {host}:{port}: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("file not found ({0})")]
    MissingLocal(String),
    #[error("remote operation failed ({path}): {reason}")]
    Remote { path: String, reason: String },
}

/// Where and as whom to connect
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl RemoteEndpoint {
    fn connection_error(&self, reason: impl ToString) -> ConnectorError {
        ConnectorError::Connection {
            host: self.host.clone(),
            port: self.port,
            reason: reason.to_string(),
        }
    }
}

/// Capability set the sync engine needs from a transport
pub trait RemoteConnector {
    /// Establish or reuse a live session. Safe to call repeatedly.
    fn connect(&mut self) -> Result<(), ConnectorError>;

    /// Create a remote directory. An already-existing directory is success.
    fn mkdir(&mut self, path: &str) -> Result<(), ConnectorError>;

    /// Move to (or verify access to) a remote directory.
    fn chdir(&mut self, path: &str) -> Result<(), ConnectorError>;

    /// Upload one file, overwriting any remote file of the same name.
    fn put(&mut self, local: &Path, remote: &str) -> Result<(), ConnectorError>;
}

fn remote_error(path: &str, reason: impl ToString) -> ConnectorError {
    ConnectorError::Remote {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Split a remote path into its parent directory and file name
fn split_remote(remote: &str) -> (Option<&str>, &str) {
    match remote.rsplit_once('/') {
        Some(("", name)) => (Some("/"), name),
        Some((dir, name)) => (Some(dir), name),
        None => (None, remote),
    }
}

/// Shared mkdir idempotence rule: a failed create is still a success when
/// the directory turns out to exist; only a truly absent directory is an
/// error. `exists` is probed only on create failure.
fn mkdir_or_exists<E: ToString>(
    path: &str,
    created: Result<(), E>,
    exists: impl FnOnce() -> bool,
) -> Result<(), ConnectorError> {
    match created {
        Ok(()) => {
            debug!("directory has been created ({})", path);
            Ok(())
        }
        Err(create_err) => {
            if exists() {
                debug!("directory already exists ({})", path);
                Ok(())
            } else {
                Err(remote_error(path, create_err))
            }
        }
    }
}

/// Conclude an FTP store performed from within the parent directory. The
/// store outcome is authoritative; failing to return to the previous
/// working directory never masks it and never fails a completed upload.
fn put_outcome<E: ToString, F: ToString>(
    remote: &str,
    stored: Result<(), E>,
    restored: Result<(), F>,
) -> Result<(), ConnectorError> {
    if let Err(e) = restored {
        warn!(
            "could not return to the previous directory after storing ({}): {}",
            remote,
            e.to_string()
        );
    }
    stored.map_err(|e| remote_error(remote, e))
}

// ---------------------------------------------------------------------------
// SFTP
// ---------------------------------------------------------------------------

enum SftpState {
    Disconnected,
    Connected { session: Session, sftp: Sftp },
}

/// SFTP connector over an ssh2 session with password authentication
pub struct SftpConnector {
    endpoint: RemoteEndpoint,
    state: SftpState,
}

impl SftpConnector {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self {
            endpoint,
            state: SftpState::Disconnected,
        }
    }

    fn ensure_connected(&mut self) -> Result<(), ConnectorError> {
        if let SftpState::Connected { session, .. } = &self.state {
            if session.authenticated() {
                return Ok(());
            }
            // Stale handle, rebuild the session below
        }
        self.state = SftpState::Disconnected;

        let addr = format!("{}:{}", self.endpoint.host, self.endpoint.port);
        info!("connecting through ssh to the server ({})", addr);

        let tcp = TcpStream::connect(&addr).map_err(|e| {
            error!("fail while connecting through ssh, check the server availability");
            self.endpoint.connection_error(e)
        })?;
        let mut session = Session::new().map_err(|e| self.endpoint.connection_error(e))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| self.endpoint.connection_error(e))?;
        session
            .userauth_password(&self.endpoint.user, &self.endpoint.password)
            .map_err(|e| {
                error!("fail while connecting through ssh, check your credentials");
                self.endpoint.connection_error(e)
            })?;
        let sftp = session
            .sftp()
            .map_err(|e| self.endpoint.connection_error(e))?;

        self.state = SftpState::Connected { session, sftp };
        Ok(())
    }

    fn live_sftp(&mut self) -> Result<&Sftp, ConnectorError> {
        self.ensure_connected()?;
        match &self.state {
            SftpState::Connected { sftp, .. } => Ok(sftp),
            SftpState::Disconnected => {
                Err(self.endpoint.connection_error("session not established"))
            }
        }
    }
}

impl RemoteConnector for SftpConnector {
    fn connect(&mut self) -> Result<(), ConnectorError> {
        self.ensure_connected()
    }

    fn mkdir(&mut self, path: &str) -> Result<(), ConnectorError> {
        info!("creating directory ({})", path);
        let created = {
            let sftp = self.live_sftp()?;
            sftp.mkdir(Path::new(path), 0o755)
        };
        mkdir_or_exists(path, created, || match self.live_sftp() {
            Ok(sftp) => sftp.stat(Path::new(path)).is_ok(),
            Err(_) => false,
        })
    }

    fn chdir(&mut self, path: &str) -> Result<(), ConnectorError> {
        info!("changing to directory ({})", path);
        let opened = {
            let sftp = self.live_sftp()?;
            sftp.opendir(Path::new(path)).map(|_| ())
        };
        opened.map_err(|e| remote_error(path, e))
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        info!("copying file from ({}) to ({})", local.display(), remote);
        let mut src = File::open(local)
            .map_err(|_| ConnectorError::MissingLocal(local.display().to_string()))?;
        let copied: Result<(), String> = {
            let sftp = self.live_sftp()?;
            sftp.create(Path::new(remote))
                .map_err(|e| e.to_string())
                .and_then(|mut dst| {
                    std::io::copy(&mut src, &mut dst)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
        };
        copied.map_err(|reason| remote_error(remote, reason))?;
        debug!("file has been copied ({})", remote);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FTP
// ---------------------------------------------------------------------------

enum FtpState {
    Disconnected,
    Connected(FtpStream),
}

/// Plain FTP connector; mirrors the classic ftplib call set
/// (`MKD`/`CWD`/`NLST`/`STOR`)
pub struct FtpConnector {
    endpoint: RemoteEndpoint,
    state: FtpState,
}

impl FtpConnector {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self {
            endpoint,
            state: FtpState::Disconnected,
        }
    }

    fn ensure_connected(&mut self) -> Result<(), ConnectorError> {
        if let FtpState::Connected(stream) = &mut self.state {
            if stream.noop().is_ok() {
                return Ok(());
            }
        }
        self.state = FtpState::Disconnected;

        info!(
            "connecting through ftp to the server ({}:{})",
            self.endpoint.host, self.endpoint.port
        );
        let mut stream = FtpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .map_err(|e| {
                error!("fail while connecting through ftp, check the server availability");
                self.endpoint.connection_error(e)
            })?;
        stream
            .login(&self.endpoint.user, &self.endpoint.password)
            .map_err(|e| {
                error!("fail while connecting through ftp, check your credentials");
                self.endpoint.connection_error(e)
            })?;

        self.state = FtpState::Connected(stream);
        Ok(())
    }

    fn live_stream(&mut self) -> Result<&mut FtpStream, ConnectorError> {
        self.ensure_connected()?;
        match &mut self.state {
            FtpState::Connected(stream) => Ok(stream),
            FtpState::Disconnected => {
                Err(self.endpoint.connection_error("session not established"))
            }
        }
    }

    fn exists_dir(&mut self, path: &str) -> bool {
        info!("checking if directory already exists ({})", path);
        match self.live_stream() {
            Ok(stream) => stream.nlst(Some(path)).is_ok(),
            Err(_) => false,
        }
    }
}

impl RemoteConnector for FtpConnector {
    fn connect(&mut self) -> Result<(), ConnectorError> {
        self.ensure_connected()
    }

    fn mkdir(&mut self, path: &str) -> Result<(), ConnectorError> {
        info!("creating directory ({})", path);
        let created = self.live_stream()?.mkdir(path);
        mkdir_or_exists(path, created, || self.exists_dir(path))
    }

    fn chdir(&mut self, path: &str) -> Result<(), ConnectorError> {
        info!("changing to directory ({})", path);
        self.live_stream()?
            .cwd(path)
            .map_err(|e| remote_error(path, e))
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        info!("copying file from ({}) to ({})", local.display(), remote);
        let mut src = File::open(local)
            .map_err(|_| ConnectorError::MissingLocal(local.display().to_string()))?;

        match split_remote(remote) {
            (Some(dir), name) => {
                // Store by file name from within the parent directory, then
                // restore the working directory so absolute and relative
                // destinations both keep working across calls.
                let prev = self
                    .live_stream()?
                    .pwd()
                    .map_err(|e| remote_error(remote, e))?;
                self.chdir(dir)?;
                let stored = self.live_stream()?.put_file(name, &mut src).map(|_| ());
                let restored = self.chdir(&prev);
                put_outcome(remote, stored, restored)?;
            }
            (None, name) => {
                self.live_stream()?
                    .put_file(name, &mut src)
                    .map_err(|e| remote_error(remote, e))?;
            }
        }
        debug!("file has been copied ({})", remote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_remote_separates_parent_and_name() {
        assert_eq!(
            split_remote("/var/www/serial/scilista.lst"),
            (Some("/var/www/serial"), "scilista.lst")
        );
        assert_eq!(split_remote("/issue.mst"), (Some("/"), "issue.mst"));
        assert_eq!(split_remote("issue.mst"), (None, "issue.mst"));
    }

    #[test]
    fn successful_mkdir_skips_the_existence_probe() {
        let result = mkdir_or_exists("/remote/serial", Ok::<(), &str>(()), || {
            panic!("probe must not run after a successful create")
        });
        assert!(result.is_ok());
    }

    #[test]
    fn failed_mkdir_on_an_existing_directory_is_success() {
        let result = mkdir_or_exists("/remote/serial", Err("550 already exists"), || true);
        assert!(result.is_ok());
    }

    #[test]
    fn failed_mkdir_on_an_absent_directory_is_an_error() {
        let err = mkdir_or_exists("/remote/serial", Err("550 denied"), || false).unwrap_err();
        match err {
            ConnectorError::Remote { path, reason } => {
                assert_eq!(path, "/remote/serial");
                assert_eq!(reason, "550 denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn store_error_is_not_masked_by_a_failed_restore() {
        let err = put_outcome(
            "/remote/a.pdf",
            Err::<(), _>("451 transfer aborted"),
            Err::<(), _>("550 no such directory"),
        )
        .unwrap_err();
        match err {
            ConnectorError::Remote { reason, .. } => assert_eq!(reason, "451 transfer aborted"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn completed_store_survives_a_failed_restore() {
        let result = put_outcome(
            "/remote/a.pdf",
            Ok::<(), &str>(()),
            Err::<(), _>("550 no such directory"),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn missing_local_file_is_reported_as_such() {
        let mut ftp = FtpConnector::new(RemoteEndpoint {
            host: "localhost".into(),
            port: 21,
            user: "anonymous".into(),
            password: "anonymous".into(),
        });
        // The local open happens before any network traffic, so this fails
        // fast with MissingLocal even with no server around.
        let err = ftp
            .put(Path::new("/nonexistent/file.pdf"), "/remote/file.pdf")
            .unwrap_err();
        assert!(matches!(err, ConnectorError::MissingLocal(_)));
    }
}
