//! Courier - selective delivery of publishing-platform assets
//!
//! Mirrors subtrees of a local staging site (databases, PDFs, images,
//! translations, XML) to a remote server over SFTP or FTP, driven by a
//! manifest of active collection/item pairs. Database pairs can be run
//! through an external conversion utility once per stem before transfer.

pub mod config;
pub mod connector;
pub mod convert;
pub mod deliver;
pub mod manifest;
pub mod sync;

pub use config::{DeliveryConfig, Presets, Transport};
pub use connector::{ConnectorError, FtpConnector, RemoteConnector, RemoteEndpoint, SftpConnector};
pub use convert::{Converter, MasterConverter};
pub use deliver::{Category, Delivery};
pub use manifest::{parse_manifest, WorkItem};
pub use sync::{SyncEngine, TransferStats};
