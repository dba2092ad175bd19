//! Delivery orchestrator
//!
//! Maps the high-level categories (serial databases, PDFs, images,
//! translations, XML) onto sync-engine calls driven by the manifest.
//! Items marked for deletion are skipped everywhere; removing remote
//! assets is out of scope, the flag only suppresses delivery.

use std::path::PathBuf;

use clap::ValueEnum;
use tracing::{error, info};

use crate::manifest::WorkItem;
use crate::sync::{SyncEngine, TransferStats};

/// Fixed name under which the manifest is published on the server,
/// whatever its local file name; downstream consumers of the server tree
/// look for exactly this file.
const MANIFEST_REMOTE_NAME: &str = "scilista.lst";

/// Deliverable asset categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Category {
    /// Serial databases, converted per stem when compatibility mode is on
    Databases,
    Images,
    Pdfs,
    Translations,
    Xmls,
}

/// Drives one delivery run over the manifest
pub struct Delivery {
    engine: SyncEngine,
    manifest: Vec<WorkItem>,
    manifest_path: PathBuf,
    compatibility_mode: bool,
    connected: bool,
}

impl Delivery {
    pub fn new(
        engine: SyncEngine,
        manifest: Vec<WorkItem>,
        manifest_path: PathBuf,
        compatibility_mode: bool,
    ) -> Self {
        Self {
            engine,
            manifest,
            manifest_path,
            compatibility_mode,
            connected: false,
        }
    }

    /// Whether the initial session probe succeeded. When it did not, every
    /// category method is a no-op and the run counts as failed.
    pub fn session_established(&self) -> bool {
        self.connected
    }

    /// Run one category, or all of them in the fixed order
    /// serial → images → pdfs → translations → xmls.
    pub fn run(&mut self, category: Option<Category>) -> TransferStats {
        self.connected = match self.engine.connect() {
            Ok(()) => true,
            Err(e) => {
                error!("could not establish a session, nothing will be sent: {}", e);
                false
            }
        };

        let mut stats = TransferStats::default();
        match category {
            Some(Category::Databases) => stats.merge(&self.run_serial()),
            Some(Category::Images) => stats.merge(&self.run_images()),
            Some(Category::Pdfs) => stats.merge(&self.run_pdfs()),
            Some(Category::Translations) => stats.merge(&self.run_translations()),
            Some(Category::Xmls) => stats.merge(&self.run_xmls()),
            None => {
                stats.merge(&self.run_serial());
                stats.merge(&self.run_images());
                stats.merge(&self.run_pdfs());
                stats.merge(&self.run_translations());
                stats.merge(&self.run_xmls());
            }
        }
        stats
    }

    /// Serial databases: the manifest itself, the global issue and title
    /// databases, then one `base` subtree per active item.
    pub fn run_serial(&mut self) -> TransferStats {
        if !self.connected {
            return TransferStats::default();
        }
        let mut stats = TransferStats::default();

        info!("copying manifest file");
        let manifest_path = self.manifest_path.clone();
        stats.merge(
            &self
                .engine
                .send_file(&manifest_path, &format!("serial/{}", MANIFEST_REMOTE_NAME)),
        );

        info!("copying issue database");
        stats.merge(
            &self
                .engine
                .transfer_tree_with_conversion("serial/issue", self.compatibility_mode),
        );

        info!("copying title database");
        stats.merge(
            &self
                .engine
                .transfer_tree_with_conversion("serial/title", self.compatibility_mode),
        );

        for item in &self.manifest {
            if item.marked_for_deletion {
                continue;
            }
            info!("copying databases from {} {}", item.collection, item.item);
            let base_path = format!("serial/{}/{}/base", item.collection, item.item);
            stats.merge(
                &self
                    .engine
                    .transfer_tree_with_conversion(&base_path, self.compatibility_mode),
            );
        }

        stats
    }

    pub fn run_pdfs(&mut self) -> TransferStats {
        self.mirror_per_item("pdf's", "bases/pdf")
    }

    pub fn run_translations(&mut self) -> TransferStats {
        self.mirror_per_item("translations", "bases/translation")
    }

    pub fn run_xmls(&mut self) -> TransferStats {
        self.mirror_per_item("xmls", "bases/xml")
    }

    pub fn run_images(&mut self) -> TransferStats {
        self.mirror_per_item("images", "htdocs/img/revistas")
    }

    /// Verbatim-mirror `<prefix>/<collection>/<item>` for every active item
    fn mirror_per_item(&mut self, label: &str, prefix: &str) -> TransferStats {
        if !self.connected {
            return TransferStats::default();
        }
        let mut stats = TransferStats::default();
        for item in &self.manifest {
            if item.marked_for_deletion {
                continue;
            }
            info!("copying {} from {} {}", label, item.collection, item.item);
            let base_path = format!("{}/{}/{}", prefix, item.collection, item.item);
            stats.merge(&self.engine.transfer_tree_verbatim(&base_path));
        }
        stats
    }
}
