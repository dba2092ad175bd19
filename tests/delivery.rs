use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use courier::connector::{ConnectorError, RemoteConnector};
use courier::convert::Converter;
use courier::deliver::{Category, Delivery};
use courier::manifest::parse_manifest;
use courier::sync::SyncEngine;

/// Records the full remote operation sequence of a run
struct RecordingConnector {
    ops: Rc<RefCell<Vec<String>>>,
}

impl RemoteConnector for RecordingConnector {
    fn connect(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
    fn mkdir(&mut self, path: &str) -> Result<(), ConnectorError> {
        self.ops.borrow_mut().push(format!("mkdir {}", path));
        Ok(())
    }
    fn chdir(&mut self, path: &str) -> Result<(), ConnectorError> {
        self.ops.borrow_mut().push(format!("chdir {}", path));
        Ok(())
    }
    fn put(&mut self, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        if !local.exists() {
            return Err(ConnectorError::MissingLocal(local.display().to_string()));
        }
        self.ops
            .borrow_mut()
            .push(format!("put {} -> {}", local.display(), remote));
        Ok(())
    }
}

/// Fabricates the converted pair next to the input stem
struct StubConverter {
    calls: Rc<RefCell<Vec<String>>>,
}

impl Converter for StubConverter {
    fn convert(&self, input_stem: &str, output_stem: &str) -> bool {
        self.calls.borrow_mut().push(input_stem.to_string());
        fs::write(format!("{}.mst", output_stem), b"converted-mst").unwrap();
        fs::write(format!("{}.xrf", output_stem), b"converted-xrf").unwrap();
        true
    }
}

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

struct Site {
    tmp: tempfile::TempDir,
    ops: Rc<RefCell<Vec<String>>>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl Site {
    fn new(manifest: &str) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("serial/scilista.lst"), manifest.as_bytes());
        Site {
            tmp,
            ops: Rc::new(RefCell::new(Vec::new())),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn delivery(&self, compatibility_mode: bool) -> Delivery {
        let source = self.tmp.path().to_string_lossy().to_string();
        let manifest_path = self.tmp.path().join("serial/scilista.lst");
        let engine = SyncEngine::new(
            Box::new(RecordingConnector {
                ops: Rc::clone(&self.ops),
            }),
            Box::new(StubConverter {
                calls: Rc::clone(&self.calls),
            }),
            &source,
            "/remote",
        );
        Delivery::new(
            engine,
            parse_manifest(&manifest_path),
            manifest_path,
            compatibility_mode,
        )
    }
}

#[test]
fn serial_databases_end_to_end() {
    let site = Site::new("rsap v1 \n");
    write_file(&site.tmp.path().join("serial/issue/issue.mst"), b"mst");
    write_file(&site.tmp.path().join("serial/issue/issue.xrf"), b"xrf");
    write_file(&site.tmp.path().join("serial/title/title.mst"), b"mst");
    write_file(&site.tmp.path().join("serial/title/title.xrf"), b"xrf");
    write_file(&site.tmp.path().join("serial/rsap/v1/base/art.mst"), b"mst");
    write_file(&site.tmp.path().join("serial/rsap/v1/base/art.xrf"), b"xrf");

    let mut delivery = site.delivery(true);
    let stats = delivery.run(Some(Category::Databases));

    assert!(delivery.session_established());
    assert!(!stats.has_failures());

    // Each database pair was converted exactly once
    let calls = site.calls.borrow();
    let stems: Vec<&str> = calls
        .iter()
        .map(|c| c.rsplit('/').next().unwrap())
        .collect();
    assert_eq!(stems, vec!["issue", "title", "art"]);

    let ops = site.ops.borrow();
    // The manifest travels first, under its own name
    assert_eq!(ops[0], "mkdir /remote/serial");
    assert!(ops[1].ends_with("-> /remote/serial/scilista.lst"));
    // Converted artifacts land on the original destination names
    assert!(ops
        .iter()
        .any(|o| o.contains("issue_converted.mst -> /remote/serial/issue/issue.mst")));
    assert!(ops
        .iter()
        .any(|o| o.contains("issue_converted.xrf -> /remote/serial/issue/issue.xrf")));
    assert!(ops
        .iter()
        .any(|o| o.contains("art_converted.mst -> /remote/serial/rsap/v1/base/art.mst")));

    // Transient converted copies were cleaned up, originals kept
    assert!(!site
        .tmp
        .path()
        .join("serial/issue/issue_converted.mst")
        .exists());
    assert!(site.tmp.path().join("serial/issue/issue.mst").exists());
}

#[test]
fn full_run_covers_all_categories_in_order() {
    let site = Site::new("rsap v1\n");
    write_file(&site.tmp.path().join("serial/issue/issue.mst"), b"mst");
    write_file(&site.tmp.path().join("bases/pdf/rsap/v1/a.pdf"), b"pdf");
    write_file(&site.tmp.path().join("bases/xml/rsap/v1/a.xml"), b"xml");
    write_file(
        &site.tmp.path().join("htdocs/img/revistas/rsap/v1/f01.jpg"),
        b"jpg",
    );

    let mut delivery = site.delivery(false);
    let stats = delivery.run(None);

    assert!(!stats.has_failures());
    let ops = site.ops.borrow();
    let first = |needle: &str| ops.iter().position(|o| o.contains(needle)).unwrap();
    let serial = first("/remote/serial");
    let images = first("/remote/htdocs/img/revistas/rsap/v1");
    let pdfs = first("/remote/bases/pdf/rsap/v1");
    let translations = first("/remote/bases/translation/rsap/v1");
    let xmls = first("/remote/bases/xml/rsap/v1");
    assert!(serial < images && images < pdfs && pdfs < translations && translations < xmls);
}

#[test]
fn deletion_flag_suppresses_every_category() {
    let site = Site::new("rsap v1 del\n");
    write_file(&site.tmp.path().join("bases/pdf/rsap/v1/a.pdf"), b"pdf");
    write_file(&site.tmp.path().join("serial/rsap/v1/base/art.mst"), b"mst");

    let mut delivery = site.delivery(true);
    delivery.run(None);

    let ops = site.ops.borrow();
    assert!(
        !ops.iter().any(|o| o.contains("rsap")),
        "deletion-flagged item reached the remote side: {:?}",
        ops
    );
    // The global databases and manifest still travel
    assert!(ops.iter().any(|o| o.contains("/remote/serial/issue")));
    assert!(ops.iter().any(|o| o.ends_with("-> /remote/serial/scilista.lst")));
}

#[test]
fn rerun_produces_the_same_remote_sequence() {
    let site = Site::new("rsap v1\n");
    write_file(&site.tmp.path().join("bases/pdf/rsap/v1/a.pdf"), b"pdf");
    write_file(&site.tmp.path().join("bases/pdf/rsap/v1/sub/b.pdf"), b"pdf");

    let mut delivery = site.delivery(false);
    delivery.run(Some(Category::Pdfs));
    let before = site.ops.borrow().clone();
    site.ops.borrow_mut().clear();

    let mut delivery = site.delivery(false);
    delivery.run(Some(Category::Pdfs));
    assert_eq!(before, *site.ops.borrow());
}
