//! Work-list manifest parsing
//!
//! The manifest is a plain text file with one work item per line:
//! `<collection> <item> [del]`. Items flagged `del` are kept in the
//! sequence but suppress delivery downstream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{error, info, warn};

/// One entry of the manifest, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub collection: String,
    pub item: String,
    pub marked_for_deletion: bool,
}

/// Parse the manifest at `path` into an ordered item list.
///
/// Malformed lines (fewer than 2 or more than 3 fields) are skipped with a
/// warning. An unreadable manifest yields an empty list so the run proceeds
/// and simply delivers nothing.
pub fn parse_manifest(path: &Path) -> Vec<WorkItem> {
    info!("loading manifest ({})", path.display());

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            error!(
                "fail while loading manifest, file not found ({}): {}",
                path.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    "unreadable line in manifest ({}) line ({}): {}",
                    path.display(),
                    lineno + 1,
                    e
                );
                continue;
            }
        };

        let fields: Vec<String> = line
            .trim()
            .split(' ')
            .map(|f| f.trim().to_lowercase())
            .collect();

        match fields.len() {
            2 => items.push(WorkItem {
                collection: fields[0].clone(),
                item: fields[1].clone(),
                marked_for_deletion: false,
            }),
            3 => {
                let flagged = fields[2] == "del";
                if !flagged {
                    warn!(
                        "unrecognized token '{}' in manifest ({}) line ({}), item will be delivered",
                        fields[2],
                        path.display(),
                        lineno + 1
                    );
                }
                items.push(WorkItem {
                    collection: fields[0].clone(),
                    item: fields[1].clone(),
                    marked_for_deletion: flagged,
                });
            }
            _ => warn!(
                "wrong value in manifest ({}) line ({}): {}",
                path.display(),
                lineno + 1,
                line
            ),
        }
    }

    info!("manifest loaded ({}), {} items", path.display(), items.len());
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manifest_with(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp manifest");
        f.write_all(content.as_bytes()).expect("write manifest");
        f
    }

    #[test]
    fn two_fields_yield_undeleted_item() {
        let f = manifest_with("rsap v1n3\n");
        let items = parse_manifest(f.path());
        assert_eq!(
            items,
            vec![WorkItem {
                collection: "rsap".into(),
                item: "v1n3".into(),
                marked_for_deletion: false,
            }]
        );
    }

    #[test]
    fn del_token_marks_item_for_deletion() {
        let f = manifest_with("rsap v1n3 del\nrsap v2n1 DEL\n");
        let items = parse_manifest(f.path());
        assert_eq!(items.len(), 2);
        assert!(items[0].marked_for_deletion);
        assert!(items[1].marked_for_deletion);
    }

    #[test]
    fn unknown_third_token_keeps_item_undeleted() {
        let f = manifest_with("rsap v1n3 keep\n");
        let items = parse_manifest(f.path());
        assert_eq!(items.len(), 1);
        assert!(!items[0].marked_for_deletion);
    }

    #[test]
    fn malformed_lines_are_skipped_without_disturbing_order() {
        let f = manifest_with("a b\nbad\nc d del\n\none two three four\ne f\n");
        let items = parse_manifest(f.path());
        let got: Vec<(&str, &str, bool)> = items
            .iter()
            .map(|i| (i.collection.as_str(), i.item.as_str(), i.marked_for_deletion))
            .collect();
        assert_eq!(
            got,
            vec![("a", "b", false), ("c", "d", true), ("e", "f", false)]
        );
    }

    #[test]
    fn fields_are_trimmed_and_lowercased() {
        let f = manifest_with("  RSAP V1N3  \n");
        let items = parse_manifest(f.path());
        assert_eq!(items[0].collection, "rsap");
        assert_eq!(items[0].item, "v1n3");
    }

    #[test]
    fn missing_manifest_yields_empty_list() {
        let items = parse_manifest(Path::new("/nonexistent/scilista.lst"));
        assert!(items.is_empty());
    }
}
