use crate::error::{LoadWarning, Result, TextDbError};
use crate::record::codec;
use crate::record::RecordSnapshot;
use crate::relation;
use crate::schema::parser::{schema_from_yaml, schema_to_yaml};
use crate::table::Table;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sidecar directory holding one schema definition file per table.
const SCHEMA_DIR: &str = ".properties";
const SCHEMA_EXT: &str = "yaml";
const RECORD_EXT: &str = "md";

/// The root handle: a set of tables bound to one directory tree.
///
/// Layout on disk: `<root>/.properties/<table>.yaml` holds the table's
/// ordered field definitions; `<root>/<table>/<record>.md` holds one
/// record per file. All mutation happens in memory; `save` is the only
/// thing that writes.
pub struct Database {
    root: PathBuf,
    tables: BTreeMap<String, Table>,
    warnings: Vec<LoadWarning>,
    /// Tables dropped since the last save; their directories and schema
    /// files are deleted on the next successful save.
    dropped_tables: Vec<String>,
}

impl Database {
    /// Open the database rooted at `path`. A nonexistent path yields an
    /// empty database bound to it. Schema definition files enumerate the
    /// tables; each table's record files are decoded and reconciled.
    /// Malformed record files degrade to plain content, and unreadable
    /// ones are skipped; both are reported via `warnings()` instead of
    /// aborting the load.
    pub fn open(path: impl AsRef<Path>) -> Result<Database> {
        let mut db = Database {
            root: path.as_ref().to_path_buf(),
            tables: BTreeMap::new(),
            warnings: Vec::new(),
            dropped_tables: Vec::new(),
        };
        if !db.root.exists() {
            return Ok(db);
        }

        let schema_dir = db.root.join(SCHEMA_DIR);
        if !schema_dir.exists() {
            return Ok(db);
        }

        let pattern = format!("{}/*.{}", schema_dir.display(), SCHEMA_EXT);
        let schema_files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| TextDbError::Schema(format!("bad schema glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .collect();

        for schema_path in schema_files {
            let table_name = schema_path
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let contents = std::fs::read_to_string(&schema_path)?;
            let schema = schema_from_yaml(&contents)?;

            let mut table = Table::with_schema(&table_name, schema);
            db.load_records(&mut table)?;
            db.tables.insert(table_name, table);
        }

        Ok(db)
    }

    fn load_records(&mut self, table: &mut Table) -> Result<()> {
        let dir = self.root.join(table.name());
        if !dir.exists() {
            return Ok(());
        }

        let pattern = format!("{}/*.{}", dir.display(), RECORD_EXT);
        let files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| TextDbError::Schema(format!("bad record glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .collect();

        for file_path in files {
            // A single unreadable file (permissions, invalid UTF-8) is
            // skipped with a warning; the rest of the table still loads.
            let raw = match std::fs::read_to_string(&file_path) {
                Ok(raw) => raw,
                Err(e) => {
                    let message = format!("unreadable record file: {e}");
                    log::warn!("{}: {message}", file_path.display());
                    self.warnings.push(LoadWarning {
                        path: file_path.clone(),
                        message,
                    });
                    continue;
                }
            };
            let decoded = codec::decode(&raw);
            if let Some(message) = decoded.warning {
                log::warn!("{}: {message}", file_path.display());
                self.warnings.push(LoadWarning {
                    path: file_path.clone(),
                    message,
                });
            }
            let name = file_path
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            table.insert_loaded(name, decoded.fields, decoded.content);
        }
        Ok(())
    }

    /// Non-fatal problems collected by the last `open`.
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add_table(&mut self, name: &str) -> Result<&mut Table> {
        match self.tables.entry(name.to_string()) {
            std::collections::btree_map::Entry::Occupied(_) => Err(TextDbError::DuplicateTable {
                name: name.to_string(),
            }),
            std::collections::btree_map::Entry::Vacant(entry) => {
                Ok(entry.insert(Table::new(name)))
            }
        }
    }

    /// Drop a table from memory. Its directory and schema file are deleted
    /// at the next successful save.
    pub fn remove_table(&mut self, name: &str) -> Result<()> {
        if self.tables.remove(name).is_none() {
            return Err(TextDbError::NoSuchTable {
                name: name.to_string(),
            });
        }
        self.dropped_tables.push(name.to_string());
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| TextDbError::NoSuchTable {
            name: name.to_string(),
        })
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| TextDbError::NoSuchTable {
                name: name.to_string(),
            })
    }

    pub fn try_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Resolve one record's relation field to snapshots of its targets.
    pub fn resolve_relation(
        &self,
        table_name: &str,
        field_name: &str,
        record_name: &str,
    ) -> Result<Vec<RecordSnapshot>> {
        relation::resolve(self, table_name, field_name, record_name)
    }

    /// Save to the bound root.
    pub fn save(&mut self) -> Result<()> {
        let root = self.root.clone();
        self.save_to(&root)
    }

    /// Reconcile and validate everything, then write. The validation pass
    /// (reconciliation, relation integrity, relation target existence)
    /// completes before any file is touched, so a failing save writes
    /// nothing at all. Each individual file write is temp-then-rename.
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let root = path.as_ref().to_path_buf();

        for table in self.tables.values_mut() {
            table.reconcile_all();
        }
        relation::validate_all(self)?;

        std::fs::create_dir_all(root.join(SCHEMA_DIR))?;
        for (name, table) in &self.tables {
            std::fs::create_dir_all(root.join(name))?;

            let schema_text = schema_to_yaml(table.schema())?;
            let schema_path = root.join(SCHEMA_DIR).join(format!("{name}.{SCHEMA_EXT}"));
            write_atomic(&schema_path, &schema_text)?;

            for record in table.iter() {
                let header = table.header_in_schema_order(record);
                let raw = codec::encode(&header, record.content())?;
                let record_path = root.join(name).join(format!("{}.{RECORD_EXT}", record.name()));
                write_atomic(&record_path, &raw)?;
            }
        }

        // Deletions happen after all writes succeeded.
        for (name, table) in &mut self.tables {
            for purged in table.purge_removed() {
                let file = root.join(name).join(format!("{purged}.{RECORD_EXT}"));
                if file.exists() {
                    std::fs::remove_file(&file)?;
                }
            }
            table.mark_all_clean();
        }
        for dropped in std::mem::take(&mut self.dropped_tables) {
            let dir = root.join(&dropped);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            let schema_path = root.join(SCHEMA_DIR).join(format!("{dropped}.{SCHEMA_EXT}"));
            if schema_path.exists() {
                std::fs::remove_file(&schema_path)?;
            }
        }

        log::debug!("saved {} table(s) to {}", self.tables.len(), root.display());
        Ok(())
    }
}

/// Write a file atomically: temp file in the destination directory, then
/// rename over the target. A crash mid-write never corrupts an existing
/// file.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| TextDbError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_yaml::{Mapping, Value};
    use tempfile::TempDir;

    fn fields(pairs: &[(&str, Value)]) -> Mapping {
        let mut m = Mapping::new();
        for (k, v) in pairs {
            m.insert(Value::String((*k).into()), v.clone());
        }
        m
    }

    fn notes_db(root: &Path) -> Database {
        let mut db = Database::open(root).unwrap();
        let notes = db.add_table("notes").unwrap();
        notes.define_field("pinned", "boolean").unwrap();
        notes.define_field("url", "text").unwrap();
        db
    }

    #[test]
    fn open_missing_path_is_empty() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path().join("nope")).unwrap();
        assert!(db.tables().next().is_none());
        assert!(db.warnings().is_empty());
    }

    #[test]
    fn add_table_rejects_duplicates() {
        let tmp = TempDir::new().unwrap();
        let mut db = Database::open(tmp.path()).unwrap();
        db.add_table("notes").unwrap();
        assert!(matches!(
            db.add_table("notes").unwrap_err(),
            TextDbError::DuplicateTable { .. }
        ));
    }

    #[test]
    fn end_to_end_create_edit_save_reopen() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = notes_db(&root);

        db.table_mut("notes")
            .unwrap()
            .create("n1", fields(&[("pinned", Value::Bool(true))]))
            .unwrap();
        db.table_mut("notes")
            .unwrap()
            .edit("n1", fields(&[("url", Value::String("http://x".into()))]))
            .unwrap();

        let before = db.table("notes").unwrap().get("n1").unwrap();
        assert_eq!(before.name, "n1");
        assert_eq!(before.properties["pinned"], Value::Bool(true));
        assert_eq!(before.properties["url"], Value::String("http://x".into()));
        assert_eq!(before.content, "");

        db.save().unwrap();

        let reopened = Database::open(&root).unwrap();
        assert!(reopened.warnings().is_empty());
        let after = reopened.table("notes").unwrap().get("n1").unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn drift_in_hand_edited_file_is_corrected_on_save() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        std::fs::create_dir_all(root.join(SCHEMA_DIR)).unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(
            root.join(SCHEMA_DIR).join("notes.yaml"),
            "pinned: boolean\nurl: text\n",
        )
        .unwrap();
        // Hand-edited drift: no `url`, undeclared `junk`.
        std::fs::write(
            root.join("notes/n1.md"),
            "---\npinned: true\njunk: 12\n---\nbody\n",
        )
        .unwrap();

        let mut db = Database::open(&root).unwrap();
        assert!(db.warnings().is_empty());

        let snap = db.table("notes").unwrap().get("n1").unwrap();
        assert_eq!(snap.properties["url"], Value::String(String::new()));
        assert!(snap.properties.get("junk").is_none());
        assert_eq!(snap.content, "body\n");

        db.save().unwrap();
        let raw = std::fs::read_to_string(root.join("notes/n1.md")).unwrap();
        assert!(raw.contains("url:"));
        assert!(!raw.contains("junk"));
        assert!(raw.ends_with("---\nbody\n"));
    }

    #[test]
    fn malformed_record_degrades_with_warning() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        std::fs::create_dir_all(root.join(SCHEMA_DIR)).unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join(SCHEMA_DIR).join("notes.yaml"), "pinned: boolean\n").unwrap();
        std::fs::write(root.join("notes/broken.md"), "no front matter here\n").unwrap();

        let db = Database::open(&root).unwrap();
        assert_eq!(db.warnings().len(), 1);
        assert!(db.warnings()[0].path.ends_with("broken.md"));

        // Degraded, but loaded: whole file is content, schema defaults fill in.
        let snap = db.table("notes").unwrap().get("broken").unwrap();
        assert_eq!(snap.content, "no front matter here\n");
        assert_eq!(snap.properties["pinned"], Value::Bool(false));
    }

    #[test]
    fn unreadable_record_is_skipped_with_warning() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        std::fs::create_dir_all(root.join(SCHEMA_DIR)).unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join(SCHEMA_DIR).join("notes.yaml"), "pinned: boolean\n").unwrap();
        std::fs::write(root.join("notes/good.md"), "---\npinned: true\n---\n").unwrap();
        // Not valid UTF-8; reading it as a string fails.
        std::fs::write(root.join("notes/bad.md"), [0xff_u8, 0xfe, 0x00]).unwrap();

        let db = Database::open(&root).unwrap();
        assert_eq!(db.warnings().len(), 1);
        assert!(db.warnings()[0].path.ends_with("bad.md"));

        let table = db.table("notes").unwrap();
        assert!(table.contains("good"));
        assert!(!table.contains("bad"));
    }

    #[test]
    fn dangling_reference_aborts_save_before_any_write() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = Database::open(&root).unwrap();
        db.add_table("notes").unwrap();
        db.add_table("projects").unwrap();
        db.table_mut("projects").unwrap().declare_relation("notes").unwrap();
        db.table_mut("projects")
            .unwrap()
            .create(
                "p1",
                fields(&[("notes", Value::Sequence(vec![Value::String("missing".into())]))]),
            )
            .unwrap();

        let err = db.save().unwrap_err();
        assert!(matches!(err, TextDbError::DanglingReference { .. }));
        // Validation failed before any file was written.
        assert!(!root.exists());
    }

    #[test]
    fn relation_to_undeclared_table_fails_save() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = Database::open(&root).unwrap();
        db.add_table("projects").unwrap();
        db.table_mut("projects").unwrap().declare_relation("notes").unwrap();

        let err = db.save().unwrap_err();
        assert!(matches!(err, TextDbError::Schema(_)));
        assert!(!root.exists());
    }

    #[test]
    fn removed_record_file_is_deleted_and_name_freed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = notes_db(&root);
        db.table_mut("notes").unwrap().create("n1", Mapping::new()).unwrap();
        db.table_mut("notes").unwrap().create("n2", Mapping::new()).unwrap();
        db.save().unwrap();
        assert!(root.join("notes/n1.md").exists());

        db.table_mut("notes").unwrap().remove("n1").unwrap();
        // Name still reserved until the save completes.
        assert!(matches!(
            db.table_mut("notes").unwrap().create("n1", Mapping::new()),
            Err(TextDbError::DuplicateRecord { .. })
        ));

        db.save().unwrap();
        assert!(!root.join("notes/n1.md").exists());
        assert!(root.join("notes/n2.md").exists());

        // Purged after save: the name is free again.
        db.table_mut("notes").unwrap().create("n1", Mapping::new()).unwrap();
    }

    #[test]
    fn removed_table_directory_is_deleted_on_save() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = notes_db(&root);
        db.table_mut("notes").unwrap().create("n1", Mapping::new()).unwrap();
        db.save().unwrap();
        assert!(root.join("notes").exists());

        db.remove_table("notes").unwrap();
        db.save().unwrap();
        assert!(!root.join("notes").exists());
        assert!(!root.join(SCHEMA_DIR).join("notes.yaml").exists());
    }

    #[test]
    fn schema_field_order_survives_save_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = Database::open(&root).unwrap();
        let table = db.add_table("notes").unwrap();
        table.define_field("zebra", "text").unwrap();
        table.define_field("alpha", "boolean").unwrap();
        db.save().unwrap();

        let reopened = Database::open(&root).unwrap();
        let names: Vec<&str> = reopened
            .table("notes")
            .unwrap()
            .schema()
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["zebra", "alpha"]);
    }

    #[test]
    fn schema_change_between_open_and_save_rewrites_records() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("db");
        let mut db = notes_db(&root);
        db.table_mut("notes").unwrap().create("n1", Mapping::new()).unwrap();
        db.save().unwrap();

        let mut db = Database::open(&root).unwrap();
        db.table_mut("notes").unwrap().define_field("tags", "list").unwrap();
        db.save().unwrap();

        let raw = std::fs::read_to_string(root.join("notes/n1.md")).unwrap();
        assert!(raw.contains("tags: []"));
    }
}
