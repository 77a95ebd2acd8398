//! User-declared ("virtual") foreign-key relations.
//!
//! Some schemas lack the constraint for a relationship that exists in the
//! data. The overlay supplies those relations to the traversal and drops each
//! entry as soon as the real constraint shows up.

use crate::model::ForeignKeyRelation;
use std::fs;
use std::path::{Path, PathBuf};

const SEPARATOR: char = '|';
const COMMENT: &str = "#";

pub trait RelationOverlay {
    /// Overlay relations whose parent is `table`, case-insensitive.
    fn relations_for_parent(&self, table: &str) -> Vec<ForeignKeyRelation>;

    /// Drops every entry that a real relation now covers (same parent, child
    /// table and fk column). Returns the number removed. Removing an entry that
    /// is already gone is a no-op.
    fn reconcile(&mut self, real: &[ForeignKeyRelation]) -> usize;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryOverlay {
    entries: Vec<ForeignKeyRelation>,
}

impl MemoryOverlay {
    pub fn new(entries: Vec<ForeignKeyRelation>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ForeignKeyRelation] {
        &self.entries
    }

    /// Adds a relation unless an equal one (ignoring case) is present.
    pub fn add(&mut self, relation: ForeignKeyRelation) -> bool {
        if self.entries.iter().any(|e| e.eq_ignore_case(&relation)) {
            return false;
        }
        self.entries.push(relation);
        true
    }

    /// Removes entries equal to `relation` on all four fields, ignoring case.
    pub fn remove(&mut self, relation: &ForeignKeyRelation) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !e.eq_ignore_case(relation));
        self.entries.len() != before
    }
}

impl RelationOverlay for MemoryOverlay {
    fn relations_for_parent(&self, table: &str) -> Vec<ForeignKeyRelation> {
        self.entries
            .iter()
            .filter(|e| e.parent_table.eq_ignore_ascii_case(table))
            .cloned()
            .collect()
    }

    fn reconcile(&mut self, real: &[ForeignKeyRelation]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let now_real = real.iter().any(|r| {
                r.parent_table.eq_ignore_ascii_case(&entry.parent_table)
                    && r.same_child_column(entry)
            });
            if now_real {
                tracing::info!(relation = %entry, "virtual relation now backed by a constraint, removing");
            }
            !now_real
        });
        before - self.entries.len()
    }
}

/// Overlay persisted as `CHILD_TABLE|FK_COLUMN|PARENT_TABLE|PARENT_PK_COLUMN`
/// lines. A missing file is an empty overlay; every mutation rewrites it.
#[derive(Debug, Clone)]
pub struct FileOverlay {
    path: PathBuf,
    inner: MemoryOverlay,
}

impl FileOverlay {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = match fs::read_to_string(&path) {
            Ok(contents) => MemoryOverlay::new(parse_entries(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryOverlay::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read overlay file");
                MemoryOverlay::default()
            }
        };
        Self { path, inner }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ForeignKeyRelation] {
        self.inner.entries()
    }

    pub fn add(&mut self, relation: ForeignKeyRelation) -> std::io::Result<bool> {
        let added = self.inner.add(normalize(relation));
        if added {
            self.save()?;
        }
        Ok(added)
    }

    pub fn remove(&mut self, relation: &ForeignKeyRelation) -> std::io::Result<bool> {
        let removed = self.inner.remove(relation);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serialize_entries(self.inner.entries()))
    }
}

impl RelationOverlay for FileOverlay {
    fn relations_for_parent(&self, table: &str) -> Vec<ForeignKeyRelation> {
        self.inner.relations_for_parent(table)
    }

    fn reconcile(&mut self, real: &[ForeignKeyRelation]) -> usize {
        let removed = self.inner.reconcile(real);
        if removed > 0 {
            if let Err(e) = self.save() {
                tracing::warn!(path = %self.path.display(), error = %e, "could not save overlay file");
            }
        }
        removed
    }
}

fn normalize(relation: ForeignKeyRelation) -> ForeignKeyRelation {
    ForeignKeyRelation::new(
        relation.child_table.trim().to_uppercase(),
        relation.fk_column.trim().to_uppercase(),
        relation.parent_table.trim().to_uppercase(),
        relation.parent_pk_column.trim().to_uppercase(),
    )
}

fn parse_entries(contents: &str) -> Vec<ForeignKeyRelation> {
    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            continue;
        }
        let parts: Vec<&str> = line.split(SEPARATOR).collect();
        if parts.len() != 4 || parts.iter().any(|p| p.trim().is_empty()) {
            tracing::warn!(line = idx + 1, "skipping malformed overlay entry");
            continue;
        }
        entries.push(normalize(ForeignKeyRelation::new(
            parts[0], parts[1], parts[2], parts[3],
        )));
    }
    entries
}

fn serialize_entries(entries: &[ForeignKeyRelation]) -> String {
    let mut out = String::new();
    out.push_str("# Virtual foreign keys\n");
    out.push_str("# Format: CHILD_TABLE|FK_COLUMN|PARENT_TABLE|PARENT_PK_COLUMN\n");
    for e in entries {
        out.push_str(&format!(
            "{}{sep}{}{sep}{}{sep}{}\n",
            e.child_table,
            e.fk_column,
            e.parent_table,
            e.parent_pk_column,
            sep = SEPARATOR
        ));
    }
    out
}
