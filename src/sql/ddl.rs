//! CREATE / ALTER statement builders

use super::identifier_re;
use crate::schema::FieldInfo;
use crate::{Error, Result};

/// `CREATE STABLE IF NOT EXISTS <name> (<columns>) TAGS (<tags>)`
pub fn create_stable(name: &str, columns: &[FieldInfo], tags: &[FieldInfo]) -> String {
    format!(
        "CREATE STABLE IF NOT EXISTS {} ({}) TAGS ({})",
        name,
        join_specs(columns),
        join_specs(tags)
    )
}

fn join_specs(fields: &[FieldInfo]) -> String {
    fields
        .iter()
        .map(FieldInfo::column_spec)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Stable,
    Table,
}

impl TableKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            TableKind::Stable => "STABLE",
            TableKind::Table => "TABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterAction {
    Add,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterTarget {
    Column,
    Tag,
}

/// Schema change on a single column or tag
#[derive(Debug, Clone)]
pub struct AlterStatement<'a> {
    pub kind: TableKind,
    pub table: &'a str,
    pub action: AlterAction,
    pub target: AlterTarget,
    pub field: &'a FieldInfo,
}

impl AlterStatement<'_> {
    /// Render the statement. Tags only exist on supertables.
    pub fn render(&self) -> Result<String> {
        if !identifier_re().is_match(&self.field.name) {
            return Err(Error::Planning(format!(
                "invalid field name '{}'",
                self.field.name
            )));
        }
        if self.target == AlterTarget::Tag && self.kind != TableKind::Stable {
            return Err(Error::Planning(format!(
                "cannot alter tag '{}' on plain table {}",
                self.field.name, self.table
            )));
        }
        let action = match self.action {
            AlterAction::Add => "ADD",
            AlterAction::Modify => "MODIFY",
        };
        let target = match self.target {
            AlterTarget::Column => "COLUMN",
            AlterTarget::Tag => "TAG",
        };
        Ok(format!(
            "ALTER {} {} {} {} {}",
            self.kind.keyword(),
            self.table,
            action,
            target,
            self.field.column_spec()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_stable_text() {
        let sql = create_stable(
            "db.table",
            &[
                FieldInfo::timestamp(),
                FieldInfo::new("colA", "bigint", 0),
                FieldInfo::new("colB", "binary", 32),
            ],
            &[FieldInfo::new("tagA", "binary", 16)],
        );
        assert_eq!(
            sql,
            "CREATE STABLE IF NOT EXISTS db.table (ts timestamp, colA bigint, colB binary(32)) TAGS (tagA binary(16))"
        );
    }

    #[test]
    fn test_alter_variants() {
        let field = FieldInfo::new("note", "binary", 64);
        let add_column = AlterStatement {
            kind: TableKind::Table,
            table: "db.d1",
            action: AlterAction::Add,
            target: AlterTarget::Column,
            field: &field,
        };
        assert_eq!(
            add_column.render().unwrap(),
            "ALTER TABLE db.d1 ADD COLUMN note binary(64)"
        );

        let modify_tag = AlterStatement {
            kind: TableKind::Stable,
            table: "db.st",
            action: AlterAction::Modify,
            target: AlterTarget::Tag,
            field: &field,
        };
        assert_eq!(
            modify_tag.render().unwrap(),
            "ALTER STABLE db.st MODIFY TAG note binary(64)"
        );
    }

    #[test]
    fn test_tag_on_plain_table_is_rejected() {
        let field = FieldInfo::new("site", "binary", 8);
        let stmt = AlterStatement {
            kind: TableKind::Table,
            table: "db.d1",
            action: AlterAction::Add,
            target: AlterTarget::Tag,
            field: &field,
        };
        assert!(matches!(stmt.render(), Err(Error::Planning(_))));
    }

    #[test]
    fn test_unsafe_field_name_is_rejected() {
        let field = FieldInfo::new("note binary(8), evil", "binary", 8);
        let stmt = AlterStatement {
            kind: TableKind::Stable,
            table: "db.st",
            action: AlterAction::Add,
            target: AlterTarget::Column,
            field: &field,
        };
        let err = stmt.render().unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
        assert!(err.to_string().contains("invalid field name"));
    }
}
