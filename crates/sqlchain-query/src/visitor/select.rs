//! Structured SELECT statements.
//!
//! The walker collects clauses into a [`SelectBlock`] while it descends the
//! operator chain and only renders text once the chain is complete. A block
//! that cannot absorb the next operator is rendered as a derived table and a
//! fresh block is started on top of it.

use std::sync::Arc;

use sqlchain_core::{Error, Result, TableInfo};

use crate::writer::Writer;

/// What a query row (or lambda parameter) looks like.
#[derive(Debug, Clone)]
pub enum Shape {
    /// All mapped members of an entity table.
    Entity {
        alias: Option<String>,
        info: Arc<TableInfo>,
    },
    /// Named members, as produced by an anonymous projection.
    Members(Vec<(String, Shape)>),
    /// A single SQL expression.
    Scalar(String),
    /// A group: its key and the shape of its elements.
    Group { key: Box<Shape>, element: Box<Shape> },
}

/// One projected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// Output column name.
    pub name: String,
    /// Column expression.
    pub sql: String,
}

impl Shape {
    /// Shape of `self.name`.
    pub fn member(&self, name: &str, w: &Writer) -> Result<Shape> {
        match self {
            Shape::Entity { alias, info } => {
                let column = info
                    .column(name)
                    .ok_or_else(|| Error::unmapped(&info.table_name, name))?;
                Ok(Shape::Scalar(qualified(w, alias.as_deref(), column)))
            }
            Shape::Members(members) => members
                .iter()
                .find(|(m, _)| m == name)
                .map(|(_, shape)| shape.clone())
                .ok_or_else(|| Error::unmapped("projection", name)),
            Shape::Group { key, .. } if name.eq_ignore_ascii_case("key") => Ok((**key).clone()),
            Shape::Scalar(_) | Shape::Group { .. } => Err(Error::unsupported(format!(
                "member '{name}' cannot be accessed on a {}",
                self.kind()
            ))),
        }
    }

    /// Short kind name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Entity { .. } => "entity",
            Shape::Members(_) => "projection",
            Shape::Scalar(_) => "scalar",
            Shape::Group { .. } => "group",
        }
    }

    /// Projected columns in output order.
    ///
    /// Nested members are flattened as `outer__inner`; a bare scalar is
    /// named `value`.
    pub fn leaves(&self, w: &Writer) -> Result<Vec<Leaf>> {
        let mut out = Vec::new();
        self.collect(None, w, &mut out)?;
        Ok(out)
    }

    fn collect(&self, prefix: Option<&str>, w: &Writer, out: &mut Vec<Leaf>) -> Result<()> {
        match self {
            Shape::Entity { alias, info } => {
                for (member, column) in &info.read_or_writes {
                    out.push(Leaf {
                        name: leaf_name(prefix, member),
                        sql: qualified(w, alias.as_deref(), column),
                    });
                }
            }
            Shape::Members(members) => {
                for (member, shape) in members {
                    let name = leaf_name(prefix, member);
                    match shape {
                        Shape::Scalar(sql) => out.push(Leaf {
                            name,
                            sql: sql.clone(),
                        }),
                        nested => nested.collect(Some(&name), w, out)?,
                    }
                }
            }
            Shape::Scalar(sql) => out.push(Leaf {
                name: prefix.unwrap_or("value").to_string(),
                sql: sql.clone(),
            }),
            Shape::Group { .. } => {
                return Err(Error::unsupported(
                    "a group cannot be projected directly; select from it instead",
                ));
            }
        }
        Ok(())
    }

    /// The same shape read back from the derived table `alias`.
    pub fn rebind(&self, alias: &str, w: &Writer) -> Result<Shape> {
        self.rebind_at(alias, None, w)
    }

    fn rebind_at(&self, alias: &str, prefix: Option<&str>, w: &Writer) -> Result<Shape> {
        match self {
            Shape::Entity { info, .. } => Ok(Shape::Members(
                info.read_or_writes
                    .iter()
                    .map(|(member, _)| {
                        let column = leaf_name(prefix, member);
                        (
                            member.clone(),
                            Shape::Scalar(qualified(w, Some(alias), &column)),
                        )
                    })
                    .collect(),
            )),
            Shape::Members(members) => members
                .iter()
                .map(|(member, shape)| {
                    let name = leaf_name(prefix, member);
                    let rebound = match shape {
                        Shape::Scalar(_) => Shape::Scalar(qualified(w, Some(alias), &name)),
                        nested => nested.rebind_at(alias, Some(&name), w)?,
                    };
                    Ok((member.clone(), rebound))
                })
                .collect::<Result<Vec<_>>>()
                .map(Shape::Members),
            Shape::Scalar(_) => Ok(Shape::Scalar(qualified(
                w,
                Some(alias),
                prefix.unwrap_or("value"),
            ))),
            Shape::Group { .. } => Err(Error::unsupported(
                "a group cannot be read back from a derived table",
            )),
        }
    }
}

fn leaf_name(prefix: Option<&str>, member: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}__{member}"),
        None => member.to_string(),
    }
}

/// `alias.column`, or the bare column without an alias.
pub fn qualified(w: &Writer, alias: Option<&str>, column: &str) -> String {
    let column = w.settings().name(column);
    match alias {
        Some(alias) => format!("{}.{}", w.quoted(alias), column),
        None => column,
    }
}

/// Row source of a block.
#[derive(Debug, Clone)]
pub enum FromItem {
    Table {
        name: String,
        alias: Option<String>,
    },
    Derived {
        sql: String,
        alias: String,
        /// `sql` is a set combination of two selects.
        compound: bool,
    },
}

impl FromItem {
    fn render(&self, w: &mut Writer) {
        match self {
            FromItem::Table { name, alias } => {
                w.name(name);
                if let Some(alias) = alias {
                    w.alias(alias);
                }
            }
            FromItem::Derived { sql, alias, .. } => {
                w.open_brace();
                w.write(sql.as_str());
                w.close_brace();
                w.alias(alias);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

impl JoinType {
    const fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => " INNER JOIN ",
            JoinType::Left => " LEFT JOIN ",
            JoinType::Cross => " CROSS JOIN ",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub kind: JoinType,
    pub source: FromItem,
    pub on: Option<String>,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub sql: String,
    pub descending: bool,
}

/// How a block is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// The outermost statement: ORDER BY is kept.
    Top,
    /// A derived table or subquery: ORDER BY is kept only when paging
    /// needs it, and a bare scalar is named.
    Derived,
}

/// Clauses of one SELECT.
#[derive(Debug, Clone)]
pub struct SelectBlock {
    pub distinct: bool,
    pub from: FromItem,
    pub joins: Vec<JoinClause>,
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Vec<String>,
    pub order_by: Vec<OrderKey>,
    pub take: Option<u64>,
    pub skip: u64,
}

impl SelectBlock {
    /// An empty block reading from `from`.
    pub fn new(from: FromItem) -> Self {
        Self {
            distinct: false,
            from,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            take: None,
            skip: 0,
        }
    }

    /// Check if Take or Skip was applied.
    pub fn is_paged(&self) -> bool {
        self.take.is_some() || self.skip > 0
    }

    /// Check if a row-level clause can no longer be added without
    /// changing the meaning of the block.
    pub fn is_sealed(&self) -> bool {
        self.is_paged() || self.distinct
    }

    /// Check if the block only reads from its source.
    pub fn is_plain(&self) -> bool {
        !self.distinct
            && self.joins.is_empty()
            && self.filters.is_empty()
            && self.group_by.is_empty()
            && self.having.is_empty()
            && self.order_by.is_empty()
            && !self.is_paged()
    }

    /// Reverse every sort key.
    pub fn flip_order(&mut self) {
        for key in &mut self.order_by {
            key.descending = !key.descending;
        }
    }

    /// Render the block projecting `shape`.
    ///
    /// Rendering goes through a nested writer, so parameters stay in the
    /// parent's bag.
    pub fn render(&self, shape: &Shape, mode: RenderMode, parent: &Writer) -> Result<String> {
        let mut w = parent.nested();
        let leaves = shape.leaves(&w)?;

        if let Some(compound) = self.bare_compound(&leaves, &w) {
            return Ok(compound.to_string());
        }

        w.keyword("SELECT ");
        if self.distinct {
            w.keyword("DISTINCT ");
        }
        let bare_scalar = matches!(shape, Shape::Scalar(_));
        for (i, leaf) in leaves.iter().enumerate() {
            if i > 0 {
                w.delimiter();
            }
            w.write(leaf.sql.as_str());
            let named = !bare_scalar || mode == RenderMode::Derived;
            if named && !names_itself(&w, leaf) {
                w.alias(&leaf.name);
            }
        }

        w.keyword(" FROM ");
        self.from.render(&mut w);

        for join in &self.joins {
            w.keyword(join.kind.keyword());
            join.source.render(&mut w);
            if let Some(on) = &join.on {
                w.keyword(" ON ");
                w.write(on.as_str());
            }
        }

        if !self.filters.is_empty() {
            w.keyword(" WHERE ");
            w.write(self.filters.join(" AND "));
        }
        if !self.group_by.is_empty() {
            w.keyword(" GROUP BY ");
            w.write(self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            w.keyword(" HAVING ");
            w.write(self.having.join(" AND "));
        }

        if mode == RenderMode::Top || self.is_paged() {
            w.sorting(|w| {
                for (i, key) in self.order_by.iter().enumerate() {
                    if i > 0 {
                        w.delimiter();
                    }
                    w.write(key.sql.as_str());
                    if key.descending {
                        w.keyword(" DESC");
                    }
                }
                Ok(())
            })?;
        }

        if self.is_paged() {
            Ok(w.paginate(self.take, self.skip))
        } else {
            Ok(w.sql())
        }
    }

    /// The compound text itself, when the block adds nothing on top of it.
    fn bare_compound<'b>(&'b self, leaves: &[Leaf], w: &Writer) -> Option<&'b str> {
        match &self.from {
            FromItem::Derived {
                sql,
                alias,
                compound: true,
            } if self.is_plain()
                && leaves
                    .iter()
                    .all(|leaf| leaf.sql == qualified(w, Some(alias), &leaf.name)) =>
            {
                Some(sql.as_str())
            }
            _ => None,
        }
    }
}

/// Check if a column expression already carries its output name.
fn names_itself(w: &Writer, leaf: &Leaf) -> bool {
    let quoted = w.settings().name(&leaf.name);
    leaf.sql == quoted || leaf.sql.ends_with(&format!(".{quoted}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresSettings, SqlServerSettings};
    use sqlchain_core::TokenPolicy;
    use std::any::TypeId;

    fn users() -> Arc<TableInfo> {
        Arc::new(TableInfo {
            table_type: TypeId::of::<()>(),
            type_name: "User",
            table_name: "users".to_string(),
            keys: vec!["id".to_string()],
            read_onlys: vec!["id".to_string()],
            tokens: vec![("version".to_string(), TokenPolicy::Version)],
            read_writes: vec![
                ("name".to_string(), "user_name".to_string()),
                ("version".to_string(), "version".to_string()),
            ],
            read_or_writes: vec![
                ("id".to_string(), "id".to_string()),
                ("name".to_string(), "user_name".to_string()),
                ("version".to_string(), "version".to_string()),
            ],
        })
    }

    fn pg() -> Writer {
        Writer::new(Arc::new(PostgresSettings))
    }

    fn entity(alias: &str) -> Shape {
        Shape::Entity {
            alias: Some(alias.to_string()),
            info: users(),
        }
    }

    // ==================== Shape Tests ====================

    #[test]
    fn test_entity_member_is_qualified_column() {
        let w = pg();
        match entity("u").member("name", &w).unwrap() {
            Shape::Scalar(sql) => assert_eq!(sql, "\"u\".\"user_name\""),
            other => panic!("expected scalar, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unknown_member_is_mapping_error() {
        let err = entity("u").member("nickname", &pg()).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn test_group_key_member() {
        let group = Shape::Group {
            key: Box::new(Shape::Scalar("k".to_string())),
            element: Box::new(entity("u")),
        };
        assert!(matches!(group.member("Key", &pg()).unwrap(), Shape::Scalar(s) if s == "k"));
        assert!(group.member("Count", &pg()).is_err());
        assert!(group.leaves(&pg()).is_err());
    }

    #[test]
    fn test_nested_leaves_are_prefixed() {
        let shape = Shape::Members(vec![
            ("total".to_string(), Shape::Scalar("COUNT(*)".to_string())),
            ("owner".to_string(), entity("u")),
        ]);
        let names: Vec<String> = shape
            .leaves(&pg())
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(
            names,
            vec!["total", "owner__id", "owner__name", "owner__version"]
        );
    }

    #[test]
    fn test_rebind_mirrors_leaf_names() {
        let w = pg();
        let shape = Shape::Members(vec![
            ("n".to_string(), Shape::Scalar("1".to_string())),
            ("owner".to_string(), entity("u")),
        ]);
        let rebound = shape.rebind("t0", &w).unwrap();
        let owner = rebound.member("owner", &w).unwrap();
        match owner.member("name", &w).unwrap() {
            Shape::Scalar(sql) => assert_eq!(sql, "\"t0\".\"owner__name\""),
            other => panic!("expected scalar, got {}", other.kind()),
        }
    }

    // ==================== Render Tests ====================

    #[test]
    fn test_render_entity_aliases_renamed_columns() {
        let w = pg();
        let block = SelectBlock::new(FromItem::Table {
            name: "users".to_string(),
            alias: Some("u".to_string()),
        });
        let sql = block.render(&entity("u"), RenderMode::Top, &w).unwrap();
        assert_eq!(
            sql,
            "SELECT \"u\".\"id\", \"u\".\"user_name\" AS \"name\", \"u\".\"version\" FROM \"users\" AS \"u\""
        );
    }

    #[test]
    fn test_render_clauses_in_order() {
        let w = Writer::new(Arc::new(SqlServerSettings));
        let mut block = SelectBlock::new(FromItem::Table {
            name: "users".to_string(),
            alias: Some("u".to_string()),
        });
        block.filters.push("[u].[id] > 1".to_string());
        block.filters.push("[u].[id] < 9".to_string());
        block.group_by.push("[u].[user_name]".to_string());
        block.having.push("COUNT(*) > 1".to_string());
        block.order_by.push(OrderKey {
            sql: "[u].[user_name]".to_string(),
            descending: true,
        });
        let shape = Shape::Scalar("[u].[user_name]".to_string());

        let sql = block.render(&shape, RenderMode::Top, &w).unwrap();
        assert_eq!(
            sql,
            "SELECT [u].[user_name] FROM [users] AS [u] WHERE [u].[id] > 1 AND [u].[id] < 9 \
             GROUP BY [u].[user_name] HAVING COUNT(*) > 1 ORDER BY [u].[user_name] DESC"
        );
    }

    #[test]
    fn test_derived_mode_drops_unpaged_order_and_names_scalar() {
        let w = pg();
        let mut block = SelectBlock::new(FromItem::Table {
            name: "users".to_string(),
            alias: None,
        });
        block.order_by.push(OrderKey {
            sql: "\"id\"".to_string(),
            descending: false,
        });
        let shape = Shape::Scalar("\"id\"".to_string());

        let sql = block.render(&shape, RenderMode::Derived, &w).unwrap();
        assert_eq!(sql, "SELECT \"id\" AS \"value\" FROM \"users\"");
    }

    #[test]
    fn test_paged_block_uses_dialect_rewrite() {
        let w = pg();
        let mut block = SelectBlock::new(FromItem::Table {
            name: "users".to_string(),
            alias: None,
        });
        block.order_by.push(OrderKey {
            sql: "\"id\"".to_string(),
            descending: false,
        });
        block.take = Some(5);
        block.skip = 10;
        let shape = Shape::Scalar("\"id\"".to_string());

        let sql = block.render(&shape, RenderMode::Derived, &w).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\" AS \"value\" FROM \"users\" ORDER BY \"id\" LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_bare_compound_renders_as_is() {
        let w = pg();
        let block = SelectBlock::new(FromItem::Derived {
            sql: "SELECT 1 AS \"value\" UNION SELECT 2 AS \"value\"".to_string(),
            alias: "t1".to_string(),
            compound: true,
        });
        let shape = Shape::Scalar("\"t1\".\"value\"".to_string());
        assert_eq!(
            block.render(&shape, RenderMode::Top, &w).unwrap(),
            "SELECT 1 AS \"value\" UNION SELECT 2 AS \"value\""
        );
    }
}
