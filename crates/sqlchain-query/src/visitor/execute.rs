//! Write-side visitor.

use std::sync::Arc;

use sqlchain_core::{Error, Result, TableInfo, TokenPolicy, Value};
use tracing::{debug, trace};

use super::expression::ExpressionWriter;
use super::select::{FromItem, SelectBlock, Shape, qualified};
use super::walker::{QueryState, ReadPolicy};
use super::{StartupVisitor, VisitorState, begin, ready};
use crate::command::CommandSql;
use crate::config::TranslateConfig;
use crate::dispatch::Operator;
use crate::expr::{BinaryOp, Call, Expr, Lambda};
use crate::writer::{Polarity, Writer};

/// The table a write statement targets, with the filters of its chain.
struct Target {
    info: Arc<TableInfo>,
    table: String,
    filters: Vec<String>,
    policy: ReadPolicy,
}

/// Translates an `Insert`, `Update` or `Delete` tree into a [`CommandSql`].
///
/// The receiver of the write operator names the target table. It may carry
/// `Where` filters and the `From`, `TimeOut` and `WatchSql` settings; any
/// other shaping of the target (paging, joins, grouping, projection) is
/// rejected. Columns are written without a table alias.
pub struct ExecuteVisitor {
    config: TranslateConfig,
    writer: Writer,
    state: VisitorState,
    sql: String,
    policy: ReadPolicy,
    command: Option<CommandSql>,
}

impl std::fmt::Debug for ExecuteVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteVisitor")
            .field("state", &self.state)
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

impl ExecuteVisitor {
    /// Create an idle visitor.
    pub fn new(config: &TranslateConfig) -> Self {
        Self {
            config: config.clone(),
            writer: Writer::new(Arc::clone(config.settings())),
            state: VisitorState::Idle,
            sql: String::new(),
            policy: ReadPolicy::default(),
            command: None,
        }
    }

    /// Translate `tree` in one step.
    pub fn translate(tree: &Expr, config: &TranslateConfig) -> Result<CommandSql> {
        let mut visitor = Self::new(config);
        visitor.startup(tree)?;
        visitor.to_sql()
    }

    /// Command timeout in seconds from the chain, else the configured
    /// default.
    pub fn time_out(&self) -> Option<u32> {
        self.policy.time_out.or(self.config.default_timeout())
    }

    /// Freeze the translation. Repeated calls return the same command and
    /// run the `WatchSql` hooks only once.
    pub fn to_sql(&mut self) -> Result<CommandSql> {
        ready(self.state)?;
        if let Some(command) = &self.command {
            return Ok(command.clone());
        }

        let parameters = self.writer.parameters_in(&self.sql);
        let mut command = CommandSql::new(self.sql.clone(), parameters);
        command.command_timeout = self.time_out();
        for hook in &self.policy.hooks {
            hook.call(&command);
        }

        debug!(parameters = command.parameters.len(), "Write translated");
        trace!(sql = %command.sql, "Write SQL");
        self.state = VisitorState::Completed;
        self.command = Some(command.clone());
        Ok(command)
    }

    fn translate_tree(&mut self, tree: &Expr) -> Result<()> {
        let Expr::Call(call) = tree else {
            return Err(Error::unsupported(format!(
                "a {} is not a write statement",
                tree.kind()
            )));
        };
        let op = call.op.filter(|op| op.is_write()).ok_or_else(|| {
            Error::unsupported_operator(
                &call.name,
                format!("no write operator matches {}", call.signature()),
            )
        })?;
        let receiver = call
            .receiver()
            .ok_or_else(|| Error::unsupported_operator(&call.name, "missing target argument"))?;

        let expressions = ExpressionWriter::new(&self.config);
        let w = &mut self.writer;
        let target = target(&expressions, w, receiver, &call.name)?;

        self.sql = match op {
            Operator::Delete { row } => {
                let mut predicates = if row {
                    identity(w, &target.info, row_arg(call)?)?
                } else {
                    Vec::new()
                };
                predicates.extend(target.filters.iter().cloned());
                w.capture(|w| {
                    w.keyword("DELETE FROM ");
                    w.name(&target.table);
                    write_where(w, &predicates);
                    Ok(())
                })?
            }
            Operator::Update { row: false } => {
                let lambda = call.lambda(1).ok_or_else(|| {
                    Error::unsupported_operator(&call.name, "argument 1 must be a lambda")
                })?;
                let assignments = assign_lambda(&expressions, w, &target.info, lambda)?;
                w.capture(|w| {
                    write_update(w, &target.table, &assignments, &target.filters);
                    Ok(())
                })?
            }
            Operator::Update { row: true } => {
                let values = row_arg(call)?;
                let assignments = assign_row(w, &target.info, values)?;
                let mut predicates = identity(w, &target.info, values)?;
                predicates.extend(target.filters.iter().cloned());
                w.capture(|w| {
                    write_update(w, &target.table, &assignments, &predicates);
                    Ok(())
                })?
            }
            Operator::Insert { row } => {
                if !target.filters.is_empty() {
                    return Err(Error::unsupported_operator(
                        &call.name,
                        "an insert target cannot be filtered",
                    ));
                }
                if row {
                    insert_row(w, &target, row_arg(call)?)?
                } else {
                    let source = call.args.get(1).ok_or_else(|| {
                        Error::unsupported_operator(&call.name, "missing source query")
                    })?;
                    insert_query(&expressions, w, &target, source)?
                }
            }
            other => {
                return Err(Error::unsupported_operator(
                    &call.name,
                    format!("{other:?} is not a write operator"),
                ));
            }
        };
        self.policy = target.policy;
        Ok(())
    }
}

impl StartupVisitor for ExecuteVisitor {
    #[tracing::instrument(level = "debug", skip(self, tree))]
    fn startup(&mut self, tree: &Expr) -> Result<()> {
        begin(&mut self.state)?;
        debug!(
            operators = tree.chain_len(),
            engine = %self.config.settings().engine(),
            "Translating write"
        );

        let outcome = self.translate_tree(tree);
        if let Err(err) = &outcome {
            debug!(error = %err, "Write translation failed");
            self.state = VisitorState::Faulted;
        }
        outcome
    }

    fn state(&self) -> VisitorState {
        self.state
    }
}

// ==================== Target ====================

fn target(expressions: &ExpressionWriter<'_>, w: &mut Writer, expr: &Expr, name: &str) -> Result<Target> {
    let QueryState {
        block,
        shape,
        grouped,
        policy,
        ..
    } = expressions.walk_unqualified(w, expr)?;

    let kind = shape.kind();
    let Shape::Entity { info, .. } = shape else {
        return Err(Error::unsupported_operator(
            name,
            format!("the target must be an entity table, not a {kind}"),
        ));
    };
    let sealed = block.is_sealed();
    let SelectBlock {
        from,
        joins,
        filters,
        group_by,
        having,
        order_by,
        ..
    } = block;
    let FromItem::Table { name: table, .. } = from else {
        return Err(Error::unsupported_operator(name, "the target must be a table"));
    };
    if sealed
        || grouped
        || !joins.is_empty()
        || !group_by.is_empty()
        || !having.is_empty()
        || !order_by.is_empty()
    {
        return Err(Error::unsupported_operator(
            name,
            "the target may only be filtered",
        ));
    }

    Ok(Target {
        info,
        table,
        filters,
        policy,
    })
}

fn row_arg(call: &Call) -> Result<&[(String, Value)]> {
    match call.args.get(1) {
        Some(Expr::Row(values)) => Ok(values),
        _ => Err(Error::Argument(format!("{} expects an entity row", call.name))),
    }
}

fn row_value<'r>(row: &'r [(String, Value)], member: &str) -> Option<&'r Value> {
    row.iter().find(|(m, _)| m == member).map(|(_, v)| v)
}

// ==================== Predicates ====================

/// Key and concurrency-token predicates that pin `row`.
fn identity(w: &mut Writer, info: &TableInfo, row: &[(String, Value)]) -> Result<Vec<String>> {
    let keys = info.key_columns();
    if keys.is_empty() {
        return Err(Error::Argument(format!(
            "{} has no key; a row cannot be identified",
            info.table_name
        )));
    }

    let mut predicates = Vec::with_capacity(keys.len() + info.tokens.len());
    for (member, column) in keys {
        let value = row_value(row, member)
            .filter(|value| !value.is_null())
            .ok_or_else(|| {
                Error::Argument(format!(
                    "key member {member} of {} has no value",
                    info.table_name
                ))
            })?;
        predicates.push(w.capture(|w| {
            let column = qualified(w, None, column);
            w.write(column);
            w.compare(BinaryOp::Eq, Polarity::Positive);
            w.parameter(member, value.clone());
            Ok(())
        })?);
    }

    for (member, _) in &info.tokens {
        let column = info
            .column(member)
            .ok_or_else(|| Error::unmapped(&info.table_name, member))?;
        let value = row_value(row, member).cloned().unwrap_or(Value::Null);
        predicates.push(w.capture(|w| {
            let column = qualified(w, None, column);
            w.write(column);
            if value.is_null() {
                w.is_null(Polarity::Positive);
            } else {
                w.compare(BinaryOp::Eq, Polarity::Positive);
                w.parameter(member, value);
            }
            Ok(())
        })?);
    }
    Ok(predicates)
}

fn write_where(w: &mut Writer, predicates: &[String]) {
    if !predicates.is_empty() {
        w.keyword(" WHERE ");
        w.write(predicates.join(" AND "));
    }
}

// ==================== Update ====================

fn write_update(w: &mut Writer, table: &str, assignments: &[String], predicates: &[String]) {
    w.keyword("UPDATE ");
    w.name(table);
    w.keyword(" SET ");
    w.write(assignments.join(", "));
    write_where(w, predicates);
}

/// `SET` items of `Update(q, λ)`, from the members the lambda assigns.
fn assign_lambda(
    expressions: &ExpressionWriter<'_>,
    w: &mut Writer,
    info: &Arc<TableInfo>,
    lambda: &Lambda,
) -> Result<Vec<String>> {
    let Expr::New(fields) = &lambda.body else {
        return Err(Error::unsupported_operator(
            "Update",
            format!("expects a lambda building the new values, got a {}", lambda.body.kind()),
        ));
    };
    let [param] = lambda.params.as_slice() else {
        return Err(Error::unsupported_operator(
            "Update",
            format!("expects a one-parameter lambda, got {} parameters", lambda.arity()),
        ));
    };
    let bindings = vec![(
        param.clone(),
        Shape::Entity {
            alias: None,
            info: Arc::clone(info),
        },
    )];

    let mut assignments = Vec::with_capacity(fields.len() + info.tokens.len());
    expressions.with_scope(bindings, || {
        for (member, value) in fields {
            let column = writable_column(info, member)?;
            assignments.push(w.capture(|w| {
                let column = qualified(w, None, column);
                w.write(column);
                w.write(" = ");
                match value {
                    Expr::Constant(constant) => {
                        w.parameter(member, constant.clone());
                        Ok(())
                    }
                    other => expressions.write(w, other),
                }
            })?);
        }
        Ok(())
    })?;

    let assigned: Vec<&str> = fields.iter().map(|(m, _)| m.as_str()).collect();
    refresh_tokens(w, info, &assigned, &mut assignments)?;
    Ok(assignments)
}

/// `SET` items of `Update(q, row)`: every writable member that is not a
/// token.
fn assign_row(w: &mut Writer, info: &TableInfo, row: &[(String, Value)]) -> Result<Vec<String>> {
    let mut assignments = Vec::new();
    for (member, column) in info.writable_columns() {
        if info.token(member).is_some() {
            continue;
        }
        let Some(value) = row_value(row, member) else {
            continue;
        };
        assignments.push(w.capture(|w| {
            let column = qualified(w, None, column);
            w.write(column);
            w.write(" = ");
            w.parameter(member, value.clone());
            Ok(())
        })?);
    }
    refresh_tokens(w, info, &[], &mut assignments)?;

    if assignments.is_empty() {
        return Err(Error::Argument(format!(
            "{} has no writable members to update",
            info.table_name
        )));
    }
    Ok(assignments)
}

/// Advance every token the statement does not assign itself. Read-only
/// tokens are maintained by the database.
fn refresh_tokens(
    w: &mut Writer,
    info: &TableInfo,
    assigned: &[&str],
    assignments: &mut Vec<String>,
) -> Result<()> {
    for (member, policy) in &info.tokens {
        if assigned.contains(&member.as_str()) || info.is_read_only(member) {
            continue;
        }
        let column = info
            .column(member)
            .ok_or_else(|| Error::unmapped(&info.table_name, member))?;
        let column = qualified(w, None, column);
        assignments.push(match policy {
            TokenPolicy::Version => format!("{column} = {column} + 1"),
            TokenPolicy::Timestamp => format!("{column} = CURRENT_TIMESTAMP"),
        });
    }
    Ok(())
}

fn writable_column<'i>(info: &'i TableInfo, member: &str) -> Result<&'i str> {
    let column = insertable_column(info, member)?;
    if info.is_writable(member) {
        Ok(column)
    } else {
        Err(Error::Argument(format!(
            "{member} of {} is a key and cannot be assigned",
            info.table_name
        )))
    }
}

fn insertable_column<'i>(info: &'i TableInfo, member: &str) -> Result<&'i str> {
    let column = info
        .column(member)
        .ok_or_else(|| Error::unmapped(&info.table_name, member))?;
    if info.is_read_only(member) {
        Err(Error::Argument(format!(
            "{member} of {} is read-only",
            info.table_name
        )))
    } else {
        Ok(column)
    }
}

// ==================== Insert ====================

fn insert_row(w: &mut Writer, target: &Target, row: &[(String, Value)]) -> Result<String> {
    let columns: Vec<(&str, &str)> = target
        .info
        .insertable_columns()
        .filter(|(member, _)| row_value(row, member).is_some())
        .collect();
    if columns.is_empty() {
        return Err(Error::Argument(format!(
            "{} has no writable members to insert",
            target.info.table_name
        )));
    }

    w.capture(|w| {
        w.keyword("INSERT INTO ");
        w.name(&target.table);
        w.whitespace();
        write_columns(w, columns.iter().map(|(_, column)| *column));
        w.keyword(" VALUES (");
        for (i, (member, _)) in columns.iter().enumerate() {
            if i > 0 {
                w.delimiter();
            }
            let value = row_value(row, member).cloned().unwrap_or(Value::Null);
            w.parameter(member, value);
        }
        w.close_brace();
        Ok(())
    })
}

/// `INSERT INTO t (cols) SELECT ...`. The column list depends on the
/// projection of the source, so it is filled in after the source is walked.
fn insert_query(
    expressions: &ExpressionWriter<'_>,
    w: &mut Writer,
    target: &Target,
    source: &Expr,
) -> Result<String> {
    w.capture(|w| {
        w.keyword("INSERT INTO ");
        w.name(&target.table);
        let columns = w.reserve();
        w.whitespace();

        let state = expressions.walk(w, source)?;
        let leaves = state.shape.leaves(w)?;
        let sql = expressions.render_query(w, &state)?;
        w.write(sql);

        let mut names = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            names.push(insertable_column(&target.info, &leaf.name)?);
        }
        let list = w.capture(|w| {
            w.whitespace();
            write_columns(w, names.iter().copied());
            Ok(())
        })?;
        w.fill(columns, list);
        Ok(())
    })
}

fn write_columns<'c>(w: &mut Writer, columns: impl Iterator<Item = &'c str>) {
    w.open_brace();
    for (i, column) in columns.enumerate() {
        if i > 0 {
            w.delimiter();
        }
        let column = qualified(w, None, column);
        w.write(column);
    }
    w.close_brace();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Query;
    use crate::dialect::Engine;
    use crate::expr::lambda;
    use crate::testing::{Ledger, Order, User, registry};
    use std::sync::Mutex;

    fn users() -> Query<User> {
        Query::with_registry(registry())
    }

    fn orders() -> Query<Order> {
        Query::with_registry(registry())
    }

    fn ann() -> User {
        User {
            id: 7,
            name: "Ann".to_string(),
            age: 31,
            version: 3,
        }
    }

    fn translate(engine: Engine, tree: &Expr) -> Result<CommandSql> {
        ExecuteVisitor::translate(tree, &TranslateConfig::for_engine(engine))
    }

    // ==================== Delete Tests ====================

    #[test]
    fn test_delete_with_filter() {
        let tree = users()
            .filter(lambda("u", |u| u.member("age").lt(18)))
            .delete()
            .into_expr();
        let command = translate(Engine::PostgreSql, &tree).unwrap();
        assert_eq!(command.sql, "DELETE FROM \"users\" WHERE \"age\" < 18");
        assert!(command.parameters.is_empty());
    }

    #[test]
    fn test_delete_whole_table() {
        let tree = users().delete().into_expr();
        let command = translate(Engine::MySql, &tree).unwrap();
        assert_eq!(command.sql, "DELETE FROM `users`");
    }

    #[test]
    fn test_delete_row_by_key_and_token() {
        let tree = users().delete_row(&ann()).into_expr();
        let command = translate(Engine::SqlServer, &tree).unwrap();
        assert_eq!(
            command.sql,
            "DELETE FROM [users] WHERE [id] = @id AND [version] = @version"
        );
        assert_eq!(command.parameters.get("id"), Some(&Value::BigInt(7)));
        assert_eq!(command.parameters.get("version"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_delete_row_without_key_value() {
        let row = Expr::Row(vec![("name".to_string(), Value::from("Ann"))]);
        let tree = Expr::call("Delete", vec![users().into_expr(), row]);
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_null_token_compares_with_is_null() {
        let row = Expr::Row(vec![
            ("id".to_string(), Value::from(7i64)),
            ("version".to_string(), Value::Null),
        ]);
        let tree = Expr::call("Delete", vec![users().into_expr(), row]);
        let command = translate(Engine::Sqlite, &tree).unwrap();
        assert_eq!(
            command.sql,
            "DELETE FROM \"users\" WHERE \"id\" = @id AND \"version\" IS NULL"
        );
    }

    // ==================== Update Tests ====================

    #[test]
    fn test_update_with_lambda() {
        let tree = users()
            .filter(lambda("u", |u| u.member("id").eq(5)))
            .update(lambda("u", |u| {
                Expr::new_object([
                    ("name", Expr::lit("Ann")),
                    ("age", u.member("age").add(1)),
                ])
            }))
            .into_expr();
        let command = translate(Engine::PostgreSql, &tree).unwrap();
        assert_eq!(
            command.sql,
            "UPDATE \"users\" SET \"user_name\" = :name, \"age\" = (\"age\" + 1), \
             \"version\" = \"version\" + 1 WHERE \"id\" = 5"
        );
        assert_eq!(command.parameters.get("name"), Some(&Value::from("Ann")));
    }

    #[test]
    fn test_update_assigning_token_skips_refresh() {
        let tree = users()
            .update(lambda("u", |u| {
                Expr::new_object([("version", u.member("version").mul(2))])
            }))
            .into_expr();
        let command = translate(Engine::Sqlite, &tree).unwrap();
        assert_eq!(
            command.sql,
            "UPDATE \"users\" SET \"version\" = (\"version\" * 2)"
        );
    }

    #[test]
    fn test_update_read_only_member_is_rejected() {
        let tree = orders()
            .update(lambda("o", |_| {
                Expr::new_object([("created_at", Expr::lit("2024-01-01"))])
            }))
            .into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_update_key_member_is_rejected() {
        let tree = users()
            .update(lambda("u", |_| Expr::new_object([("id", Expr::lit(9i64))])))
            .into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_read_only_token_is_not_refreshed() {
        let row = Ledger {
            id: 1,
            amount: 9.5,
            stamp: Some("0x01".to_string()),
        };
        let tree = Query::<Ledger>::with_registry(registry())
            .update_row(&row)
            .into_expr();
        let command = translate(Engine::PostgreSql, &tree).unwrap();
        assert_eq!(
            command.sql,
            "UPDATE \"ledgers\" SET \"amount\" = :amount WHERE \"id\" = :id AND \"stamp\" = :stamp"
        );

        let tree = Query::<Ledger>::with_registry(registry())
            .update(lambda("l", |l| Expr::new_object([("amount", l.member("amount").mul(2))])))
            .into_expr();
        let command = translate(Engine::PostgreSql, &tree).unwrap();
        assert_eq!(
            command.sql,
            "UPDATE \"ledgers\" SET \"amount\" = (\"amount\" * 2)"
        );
    }

    #[test]
    fn test_update_unknown_member_is_mapping_error() {
        let tree = users()
            .update(lambda("u", |_| Expr::new_object([("email", Expr::lit("a@b"))])))
            .into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn test_update_requires_object_body() {
        let tree = users()
            .update(lambda("u", |u| u.member("age").add(1)))
            .into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.operator(), Some("Update"));
    }

    #[test]
    fn test_update_row() {
        let tree = users().update_row(&ann()).into_expr();
        let command = translate(Engine::PostgreSql, &tree).unwrap();
        assert_eq!(
            command.sql,
            "UPDATE \"users\" SET \"user_name\" = :name, \"age\" = :age, \
             \"version\" = \"version\" + 1 WHERE \"id\" = :id AND \"version\" = :version"
        );
        assert_eq!(
            command.parameters.names(),
            vec!["name", "age", "id", "version"]
        );
    }

    // ==================== Insert Tests ====================

    #[test]
    fn test_insert_row_skips_read_only() {
        let order = Order {
            id: 1,
            user_id: 7,
            total: 9.5,
            created_at: None,
        };
        let tree = orders().insert(&order).into_expr();
        let command = translate(Engine::SqlServer, &tree).unwrap();
        assert_eq!(
            command.sql,
            "INSERT INTO [orders] ([id], [user_id], [total]) VALUES (@id, @user_id, @total)"
        );
        assert_eq!(command.parameters.len(), 3);
    }

    #[test]
    fn test_insert_from_query() {
        let source = users()
            .filter(lambda("u", |u| u.member("age").ge(18)))
            .select(lambda("u", |u| {
                Expr::new_object([("user_id", u.clone().member("id")), ("total", u.member("age"))])
            }));
        let tree = orders().insert_from(source).into_expr();
        let command = translate(Engine::PostgreSql, &tree).unwrap();
        assert_eq!(
            command.sql,
            "INSERT INTO \"orders\" (\"user_id\", \"total\") SELECT \"u\".\"id\" AS \"user_id\", \
             \"u\".\"age\" AS \"total\" FROM \"users\" AS \"u\" WHERE \"u\".\"age\" >= 18"
        );
    }

    #[test]
    fn test_insert_from_query_with_unmapped_column() {
        let source = users().select(lambda("u", |u| {
            Expr::new_object([("nickname", u.member("name"))])
        }));
        let tree = orders().insert_from(source).into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn test_insert_into_filtered_target_is_rejected() {
        let tree = users()
            .filter(lambda("u", |u| u.member("age").gt(1)))
            .insert(&ann())
            .into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(err.is_unsupported());
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_paged_target_is_rejected() {
        let tree = users().take(5).delete().into_expr();
        let config = TranslateConfig::default();
        let mut visitor = ExecuteVisitor::new(&config);
        let err = visitor.startup(&tree).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(visitor.state(), VisitorState::Faulted);
        assert!(matches!(visitor.to_sql(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_sorted_target_is_rejected() {
        let delete = users()
            .order_by(lambda("u", |u| u.member("age")))
            .delete()
            .into_expr();
        let err = translate(Engine::PostgreSql, &delete).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.operator(), Some("Delete"));

        let update = users()
            .filter(lambda("u", |u| u.member("age").lt(18)))
            .order_by_descending(lambda("u", |u| u.member("name")))
            .update(lambda("u", |u| Expr::new_object([("age", u.member("age").add(1))])))
            .into_expr();
        let err = translate(Engine::SqlServer, &update).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.operator(), Some("Update"));
    }

    #[test]
    fn test_read_tree_is_not_a_write() {
        let tree = users().into_expr();
        let err = translate(Engine::PostgreSql, &tree).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_timeout_and_hook_carry_over() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tree = users()
            .time_out(30)
            .watch_sql(move |command| sink.lock().unwrap().push(command.sql.clone()))
            .delete()
            .into_expr();

        let config = TranslateConfig::default();
        let mut visitor = ExecuteVisitor::new(&config);
        visitor.startup(&tree).unwrap();
        let first = visitor.to_sql().unwrap();
        let second = visitor.to_sql().unwrap();

        assert_eq!(first.command_timeout, Some(30));
        assert_eq!(first.sql, second.sql);
        assert_eq!(visitor.state(), VisitorState::Completed);
        assert_eq!(*seen.lock().unwrap(), vec!["DELETE FROM \"users\"".to_string()]);
    }
}
