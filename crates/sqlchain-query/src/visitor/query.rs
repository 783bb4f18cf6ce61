//! Read-side visitor.

use std::sync::Arc;

use sqlchain_core::{Error, Result, Value};
use tracing::{debug, trace};

use super::expression::ExpressionWriter;
use super::walker::ReadPolicy;
use super::{StartupVisitor, VisitorState, begin, ready};
use crate::command::{CommandSql, TypedCommandSql};
use crate::config::TranslateConfig;
use crate::expr::Expr;
use crate::writer::Writer;

/// Translates a read chain into a [`TypedCommandSql`].
///
/// Besides the statement, the visitor exposes the read policy gathered from
/// the chain: whether a row is required (`First`, `Single`, ...), the
/// fallback of the `OrDefault` forms, the missing-row message and the
/// command timeout. The policy is only carried into the command; the
/// compiler never checks row counts itself.
///
/// ```
/// use sqlchain_query::{QueryVisitor, StartupVisitor, TranslateConfig, VisitorState};
/// # use sqlchain_core::{Entity, FieldInfo, TableRegistry, NamingConvention, Value};
/// # struct User;
/// # impl Entity for User {
/// #     const TYPE_NAME: &'static str = "User";
/// #     fn fields() -> &'static [FieldInfo] {
/// #         const FIELDS: &[FieldInfo] = &[FieldInfo::new("id").key(true)];
/// #         FIELDS
/// #     }
/// #     fn to_row(&self) -> Vec<(&'static str, Value)> { Vec::new() }
/// # }
/// # let registry = TableRegistry::new(NamingConvention::SnakeCase);
/// use sqlchain_query::Query;
///
/// let tree = Query::<User>::with_registry(&registry).first().into_expr();
/// let config = TranslateConfig::default();
/// let mut visitor = QueryVisitor::new(&config);
/// visitor.startup(&tree).unwrap();
/// let command = visitor.to_sql::<Value>().unwrap();
///
/// assert_eq!(command.sql, "SELECT \"id\" FROM \"user\" LIMIT 1");
/// assert!(visitor.required());
/// assert_eq!(visitor.state(), VisitorState::Completed);
/// ```
pub struct QueryVisitor {
    config: TranslateConfig,
    writer: Writer,
    state: VisitorState,
    sql: String,
    policy: ReadPolicy,
    command: Option<CommandSql>,
}

impl std::fmt::Debug for QueryVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryVisitor")
            .field("state", &self.state)
            .field("sql", &self.sql)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl QueryVisitor {
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
    pub fn translate<T>(tree: &Expr, config: &TranslateConfig) -> Result<TypedCommandSql<T>>
    where
        T: TryFrom<Value>,
        Error: From<T::Error>,
    {
        let mut visitor = Self::new(config);
        visitor.startup(tree)?;
        visitor.to_sql()
    }

    // ==================== Read Policy ====================

    /// At least one row must be returned.
    pub fn required(&self) -> bool {
        self.policy.required
    }

    /// An `OrDefault` form supplies a fallback.
    pub fn has_default_value(&self) -> bool {
        self.policy.has_default_value
    }

    /// The explicit fallback value, if one was given.
    pub fn default_value(&self) -> Option<&Value> {
        self.policy.default_value.as_ref()
    }

    pub fn missing_data_message(&self) -> Option<&str> {
        self.policy.missing_data_message.as_deref()
    }

    /// Command timeout in seconds from the chain, else the configured
    /// default.
    pub fn time_out(&self) -> Option<u32> {
        self.policy.time_out.or(self.config.default_timeout())
    }

    // ==================== Output ====================

    /// Freeze the translation.
    ///
    /// The first call completes the visitor and runs the `WatchSql` hooks;
    /// later calls return the same command.
    pub fn to_sql<T>(&mut self) -> Result<TypedCommandSql<T>>
    where
        T: TryFrom<Value>,
        Error: From<T::Error>,
    {
        ready(self.state)?;
        let command = self.freeze();
        let default_value = self
            .policy
            .default_value
            .clone()
            .map(T::try_from)
            .transpose()?;

        Ok(TypedCommandSql {
            command,
            required: self.policy.required,
            has_default_value: self.policy.has_default_value,
            default_value,
            missing_data_message: self.policy.missing_data_message.clone(),
        })
    }

    fn freeze(&mut self) -> CommandSql {
        if let Some(command) = &self.command {
            return command.clone();
        }

        let parameters = self.writer.parameters_in(&self.sql);
        let mut command = CommandSql::new(self.sql.clone(), parameters);
        command.command_timeout = self.time_out();
        for hook in &self.policy.hooks {
            hook.call(&command);
        }

        debug!(
            parameters = command.parameters.len(),
            required = self.policy.required,
            "Query translated"
        );
        trace!(sql = %command.sql, "Query SQL");
        self.state = VisitorState::Completed;
        self.command = Some(command.clone());
        command
    }

    fn translate_tree(&mut self, tree: &Expr) -> Result<()> {
        let expressions = ExpressionWriter::new(&self.config);
        let state = expressions.walk(&mut self.writer, tree)?;
        self.sql = expressions.render_query(&mut self.writer, &state)?;
        self.policy = state.policy;
        Ok(())
    }
}

impl StartupVisitor for QueryVisitor {
    #[tracing::instrument(level = "debug", skip(self, tree))]
    fn startup(&mut self, tree: &Expr) -> Result<()> {
        begin(&mut self.state)?;
        debug!(
            operators = tree.chain_len(),
            engine = %self.config.settings().engine(),
            "Translating query"
        );

        let outcome = self.translate_tree(tree);
        if let Err(err) = &outcome {
            debug!(error = %err, "Query translation failed");
            self.state = VisitorState::Faulted;
        }
        outcome
    }

    fn state(&self) -> VisitorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Query;
    use crate::dialect::Engine;
    use crate::expr::{Call, lambda, lambda2};
    use crate::testing::{Order, User, registry};
    use crate::visitor::CustomVisitor;
    use std::sync::Mutex;

    fn sql(engine: Engine, tree: &Expr) -> String {
        let config = TranslateConfig::for_engine(engine);
        QueryVisitor::translate::<Value>(tree, &config).unwrap().command.sql
    }

    fn users() -> Query<User> {
        Query::with_registry(registry())
    }

    fn orders() -> Query<Order> {
        Query::with_registry(registry())
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_second_startup_is_rejected() {
        let config = TranslateConfig::default();
        let tree = users().into_expr();
        let mut visitor = QueryVisitor::new(&config);
        visitor.startup(&tree).unwrap();
        assert_eq!(visitor.state(), VisitorState::Started);

        let err = visitor.startup(&tree).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(visitor.state(), VisitorState::Started);
    }

    #[test]
    fn test_unsupported_construct_faults_visitor() {
        let config = TranslateConfig::default();
        let tree = Expr::call("Zip", vec![users().into_expr(), orders().into_expr()]);
        let mut visitor = QueryVisitor::new(&config);

        let err = visitor.startup(&tree).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.operator(), Some("Zip"));
        assert_eq!(visitor.state(), VisitorState::Faulted);
        assert!(visitor.to_sql::<Value>().is_err());
    }

    #[test]
    fn test_to_sql_before_startup_is_rejected() {
        let config = TranslateConfig::default();
        let mut visitor = QueryVisitor::new(&config);
        assert!(matches!(
            visitor.to_sql::<Value>().unwrap_err(),
            Error::InvalidState(_)
        ));
    }

    #[test]
    fn test_to_sql_is_repeatable_and_hooks_fire_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tree = users()
            .watch_sql(move |command| sink.lock().unwrap().push(command.sql.clone()))
            .into_expr();
        let config = TranslateConfig::default();
        let mut visitor = QueryVisitor::new(&config);
        visitor.startup(&tree).unwrap();

        let first = visitor.to_sql::<Value>().unwrap();
        let second = visitor.to_sql::<Value>().unwrap();
        assert_eq!(first.sql, second.sql);
        assert_eq!(visitor.state(), VisitorState::Completed);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    // ==================== Filter and Projection Tests ====================

    #[test]
    fn test_where_double_negation() {
        let negated = users().filter(lambda("x", |x| x.member("id").gt(0).not()));
        let direct = users().filter(lambda("x", |x| x.member("id").le(0)));
        let expected = "SELECT [x].[id], [x].[user_name] AS [name], [x].[age], [x].[version] \
                        FROM [users] AS [x] WHERE [x].[id] <= 0";
        assert_eq!(sql(Engine::SqlServer, &negated.into_expr()), expected);
        assert_eq!(sql(Engine::SqlServer, &direct.into_expr()), expected);
    }

    #[test]
    fn test_select_projection_with_parameters() {
        let tree = users()
            .filter(lambda("u", |u| u.member("name").eq(Expr::var("name", "bob"))))
            .select(lambda("u", |u| {
                Expr::new_object([("id", u.clone().member("id")), ("label", u.member("name"))])
            }))
            .into_expr();
        let config = TranslateConfig::for_engine(Engine::PostgreSql);
        let command = QueryVisitor::translate::<Value>(&tree, &config).unwrap();

        assert_eq!(
            command.sql,
            "SELECT \"u\".\"id\", \"u\".\"user_name\" AS \"label\" FROM \"users\" AS \"u\" \
             WHERE \"u\".\"user_name\" = :name"
        );
        assert_eq!(command.parameters.get("name"), Some(&Value::from("bob")));
    }

    #[test]
    fn test_unmapped_member_is_mapping_error() {
        let tree = users()
            .filter(lambda("u", |u| u.member("email").eq("x")))
            .into_expr();
        let config = TranslateConfig::default();
        let err = QueryVisitor::translate::<Value>(&tree, &config).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    // ==================== Paging and Ordering Tests ====================

    #[test]
    fn test_order_and_page_on_sql_server() {
        let tree = users()
            .order_by(lambda("u", |u| u.member("age")))
            .then_by_descending(lambda("u", |u| u.member("id")))
            .skip(10)
            .take(5)
            .into_expr();
        assert_eq!(
            sql(Engine::SqlServer, &tree),
            "SELECT [u].[id], [u].[user_name] AS [name], [u].[age], [u].[version] FROM [users] AS [u] \
             ORDER BY [u].[age], [u].[id] DESC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_filter_after_take_wraps() {
        let tree = users()
            .take(3)
            .filter(lambda("u", |u| u.member("age").ge(18)))
            .select(lambda("u", |u| u.member("id")))
            .into_expr();
        assert_eq!(
            sql(Engine::Sqlite, &tree),
            "SELECT \"t0\".\"id\" FROM (SELECT \"id\", \"user_name\" AS \"name\", \"age\", \"version\" \
             FROM \"users\" LIMIT 3) AS \"t0\" WHERE \"t0\".\"age\" >= 18"
        );
    }

    #[test]
    fn test_dropped_sort_key_leaves_no_parameter() {
        let config = TranslateConfig::for_engine(Engine::PostgreSql);

        let replaced = users()
            .order_by(lambda("u", |u| u.member("name").index_of("x")))
            .order_by(lambda("u", |u| u.member("age")))
            .into_expr();
        let command = QueryVisitor::translate::<Value>(&replaced, &config).unwrap();
        assert!(command.sql.ends_with("ORDER BY \"u\".\"age\""));
        assert!(command.parameters.is_empty());

        let wrapped = users()
            .order_by(lambda("u", |u| u.member("name").index_of("x")))
            .distinct()
            .filter(lambda("u", |u| u.member("age").ge(Expr::var("age", 18))))
            .into_expr();
        let command = QueryVisitor::translate::<Value>(&wrapped, &config).unwrap();
        assert!(!command.sql.contains("STRPOS"));
        assert_eq!(command.parameters.names(), vec!["age"]);
    }

    #[test]
    fn test_reverse_without_order_is_unsupported() {
        let tree = users().reverse().into_expr();
        let config = TranslateConfig::default();
        let err = QueryVisitor::translate::<Value>(&tree, &config).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.operator(), Some("Reverse"));
    }

    #[test]
    fn test_take_last_flips_twice() {
        let tree = users()
            .order_by(lambda("u", |u| u.member("id")))
            .take_last(2)
            .select(lambda("u", |u| u.member("id")))
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"t0\".\"id\" FROM (SELECT \"u\".\"id\", \"u\".\"user_name\" AS \"name\", \
             \"u\".\"age\", \"u\".\"version\" FROM \"users\" AS \"u\" ORDER BY \"u\".\"id\" DESC LIMIT 2) \
             AS \"t0\" ORDER BY \"t0\".\"id\""
        );
    }

    #[test]
    fn test_negative_take_is_argument_error() {
        let tree = users().take(-1).into_expr();
        let config = TranslateConfig::default();
        let err = QueryVisitor::translate::<Value>(&tree, &config).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    // ==================== Element and Policy Tests ====================

    #[test]
    fn test_single_takes_two_and_requires_a_row() {
        let tree = users()
            .single_where(lambda("u", |u| u.member("id").eq(7)))
            .into_expr();
        let config = TranslateConfig::for_engine(Engine::MySql).command_timeout(12);
        let mut visitor = QueryVisitor::new(&config);
        visitor.startup(&tree).unwrap();
        let command = visitor.to_sql::<Value>().unwrap();

        assert!(command.sql.ends_with("WHERE `u`.`id` = 7 LIMIT 2"));
        assert!(command.required);
        assert!(!command.has_default_value);
        assert_eq!(command.command_timeout, Some(12));
    }

    #[test]
    fn test_or_default_carries_typed_default() {
        let tree = users()
            .select(lambda("u", |u| u.member("age")))
            .first_or(-1)
            .into_expr();
        let config = TranslateConfig::default();
        let command = QueryVisitor::translate::<i32>(&tree, &config).unwrap();

        assert!(!command.required);
        assert!(command.has_default_value);
        assert_eq!(command.default_value, Some(-1));
    }

    #[test]
    fn test_repository_extensions() {
        let tree = users()
            .from("archived_users")
            .time_out(45)
            .no_result_error("user not found")
            .first()
            .into_expr();
        let config = TranslateConfig::default().command_timeout(5);
        let command = QueryVisitor::translate::<Value>(&tree, &config).unwrap();

        assert!(command.sql.contains("FROM \"archived_users\""));
        assert_eq!(command.command_timeout, Some(45));
        assert_eq!(command.missing_data_message.as_deref(), Some("user not found"));
    }

    #[test]
    fn test_last_flips_order() {
        let tree = users()
            .order_by(lambda("u", |u| u.member("age")))
            .last()
            .into_expr();
        assert!(sql(Engine::PostgreSql, &tree).ends_with("ORDER BY \"u\".\"age\" DESC LIMIT 1"));
    }

    // ==================== Quantifier and Aggregate Tests ====================

    #[test]
    fn test_any_renders_case_exists() {
        let tree = users()
            .any_where(lambda("u", |u| u.member("age").lt(18)))
            .into_expr();
        assert_eq!(
            sql(Engine::SqlServer, &tree),
            "SELECT CASE WHEN EXISTS(SELECT 1 FROM [users] AS [u] WHERE [u].[age] < 18) THEN 1 ELSE 0 END"
        );
    }

    #[test]
    fn test_all_negates_predicate() {
        let tree = users()
            .all(lambda("u", |u| u.member("age").ge(18)))
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT CASE WHEN NOT EXISTS(SELECT 1 FROM \"users\" AS \"u\" WHERE \"u\".\"age\" < 18) \
             THEN TRUE ELSE FALSE END"
        );
    }

    #[test]
    fn test_count_with_predicate() {
        let tree = users()
            .count_where(lambda("u", |u| u.member("age").gt(30)))
            .into_expr();
        assert_eq!(
            sql(Engine::MySql, &tree),
            "SELECT COUNT(*) FROM `users` AS `u` WHERE `u`.`age` > 30"
        );
    }

    #[test]
    fn test_sum_with_selector() {
        let tree = orders().sum(lambda("o", |o| o.member("total"))).into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT SUM(\"o\".\"total\") FROM \"orders\" AS \"o\""
        );
    }

    #[test]
    fn test_contains_renders_in() {
        let tree = users()
            .select(lambda("u", |u| u.member("id")))
            .contains(Expr::var("id", 3))
            .into_expr();
        assert_eq!(
            sql(Engine::Sqlite, &tree),
            "SELECT CASE WHEN @id IN (SELECT \"u\".\"id\" FROM \"users\" AS \"u\") THEN 1 ELSE 0 END"
        );
    }

    // ==================== Grouping Tests ====================

    #[test]
    fn test_group_by_with_having_and_aggregates() {
        let tree = orders()
            .group_by(lambda("o", |o| o.member("user_id")))
            .filter(lambda("g", |g| g.count().gt(2)))
            .select(lambda("g", |g| {
                Expr::new_object([
                    ("user_id", g.clone().member("key")),
                    ("spent", g.sum(lambda("o", |o| o.member("total")))),
                ])
            }))
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"o\".\"user_id\", SUM(\"o\".\"total\") AS \"spent\" FROM \"orders\" AS \"o\" \
             GROUP BY \"o\".\"user_id\" HAVING COUNT(*) > 2"
        );
    }

    #[test]
    fn test_group_by_with_result_selector() {
        let tree = orders()
            .group_by_result(
                lambda("o", |o| o.member("user_id")),
                lambda2("k", "g", |k, g| {
                    Expr::new_object([("user_id", k), ("orders", g.count())])
                }),
            )
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"o\".\"user_id\", COUNT(*) AS \"orders\" FROM \"orders\" AS \"o\" \
             GROUP BY \"o\".\"user_id\""
        );
    }

    #[test]
    fn test_count_of_groups_wraps_grouped_block() {
        let tree = orders()
            .group_by(lambda("o", |o| o.member("user_id")))
            .count()
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT COUNT(*) FROM (SELECT \"o\".\"user_id\" AS \"value\" FROM \"orders\" AS \"o\" \
             GROUP BY \"o\".\"user_id\") AS \"t0\""
        );

        let tree = orders()
            .group_by(lambda("o", |o| o.member("user_id")))
            .count_where(lambda("g", |g| g.count().gt(2)))
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT COUNT(*) FROM (SELECT \"o\".\"user_id\" AS \"value\" FROM \"orders\" AS \"o\" \
             GROUP BY \"o\".\"user_id\" HAVING COUNT(*) > 2) AS \"t0\""
        );
    }

    #[test]
    fn test_sum_over_groups_is_unsupported() {
        let tree = orders()
            .group_by(lambda("o", |o| o.member("user_id")))
            .sum(lambda("g", |g| g.member("key")))
            .into_expr();
        let config = TranslateConfig::default();
        let err = QueryVisitor::translate::<Value>(&tree, &config).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.operator(), Some("Sum"));
    }

    // ==================== Join Tests ====================

    #[test]
    fn test_inner_join() {
        let tree = users()
            .join(
                orders(),
                lambda("u", |u| u.member("id")),
                lambda("o", |o| o.member("user_id")),
                lambda2("u", "o", |u, o| {
                    Expr::new_object([("name", u.member("name")), ("total", o.member("total"))])
                }),
            )
            .into_expr();
        assert_eq!(
            sql(Engine::SqlServer, &tree),
            "SELECT [u].[user_name] AS [name], [o].[total] FROM [users] AS [u] \
             INNER JOIN [orders] AS [o] ON [u].[id] = [o].[user_id]"
        );
    }

    #[test]
    fn test_group_join_is_left_join_with_inner_filter() {
        let tree = users()
            .group_join(
                orders().filter(lambda("o", |o| o.member("total").gt(100))),
                lambda("u", |u| u.member("id")),
                lambda("x", |x| x.member("user_id")),
                lambda2("u", "o", |u, o| {
                    Expr::new_object([("id", u.member("id")), ("total", o.member("total"))])
                }),
            )
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"u\".\"id\", \"o\".\"total\" FROM \"users\" AS \"u\" LEFT JOIN \"orders\" AS \"o\" \
             ON \"u\".\"id\" = \"o\".\"user_id\" AND \"o\".\"total\" > 100"
        );
    }

    #[test]
    fn test_select_many_left_join() {
        let tree = users()
            .select_many_with(
                lambda("u", |u| {
                    orders()
                        .filter(lambda("o", move |o| o.member("user_id").eq(u.member("id"))))
                        .default_if_empty()
                        .into_expr()
                }),
                lambda2("u", "o", |u, o| {
                    Expr::new_object([("name", u.member("name")), ("total", o.member("total"))])
                }),
            )
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"u\".\"user_name\" AS \"name\", \"o\".\"total\" FROM \"users\" AS \"u\" \
             LEFT JOIN \"orders\" AS \"o\" ON \"o\".\"user_id\" = \"u\".\"id\""
        );
    }

    // ==================== Subquery Tests ====================

    #[test]
    fn test_correlated_any_in_filter() {
        let tree = users()
            .filter(lambda("u", |u| {
                orders()
                    .any_where(lambda("o", move |o| o.member("user_id").eq(u.member("id"))))
                    .into_expr()
                    .not()
            }))
            .select(lambda("u", |u| u.member("id")))
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"u\".\"id\" FROM \"users\" AS \"u\" WHERE NOT EXISTS(SELECT 1 FROM \"orders\" AS \"o\" \
             WHERE \"o\".\"user_id\" = \"u\".\"id\")"
        );
    }

    #[test]
    fn test_scalar_subquery_in_projection() {
        let tree = users()
            .select(lambda("u", |u| {
                Expr::new_object([
                    ("id", u.clone().member("id")),
                    (
                        "orders",
                        orders()
                            .count_where(lambda("o", move |o| o.member("user_id").eq(u.member("id"))))
                            .into_expr(),
                    ),
                ])
            }))
            .into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"u\".\"id\", (SELECT COUNT(*) FROM \"orders\" AS \"o\" WHERE \"o\".\"user_id\" = \"u\".\"id\") \
             AS \"orders\" FROM \"users\" AS \"u\""
        );
    }

    // ==================== Set Operation Tests ====================

    #[test]
    fn test_union_of_projections() {
        let young = users()
            .filter(lambda("u", |u| u.member("age").lt(18)))
            .select(lambda("u", |u| u.member("id")));
        let old = users()
            .filter(lambda("v", |v| v.member("age").gt(65)))
            .select(lambda("v", |v| v.member("id")));
        let tree = young.union(old).into_expr();
        assert_eq!(
            sql(Engine::PostgreSql, &tree),
            "SELECT \"u\".\"id\" AS \"value\" FROM \"users\" AS \"u\" WHERE \"u\".\"age\" < 18 UNION \
             SELECT \"v\".\"id\" AS \"value\" FROM \"users\" AS \"v\" WHERE \"v\".\"age\" > 65"
        );
    }

    #[test]
    fn test_concat_then_filter_wraps_compound() {
        let tree = users()
            .concat(users())
            .filter(lambda("x", |x| x.member("age").gt(1)))
            .count()
            .into_expr();
        let sql = sql(Engine::PostgreSql, &tree);
        assert!(sql.starts_with("SELECT COUNT(*) FROM (SELECT \"id\", \"user_name\" AS \"name\""));
        assert!(sql.contains(" UNION ALL "));
        assert!(sql.ends_with(") AS \"t0\" WHERE \"t0\".\"age\" > 1"));
    }

    // ==================== Custom Visitor Tests ====================

    struct Soundex;

    impl CustomVisitor for Soundex {
        fn can_resolve(&self, call: &Call) -> bool {
            call.name == "Soundex"
        }

        fn visit(
            &self,
            expressions: &ExpressionWriter<'_>,
            w: &mut Writer,
            call: &Call,
        ) -> Result<()> {
            w.keyword("SOUNDEX(");
            expressions.write(w, &call.args[0])?;
            w.close_brace();
            Ok(())
        }
    }

    #[test]
    fn test_custom_visitor_translates_unknown_method() {
        let tree = users()
            .filter(lambda("u", |u| {
                u.member("name")
                    .method("Soundex", Vec::new())
                    .eq(Expr::var("code", "R163"))
            }))
            .count()
            .into_expr();
        let config = TranslateConfig::for_engine(Engine::MySql).with_visitor(Soundex);
        let command = QueryVisitor::translate::<i64>(&tree, &config).unwrap();
        assert_eq!(
            command.sql,
            "SELECT COUNT(*) FROM `users` AS `u` WHERE SOUNDEX(`u`.`user_name`) = ?code"
        );
    }
}
