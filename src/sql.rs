use crate::builder::{
    assignment_params, assignments, condition_params, conditions, driving_table,
    duplicate_key_policies, insert_columns, insert_rows, joins, orders, QueryBuilder,
};
use crate::command::{Command, CommandKind, Params, Payload};
use crate::encode::{
    encode_assignment, encode_condition, encode_duplicate_key, encode_fields, encode_join,
    encode_order, encode_row_placeholders,
};
use crate::error::{QueryError, Result};
use crate::query::Query;
use indexmap::IndexMap;
use tracing::trace;

/// Function MySQL uses to refer to the row being inserted
const UPSERT_FN: &str = "values";

/// SQL query builder (MySQL dialect)
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlQueryBuilder;

impl SqlQueryBuilder {
    pub fn new() -> Self {
        Self
    }

    fn push_joins(sql: &mut String, query: &Query) {
        for (segment, join) in joins(query) {
            sql.push(' ');
            sql.push_str(&encode_join(&segment.table, join));
        }
    }

    fn push_where(sql: &mut String, query: &Query) {
        let parts: Vec<String> = conditions(query)
            .map(|(segment, condition)| encode_condition(&segment.table, condition).text)
            .collect();
        if !parts.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&parts.join(" and "));
        }
    }

    fn push_order(sql: &mut String, query: &Query) {
        let parts: Vec<String> = orders(query)
            .map(|(segment, order)| encode_order(&segment.table, order))
            .collect();
        if !parts.is_empty() {
            sql.push_str(" order by ");
            sql.push_str(&parts.join(", "));
        }
    }
}

impl QueryBuilder for SqlQueryBuilder {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn select_command(&self, query: &Query) -> Result<Command> {
        let fields = query
            .segments()
            .iter()
            .flat_map(encode_fields)
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("select {} from {}", fields, driving_table(query));
        Self::push_joins(&mut sql, query);
        Self::push_where(&mut sql, query);
        Self::push_order(&mut sql, query);

        let mut params = IndexMap::new();
        condition_params(query, &mut params);

        trace!(segments = query.segments().len(), %sql, "rendered select");
        Ok(Command::new(CommandKind::Find, Payload::Text(sql), Params::Named(params)))
    }

    fn insert_command(&self, query: &Query) -> Result<Command> {
        let rows = insert_rows(query);
        if rows.is_empty() {
            return Err(QueryError::InvalidParams(
                "insert requires at least one row".to_string(),
            ));
        }

        let mut sql = format!("insert into {}", driving_table(query));

        let columns = insert_columns(query);
        if !columns.is_empty() {
            sql.push_str(&format!(" ({})", columns.join(", ")));
        }

        let groups = rows
            .iter()
            .map(|row| encode_row_placeholders(row.len()))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" values ");
        sql.push_str(&groups);

        let mut clauses = Vec::new();
        for (column, policy) in duplicate_key_policies(query) {
            if let Some(clause) = encode_duplicate_key(column, policy, UPSERT_FN)? {
                clauses.push(clause);
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" on duplicate key update ");
            // clauses are separated by a bare space, not a comma
            sql.push_str(&clauses.join(" "));
        }

        let values = rows.into_iter().flatten().collect();

        trace!(%sql, "rendered insert");
        Ok(Command::new(CommandKind::Insert, Payload::Text(sql), Params::Positional(values)))
    }

    fn update_command(&self, query: &Query) -> Result<Command> {
        let sets: Vec<String> = assignments(query)
            .map(|(segment, assignment)| encode_assignment(&segment.table, assignment).text)
            .collect();
        if sets.is_empty() {
            return Err(QueryError::InvalidParams(
                "update requires at least one assignment".to_string(),
            ));
        }

        let mut sql = format!("update {}", driving_table(query));
        Self::push_joins(&mut sql, query);
        sql.push_str(" set ");
        sql.push_str(&sets.join(", "));
        Self::push_where(&mut sql, query);

        let mut params = IndexMap::new();
        assignment_params(query, &mut params);
        condition_params(query, &mut params);

        trace!(%sql, "rendered update");
        Ok(Command::new(CommandKind::Update, Payload::Text(sql), Params::Named(params)))
    }

    fn delete_command(&self, query: &Query) -> Result<Command> {
        let mut sql = format!("delete from {}", driving_table(query));
        Self::push_joins(&mut sql, query);
        Self::push_where(&mut sql, query);

        let mut params = IndexMap::new();
        condition_params(query, &mut params);

        trace!(%sql, "rendered delete");
        Ok(Command::new(CommandKind::Delete, Payload::Text(sql), Params::Named(params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::hash_param;
    use crate::engine::Engine;
    use crate::query::{DuplicateKeyExpr, DuplicateKeyPolicy};
    use serde_json::json;

    fn query(table: &str) -> Query {
        Engine::mock().table(table)
    }

    fn text(command: &Command) -> &str {
        command.payload().as_text().unwrap()
    }

    #[test]
    fn test_select_all() {
        let command = SqlQueryBuilder::new().select_command(&query("test")).unwrap();

        assert_eq!(text(&command), "select test.* from test");
        assert!(command.params().is_empty());
        assert_eq!(command.kind(), CommandKind::Find);
    }

    #[test]
    fn test_select_fields() {
        let mut q = query("test");
        q.select(["column1", "column2"]);
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        assert_eq!(text(&command), "select test.column1, test.column2 from test");
    }

    #[test]
    fn test_order_fields() {
        let mut q = query("test");
        q.select(["column1", "column2"])
            .order("column1", "asc")
            .unwrap()
            .order("column2", "desc")
            .unwrap();
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "select test.column1, test.column2 from test order by test.column1 asc, test.column2 desc"
        );
    }

    #[test]
    fn test_join() {
        let mut q = query("test");
        q.inner_join("test2", [("column1", "column2")]);
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "select test.*, test2.* from test inner join test2 on test.column1 = test2.column2"
        );
        assert!(command.params().is_empty());
    }

    #[test]
    fn test_chained_joins() {
        let mut q = query("a");
        q.select(["id"])
            .inner_join("b", [("id", "a_id")])
            .select(["name"])
            .where_eq("name", "x")
            .join("c", [("id", "b_id"), ("kind", "kind")], "left")
            .unwrap()
            .order_desc("created");
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        assert_eq!(
            text(&command),
            format!(
                "select a.id, b.name, c.* from a inner join b on a.id = b.a_id \
                 left join c on b.id = c.b_id and b.kind = c.kind \
                 where b.name = {} order by c.created desc",
                hash_param("bname")
            )
        );
    }

    #[test]
    fn test_params() {
        let mut q = query("test");
        q.select(["column1", "column2"]).where_eq("column1", "test");
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        let hash = hash_param("testcolumn1");
        assert_eq!(
            text(&command),
            format!("select test.column1, test.column2 from test where test.column1 = {}", hash)
        );
        assert_eq!(command.params().len(), 1);
        assert_eq!(command.params().get(&hash), Some(&json!("test")));
    }

    #[test]
    fn test_bound_params() {
        let mut q = query("test");
        q.select(["column1", "column2"])
            .where_eq("column1", ":column1")
            .where_eq("column2", ":column2");
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "select test.column1, test.column2 from test where test.column1 = :column1 and test.column2 = :column2"
        );
        assert_eq!(command.params().get(":column1"), Some(&json!(":column1")));
        assert_eq!(command.params().get(":column2"), Some(&json!(":column2")));
    }

    #[test]
    fn test_repeated_column_shares_param() {
        let mut q = query("test");
        q.where_op("age", 18, ">").unwrap().where_op("age", 65, "<").unwrap();
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        let hash = hash_param("testage");
        assert_eq!(
            text(&command),
            format!("select test.* from test where test.age > {0} and test.age < {0}", hash)
        );
        assert_eq!(command.params().len(), 1);
        assert_eq!(command.params().get(&hash), Some(&json!(65)));
    }

    #[test]
    fn test_in_and_null_conditions() {
        let mut q = query("test");
        q.where_in("id", vec![json!(1), json!(2)]).where_null("deleted");
        let command = SqlQueryBuilder::new().select_command(&q).unwrap();

        let hash = hash_param("testid");
        assert_eq!(
            text(&command),
            format!("select test.* from test where test.id in ({}) and test.deleted is null", hash)
        );
        assert_eq!(command.params().get(&hash), Some(&json!([1, 2])));
        assert_eq!(command.params().len(), 1);
    }

    #[test]
    fn test_delete_single_table() {
        let command = SqlQueryBuilder::new().delete_command(&query("test")).unwrap();
        assert_eq!(text(&command), "delete from test");
        assert_eq!(command.kind(), CommandKind::Delete);
    }

    #[test]
    fn test_delete_multiple_tables() {
        let mut q = query("test");
        q.inner_join("test2", [("test1Col", "test2Col")]);
        let command = SqlQueryBuilder::new().delete_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "delete from test inner join test2 on test.test1Col = test2.test2Col"
        );
    }

    #[test]
    fn test_delete_with_where() {
        let mut q = query("test");
        q.where_eq("id", ":id");
        let command = SqlQueryBuilder::new().delete_command(&q).unwrap();

        assert_eq!(text(&command), "delete from test where test.id = :id");
    }

    fn insert_query(columns: &[&str], rows: serde_json::Value) -> Query {
        let mut q = query("test");
        q.columns(columns.iter().copied()).values(rows);
        q
    }

    #[test]
    fn test_insert_single_row() {
        let q = insert_query(&["test", "test2"], json!(["1", "2"]));
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(text(&command), "insert into test (test, test2) values (?, ?)");
        assert_eq!(command.params().positional(), Some(&[json!("1"), json!("2")][..]));
        assert_eq!(command.kind(), CommandKind::Insert);
    }

    #[test]
    fn test_insert_multiple_rows() {
        let q = insert_query(&["test", "test2"], json!([[1, 2], [3, 4]]));
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(text(&command), "insert into test (test, test2) values (?, ?), (?, ?)");
        assert_eq!(
            command.params().positional(),
            Some(&[json!(1), json!(2), json!(3), json!(4)][..])
        );
    }

    #[test]
    fn test_insert_without_columns() {
        let q = insert_query(&[], json!([1, 2, 3]));
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(text(&command), "insert into test values (?, ?, ?)");
    }

    #[test]
    fn test_insert_requires_rows() {
        let mut q = query("test");
        q.columns(["a"]);
        assert!(matches!(
            SqlQueryBuilder::new().insert_command(&q),
            Err(QueryError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_duplicate_key_update() {
        let mut q = insert_query(&["test", "test2"], json!(["1", "2"]));
        q.on_duplicate_key_update([("test2", DuplicateKeyPolicy::Update)]);
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "insert into test (test, test2) values (?, ?) on duplicate key update test2 = values(test2)"
        );
    }

    #[test]
    fn test_duplicate_key_update_multiples() {
        let mut q = insert_query(&["test", "test2", "test3", "test4"], json!(["1", "2", "3", "4"]));
        q.on_duplicate_key_update([
            ("test", DuplicateKeyPolicy::Update),
            ("test2", DuplicateKeyPolicy::Update),
            ("test3", DuplicateKeyPolicy::Retain),
            ("test4", DuplicateKeyPolicy::Update),
        ]);
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "insert into test (test, test2, test3, test4) values (?, ?, ?, ?) \
             on duplicate key update test = values(test) test2 = values(test2) test4 = values(test4)"
        );
    }

    #[test]
    fn test_duplicate_key_constant_and_expression() {
        let mut q = insert_query(&["a", "b", "c"], json!([1, 2, 3]));
        q.on_duplicate_key_update([
            ("a", DuplicateKeyPolicy::Constant(json!(2))),
            (
                "c",
                DuplicateKeyPolicy::Expr(DuplicateKeyExpr::add(vec![
                    DuplicateKeyExpr::update("a"),
                    DuplicateKeyExpr::update("b"),
                ])),
            ),
        ]);
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(
            text(&command),
            "insert into test (a, b, c) values (?, ?, ?) on duplicate key update a = 2 c = values(a) + values(b)"
        );
    }

    #[test]
    fn test_duplicate_key_all_retained() {
        let mut q = insert_query(&["a"], json!([1]));
        q.on_duplicate_key_update([("a", DuplicateKeyPolicy::Retain)]);
        let command = SqlQueryBuilder::new().insert_command(&q).unwrap();

        assert_eq!(text(&command), "insert into test (a) values (?)");
    }

    #[test]
    fn test_update() {
        let mut q = query("test");
        q.set("name", "Alice").set("age", 30).where_eq("id", ":id");
        let command = SqlQueryBuilder::new().update_command(&q).unwrap();

        assert_eq!(
            text(&command),
            format!(
                "update test set test.name = {}, test.age = {} where test.id = :id",
                hash_param("settestname"),
                hash_param("settestage")
            )
        );
        assert_eq!(command.params().len(), 3);
        assert_eq!(command.params().get(&hash_param("settestage")), Some(&json!(30)));
        assert_eq!(command.kind(), CommandKind::Update);
    }

    #[test]
    fn test_update_with_join() {
        let mut q = query("a");
        q.set("flag", 1).inner_join("b", [("id", "a_id")]).where_eq("kind", ":kind");
        let command = SqlQueryBuilder::new().update_command(&q).unwrap();

        assert_eq!(
            text(&command),
            format!(
                "update a inner join b on a.id = b.a_id set a.flag = {} where b.kind = :kind",
                hash_param("setaflag")
            )
        );
    }

    #[test]
    fn test_update_set_and_where_on_same_column() {
        let mut q = query("t");
        q.set("status", "archived").where_eq("status", "active");
        let command = SqlQueryBuilder::new().update_command(&q).unwrap();

        let set = hash_param("settstatus");
        let filter = hash_param("tstatus");
        assert_eq!(
            text(&command),
            format!("update t set t.status = {} where t.status = {}", set, filter)
        );
        assert_eq!(command.params().len(), 2);
        assert_eq!(command.params().get(&set), Some(&json!("archived")));
        assert_eq!(command.params().get(&filter), Some(&json!("active")));
    }

    #[test]
    fn test_update_requires_assignment() {
        assert!(matches!(
            SqlQueryBuilder::new().update_command(&query("test")),
            Err(QueryError::InvalidParams(_))
        ));
    }
}
