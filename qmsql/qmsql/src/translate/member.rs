use super::{MemberAccess, MemberTranslator};
use crate::ir::rel::SqlExpr;

type Rule = fn(&MemberAccess) -> Option<SqlExpr>;

pub(super) fn translators() -> Vec<MemberTranslator> {
    let rules: [Rule; 2] = [string_length, date_time_now];
    rules
        .into_iter()
        .map(|rule| Box::new(rule) as MemberTranslator)
        .collect()
}

fn string_length(access: &MemberAccess) -> Option<SqlExpr> {
    let target = access.target.as_ref()?;
    if access.member != "Length" || !target.node.ty.is_string() {
        return None;
    }
    Some(SqlExpr::function("LENGTH", vec![target.sql.clone()?]))
}

fn date_time_now(access: &MemberAccess) -> Option<SqlExpr> {
    if access.target.is_some() || access.member != "DateTime.Now" {
        return None;
    }
    Some(SqlExpr::Fragment("CURRENT_TIMESTAMP".to_string()))
}

#[cfg(test)]
mod tests {
    use qmsql_ast::{Expr, Ty};

    use crate::ir::rel::{ColumnOwner, SqlExpr};
    use crate::translate::{MemberAccess, Operand, TranslatorRegistry};

    #[test]
    fn test_string_length() {
        let name = Expr::source("c", Ty::class("Customer")).member("Name", Ty::String);
        let node = name.clone().member("Length", Ty::Int32);
        let column = SqlExpr::column("Name", ColumnOwner::Table("c".to_string()));

        let access = MemberAccess {
            node: &node,
            target: Some(Operand {
                node: &name,
                sql: Some(column.clone()),
            }),
            member: "Length",
        };
        assert_eq!(
            TranslatorRegistry::new().translate_member(&access),
            Some(SqlExpr::function("LENGTH", vec![column]))
        );
    }
}
