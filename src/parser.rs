/*
    Parser for the query-file dialect. A query file holds a single statement:

        SELECT [DISTINCT] * | attr-list
        FROM table-list
        [WHERE comparison AND comparison ...]
        [GROUPBY attr-list]
        [LIMIT n] [OFFSET n]

    Attributes are always written table.column; the projection list may wrap
    an attribute in MAX/MIN/SUM/COUNT/AVG(...). Comparisons between
    attributes of two different tables become join conditions, everything
    else becomes a selection.
 */

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case, take_while1};
use nom::character::complete::{char, digit1, multispace0, multispace1};
use nom::character::is_alphanumeric;
use nom::combinator::{map, map_res, opt, recognize};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded, tuple};
use nom::IResult;

use crate::catalog::{AggKind, Attribute};
use crate::error::QpError;
use crate::query::{CompareOp, CondRhs, Condition, SqlQuery};
use crate::types::TupleValue;

/// Parses a complete query file. Anything left over after the statement
/// (other than whitespace) is an error.
pub fn parse_query_file(text: &str) -> Result<SqlQuery, QpError> {
    match parse_select(text) {
        Ok((rest, query)) => {
            if rest.trim().is_empty() {
                Ok(query)
            } else {
                Err(QpError::Parse(format!("trailing input after query: {:?}", rest.trim())))
            }
        }
        Err(e) => Err(QpError::Parse(format!("malformed query: {}", e))),
    }
}

fn parse_select(rest_query: &str) -> IResult<&str, SqlQuery> {
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, _) = tag_no_case("SELECT")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, distinct) = opt(tuple((tag_no_case("DISTINCT"), multispace1)))(rest_query)?;
    let (rest_query, projections) = alt((parse_star, parse_attribute_list))(rest_query)?;
    let (rest_query, _) = tag_no_case("FROM")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, from) = parse_table_list(rest_query)?;
    let (rest_query, conditions) = opt(parse_where_clause)(rest_query)?;
    let (rest_query, group_by) = opt(parse_group_by)(rest_query)?;
    let (rest_query, limit) = opt(parse_limit)(rest_query)?;
    let (rest_query, offset) = opt(parse_offset)(rest_query)?;
    let mut selections = Vec::new();
    let mut joins = Vec::new();
    for (lhs, op, rhs) in conditions.unwrap_or_default() {
        match rhs {
            CondRhs::Attr(attr) if attr.table != lhs.table => {
                joins.push(Condition::join(lhs, op, attr));
            }
            rhs => selections.push(Condition::select(lhs, op, rhs)),
        }
    }
    Ok((
        rest_query,
        SqlQuery {
            from,
            selections,
            joins,
            projections,
            group_by: group_by.unwrap_or_default(),
            distinct: distinct.is_some(),
            limit,
            offset: offset.unwrap_or(0),
        },
    ))
}

fn parse_star(rest_query: &str) -> IResult<&str, Vec<Attribute>> {
    let (rest_query, _) = tag("*")(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, Vec::new()))
}

fn parse_attribute_list(rest_query: &str) -> IResult<&str, Vec<Attribute>> {
    let (rest_query, list) =
        separated_list1(parse_list_separator, parse_projection_attribute)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, list))
}

fn parse_projection_attribute(rest_query: &str) -> IResult<&str, Attribute> {
    alt((parse_aggregate_attribute, parse_plain_attribute))(rest_query)
}

fn parse_aggregate_attribute(rest_query: &str) -> IResult<&str, Attribute> {
    let (rest_query, agg) = parse_agg_kind(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, mut attr) =
        delimited(char('('), parse_plain_attribute, char(')'))(rest_query)?;
    attr.agg = Some(agg);
    Ok((rest_query, attr))
}

fn parse_agg_kind(rest_query: &str) -> IResult<&str, AggKind> {
    alt((
        map(tag_no_case("MAX"), |_| AggKind::Max),
        map(tag_no_case("MIN"), |_| AggKind::Min),
        map(tag_no_case("SUM"), |_| AggKind::Sum),
        map(tag_no_case("COUNT"), |_| AggKind::Count),
        map(tag_no_case("AVG"), |_| AggKind::Avg),
    ))(rest_query)
}

fn parse_plain_attribute(rest_query: &str) -> IResult<&str, Attribute> {
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, table) = take_while1(is_identifier_char)(rest_query)?;
    let (rest_query, _) = tag(".")(rest_query)?;
    let (rest_query, column) = take_while1(is_identifier_char)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, Attribute::new(table, column)))
}

fn parse_table_list(rest_query: &str) -> IResult<&str, Vec<String>> {
    let (rest_query, list) = separated_list1(parse_list_separator, parse_table_name)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, list))
}

fn parse_table_name(rest_query: &str) -> IResult<&str, String> {
    let (rest_query, name) = take_while1(is_identifier_char)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, name.to_string()))
}

fn parse_list_separator(rest_query: &str) -> IResult<&str, &str> {
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, separator) = tag(",")(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, separator))
}

fn parse_where_clause(rest_query: &str) -> IResult<&str, Vec<(Attribute, CompareOp, CondRhs)>> {
    let (rest_query, _) = tag_no_case("WHERE")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, list) = separated_list1(parse_and_separator, parse_comparison)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, list))
}

fn parse_and_separator(rest_query: &str) -> IResult<&str, &str> {
    // rhs parsers may already have eaten the space before AND
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, separator) = tag_no_case("AND")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    Ok((rest_query, separator))
}

fn parse_comparison(rest_query: &str) -> IResult<&str, (Attribute, CompareOp, CondRhs)> {
    let (rest_query, lhs) = parse_plain_attribute(rest_query)?;
    let (rest_query, op) = parse_compare_op(rest_query)?;
    let (rest_query, rhs) = parse_rhs(rest_query)?;
    Ok((rest_query, (lhs, op, rhs)))
}

fn parse_compare_op(rest_query: &str) -> IResult<&str, CompareOp> {
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, op) = alt((
        map(tag("<="), |_| CompareOp::LessThanOrEqual),
        map(tag(">="), |_| CompareOp::GreaterThanOrEqual),
        map(tag("<>"), |_| CompareOp::NotEqual),
        map(tag("="), |_| CompareOp::Equal),
        map(tag("<"), |_| CompareOp::LessThan),
        map(tag(">"), |_| CompareOp::GreaterThan),
    ))(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, op))
}

fn parse_rhs(rest_query: &str) -> IResult<&str, CondRhs> {
    alt((
        map(parse_string_literal, CondRhs::Value),
        map(parse_float_literal, CondRhs::Value),
        map(parse_int_literal, CondRhs::Value),
        map(parse_plain_attribute, CondRhs::Attr),
    ))(rest_query)
}

fn parse_string_literal(rest_query: &str) -> IResult<&str, TupleValue> {
    let (rest_query, string) = delimited(char('\''), is_not("'"), char('\''))(rest_query)?;
    Ok((rest_query, TupleValue::String(String::from(string))))
}

fn parse_float_literal(rest_query: &str) -> IResult<&str, TupleValue> {
    let (rest_query, value) = map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        str::parse::<f32>,
    )(rest_query)?;
    Ok((rest_query, TupleValue::Float(value)))
}

fn parse_int_literal(rest_query: &str) -> IResult<&str, TupleValue> {
    let (rest_query, value) = map_res(
        recognize(preceded(opt(char('-')), digit1)),
        str::parse::<i32>,
    )(rest_query)?;
    Ok((rest_query, TupleValue::Int(value)))
}

fn parse_group_by(rest_query: &str) -> IResult<&str, Vec<Attribute>> {
    let (rest_query, _) = tag_no_case("GROUPBY")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, list) =
        separated_list1(parse_list_separator, parse_plain_attribute)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, list))
}

fn parse_limit(rest_query: &str) -> IResult<&str, u64> {
    let (rest_query, _) = tag_no_case("LIMIT")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, value) = map_res(digit1, str::parse::<u64>)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, value))
}

fn parse_offset(rest_query: &str) -> IResult<&str, u64> {
    let (rest_query, _) = tag_no_case("OFFSET")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, value) = map_res(digit1, str::parse::<u64>)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, value))
}

fn is_identifier_char(c: char) -> bool {
    is_alphanumeric(c as u8) || c == '_'
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_star_query() {
        let query = parse_query_file("SELECT * FROM emp").unwrap();
        assert_eq!(query.from, vec!["emp".to_string()]);
        assert!(query.projections.is_empty());
        assert!(!query.distinct);
        assert_eq!(query.limit, None);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn test_parse_projection_and_where() {
        let query = parse_query_file(
            "SELECT emp.name, dept.dname FROM emp, dept \
             WHERE emp.deptid = dept.id AND emp.salary > 1000",
        )
        .unwrap();
        assert_eq!(query.from, vec!["emp".to_string(), "dept".to_string()]);
        assert_eq!(query.projections.len(), 2);
        assert_eq!(query.joins.len(), 1);
        assert_eq!(query.selections.len(), 1);
        assert_eq!(query.joins[0].lhs, Attribute::new("emp", "deptid"));
        assert_eq!(query.selections[0].op, CompareOp::GreaterThan);
        assert_eq!(
            query.selections[0].rhs,
            CondRhs::Value(TupleValue::Int(1000))
        );
    }

    #[test]
    fn test_parse_chained_attribute_comparisons() {
        let query = parse_query_file(
            "SELECT * FROM emp, dept, loc \
             WHERE emp.deptid = dept.id AND dept.locid = loc.id AND loc.size > 2",
        )
        .unwrap();
        assert_eq!(query.joins.len(), 2);
        assert_eq!(query.selections.len(), 1);
        assert_eq!(query.joins[1].rhs_attr(), &Attribute::new("loc", "id"));
    }

    #[test]
    fn test_same_table_comparison_is_selection() {
        let query =
            parse_query_file("SELECT * FROM emp WHERE emp.bonus < emp.salary").unwrap();
        assert!(query.joins.is_empty());
        assert_eq!(query.selections.len(), 1);
    }

    #[test]
    fn test_parse_aggregate_projection() {
        let query = parse_query_file("SELECT MAX(emp.salary), emp.deptid FROM emp").unwrap();
        assert_eq!(query.projections[0].agg, Some(AggKind::Max));
        assert_eq!(query.projections[0], Attribute::new("emp", "salary"));
        assert_eq!(query.projections[1].agg, None);
    }

    #[test]
    fn test_parse_distinct_groupby_limit_offset() {
        let query = parse_query_file(
            "SELECT DISTINCT emp.deptid FROM emp GROUPBY emp.deptid LIMIT 10 OFFSET 3",
        )
        .unwrap();
        assert!(query.distinct);
        assert_eq!(query.group_by, vec![Attribute::new("emp", "deptid")]);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, 3);
    }

    #[test]
    fn test_parse_literals() {
        let query = parse_query_file(
            "SELECT * FROM emp WHERE emp.name = 'Smith' AND emp.rate <= 12.5",
        )
        .unwrap();
        assert_eq!(
            query.selections[0].rhs,
            CondRhs::Value(TupleValue::String("Smith".to_string()))
        );
        assert_eq!(
            query.selections[1].rhs,
            CondRhs::Value(TupleValue::Float(12.5))
        );
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse_query_file("SELECT * FROM emp nonsense here").is_err());
        assert!(parse_query_file("FROM emp").is_err());
    }
}
