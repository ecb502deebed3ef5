use crate::warehouse::Table;

/// Render a table as CSV: a header row in the table's column order, then one
/// line per row. NULL cells become empty fields.
pub fn render_csv(table: &Table) -> String {
    let mut out = String::with_capacity(64 * (table.rows.len() + 1));
    push_record(&mut out, table.columns.iter().map(|c| Some(c.as_str())));
    for row in &table.rows {
        push_record(&mut out, row.iter().map(Option::as_deref));
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = Option<&'a str>>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if let Some(value) = field {
            out.push_str(&escape_csv_field(value));
        }
    }
    out.push_str("\r\n");
}

/// Escape a CSV field to prevent CSV injection attacks.
///
/// Wraps the field in double quotes and escapes internal double quotes.
/// Fields starting with `=`, `+` or `@` get a leading single quote so
/// spreadsheets do not evaluate them. A leading `-` is only neutralised when
/// the field is not a plain number, since negative values are legitimate data.
fn escape_csv_field(field: &str) -> String {
    let escaped = field.replace('"', "\"\"");
    let formula = escaped.starts_with('=')
        || escaped.starts_with('+')
        || escaped.starts_with('@')
        || (escaped.starts_with('-') && escaped.parse::<f64>().is_err());
    if formula {
        format!("\"'{escaped}\"")
    } else {
        format!("\"{escaped}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            columns: vec![
                "datetime".to_string(),
                "pagePath".to_string(),
                "eventLabel".to_string(),
            ],
            rows: vec![
                vec![
                    Some("2024-01-01 09:00:00".to_string()),
                    Some("/apply".to_string()),
                    None,
                ],
                vec![
                    Some("2024-01-01 09:01:00".to_string()),
                    Some("/apply/step-2".to_string()),
                    Some("say \"hi\", then leave".to_string()),
                ],
            ],
        }
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&table());
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "\"datetime\",\"pagePath\",\"eventLabel\"");
        assert_eq!(lines[1], "\"2024-01-01 09:00:00\",\"/apply\",");
        assert_eq!(
            lines[2],
            "\"2024-01-01 09:01:00\",\"/apply/step-2\",\"say \"\"hi\"\", then leave\""
        );
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_render_empty_table_keeps_header() {
        let t = Table {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: Vec::new(),
        };
        assert_eq!(render_csv(&t), "\"a\",\"b\"\r\n");
    }

    #[test]
    fn test_escape_csv_field_plain() {
        assert_eq!(escape_csv_field("/about"), "\"/about\"");
    }

    #[test]
    fn test_escape_csv_field_with_quotes() {
        assert_eq!(escape_csv_field("it's \"great\""), "\"it's \"\"great\"\"\"");
    }

    #[test]
    fn test_escape_csv_field_formula_injection() {
        assert_eq!(escape_csv_field("=CMD|'/c calc'"), "\"'=CMD|'/c calc'\"");
        assert_eq!(escape_csv_field("+1+2"), "\"'+1+2\"");
        assert_eq!(escape_csv_field("-1-2"), "\"'-1-2\"");
        assert_eq!(escape_csv_field("@SUM(A1)"), "\"'@SUM(A1)\"");
    }

    #[test]
    fn test_escape_csv_field_negative_number() {
        assert_eq!(escape_csv_field("-42"), "\"-42\"");
        assert_eq!(escape_csv_field("-0.5"), "\"-0.5\"");
    }
}
